//! HTTP surface: probes, metrics and the create-user endpoint

pub mod server;
pub mod validation;

pub use server::{error_response, routes, start_server};
pub use validation::{is_valid_email, validate_create_user};
