//! Business services built on the broker client

pub mod health;
pub mod user;

pub use health::{BrokerHealthCheck, HealthCheck, HealthCheckResult, HealthService, Readiness};
pub use user::{NewUser, User, UserService, NOTIFICATION_QUEUE, USER_CREATED_PATTERN};
