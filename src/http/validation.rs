//! Request body validation for `POST /users`

use crate::error::FieldErrors;
use crate::service::user::NewUser;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

const REQUIRED_FIELDS: [&str; 3] = ["name", "email", "password"];

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email))
}

/// Parse and validate a create-user body.
///
/// Every failing field is reported, not just the first one.
pub fn validate_create_user(body: &[u8]) -> Result<NewUser, FieldErrors> {
    let mut errors = FieldErrors::new();

    let value: Value = match serde_json::from_slice(body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            errors.insert("body".to_string(), vec!["must be a JSON object".to_string()]);
            return Err(errors);
        }
        Err(e) => {
            errors.insert("body".to_string(), vec![format!("invalid JSON: {e}")]);
            return Err(errors);
        }
    };

    let mut field = |name: &str| -> Option<String> {
        match value.get(name) {
            None | Some(Value::Null) => {
                errors
                    .entry(name.to_string())
                    .or_default()
                    .push(format!("{name} is required"));
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors
                    .entry(name.to_string())
                    .or_default()
                    .push(format!("{name} is required"));
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors
                    .entry(name.to_string())
                    .or_default()
                    .push(format!("{name} must be a string"));
                None
            }
        }
    };

    let [name, email, password] = REQUIRED_FIELDS.map(&mut field);

    if let Some(address) = &email {
        if !is_valid_email(address) {
            errors
                .entry("email".to_string())
                .or_default()
                .push("email must be a valid email address".to_string());
        }
    }

    match (name, email, password) {
        (Some(name), Some(email), Some(password)) if errors.is_empty() => Ok(NewUser {
            name,
            email,
            password,
        }),
        _ => Err(errors),
    }
}
