use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single form field that failed validation, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field (snake_case record field name)
    pub field: &'static str,

    /// Human readable reason
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every failure the dashboard can surface to the user who triggered it.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("authentication failed: {0}")]
    Auth(&'static str),

    #[error("role {role} may not {operation}")]
    Forbidden { role: String, operation: String },

    #[error("dataset unavailable: {0}")]
    DataUnavailable(String),

    #[error("invalid input: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("no matching record: {0}")]
    NotFound(String),

    #[error("failed to write dataset: {0}")]
    Persist(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl DashboardError {
    pub fn invalid_credentials() -> Self {
        DashboardError::Auth("InvalidCredentials")
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DashboardError::Validation(vec![FieldError::new(field, message)])
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = DashboardError::Validation(vec![
            FieldError::new("city", "must not be empty"),
            FieldError::new("cases", "must be a non-negative integer"),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid input: city: must not be empty, cases: must be a non-negative integer"
        );
    }

    #[test]
    fn invalid_credentials_is_an_auth_error() {
        let err = DashboardError::invalid_credentials();
        assert!(matches!(err, DashboardError::Auth("InvalidCredentials")));
    }
}
