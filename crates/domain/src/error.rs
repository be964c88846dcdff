//! Domain error taxonomy shared by all control plane services.

use thiserror::Error;

/// Errors surfaced synchronously by control plane operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Flag, request or backup record absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal state transition or duplicate unique key.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input rejected before touching storage.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dump utility, filesystem or eraser failure.
    #[error("External failure: {0}")]
    ExternalFailure(String),

    /// Storage collaborator failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Short machine-readable code for logs and responses.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::Validation(_) => "validation_error",
            DomainError::ExternalFailure(_) => "external_failure",
            DomainError::Storage(_) => "storage_error",
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => DomainError::Conflict("Resource already exists".into()),
                Some("23514") => DomainError::Validation(format!("Constraint violated: {}", db_err)),
                _ => DomainError::Storage(format!("Database error: {}", db_err)),
            },
            _ => DomainError::Storage(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();

        if messages.is_empty() {
            DomainError::Validation("Invalid request".into())
        } else {
            DomainError::Validation(messages.join("; "))
        }
    }
}

impl From<validator::ValidationError> for DomainError {
    fn from(error: validator::ValidationError) -> Self {
        DomainError::Validation(
            error
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            DomainError::NotFound("flag".into()).to_string(),
            "Not found: flag"
        );
        assert_eq!(
            DomainError::Conflict("state".into()).to_string(),
            "Conflict: state"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(DomainError::Validation("x".into()).code(), "validation_error");
        assert_eq!(
            DomainError::ExternalFailure("x".into()).code(),
            "external_failure"
        );
    }

    #[test]
    fn test_from_row_not_found() {
        let err: DomainError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn test_from_validation_error() {
        let mut inner = validator::ValidationError::new("range");
        inner.message = Some("Out of range".into());
        let err: DomainError = inner.into();
        match err {
            DomainError::Validation(msg) => assert_eq!(msg, "Out of range"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
