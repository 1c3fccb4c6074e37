use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirmError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: i64 },

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl FirmError {
    pub fn task_not_found(id: i64) -> Self {
        FirmError::NotFound {
            resource: "Task",
            id,
        }
    }

    pub fn user_not_found(id: i64) -> Self {
        FirmError::NotFound {
            resource: "User",
            id,
        }
    }

    pub fn to_error_code(&self) -> &'static str {
        match self {
            FirmError::NotFound { resource, .. } => match *resource {
                "Task" => "TASK_NOT_FOUND",
                "Subtask" => "SUBTASK_NOT_FOUND",
                "User" => "USER_NOT_FOUND",
                "Client" => "CLIENT_NOT_FOUND",
                "Organization" => "ORG_NOT_FOUND",
                "Action type" => "ACTION_TYPE_NOT_FOUND",
                _ => "NOT_FOUND",
            },
            FirmError::Unauthorized(_) => "UNAUTHORIZED",
            FirmError::Forbidden(_) => "FORBIDDEN",
            FirmError::Conflict(_) => "CONFLICT",
            FirmError::Validation(_) => "VALIDATION_ERROR",
            FirmError::ConfigError(_) => "CONFIG_ERROR",
            FirmError::DatabaseError(_) | FirmError::IoError(_) | FirmError::JsonError(_) => {
                "INTERNAL_ERROR"
            },
        }
    }

    /// Whether the message is safe to hand back to an API caller.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            FirmError::DatabaseError(_)
                | FirmError::IoError(_)
                | FirmError::JsonError(_)
                | FirmError::ConfigError(_)
        )
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FirmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes_are_resource_specific() {
        assert_eq!(FirmError::task_not_found(7).to_error_code(), "TASK_NOT_FOUND");
        assert_eq!(FirmError::user_not_found(7).to_error_code(), "USER_NOT_FOUND");
        let other = FirmError::NotFound {
            resource: "Widget",
            id: 1,
        };
        assert_eq!(other.to_error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_error_response_carries_message() {
        let response = FirmError::task_not_found(123).to_error_response();
        assert_eq!(response.code, "TASK_NOT_FOUND");
        assert!(response.error.contains("123"));
    }

    #[test]
    fn test_internal_classification() {
        assert!(FirmError::ConfigError("x".into()).is_internal());
        assert!(!FirmError::Conflict("x".into()).is_internal());
        assert!(!FirmError::Validation("x".into()).is_internal());
    }
}
