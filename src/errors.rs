use std::fmt;

use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse
};
use derive_more::Display;
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug)]
pub enum AppError {
    ValidationError(Vec<FieldError>),
    InvalidInput(String),
    NotFound(String),
    UnknownMember(String),
    Storage(StorageError),
    Media(MediaError),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(errors) => {
                let messages = errors.iter()
                    .map(|e| format!("{}:{}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "validation error: {}", messages)
            }
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::UnknownMember(name) => write!(f, "Unknown family member: {}", name),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Media(e) => write!(f, "Media error: {}", e),
            AppError::InternalError(msg) => write!(f, "Internal server error: {}", msg)
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::ValidationError(errors) => {
                serde_json::json!({
                    "error": "Validation failed",
                    "details": errors
                })
            }
            _ => {
                serde_json::json!({"error": self.to_string()})
            }
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnknownMember(_) => StatusCode::FORBIDDEN,
            AppError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Storage(StorageError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Media(MediaError::Rejected(_)) => StatusCode::BAD_REQUEST,
            AppError::Media(MediaError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Media(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let field_errors = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(|e| FieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                })
            })
            .collect();

        AppError::ValidationError(field_errors)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        AppError::Media(err)
    }
}

impl From<DateError> for AppError {
    fn from(err: DateError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

/// Failures of either persistence backend.
#[derive(Debug, Clone, Display, PartialEq)]
pub enum StorageError {
    #[display("Remote store is not configured: {_0}")]
    Configuration(String),

    #[display("Storage unavailable: {_0}")]
    Unavailable(String),

    #[display("Record not found: {_0}")]
    NotFound(String),

    #[display("Malformed stored data: {_0}")]
    Serialization(String),

    #[display("Remote store error: {_0}")]
    Remote(String),

    #[display("Concurrent write kept conflicting: {_0}")]
    Conflict(String),
}

impl std::error::Error for StorageError {}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Remote(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StorageError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::CreatePoolError> for StorageError {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        StorageError::Configuration(err.to_string())
    }
}

#[derive(Debug, Display)]
pub enum MediaError {
    #[display("Unsupported media: {_0}")]
    Unsupported(String),

    #[display("{kind} exceeds the {limit_mb}MB upload limit")]
    TooLarge { kind: String, limit_mb: u64 },

    #[display("Upload rejected: {_0}")]
    Rejected(String),

    #[display("Media service request failed: {_0}")]
    Transport(String),

    #[display("Media credentials missing")]
    MissingCredentials,
}

impl std::error::Error for MediaError {}

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        MediaError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Display, PartialEq)]
pub enum DateError {
    #[display("Invalid timestamp: {_0}")]
    InvalidTimestamp(String),

    #[display("Invalid date key: {_0}")]
    InvalidDateKey(String),
}

impl std::error::Error for DateError {}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}
