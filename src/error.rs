use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("record not found")]
    NotFound,

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("invariant violated: {message}")]
    Invariant {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::planner", "record not found");
        AppError::NotFound
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::planner", %message, "conflict error");
        AppError::Conflict { message }
    }

    /// Internal consistency failure. Reaching this is a bug in the engine,
    /// never a consequence of user input.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::invariant", %message, "invariant violation");
        AppError::Invariant {
            message,
            details: None,
        }
    }

    pub fn invariant_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        error!(target: "app::invariant", %message, details = %details, "invariant violation");
        AppError::Invariant {
            message,
            details: Some(details),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn details(&self) -> Option<&JsonValue> {
        match self {
            AppError::Validation { details, .. } | AppError::Invariant { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }
}
