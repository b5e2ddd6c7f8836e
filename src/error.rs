//! Error type shared by the store, the controller console and the viewer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    /// Bad credentials. The caller retries by signing in again.
    #[error("Login failed: {0}")]
    Auth(String),

    #[error("No active controller session")]
    Unauthorized,

    /// The store rejected or could not take the write. Never retried.
    #[error("Write to '{key}' failed: {reason}")]
    Write { key: String, reason: String },

    /// A snapshot is missing fields or carries the wrong types.
    #[error("Malformed snapshot at '{key}': {reason}")]
    MalformedSnapshot { key: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoardError {
    pub fn write(key: &str, reason: impl ToString) -> Self {
        BoardError::Write {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(key: &str, reason: impl ToString) -> Self {
        BoardError::MalformedSnapshot {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
