use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the backend (`{"detail": ...}`).
///
/// `detail` is a plain string for handler errors and a list of objects for
/// request validation errors, so it is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: serde_json::Value,
}

impl ErrorDetail {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DataEventError {
    #[error("data payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("data payload is not a valid agent event: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
