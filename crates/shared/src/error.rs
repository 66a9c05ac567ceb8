use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Rejected,
    Unavailable,
    Internal,
}

/// Error payload carried on events; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub code: ErrorCode,
    pub message: String,
}

impl ReportedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceKindError {
    #[error("unsupported source kind: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("document {id} has an invalid amountRemaining value: {value}")]
    InvalidAmount { id: String, value: String },
    #[error("malformed {collection} document: {message}")]
    Malformed {
        collection: &'static str,
        message: String,
    },
}
