//! Error types for Spendwatch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Insufficient data: need at least {required} transactions, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Model not trained: fit the isolation forest before scoring")]
    ModelNotTrained,

    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_transaction(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
