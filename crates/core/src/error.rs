//! Error types for the core library

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected locally before any store call was made.
    #[error("{0}")]
    Validation(String),

    /// The store answered with an error; the message is the store's own text.
    #[error("{0}")]
    Store(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// True for errors detected locally, before the store was contacted.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
