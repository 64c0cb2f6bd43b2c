use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    #[error("Upstream '{service}' failed: {message}")]
    Upstream { service: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of an [`Error`], stable enough to put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    NotFound,
    ConflictingState,
    ValidationFailure,
    UpstreamFailure,
    Internal,
}

impl Error {
    /// Helper for creating upstream collaborator errors
    ///
    /// # Example
    /// ```
    /// use sqlgate_core::Error;
    /// let err = Error::upstream("proposer", "model returned no candidates");
    /// ```
    pub fn upstream(service: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            message: msg.into(),
        }
    }

    /// Helper for creating configuration errors
    pub fn config_error(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Helper for creating general errors with a message
    ///
    /// # Example
    /// ```
    /// use sqlgate_core::Error;
    /// let err = Error::message("Something went wrong");
    /// ```
    pub fn message(msg: impl Into<String>) -> Self {
        Error::Other(anyhow::anyhow!("{}", msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ConflictingState(_) => ErrorKind::ConflictingState,
            Error::ValidationFailure(_) => ErrorKind::ValidationFailure,
            Error::Upstream { .. } | Error::Database(_) => ErrorKind::UpstreamFailure,
            Error::Config(_)
            | Error::SerializationError(_)
            | Error::IoError(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }
}
