use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaygroundError {
    #[error("configuration error: {0}")]
    Config(String),
    /// Request rejected before any network call was made.
    #[error("{0}")]
    Validation(String),
    /// Network failure or a non-2xx HTTP status.
    #[error("{0}")]
    Transport(String),
    /// Response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("a command is already in flight: {0}")]
    Busy(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl PlaygroundError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for PlaygroundError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PlaygroundError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

pub use crate::Result;
