//! Error handling for backend calls
//!
//! Provides the `ClientError` type returned by the credential provider and the
//! HTTP client. Components catch it at their own boundary and turn it into a
//! user-facing state; nothing here is shown to the user verbatim except the
//! server-provided `detail`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The credential provider could not hand out a bearer token.
    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Server-provided detail message, if the backend sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}
