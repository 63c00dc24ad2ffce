//! Server-wide error type with HTTP status mapping.

use std::fmt;
use std::io;

use crate::response::Status;

/// One variant per failure family. Each protocol-visible variant carries
/// the HTTP status it maps to and a human-readable reason; `Config` is
/// fatal at startup and `Io` terminates a session without a response.
#[derive(Debug)]
pub enum ServerError {
    /// Malformed request line, headers or body.
    Parse { status: Status, reason: String },
    /// Unrecognized endpoint, missing segments, unknown action, bad id.
    Url { status: Status, reason: String },
    /// Unsupported request type or no acceptable response type.
    Media { status: Status, reason: String },
    /// File store failures: collisions, missing files, disk errors.
    Store { status: Status, reason: String },
    /// Invalid configuration; prevents startup.
    Config { reason: String },
    /// Socket-level failure. Never rendered as an envelope.
    Io(io::Error),
}

impl ServerError {
    pub fn parse(status: Status, reason: impl Into<String>) -> Self {
        ServerError::Parse { status, reason: reason.into() }
    }

    pub fn url(status: Status, reason: impl Into<String>) -> Self {
        ServerError::Url { status, reason: reason.into() }
    }

    pub fn media(status: Status, reason: impl Into<String>) -> Self {
        ServerError::Media { status, reason: reason.into() }
    }

    pub fn store(status: Status, reason: impl Into<String>) -> Self {
        ServerError::Store { status, reason: reason.into() }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        ServerError::Config { reason: reason.into() }
    }

    pub fn status(&self) -> Status {
        match self {
            ServerError::Parse { status, .. }
            | ServerError::Url { status, .. }
            | ServerError::Media { status, .. }
            | ServerError::Store { status, .. } => *status,
            ServerError::Config { .. } | ServerError::Io(_) => Status::InternalServerError,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            ServerError::Parse { reason, .. }
            | ServerError::Url { reason, .. }
            | ServerError::Media { reason, .. }
            | ServerError::Store { reason, .. }
            | ServerError::Config { reason } => reason.clone(),
            ServerError::Io(err) => err.to_string(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Io(err)
    }
}
