//! Error types for Couchflow.
//!
//! All errors in Couchflow are represented by the `CouchflowError` enum.
//! Store failures are classified so the nodes can decide between
//! create-and-retry, a warning, or an error report.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Couchflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum CouchflowError {
    /// Engine-level errors (startup, shutdown, deployment).
    #[error("{0}")]
    Engine(String),

    /// Missing or invalid node / connection configuration.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML, etc.).
    #[error("{0}")]
    Convert(String),

    /// The database or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The credentials are not allowed to perform the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Document update conflict or database already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network or unexpected server failure.
    #[error("{0}")]
    Transport(String),

    /// Node definition or execution errors.
    #[error("{0}")]
    Node(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl CouchflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CouchflowError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CouchflowError::Unauthorized(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchflowError::Conflict(_))
    }
}

impl From<CouchflowError> for String {
    fn from(val: CouchflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for CouchflowError {
    fn from(error: std::io::Error) -> Self {
        CouchflowError::IoError(error.to_string())
    }
}

impl From<CouchflowError> for std::io::Error {
    fn from(val: CouchflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for CouchflowError {
    fn from(error: serde_json::Error) -> Self {
        CouchflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for CouchflowError {
    fn from(error: toml::de::Error) -> Self {
        CouchflowError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for CouchflowError {
    fn from(error: reqwest::Error) -> Self {
        CouchflowError::Transport(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for CouchflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        CouchflowError::Config(error.to_string())
    }
}
