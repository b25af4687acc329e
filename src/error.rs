//! Error types for channel-ingest
//!
//! Every failure a task can hit maps onto one variant of [`Error`]. The pipeline
//! never lets an error cross a task boundary: workers log the error, record the
//! task as failed and move on to the next identifier.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for channel-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-ingest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "INGEST_BUCKET")
        key: Option<String>,
    },

    /// The download tool could not be started or exited unsuccessfully
    #[error("{tool} failed: {message}")]
    ToolInvocation {
        /// Tool name as invoked (e.g., "yt-dlp")
        tool: String,
        /// Exit status and the tail of the tool's diagnostic output
        message: String,
    },

    /// An expected local artifact is absent after fetching
    #[error("artifact missing: {}", path.display())]
    ArtifactMissing {
        /// Path where the artifact was expected
        path: PathBuf,
    },

    /// The object store rejected or failed a write
    #[error("upload of {key} failed: {message}")]
    Upload {
        /// Destination key of the failed write
        key: String,
        /// Store error description
        message: String,
    },

    /// Channel enumeration failed or timed out
    #[error("channel listing failed: {0}")]
    Listing(String),

    /// An external call exceeded its configured deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out (e.g., "fetch")
        operation: &'static str,
        /// The deadline that was exceeded
        after: Duration,
    },

    /// The run was cancelled while the operation was in flight
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Stable machine-readable code for log aggregation
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::ToolInvocation { .. } => "tool_invocation",
            Error::ArtifactMissing { .. } => "artifact_missing",
            Error::Upload { .. } => "upload",
            Error::Listing(_) => "listing",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }
}
