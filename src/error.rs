//! Error types for the storage helper boundary.
//!
//! Every failure the crate can produce maps to one [`ShimError`] variant, so
//! callers can tell a missing helper binary apart from a broken stream or a
//! helper that exited badly and give an actionable message for each.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::locator::HELPER_ENV;

/// Result alias used throughout the crate.
pub type Result<T, E = ShimError> = std::result::Result<T, E>;

/// The step of process startup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStep {
    /// Capturing the helper's standard output pipe.
    Stdout,
    /// Capturing the helper's standard error pipe or starting its drain.
    Stderr,
    /// Capturing the helper's standard input pipe.
    Stdin,
    /// Starting the helper process itself.
    Start,
}

impl fmt::Display for SpawnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            SpawnStep::Stdout => "stdout pipe",
            SpawnStep::Stderr => "stderr pipe",
            SpawnStep::Stdin => "stdin pipe",
            SpawnStep::Start => "process start",
        };
        f.write_str(step)
    }
}

/// Errors produced while talking to the storage helper.
#[derive(Debug, Error)]
pub enum ShimError {
    /// The helper binary does not exist at the resolved location.
    #[error(
        "storage helper not found at {}; install it next to this executable or set {}",
        .path.display(),
        HELPER_ENV
    )]
    HelperNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The helper location could not be inspected.
    #[error("failed to locate storage helper: {0}")]
    Locate(#[source] std::io::Error),

    /// A query, sort or command payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The helper could not be started.
    #[error("failed to start storage helper ({step}): {source}")]
    Spawn {
        /// Which startup step failed.
        step: SpawnStep,
        #[source]
        source: std::io::Error,
    },

    /// A record declared a length above the maximum record size.
    #[error("record of {len} bytes exceeds maximum {max} bytes")]
    RecordTooLarge {
        /// Declared length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// A record declared a length too small to hold its own prefix.
    #[error("invalid record length {0}")]
    InvalidRecordLength(i32),

    /// The stream ended part way through a record.
    #[error("stream truncated: expected {expected} bytes, got {read}")]
    Truncated {
        /// Bytes the record declared.
        expected: usize,
        /// Bytes actually available.
        read: usize,
    },

    /// Reading the helper's output failed.
    #[error("failed to read from storage helper: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the helper's input failed.
    #[error("failed to write to storage helper: {0}")]
    Write(#[source] std::io::Error),

    /// A record did not deserialize into the requested type.
    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),

    /// A value could not be encoded as a document.
    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    /// A command produced no result document and nothing else explains why.
    #[error("storage helper returned no response for command")]
    NoResponse,

    /// Waiting on the helper process failed.
    #[error("failed to wait for storage helper: {0}")]
    Wait(#[source] std::io::Error),

    /// The helper exited unsuccessfully.
    #[error("storage helper exited with {status}")]
    Exit {
        /// Exit status reported by the OS.
        status: ExitStatus,
    },
}

impl ShimError {
    /// Whether this error means the helper binary is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShimError::HelperNotFound { .. })
    }
}
