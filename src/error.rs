//! # Error Taxonomy
//!
//! Every failure an arrow run can hit is a variant of [`ArrowError`]. Two of
//! them are recoverable and never leave the module that produces them:
//!
//! - [`ArrowError::Parse`]: a malformed transfer-log line. The line is logged
//!   and skipped.
//! - [`ArrowError::Accounting`]: the process-status file could not be read
//!   (usually because the process just exited). The monitor tick is skipped.
//!
//! All other variants abort the run and surface to the caller as the single
//! terminal error of the operation.

use crate::config::Operation;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How a supervised process finished when it did not exit cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process called `exit` with a non-zero code.
    Code(i32),
    /// The process was terminated by a signal.
    Signal(i32),
    /// The platform reported neither a code nor a signal.
    Unknown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Code(code) => write!(f, "exited with code {}", code),
            ExitReason::Signal(signal) => write!(f, "was terminated by signal {}", signal),
            ExitReason::Unknown => write!(f, "exited abnormally"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArrowError {
    #[error("{0}")]
    Config(String),

    #[error("Failed to start '{path}': {source}")]
    ProcessSpawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process {pid} ({operation}) {reason}")]
    ProcessExit {
        pid: u32,
        operation: Operation,
        reason: ExitReason,
    },

    #[error("No transfers")]
    NoTransfers,

    #[error("Failed to parse line '{line}': {reason}")]
    Parse { line: String, reason: String },

    #[error("{} operation timed out", .operation.title())]
    TimedOut { operation: Operation },

    #[error("Failed to read accounting for process {pid}: {reason}")]
    Accounting { pid: u32, reason: String },

    #[error("Message rate is undefined for a duration of {duration:.3}s")]
    UndefinedRate { duration: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Summary encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArrowError {
    /// Build a parse error for `line`.
    pub fn parse(line: &str, reason: impl Into<String>) -> Self {
        ArrowError::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is handled where it occurs rather than ending the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ArrowError::Parse { .. } | ArrowError::Accounting { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArrowError>;
