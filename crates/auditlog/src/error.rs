//! Error types for audit logging operations.
//!
//! Every sink operation in this crate returns [`Result`]. The decorator
//! forwards errors from the wrapped sinks untouched, so a caller holding an
//! [`AuditLogger`](crate::AuditLogger) sees the same error it would get from
//! the base sink directly.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`LogError`] as the error type.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur while logging or auditing.
#[derive(Error, Debug)]
pub enum LogError {
    /// I/O error from an underlying file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An audit record could not be serialized or parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink was written to after it was closed.
    #[error("Sink '{sink}' is closed")]
    Closed {
        /// Name of the closed sink.
        sink: &'static str,
    },

    /// The operation is not supported by the receiving logger.
    #[error("undefined operation '{operation}' for {receiver}")]
    NoSuchOperation {
        /// Name of the requested operation.
        operation: String,
        /// Name of the logger that rejected it.
        receiver: &'static str,
    },

    /// Every target of a broadcast operation failed.
    #[error("{operation} failed on every sink: {}", DisplayFailures(.failures))]
    Broadcast {
        /// The broadcast operation (`reopen` or `close`).
        operation: &'static str,
        /// One failure per target.
        failures: Vec<SinkFailure>,
    },

    /// A persistent context setter was called from a tokio task that has
    /// no task-scoped context of its own.
    #[error("{operation} called in a tokio task outside context::scope")]
    UnscopedTask {
        /// The rejected setter.
        operation: &'static str,
    },

    /// A sink has no active destination and would drop the write.
    #[error("Sink '{sink}' is not enabled")]
    Disabled {
        /// Name of the disabled sink.
        sink: &'static str,
    },

    /// An audit line does not satisfy the record contract.
    #[error("Invalid audit record: {reason}")]
    InvalidRecord {
        /// What is wrong with the line.
        reason: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Reason the configuration was rejected.
        reason: String,
    },
}

impl LogError {
    /// Creates a [`LogError::NoSuchOperation`] for `receiver`.
    #[must_use]
    pub fn no_such_operation(operation: &str, receiver: &'static str) -> Self {
        Self::NoSuchOperation {
            operation: operation.to_string(),
            receiver,
        }
    }

    /// Returns `true` if this is a "no such operation" failure.
    #[must_use]
    pub const fn is_no_such_operation(&self) -> bool {
        matches!(self, Self::NoSuchOperation { .. })
    }
}

/// A failure of one target within a broadcast operation.
#[derive(Debug)]
pub struct SinkFailure {
    /// Which side of the decorator failed.
    pub target: SinkRole,
    /// The error reported by that sink.
    pub error: Box<LogError>,
}

/// The two sinks held by an audit logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkRole {
    /// The general-purpose logger.
    Base,
    /// The structured audit trail.
    Audit,
}

impl fmt::Display for SinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Audit => write!(f, "audit"),
        }
    }
}

struct DisplayFailures<'a>(&'a [SinkFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} sink: {}", failure.target, failure.error)?;
        }
        Ok(())
    }
}
