//! Audit logging decorator for general-purpose application loggers.
//!
//! This crate wraps an application's ordinary [`Logger`] in an
//! [`AuditLogger`] that:
//! - forwards every ordinary logging call to the wrapped logger unchanged
//! - writes security-relevant events as structured [`AuditRecord`] lines
//!   to a separate [`AuditSink`]
//! - stamps each record with the account and transaction id of the calling
//!   thread or task, without sharing that state between callers
//!
//! # Record format
//!
//! One JSON object per line, always with exactly these keys:
//! `timestamp`, `hostname`, `pid`, `thread_id`, `level` (always `"audit"`),
//! `transaction_id`, `message`, `account_number`. Absent values are `null`.
//!
//! # Example
//!
//! ```rust
//! use auditlog::{AuditLogger, Logger, MemoryAuditSink, MemoryLogger};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemoryAuditSink::new());
//! let logger = AuditLogger::new(Arc::new(MemoryLogger::new()), sink.clone());
//!
//! logger.info("ordinary message").unwrap();
//! logger.with_account(Some("1234"), || logger.audit("Report exported")).unwrap();
//!
//! let line = sink.last_line().unwrap();
//! assert!(line.contains(r#""account_number":"1234""#));
//! ```

mod audit_logger;
mod config;
pub mod context;
mod error;
mod logger;
mod record;
mod sink;

pub use audit_logger::{AuditLogger, AuditLoggerBuilder};
pub use config::{
    AuditLogConfig, AuditSinkConfig, BaseSinkConfig, AUDIT_LOG_HOSTNAME_ENV, AUDIT_LOG_PATH_ENV,
};
pub use context::{AmbientTransactionSource, NoTransactionSource, TransactionSource};
pub use error::{LogError, Result, SinkFailure, SinkRole};
pub use logger::{
    format_line, FileLogger, Level, Logger, MemoryLogger, MessageFn, StreamLogger, TracingLogger,
};
pub use record::{current_thread_id, AuditLevel, AuditRecord, RECORD_FIELDS};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink, StdoutAuditSink, TracingAuditSink};
