//! The audit logging decorator.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::{self, AmbientTransactionSource, TransactionSource};
use crate::error::{LogError, Result, SinkFailure, SinkRole};
use crate::logger::{Level, Logger, MessageFn};
use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// A [`Logger`] that also writes a structured audit trail.
///
/// Ordinary logging calls go to the base logger untouched. [`audit`]
/// writes one [`AuditRecord`] to the audit sink and nothing to the base
/// logger. [`reopen`] and [`close`] reach both.
///
/// Operations the [`Logger`] trait does not name resolve to the base
/// logger through [`Deref`], so a wrapped `FileLogger` still exposes
/// `FileLogger::path`.
///
/// The account and transaction id stamped on records come from the calling
/// thread or task (see [`context`](crate::context)), never from the logger,
/// so one instance can be shared by any number of concurrent callers.
///
/// [`audit`]: AuditLogger::audit
/// [`reopen`]: Logger::reopen
/// [`close`]: Logger::close
#[derive(Debug)]
pub struct AuditLogger<B: ?Sized = dyn Logger> {
    hostname: String,
    transactions: Arc<dyn TransactionSource>,
    audit: Arc<dyn AuditSink>,
    base: Arc<B>,
}

impl<B: Logger + ?Sized> AuditLogger<B> {
    /// Wraps `base`, sending audit records to `audit`.
    #[must_use]
    pub fn new(base: Arc<B>, audit: Arc<dyn AuditSink>) -> Self {
        Self::builder(base, audit).build()
    }

    /// Creates a builder for configuring the logger.
    #[must_use]
    pub fn builder(base: Arc<B>, audit: Arc<dyn AuditSink>) -> AuditLoggerBuilder<B> {
        AuditLoggerBuilder::new(base, audit)
    }

    /// Writes one audit record carrying `message`.
    ///
    /// The record picks up the account and transaction id of the calling
    /// context. The message is stored as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or the audit
    /// sink rejects the write. Nothing is retried.
    pub fn audit(&self, message: &str) -> Result<()> {
        let record = self.capture(message);
        let line = record.to_line()?;
        debug!(sink = self.audit.name(), "Writing audit record");
        self.audit.write_line(&line)
    }

    /// Builds the record [`audit`](Self::audit) would write for `message`.
    #[must_use]
    pub fn capture(&self, message: &str) -> AuditRecord {
        AuditRecord::capture(
            &self.hostname,
            message,
            self.transactions.transaction_id(),
            context::current_account(),
        )
    }

    /// Runs `scope` on behalf of `account`, restoring the previous account
    /// afterwards, including when `scope` panics.
    pub fn with_account<T>(&self, account: Option<&str>, scope: impl FnOnce() -> T) -> T {
        context::with_account(account, scope)
    }

    /// Sets the account for every later record on this thread or task
    /// scope; `None` clears it.
    ///
    /// Returns the previous account.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::UnscopedTask`] when called from a tokio task
    /// outside [`context::scope`] or [`with_account_async`](Self::with_account_async).
    pub fn set_account(&self, account: Option<&str>) -> Result<Option<String>> {
        context::set_account(account)
    }

    /// Runs `future` in its own task-scoped context on behalf of `account`.
    ///
    /// The account is dropped when the future completes or is cancelled.
    pub fn with_account_async<F: Future>(
        &self,
        account: Option<&str>,
        future: F,
    ) -> impl Future<Output = F::Output> {
        context::with_account_async(account, future)
    }

    /// Returns the hostname stamped on records.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the wrapped base logger.
    #[must_use]
    pub const fn base(&self) -> &Arc<B> {
        &self.base
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }
}

impl<B: ?Sized> Deref for AuditLogger<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.base
    }
}

impl<B: Logger + ?Sized> Logger for AuditLogger<B> {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn enabled(&self, level: Level) -> bool {
        self.base.enabled(level)
    }

    fn add(&self, level: Level, message: &str) -> Result<()> {
        self.base.add(level, message)
    }

    fn add_with(&self, level: Level, message: MessageFn<'_>) -> Result<()> {
        self.base.add_with(level, message)
    }

    fn append(&self, raw: &str) -> Result<()> {
        self.base.append(raw)
    }

    fn reopen(&self) -> Result<()> {
        broadcast("reopen", || self.base.reopen(), || self.audit.reopen())
    }

    fn close(&self) -> Result<()> {
        broadcast("close", || self.base.close(), || self.audit.close())
    }

    fn call(&self, operation: &str, argument: Option<&str>) -> Result<()> {
        self.base.call(operation, argument)
    }

    fn debug(&self, message: &str) -> Result<()> {
        self.base.debug(message)
    }

    fn info(&self, message: &str) -> Result<()> {
        self.base.info(message)
    }

    fn warn(&self, message: &str) -> Result<()> {
        self.base.warn(message)
    }

    fn error(&self, message: &str) -> Result<()> {
        self.base.error(message)
    }

    fn fatal(&self, message: &str) -> Result<()> {
        self.base.fatal(message)
    }

    fn unknown(&self, message: &str) -> Result<()> {
        self.base.unknown(message)
    }

    fn debug_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.base.debug_with(message)
    }

    fn info_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.base.info_with(message)
    }

    fn warn_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.base.warn_with(message)
    }

    fn error_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.base.error_with(message)
    }

    fn fatal_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.base.fatal_with(message)
    }
}

/// Runs `base` and `audit` unconditionally and folds their failures.
///
/// A single failure is returned unchanged; two become
/// [`LogError::Broadcast`].
fn broadcast(
    operation: &'static str,
    base: impl FnOnce() -> Result<()>,
    audit: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let results = [(SinkRole::Base, base()), (SinkRole::Audit, audit())];

    let mut failures: Vec<SinkFailure> = results
        .into_iter()
        .filter_map(|(target, result)| result.err().map(|error| (target, error)))
        .map(|(target, error)| {
            warn!("Failed to {} {} sink: {}", operation, target, error);
            SinkFailure {
                target,
                error: Box::new(error),
            }
        })
        .collect();

    match failures.pop() {
        None => Ok(()),
        Some(only) if failures.is_empty() => Err(*only.error),
        Some(last) => {
            failures.push(last);
            Err(LogError::Broadcast {
                operation,
                failures,
            })
        }
    }
}

/// Builder for configuring an audit logger.
#[derive(Debug)]
pub struct AuditLoggerBuilder<B: ?Sized = dyn Logger> {
    hostname: Option<String>,
    transactions: Arc<dyn TransactionSource>,
    audit: Arc<dyn AuditSink>,
    base: Arc<B>,
}

impl<B: Logger + ?Sized> AuditLoggerBuilder<B> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(base: Arc<B>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            hostname: None,
            transactions: Arc::new(AmbientTransactionSource),
            audit,
            base,
        }
    }

    /// Overrides the hostname stamped on records.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets where transaction ids are read from.
    #[must_use]
    pub fn transaction_source(mut self, source: Arc<dyn TransactionSource>) -> Self {
        self.transactions = source;
        self
    }

    /// Builds the audit logger, resolving the hostname if not overridden.
    #[must_use]
    pub fn build(self) -> AuditLogger<B> {
        AuditLogger {
            hostname: self.hostname.unwrap_or_else(resolve_hostname),
            transactions: self.transactions,
            audit: self.audit,
            base: self.base,
        }
    }
}

fn resolve_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Failed to resolve hostname: {}", e);
            "unknown".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoTransactionSource;
    use crate::logger::MemoryLogger;
    use crate::sink::MemoryAuditSink;

    struct Fixture {
        base: Arc<MemoryLogger>,
        sink: Arc<MemoryAuditSink>,
        wrapped: AuditLogger<MemoryLogger>,
    }

    fn fixture() -> Fixture {
        let base = Arc::new(MemoryLogger::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped = AuditLogger::builder(base.clone(), sink.clone())
            .hostname("test-host")
            .build();
        Fixture {
            base,
            sink,
            wrapped,
        }
    }

    fn last_record(sink: &MemoryAuditSink) -> serde_json::Value {
        let line = sink.last_line().expect("no output in the audit log");
        serde_json::from_str(&line).unwrap()
    }

    #[derive(Debug)]
    struct BrokenLogger;

    impl Logger for BrokenLogger {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn add(&self, _level: Level, _message: &str) -> Result<()> {
            Err(LogError::Closed { sink: "broken" })
        }

        fn append(&self, _raw: &str) -> Result<()> {
            Err(LogError::Closed { sink: "broken" })
        }

        fn reopen(&self) -> Result<()> {
            Err(LogError::Io(std::io::Error::other("reopen failed")))
        }

        fn close(&self) -> Result<()> {
            Err(LogError::Io(std::io::Error::other("close failed")))
        }
    }

    #[derive(Debug, Default)]
    struct BrokenSink {
        closes: std::sync::atomic::AtomicUsize,
    }

    impl AuditSink for BrokenSink {
        fn write_line(&self, _line: &str) -> Result<()> {
            Err(LogError::Closed { sink: "broken_sink" })
        }

        fn reopen(&self) -> Result<()> {
            Err(LogError::Closed { sink: "broken_sink" })
        }

        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(LogError::Closed { sink: "broken_sink" })
        }

        fn name(&self) -> &'static str {
            "broken_sink"
        }
    }

    #[test]
    fn test_audit_message_formatted_as_json() {
        let f = fixture();
        f.wrapped.audit("Audit message").unwrap();

        let record = last_record(&f.sink);
        assert_eq!(record["message"], "Audit message");
        assert_eq!(record["level"], "audit");
        assert_eq!(record["hostname"], "test-host");
        assert_eq!(record["pid"], u64::from(std::process::id()));
        assert!(f.base.output().is_empty());
    }

    #[test]
    fn test_audit_includes_general_evidence() {
        let f = fixture();
        f.wrapped.audit("Audit message").unwrap();

        let record = last_record(&f.sink);
        let mut keys: Vec<&str> = record.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "account_number",
                "hostname",
                "level",
                "message",
                "pid",
                "thread_id",
                "timestamp",
                "transaction_id",
            ]
        );
    }

    #[test]
    fn test_other_logs_passed_to_base_logger() {
        let f = fixture();
        f.wrapped.info("Test info to base logger").unwrap();
        f.wrapped.info_with(&|| "Test block passing to base logger".to_string()).unwrap();
        f.wrapped.debug("Test debug to base logger").unwrap();
        f.wrapped.warn("Test warn to base logger").unwrap();
        f.wrapped.error("Test error to base logger").unwrap();
        f.wrapped.fatal("Test fatal to base logger").unwrap();
        f.wrapped.unknown("Test unknown to base logger").unwrap();

        let output = f.base.output();
        for needle in ["info", "block", "debug", "warn", "error", "fatal", "unknown"] {
            assert!(output.contains(needle), "missing {needle} in {output}");
        }
        assert!(f.sink.lines().is_empty());
    }

    #[test]
    fn test_reopen_sent_to_both_loggers() {
        let f = fixture();
        f.wrapped.reopen().unwrap();
        assert_eq!(f.base.reopen_count(), 1);
        assert_eq!(f.sink.reopen_count(), 1);
    }

    #[test]
    fn test_close_sent_to_both_loggers() {
        let f = fixture();
        f.wrapped.close().unwrap();
        assert_eq!(f.base.close_count(), 1);
        assert_eq!(f.sink.close_count(), 1);
    }

    #[test]
    fn test_raw_append_passed_to_base_logger() {
        let f = fixture();
        f.wrapped.append("RAW MESSAGE").unwrap();
        assert!(f.base.output().contains("RAW MESSAGE"));
        assert!(f.sink.lines().is_empty());
    }

    #[test]
    fn test_base_specific_operations_reachable() {
        let f = fixture();
        f.wrapped.info("to be cleared").unwrap();
        f.wrapped.call("clear", None).unwrap();
        assert!(f.base.output().is_empty());

        // inherent MemoryLogger methods resolve through Deref
        assert_eq!(f.wrapped.close_count(), 0);
    }

    #[test]
    fn test_unknown_operation_matches_base_error() {
        let f = fixture();
        let wrapped_err = f.wrapped.call("non_existent_method", None).unwrap_err();
        let direct_err = f.base.call("non_existent_method", None).unwrap_err();

        assert!(wrapped_err.is_no_such_operation());
        assert_eq!(wrapped_err.to_string(), direct_err.to_string());
    }

    #[test]
    fn test_setting_account_number() {
        std::thread::spawn(|| {
            let f = fixture();

            f.wrapped.set_account(Some("1")).unwrap();
            f.wrapped.audit("Audit message").unwrap();
            assert_eq!(last_record(&f.sink)["account_number"], "1");

            f.wrapped.with_account(Some("2"), || {
                f.wrapped.audit("Audit message").unwrap();
                assert_eq!(last_record(&f.sink)["account_number"], "2");
            });

            f.wrapped.audit("Audit message").unwrap();
            assert_eq!(last_record(&f.sink)["account_number"], "1");

            f.wrapped.set_account(None).unwrap();
            f.wrapped.audit("Audit message").unwrap();
            assert!(last_record(&f.sink)["account_number"].is_null());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_scoped_account_returns_scope_value() {
        let f = fixture();
        let value = f.wrapped.with_account(Some("7"), || 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_transaction_id_from_context() {
        std::thread::spawn(|| {
            let f = fixture();
            context::with_transaction_id(Some("req-123"), || f.wrapped.audit("inside").unwrap());
            assert_eq!(last_record(&f.sink)["transaction_id"], "req-123");

            f.wrapped.audit("outside").unwrap();
            assert!(last_record(&f.sink)["transaction_id"].is_null());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_transaction_source_disabled() {
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped = AuditLogger::builder(Arc::new(MemoryLogger::new()), sink.clone())
            .transaction_source(Arc::new(NoTransactionSource))
            .build();

        context::with_transaction_id(Some("req-123"), || wrapped.audit("m").unwrap());
        assert!(last_record(&sink)["transaction_id"].is_null());
    }

    #[test]
    fn test_audit_write_failure_propagates() {
        let wrapped = AuditLogger::new(Arc::new(MemoryLogger::new()), Arc::new(BrokenSink::default()));
        let err = wrapped.audit("lost?").unwrap_err();
        assert!(matches!(err, LogError::Closed { sink: "broken_sink" }));
    }

    #[test]
    fn test_reopen_attempts_audit_sink_when_base_fails() {
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped = AuditLogger::new(Arc::new(BrokenLogger), sink.clone());

        let err = wrapped.reopen().unwrap_err();
        assert_eq!(err.to_string(), "I/O error: reopen failed");
        assert_eq!(sink.reopen_count(), 1);
    }

    #[test]
    fn test_reopen_aggregates_when_both_fail() {
        let wrapped = AuditLogger::new(Arc::new(BrokenLogger), Arc::new(BrokenSink::default()));

        match wrapped.reopen().unwrap_err() {
            LogError::Broadcast {
                operation,
                failures,
            } => {
                assert_eq!(operation, "reopen");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].target, SinkRole::Base);
                assert!(matches!(*failures[0].error, LogError::Io(_)));
                assert_eq!(failures[1].target, SinkRole::Audit);
                assert!(matches!(
                    *failures[1].error,
                    LogError::Closed { sink: "broken_sink" }
                ));
            }
            other => panic!("expected broadcast error, got {other:?}"),
        }
    }

    #[test]
    fn test_close_attempts_audit_sink_when_base_fails() {
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped = AuditLogger::new(Arc::new(BrokenLogger), sink.clone());

        let err = wrapped.close().unwrap_err();
        assert_eq!(err.to_string(), "I/O error: close failed");
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_close_attempts_base_when_audit_sink_fails() {
        let base = Arc::new(MemoryLogger::new());
        let wrapped = AuditLogger::new(base.clone(), Arc::new(BrokenSink::default()));

        let err = wrapped.close().unwrap_err();
        assert!(matches!(err, LogError::Closed { sink: "broken_sink" }));
        assert_eq!(base.close_count(), 1);
    }

    #[test]
    fn test_close_aggregates_when_both_fail() {
        let sink = Arc::new(BrokenSink::default());
        let wrapped = AuditLogger::new(Arc::new(BrokenLogger), sink.clone());

        match wrapped.close().unwrap_err() {
            LogError::Broadcast {
                operation,
                failures,
            } => {
                assert_eq!(operation, "close");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].target, SinkRole::Base);
                assert_eq!(failures[1].target, SinkRole::Audit);
            }
            other => panic!("expected broadcast error, got {other:?}"),
        }
        assert_eq!(sink.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_leveled_errors_come_from_base() {
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped = AuditLogger::new(Arc::new(BrokenLogger), sink.clone());
        assert!(matches!(wrapped.info("x"), Err(LogError::Closed { sink: "broken" })));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_dyn_base_logger() {
        let base: Arc<dyn Logger> = Arc::new(MemoryLogger::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let wrapped: AuditLogger = AuditLogger::new(base, sink.clone());

        wrapped.info("plain").unwrap();
        wrapped.audit("audited").unwrap();
        assert_eq!(wrapped.name(), "memory");
        assert_eq!(sink.lines().len(), 1);
    }
}
