//! The general-purpose logging interface and the stock base sinks.
//!
//! [`Logger`] is the surface the rest of an application calls. The audit
//! decorator implements it by forwarding, so any `Logger` can be swapped for
//! an [`AuditLogger`](crate::AuditLogger) without touching call sites.

use std::fmt::{self, Debug};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{LogError, Result};

/// Severity of an ordinary log message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Low-level information for developers.
    #[default]
    Debug,
    /// Generic operational information.
    Info,
    /// A handleable problem.
    Warn,
    /// An unhandled error.
    Error,
    /// An error that crashes the program.
    Fatal,
    /// A message of unknown severity that should always be logged.
    Unknown,
}

impl Level {
    /// Returns the upper-case label used in formatted lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "ANY",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            "unknown" | "any" => Ok(Self::Unknown),
            other => Err(LogError::Config {
                reason: format!("unknown log level '{other}'"),
            }),
        }
    }
}

/// Lazily evaluated log message.
pub type MessageFn<'a> = &'a dyn Fn() -> String;

/// A general-purpose leveled logger.
///
/// Implementors provide [`add`](Logger::add), [`append`](Logger::append)
/// and the lifecycle calls; the leveled helpers are derived from them.
pub trait Logger: Send + Sync + Debug {
    /// Returns the logger name, used in error messages.
    fn name(&self) -> &'static str;

    /// Returns whether messages at `level` would be written.
    fn enabled(&self, _level: Level) -> bool {
        true
    }

    /// Logs `message` at `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn add(&self, level: Level, message: &str) -> Result<()>;

    /// Logs the message produced by `message` at `level`.
    ///
    /// The producer is only called when the level is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn add_with(&self, level: Level, message: MessageFn<'_>) -> Result<()> {
        if self.enabled(level) {
            self.add(level, &message())
        } else {
            Ok(())
        }
    }

    /// Writes `raw` as-is, without level or formatting.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be written.
    fn append(&self, raw: &str) -> Result<()>;

    /// Reopens the underlying resource, e.g. after external rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be reopened.
    fn reopen(&self) -> Result<()>;

    /// Releases the underlying resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be released.
    fn close(&self) -> Result<()>;

    /// Invokes a logger-specific operation by name.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NoSuchOperation`] unless the logger supports
    /// `operation`.
    fn call(&self, operation: &str, _argument: Option<&str>) -> Result<()> {
        Err(LogError::no_such_operation(operation, self.name()))
    }

    /// Logs at [`Level::Debug`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn debug(&self, message: &str) -> Result<()> {
        self.add(Level::Debug, message)
    }

    /// Logs at [`Level::Info`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn info(&self, message: &str) -> Result<()> {
        self.add(Level::Info, message)
    }

    /// Logs at [`Level::Warn`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn warn(&self, message: &str) -> Result<()> {
        self.add(Level::Warn, message)
    }

    /// Logs at [`Level::Error`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn error(&self, message: &str) -> Result<()> {
        self.add(Level::Error, message)
    }

    /// Logs at [`Level::Fatal`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn fatal(&self, message: &str) -> Result<()> {
        self.add(Level::Fatal, message)
    }

    /// Logs at [`Level::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn unknown(&self, message: &str) -> Result<()> {
        self.add(Level::Unknown, message)
    }

    /// Lazily logs at [`Level::Debug`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn debug_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.add_with(Level::Debug, message)
    }

    /// Lazily logs at [`Level::Info`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn info_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.add_with(Level::Info, message)
    }

    /// Lazily logs at [`Level::Warn`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn warn_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.add_with(Level::Warn, message)
    }

    /// Lazily logs at [`Level::Error`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn error_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.add_with(Level::Error, message)
    }

    /// Lazily logs at [`Level::Fatal`].
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn fatal_with(&self, message: MessageFn<'_>) -> Result<()> {
        self.add_with(Level::Fatal, message)
    }
}

/// Formats one base log line: `I, [2024-05-01T10:00:00.000123 #4242]  INFO -- : message`.
#[must_use]
pub fn format_line(level: Level, message: &str) -> String {
    let label = level.label();
    format!(
        "{}, [{} #{}] {label:>5} -- : {message}\n",
        &label[..1],
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
        std::process::id(),
    )
}

/// Base logger that forwards messages to `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    /// Creates a new tracing logger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn add(&self, level: Level, message: &str) -> Result<()> {
        match level {
            Level::Debug => debug!(target: "app", "{message}"),
            Level::Info => info!(target: "app", "{message}"),
            Level::Warn => warn!(target: "app", "{message}"),
            Level::Error => error!(target: "app", "{message}"),
            Level::Fatal | Level::Unknown => error!(target: "app", severity = %level, "{message}"),
        }
        Ok(())
    }

    fn append(&self, raw: &str) -> Result<()> {
        info!(target: "app", "{}", raw.trim_end());
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Base logger writing formatted lines to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamLogger {
    min_level: Level,
}

impl StreamLogger {
    /// Creates a stderr logger writing messages at `min_level` and above.
    #[must_use]
    pub const fn new(min_level: Level) -> Self {
        Self { min_level }
    }

    /// Returns the minimum level written.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.min_level
    }
}

impl Logger for StreamLogger {
    fn name(&self) -> &'static str {
        "stderr"
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn add(&self, level: Level, message: &str) -> Result<()> {
        if self.enabled(level) {
            self.append(&format_line(level, message))?;
        }
        Ok(())
    }

    fn append(&self, raw: &str) -> Result<()> {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(raw.as_bytes())?;
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Base logger appending formatted lines to a file.
///
/// [`reopen`](Logger::reopen) reopens the path, picking up a file moved
/// away by external rotation. Supports the `flush` operation through
/// [`call`](Logger::call).
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    min_level: Level,
    file: Mutex<Option<File>>,
}

impl FileLogger {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, min_level: Level) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            min_level,
            file: Mutex::new(Some(file)),
        })
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the minimum level written.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.min_level
    }
}

pub(crate) fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

impl Logger for FileLogger {
    fn name(&self) -> &'static str {
        "file"
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn add(&self, level: Level, message: &str) -> Result<()> {
        if self.enabled(level) {
            self.append(&format_line(level, message))?;
        }
        Ok(())
    }

    fn append(&self, raw: &str) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(LogError::Closed { sink: "file" })?;
        file.write_all(raw.as_bytes())?;
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        let file = open_append(&self.path)?;
        *self.file.lock() = Some(file);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(mut file) = self.file.lock().take() {
            file.flush()?;
        }
        Ok(())
    }

    fn call(&self, operation: &str, _argument: Option<&str>) -> Result<()> {
        match operation {
            "flush" => {
                if let Some(file) = self.file.lock().as_mut() {
                    file.flush()?;
                }
                Ok(())
            }
            _ => Err(LogError::no_such_operation(operation, self.name())),
        }
    }
}

/// Base logger capturing formatted lines in memory.
///
/// Counts lifecycle calls so tests can assert on them. Supports the `clear`
/// operation through [`call`](Logger::call).
#[derive(Debug, Default)]
pub struct MemoryLogger {
    min_level: Level,
    output: Mutex<String>,
    reopens: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryLogger {
    /// Creates an in-memory logger capturing every level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory logger capturing `min_level` and above.
    #[must_use]
    pub fn with_level(min_level: Level) -> Self {
        Self {
            min_level,
            ..Self::default()
        }
    }

    /// Returns everything written so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.output.lock().clone()
    }

    /// Returns the captured output split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.output.lock().lines().map(str::to_string).collect()
    }

    /// Returns how many times [`Logger::reopen`] was called.
    #[must_use]
    pub fn reopen_count(&self) -> usize {
        self.reopens.load(Ordering::SeqCst)
    }

    /// Returns how many times [`Logger::close`] was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Logger for MemoryLogger {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn add(&self, level: Level, message: &str) -> Result<()> {
        if self.enabled(level) {
            self.append(&format_line(level, message))?;
        }
        Ok(())
    }

    fn append(&self, raw: &str) -> Result<()> {
        self.output.lock().push_str(raw);
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        self.reopens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn call(&self, operation: &str, _argument: Option<&str>) -> Result<()> {
        match operation {
            "clear" => {
                self.output.lock().clear();
                Ok(())
            }
            _ => Err(LogError::no_such_operation(operation, self.name())),
        }
    }
}
