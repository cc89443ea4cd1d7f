//! Destinations for structured audit lines.

use std::fmt::Debug;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{info, Level};

use crate::error::{LogError, Result};
use crate::logger::open_append;

/// Sink trait for audit trail storage.
///
/// Each call to [`write_line`](AuditSink::write_line) must store the line
/// as one unit; implementations that share a handle between threads
/// serialize writes so lines never interleave.
pub trait AuditSink: Send + Sync + Debug {
    /// Appends one serialized audit record.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written.
    fn write_line(&self, line: &str) -> Result<()>;

    /// Reopens the underlying resource.
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

    /// Returns the sink name for identification.
    fn name(&self) -> &'static str;
}

/// Audit sink appending JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileAuditSink {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Returns the audit trail path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(LogError::Closed { sink: "audit_file" })?;
        // one write_all per record keeps O_APPEND writes whole
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
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

    fn name(&self) -> &'static str {
        "audit_file"
    }
}

/// Audit sink printing JSON lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutAuditSink;

impl StdoutAuditSink {
    /// Creates a new stdout sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for StdoutAuditSink {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        std::io::stdout().lock().flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Audit sink that emits each line as a `tracing` event under the `audit` target.
///
/// Writes fail with [`LogError::Disabled`] when no subscriber accepts
/// `INFO` events for the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates a new tracing sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn write_line(&self, line: &str) -> Result<()> {
        if !tracing::enabled!(target: "audit", Level::INFO) {
            return Err(LogError::Disabled { sink: "tracing" });
        }
        info!(target: "audit", audit_record = %line, "Audit record");
        Ok(())
    }

    fn reopen(&self) -> Result<()> {
        // Tracing sink holds no resource
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory audit sink for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
    reopens: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryAuditSink {
    /// Creates a new in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all written lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Returns the most recent line, if any.
    #[must_use]
    pub fn last_line(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }

    /// Clears all written lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Returns how many times [`AuditSink::reopen`] was called.
    #[must_use]
    pub fn reopen_count(&self) -> usize {
        self.reopens.load(Ordering::SeqCst)
    }

    /// Returns how many times [`AuditSink::close`] was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl AuditSink for MemoryAuditSink {
    fn write_line(&self, line: &str) -> Result<()> {
        self.lines.lock().push(line.to_string());
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

    fn name(&self) -> &'static str {
        "memory"
    }
}
