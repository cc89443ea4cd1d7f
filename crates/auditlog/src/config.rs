//! Configuration for building an [`AuditLogger`] from files or the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit_logger::AuditLogger;
use crate::context::{AmbientTransactionSource, NoTransactionSource, TransactionSource};
use crate::error::{LogError, Result};
use crate::logger::{FileLogger, Level, Logger, StreamLogger, TracingLogger};
use crate::sink::{AuditSink, FileAuditSink, StdoutAuditSink, TracingAuditSink};

/// Environment variable overriding the audit trail path.
pub const AUDIT_LOG_PATH_ENV: &str = "AUDIT_LOG_PATH";

/// Environment variable overriding the record hostname.
pub const AUDIT_LOG_HOSTNAME_ENV: &str = "AUDIT_LOG_HOSTNAME";

/// Where ordinary log messages go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BaseSinkConfig {
    /// Forward to `tracing` events.
    #[default]
    Tracing,
    /// Formatted lines on standard error.
    Stderr,
    /// Formatted lines appended to a file.
    File {
        /// Log file path.
        path: PathBuf,
    },
}

/// Where audit records go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSinkConfig {
    /// Emit as `tracing` events under the `audit` target.
    Tracing,
    /// JSON lines on standard output.
    #[default]
    Stdout,
    /// JSON lines appended to a file.
    File {
        /// Audit trail path.
        path: PathBuf,
    },
}

/// Configuration for an [`AuditLogger`].
///
/// # Examples
///
/// ```
/// use auditlog::{AuditLogConfig, AuditSinkConfig};
///
/// let config = AuditLogConfig::from_yaml_str(
///     "audit:\n  type: file\n  path: /var/log/app/audit.log\nhostname: web-1\n",
/// )
/// .unwrap();
/// assert_eq!(config.hostname.as_deref(), Some("web-1"));
/// assert!(matches!(config.audit, AuditSinkConfig::File { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditLogConfig {
    /// Base logger destination.
    pub base: BaseSinkConfig,

    /// Minimum level written by stream and file base loggers.
    pub base_level: Level,

    /// Audit sink destination.
    pub audit: AuditSinkConfig,

    /// Hostname override; resolved from the OS when unset.
    pub hostname: Option<String>,

    /// Whether records carry the ambient transaction id.
    pub transaction_ids: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            base: BaseSinkConfig::default(),
            base_level: Level::Debug,
            audit: AuditSinkConfig::default(),
            hostname: None,
            transaction_ids: true,
        }
    }
}

impl AuditLogConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] if the document is invalid.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LogError::Config {
            reason: e.to_string(),
        })
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Applies [`AUDIT_LOG_PATH_ENV`] and [`AUDIT_LOG_HOSTNAME_ENV`] when set.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(AUDIT_LOG_PATH_ENV).filter(|p| !p.is_empty()) {
            self.audit = AuditSinkConfig::File { path: path.into() };
        }
        if let Some(hostname) = lookup(AUDIT_LOG_HOSTNAME_ENV).filter(|h| !h.is_empty()) {
            self.hostname = Some(hostname);
        }
        self
    }

    /// Sets the base logger destination.
    #[must_use]
    pub fn with_base(mut self, base: BaseSinkConfig) -> Self {
        self.base = base;
        self
    }

    /// Sets the minimum base log level.
    #[must_use]
    pub const fn with_base_level(mut self, level: Level) -> Self {
        self.base_level = level;
        self
    }

    /// Sets the audit sink destination.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditSinkConfig) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the hostname override.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Enables or disables transaction ids on records.
    #[must_use]
    pub const fn with_transaction_ids(mut self, enabled: bool) -> Self {
        self.transaction_ids = enabled;
        self
    }

    /// Opens the configured sinks and builds the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if a log file cannot be opened.
    pub fn build(&self) -> Result<AuditLogger> {
        let base: Arc<dyn Logger> = match &self.base {
            BaseSinkConfig::Tracing => Arc::new(TracingLogger::new()),
            BaseSinkConfig::Stderr => Arc::new(StreamLogger::new(self.base_level)),
            BaseSinkConfig::File { path } => Arc::new(FileLogger::open(path, self.base_level)?),
        };
        let audit: Arc<dyn AuditSink> = match &self.audit {
            AuditSinkConfig::Tracing => Arc::new(TracingAuditSink::new()),
            AuditSinkConfig::Stdout => Arc::new(StdoutAuditSink::new()),
            AuditSinkConfig::File { path } => Arc::new(FileAuditSink::open(path)?),
        };
        let transactions: Arc<dyn TransactionSource> = if self.transaction_ids {
            Arc::new(AmbientTransactionSource)
        } else {
            Arc::new(NoTransactionSource)
        };

        let mut builder = AuditLogger::builder(base, audit).transaction_source(transactions);
        if let Some(hostname) = &self.hostname {
            builder = builder.hostname(hostname.clone());
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditLogConfig::new();
        assert_eq!(config.base, BaseSinkConfig::Tracing);
        assert_eq!(config.audit, AuditSinkConfig::Stdout);
        assert_eq!(config.base_level, Level::Debug);
        assert!(config.transaction_ids);
        assert!(config.hostname.is_none());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r"
base:
  type: file
  path: /tmp/app.log
base_level: warn
audit:
  type: stdout
hostname: web-1
transaction_ids: false
";
        let config = AuditLogConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.base,
            BaseSinkConfig::File {
                path: PathBuf::from("/tmp/app.log")
            }
        );
        assert_eq!(config.base_level, Level::Warn);
        assert_eq!(config.audit, AuditSinkConfig::Stdout);
        assert_eq!(config.hostname.as_deref(), Some("web-1"));
        assert!(!config.transaction_ids);
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let err = AuditLogConfig::from_yaml_str("rotation: daily\n").unwrap_err();
        assert!(matches!(err, LogError::Config { .. }));
    }

    #[test]
    fn test_overrides_applied() {
        let config = AuditLogConfig::new().with_overrides(|key| match key {
            AUDIT_LOG_PATH_ENV => Some("/var/log/audit.log".to_string()),
            AUDIT_LOG_HOSTNAME_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(
            config.audit,
            AuditSinkConfig::File {
                path: PathBuf::from("/var/log/audit.log")
            }
        );
        assert!(config.hostname.is_none());
    }

    #[test]
    fn test_build_file_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit.log");
        let config = AuditLogConfig::new()
            .with_base(BaseSinkConfig::File {
                path: dir.path().join("app.log"),
            })
            .with_base_level(Level::Info)
            .with_audit(AuditSinkConfig::File {
                path: audit_path.clone(),
            })
            .with_hostname("configured-host");

        let logger = config.build().unwrap();
        logger.info("hello").unwrap();
        logger.audit("configured").unwrap();
        logger.close().unwrap();

        let line = std::fs::read_to_string(&audit_path).unwrap();
        assert!(line.contains("\"hostname\":\"configured-host\""));
        assert!(line.contains("\"message\":\"configured\""));
        assert_eq!(logger.hostname(), "configured-host");
    }

    #[test]
    fn test_omitted_audit_section_defaults_to_stdout() {
        let config = AuditLogConfig::from_yaml_str("hostname: web-1\n").unwrap();
        assert_eq!(config.audit, AuditSinkConfig::Stdout);
        assert_eq!(config.build().unwrap().audit_sink().name(), "stdout");
    }

    #[test]
    fn test_tracing_audit_sink_filtered_out_fails_loudly() {
        let logger = AuditLogConfig::new()
            .with_audit(AuditSinkConfig::Tracing)
            .build()
            .unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("auditlog=info")
            .with_writer(std::io::sink)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || logger.audit("security event"));
        assert!(matches!(result, Err(LogError::Disabled { sink: "tracing" })));
    }

    #[test]
    fn test_build_fails_on_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new().with_audit(AuditSinkConfig::File {
            path: dir.path().join("missing").join("audit.log"),
        });
        assert!(matches!(config.build(), Err(LogError::Io(_))));
    }
}
