//! The structured audit record.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{LogError, Result};

/// Keys of a serialized audit record, in emission order.
///
/// Downstream compliance tooling parses audit trails by these names.
pub const RECORD_FIELDS: [&str; 8] = [
    "timestamp",
    "hostname",
    "pid",
    "thread_id",
    "level",
    "transaction_id",
    "message",
    "account_number",
];

/// Level of every audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// The only audit level.
    Audit,
}

/// One entry of the audit trail.
///
/// Fields are fixed at construction. Absent values serialize as `null`
/// rather than being omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    timestamp: DateTime<Utc>,
    hostname: String,
    pid: u32,
    thread_id: u64,
    level: AuditLevel,
    transaction_id: Option<String>,
    message: String,
    account_number: Option<String>,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl AuditRecord {
    /// Captures a record for the calling thread at the current instant.
    #[must_use]
    pub fn capture(
        hostname: &str,
        message: &str,
        transaction_id: Option<String>,
        account_number: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            hostname: hostname.to_string(),
            pid: std::process::id(),
            thread_id: current_thread_id(),
            level: AuditLevel::Audit,
            transaction_id,
            message: message.to_string(),
            account_number,
        }
    }

    /// Parses one line of an audit trail.
    ///
    /// The line must be a JSON object carrying exactly the keys in
    /// [`RECORD_FIELDS`]. `null` is accepted only for `transaction_id` and
    /// `account_number`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidRecord`] if a key is missing or extra, and
    /// [`LogError::Serialization`] if a value has the wrong type.
    pub fn from_line(line: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let object = value.as_object().ok_or_else(|| LogError::InvalidRecord {
            reason: "record is not a JSON object".to_string(),
        })?;

        // serde treats a missing Option field as None, so check presence here
        if let Some(missing) = RECORD_FIELDS.iter().find(|k| !object.contains_key(**k)) {
            return Err(LogError::InvalidRecord {
                reason: format!("missing field '{missing}'"),
            });
        }
        if let Some(extra) = object.keys().find(|k| !RECORD_FIELDS.contains(&k.as_str())) {
            return Err(LogError::InvalidRecord {
                reason: format!("unexpected field '{extra}'"),
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the record as a single JSON line without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Serialization`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the emission time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the hostname of the emitting process.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the emitting process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the emitting thread id.
    #[must_use]
    pub const fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Returns the record level.
    #[must_use]
    pub const fn level(&self) -> AuditLevel {
        self.level
    }

    /// Returns the correlation id of the originating request, if any.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Returns the audited message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the account the operation was performed on behalf of.
    #[must_use]
    pub fn account_number(&self) -> Option<&str> {
        self.account_number.as_deref()
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns a process-unique numeric id for the calling thread.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
