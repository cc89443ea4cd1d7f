//! Verify command implementation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use auditlog::AuditRecord;
use clap::Args;
use tracing::{info, warn};

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Audit trail to check
    pub path: PathBuf,

    /// Print every record
    #[arg(short, long)]
    pub verbose: bool,
}

/// Outcome of checking an audit trail.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Number of valid records.
    pub valid: usize,
    /// Line number and reason for every invalid line.
    pub invalid: Vec<(usize, String)>,
}

/// Runs the verify command.
pub fn run(args: &VerifyArgs) -> Result<()> {
    info!(path = ?args.path, "Verifying audit trail");

    let report = verify_file(&args.path, args.verbose)?;

    if !report.invalid.is_empty() {
        println!("Errors:");
        for (line, reason) in &report.invalid {
            println!("✗ line {line}: {reason}");
        }
        anyhow::bail!("{} invalid audit records", report.invalid.len());
    }

    println!("✓ {} audit records valid", report.valid);
    Ok(())
}

/// Checks every non-empty line of `path`.
pub fn verify_file(path: &Path, verbose: bool) -> Result<VerifyReport> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut report = VerifyReport::default();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match AuditRecord::from_line(&line) {
            Ok(record) => {
                if verbose {
                    println!(
                        "{} pid={} account={} {}",
                        record.timestamp(),
                        record.pid(),
                        record.account_number().unwrap_or("-"),
                        record.message()
                    );
                }
                report.valid += 1;
            }
            Err(e) => {
                warn!(line = index + 1, "Invalid audit record: {}", e);
                report.invalid.push((index + 1, e.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"{"timestamp":"2024-05-01T10:00:00.000001Z","hostname":"web-1","pid":10,"thread_id":2,"level":"audit","transaction_id":null,"message":"ok","account_number":"1"}"#;

    #[test]
    fn test_verify_reports_invalid_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{VALID}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"message":"partial"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let report = verify_file(file.path(), false).unwrap();
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid.len(), 2);
        assert_eq!(report.invalid[0].0, 3);
        assert_eq!(report.invalid[1].0, 4);
    }

    #[test]
    fn test_run_fails_on_invalid_trail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();

        let args = VerifyArgs {
            path: file.path().to_path_buf(),
            verbose: false,
        };
        assert!(run(&args).is_err());
    }

    #[test]
    fn test_run_accepts_valid_trail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{VALID}").unwrap();

        let args = VerifyArgs {
            path: file.path().to_path_buf(),
            verbose: true,
        };
        run(&args).unwrap();
    }
}
