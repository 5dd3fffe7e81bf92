//! Error types for report acquisition and check projection.
//!
//! Which of these are fatal depends on where they happen: a failure on the
//! live report aborts the scrape, a failure on the logged report or on a single
//! keyword only means fewer metrics for that scrape.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error type for everything that can go wrong between running
/// `ipa-healthcheck` and producing metric observations.
#[derive(Debug)]
pub enum ExporterError {
    /// The external tool could not be started or exited non-zero
    ToolExecution {
        /// Path of the tool that was invoked
        tool: PathBuf,
        /// What went wrong (spawn failure or exit status)
        reason: String,
    },

    /// A report file could not be read
    ReportIo {
        /// The report file
        path: PathBuf,
        /// The underlying I/O error
        source: io::Error,
    },

    /// A report file is not a JSON array of checks
    ReportParse {
        /// The report file
        path: PathBuf,
        /// The underlying decoding error
        source: serde_json::Error,
    },

    /// A single keyword of a check has the wrong shape
    FieldDecode {
        /// Name of the check carrying the keyword
        check: String,
        /// Keyword name
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl ExporterError {
    pub(crate) fn field_decode(check: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::FieldDecode {
            check: check.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolExecution { tool, reason } => {
                write!(f, "ipa-healthcheck tool {} failed: {}", tool.display(), reason)
            }
            Self::ReportIo { path, source } => {
                write!(f, "Cannot read checks from {}: {}", path.display(), source)
            }
            Self::ReportParse { path, source } => {
                write!(f, "Cannot unmarshal checks from {}: {}", path.display(), source)
            }
            Self::FieldDecode { check, key, reason } => {
                write!(f, "Invalid keyword '{}' in check {}: {}", key, check, reason)
            }
        }
    }
}

impl std::error::Error for ExporterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReportIo { source, .. } => Some(source),
            Self::ReportParse { source, .. } => Some(source),
            _ => None,
        }
    }
}
