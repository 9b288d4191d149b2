//! Error types for dsmig
//!
//! This module provides the error handling for the library, including:
//! - A crate-wide [`Error`] enum with file-level, row-level and collaborator variants
//! - [`RowError`] for rows the control store rejects while loading
//! - Process exit code mapping for the command line surface

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dsmig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dsmig
///
/// Variants are split by blast radius: `Format` and `Persistence` stop a run, the
/// collaborator variants (`Transfer`, `Conversion`, `Timeout`, `ExternalTool`) only fail the
/// row they were raised for.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transfer.max_concurrent")
        key: Option<String>,
    },

    /// The control file cannot be interpreted (missing or duplicated required header,
    /// unreadable delimited text)
    #[error("control file {path} is malformed: {reason}")]
    Format {
        /// Control file being read
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// A dataset name appears more than once
    #[error("duplicate dataset {dataset}")]
    DuplicateKey {
        /// The repeated dataset name
        dataset: String,
    },

    /// A dataset name is not a valid mainframe dataset name
    #[error("invalid dataset name {dataset:?}: {reason}")]
    InvalidDataset {
        /// The name as given
        dataset: String,
        /// Which rule it breaks
        reason: String,
    },

    /// The control file could not be written back
    #[error("failed to persist control file {path}: {reason}")]
    Persistence {
        /// Control file being written
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The transfer collaborator reported a failure
    #[error("retrieval of {dataset} failed: {reason}")]
    Transfer {
        /// Dataset being retrieved
        dataset: String,
        /// Failure reported by the transfer collaborator
        reason: String,
    },

    /// The decode/load collaborator reported a failure
    #[error("conversion of {dataset} failed: {reason}")]
    Conversion {
        /// Dataset being converted
        dataset: String,
        /// Failure reported by the decode/load collaborator
        reason: String,
    },

    /// A collaborator call exceeded its time budget
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// The operation that timed out (e.g., "fetch SYS1.DATA")
        operation: String,
        /// Configured timeout
        after: Duration,
    },

    /// External tool execution failed (ftp, cobgensch, dsmigin, idcams)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, unsupported organization, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The run was cancelled before the operation could finish
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-text error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error should stop the whole run rather than fail a single row
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::Format { .. } | Error::Persistence { .. }
        )
    }
}

/// Why a single control file row was excluded at load time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowErrorKind {
    /// A cell could not be coerced to its column type
    #[error("column {column} has invalid value {value:?}: {reason}")]
    InvalidValue {
        /// Column header
        column: String,
        /// Raw cell text
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The dataset name cell is blank
    #[error("dataset name is blank")]
    MissingDataset,

    /// The dataset name is not a valid mainframe dataset name
    #[error("invalid dataset name {value:?}: {reason}")]
    InvalidDataset {
        /// Raw cell text
        value: String,
        /// Which rule it breaks
        reason: String,
    },

    /// The dataset name was already claimed by an earlier row
    #[error("duplicate of dataset first seen on line {first_line}")]
    Duplicate {
        /// Line number of the row that keeps the name
        first_line: u64,
    },
}

/// A rejected control file row: excluded from both phases, written back verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line number in the control file (the header is line 1)
    pub line: u64,
    /// Dataset name when one could be read
    pub dataset: Option<String>,
    /// What went wrong
    pub kind: RowErrorKind,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.dataset {
            Some(dataset) => write!(f, "line {} ({}): {}", self.line, dataset, self.kind),
            None => write!(f, "line {}: {}", self.line, self.kind),
        }
    }
}

impl std::error::Error for RowError {}

impl RowError {
    /// Machine-readable classification, mirroring [`ToExitCode::error_code`]
    pub fn error_code(&self) -> &'static str {
        match self.kind {
            RowErrorKind::InvalidValue { .. }
            | RowErrorKind::MissingDataset
            | RowErrorKind::InvalidDataset { .. } => "format_error",
            RowErrorKind::Duplicate { .. } => "duplicate_key",
        }
    }
}

/// Convert errors to process exit codes for the command line surface
///
/// `0` is a clean run, `1` a degraded run (some rows failed), `2` a fatal error.
pub trait ToExitCode {
    /// Get the process exit code for this error
    fn exit_code(&self) -> i32;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

/// Exit code for a run where every selected row succeeded
pub const EXIT_OK: i32 = 0;
/// Exit code for a run that completed but had failed or rejected rows
pub const EXIT_DEGRADED: i32 = 1;
/// Exit code for a run that could not load or persist the control file
pub const EXIT_FATAL: i32 = 2;

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            // Row-scoped failures only degrade a run
            Error::DuplicateKey { .. }
            | Error::InvalidDataset { .. }
            | Error::Transfer { .. }
            | Error::Conversion { .. }
            | Error::Timeout { .. }
            | Error::ExternalTool(_)
            | Error::NotSupported(_)
            | Error::Cancelled(_) => EXIT_DEGRADED,

            // Anything reaching the top level otherwise aborted the run
            Error::Config { .. }
            | Error::Format { .. }
            | Error::Persistence { .. }
            | Error::Io(_)
            | Error::Csv(_)
            | Error::Serialization(_)
            | Error::Other(_) => EXIT_FATAL,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Format { .. } => "format_error",
            Error::DuplicateKey { .. } => "duplicate_key",
            Error::InvalidDataset { .. } => "invalid_dataset",
            Error::Persistence { .. } => "persistence_error",
            Error::Transfer { .. } => "transfer_failure",
            Error::Conversion { .. } => "conversion_failure",
            Error::Timeout { .. } => "timeout",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Cancelled(_) => "cancelled",
            Error::Io(_) => "io_error",
            Error::Csv(_) => "csv_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_exit_code, expected_error_code) for every match arm
    fn all_error_variants() -> Vec<(Error, i32, &'static str)> {
        vec![
            (
                Error::config("transfer.max_concurrent", "must be at least 1"),
                EXIT_FATAL,
                "config_error",
            ),
            (
                Error::Format {
                    path: PathBuf::from("datasets.csv"),
                    reason: "missing DSN".into(),
                },
                EXIT_FATAL,
                "format_error",
            ),
            (
                Error::DuplicateKey {
                    dataset: "SYS1.DATA".into(),
                },
                EXIT_DEGRADED,
                "duplicate_key",
            ),
            (
                Error::InvalidDataset {
                    dataset: "..".into(),
                    reason: "dataset name has an empty qualifier".into(),
                },
                EXIT_DEGRADED,
                "invalid_dataset",
            ),
            (
                Error::Persistence {
                    path: PathBuf::from("datasets.csv"),
                    reason: "read-only".into(),
                },
                EXIT_FATAL,
                "persistence_error",
            ),
            (
                Error::Transfer {
                    dataset: "SYS1.DATA".into(),
                    reason: "550 not found".into(),
                },
                EXIT_DEGRADED,
                "transfer_failure",
            ),
            (
                Error::Conversion {
                    dataset: "SYS1.DATA".into(),
                    reason: "bad copybook".into(),
                },
                EXIT_DEGRADED,
                "conversion_failure",
            ),
            (
                Error::Timeout {
                    operation: "fetch SYS1.DATA".into(),
                    after: Duration::from_secs(30),
                },
                EXIT_DEGRADED,
                "timeout",
            ),
            (
                Error::ExternalTool("dsmigin exited 3".into()),
                EXIT_DEGRADED,
                "external_tool_error",
            ),
            (
                Error::NotSupported("GDG".into()),
                EXIT_DEGRADED,
                "not_supported",
            ),
            (
                Error::Cancelled("shutdown".into()),
                EXIT_DEGRADED,
                "cancelled",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                EXIT_FATAL,
                "io_error",
            ),
            (
                Error::Serialization(serde_json::from_str::<u32>("x").unwrap_err()),
                EXIT_FATAL,
                "serialization_error",
            ),
            (Error::Other("boom".into()), EXIT_FATAL, "internal_error"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_exit_and_error_code() {
        for (error, exit, code) in all_error_variants() {
            assert_eq!(error.exit_code(), exit, "exit code for {error:?}");
            assert_eq!(error.error_code(), code, "error code for {error:?}");
        }
    }

    #[test]
    fn only_file_level_errors_are_fatal() {
        for (error, exit, _) in all_error_variants() {
            if error.is_fatal() {
                assert_eq!(exit, EXIT_FATAL, "{error:?} is fatal but degrades");
            }
        }
        assert!(
            !Error::Transfer {
                dataset: "A".into(),
                reason: "x".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let err = Error::Timeout {
            operation: "convert SYS1.DATA".into(),
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "convert SYS1.DATA timed out after 90s");
    }

    #[test]
    fn row_error_display_includes_dataset_when_known() {
        let err = RowError {
            line: 7,
            dataset: Some("SYS1.DATA".into()),
            kind: RowErrorKind::InvalidValue {
                column: "LRECL".into(),
                value: "eighty".into(),
                reason: "not an unsigned integer".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "line 7 (SYS1.DATA): column LRECL has invalid value \"eighty\": not an unsigned integer"
        );
        assert_eq!(err.error_code(), "format_error");

        let dup = RowError {
            line: 9,
            dataset: None,
            kind: RowErrorKind::Duplicate { first_line: 3 },
        };
        assert_eq!(
            dup.to_string(),
            "line 9: duplicate of dataset first seen on line 3"
        );
        assert_eq!(dup.error_code(), "duplicate_key");
    }
}
