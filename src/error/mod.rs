mod bq_error;
mod parser;

use std::time::Duration;
use thiserror::Error;

pub use bq_error::{BigQueryError, QueryErrorLocation};
pub use parser::{parse_bq_error, ErrorContext};

#[derive(Error, Debug)]
pub enum BqdmError {
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    #[error("BigQuery client error: {0}")]
    Client(String),

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Configuration directory not found: {0}")]
    ConfigDirNotFound(String),

    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Job {job_id} did not finish within {timeout:?}")]
    JobTimeout { job_id: String, timeout: Duration },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("{failed} of {total} operations failed")]
    Apply { failed: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BqdmError {
    /// True when the remote store reported the addressed resource as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            BqdmError::NotFound(_) => true,
            BqdmError::BigQuery(bq) => bq.is_not_found(),
            _ => false,
        }
    }

    /// Configuration errors are reported before any remote mutation is attempted.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BqdmError::UnknownFieldType(_)
                | BqdmError::ConfigDirNotFound(_)
                | BqdmError::ConfigFileNotFound(_)
                | BqdmError::Config(_)
                | BqdmError::Yaml(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BqdmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_from_store() {
        assert!(BqdmError::NotFound("ds.tbl".into()).is_not_found());
    }

    #[test]
    fn test_not_found_from_bigquery() {
        let err = BqdmError::BigQuery(BigQueryError::DatasetNotFound {
            project: "p".into(),
            dataset: "d".into(),
        });
        assert!(err.is_not_found());
        assert!(!BqdmError::Client("boom".into()).is_not_found());
    }

    #[test]
    fn test_config_errors() {
        assert!(BqdmError::UnknownFieldType("NUMBER".into()).is_config_error());
        assert!(BqdmError::ConfigDirNotFound("./conf".into()).is_config_error());
        assert!(!BqdmError::JobFailed { job_id: "j".into(), message: "m".into() }.is_config_error());
    }

    #[test]
    fn test_job_failed_display() {
        let err = BqdmError::JobFailed {
            job_id: "job_123".into(),
            message: "Invalid cast".into(),
        };
        assert_eq!(err.to_string(), "Job job_123 failed: Invalid cast");
    }
}
