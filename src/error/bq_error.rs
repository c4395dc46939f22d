use std::fmt;

#[derive(Debug, Clone)]
pub enum BigQueryError {
    AuthenticationFailed {
        reason: String,
    },

    InvalidQuery {
        sql_preview: String,
        message: String,
        location: Option<QueryErrorLocation>,
    },

    TableNotFound {
        project: String,
        dataset: String,
        table: String,
    },

    DatasetNotFound {
        project: String,
        dataset: String,
    },

    AlreadyExists {
        resource: String,
    },

    AccessDenied {
        resource: String,
        required_permission: Option<String>,
    },

    QuotaExceeded {
        quota_type: String,
        message: String,
    },

    ConnectionFailed {
        reason: String,
    },

    InvalidCredentials {
        path: Option<String>,
        reason: String,
    },

    Unknown {
        code: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct QueryErrorLocation {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl BigQueryError {
    pub fn is_not_found(&self) -> bool {
        match self {
            BigQueryError::TableNotFound { .. } | BigQueryError::DatasetNotFound { .. } => true,
            BigQueryError::Unknown { code, .. } => code.as_deref() == Some("notFound"),
            _ => false,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            BigQueryError::AuthenticationFailed { .. } => {
                "Try:\n  \
                 • Run: gcloud auth application-default login\n  \
                 • Or pass --credential-file (GOOGLE_APPLICATION_CREDENTIALS) with a service account key".to_string()
            }

            BigQueryError::InvalidQuery { .. } => {
                "The migration query was rejected:\n  \
                 • Check that every changed column type can be CAST from the old type\n  \
                 • Consider --mode drop_create if existing rows need not be kept".to_string()
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                format!(
                    "Verify the table exists:\n  \
                     • Run: bq show {project}:{dataset}.{table}\n  \
                     • Re-run plan to refresh the remote state"
                )
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                format!(
                    "Verify the dataset exists:\n  \
                     • Run: bq show {project}:{dataset}\n  \
                     • Check the --backup-dataset value if one was given"
                )
            }

            BigQueryError::AlreadyExists { resource } => {
                format!(
                    "{resource} already exists:\n  \
                     • Re-run plan; the remote state changed since it was read\n  \
                     • Export it first if it should be managed from files"
                )
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                let perm = required_permission.as_deref().unwrap_or("bigquery.datasets.update");
                format!(
                    "Request access to {resource}:\n  \
                     • Required permission: {perm}\n  \
                     • bqdm plan needs bigquery.datasets.get and bigquery.tables.get; apply and destroy also need update/delete\n  \
                     • Check that --project (GCP_PROJECT_ID) names the intended project"
                )
            }

            BigQueryError::QuotaExceeded { quota_type, .. } => {
                format!(
                    "Quota '{quota_type}' exceeded:\n  \
                     • Wait and retry later\n  \
                     • Lower --parallelism to reduce concurrent API calls"
                )
            }

            BigQueryError::ConnectionFailed { .. } => {
                "Connection failed:\n  \
                 • Verify the BigQuery API is enabled for --project\n  \
                 • Re-run bqdm plan before apply; steps finished before the failure are not rolled back".to_string()
            }

            BigQueryError::InvalidCredentials { path, .. } => {
                let path_info = path.as_ref()
                    .map(|p| format!(" ({})", p))
                    .unwrap_or_default();
                format!(
                    "Invalid credentials{path_info}:\n  \
                     • Check the --credential-file path\n  \
                     • Verify the service account key is valid"
                )
            }

            BigQueryError::Unknown { .. } => {
                "An unexpected error occurred:\n  \
                 • Re-run with --debug to log each store call and migration step\n  \
                 • Re-run bqdm plan to see what is left to apply".to_string()
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BigQueryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            BigQueryError::InvalidQuery { .. } => "INVALID_QUERY",
            BigQueryError::TableNotFound { .. } => "TABLE_NOT_FOUND",
            BigQueryError::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            BigQueryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            BigQueryError::AccessDenied { .. } => "ACCESS_DENIED",
            BigQueryError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            BigQueryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BigQueryError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            BigQueryError::Unknown { .. } => "UNKNOWN",
        }
    }
}

impl fmt::Display for BigQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BigQueryError::AuthenticationFailed { reason } => {
                write!(f, "Authentication failed: {reason}")
            }

            BigQueryError::InvalidQuery { message, sql_preview, location } => {
                write!(f, "Invalid SQL: {message}")?;
                if let Some(QueryErrorLocation { line: Some(line), column }) = location {
                    write!(f, " (line {line}")?;
                    if let Some(col) = column {
                        write!(f, ", column {col}")?;
                    }
                    write!(f, ")")?;
                }
                if !sql_preview.is_empty() {
                    write!(f, "\n\nSQL preview:\n  {sql_preview}")?;
                }
                Ok(())
            }

            BigQueryError::TableNotFound { project, dataset, table } => {
                write!(f, "Table not found: {project}.{dataset}.{table}")
            }

            BigQueryError::DatasetNotFound { project, dataset } => {
                write!(f, "Dataset not found: {project}.{dataset}")
            }

            BigQueryError::AlreadyExists { resource } => {
                write!(f, "Already exists: {resource}")
            }

            BigQueryError::AccessDenied { resource, required_permission } => {
                write!(f, "Access denied to {resource}")?;
                if let Some(perm) = required_permission {
                    write!(f, " (requires {perm})")?;
                }
                Ok(())
            }

            BigQueryError::QuotaExceeded { quota_type, message } => {
                write!(f, "Quota exceeded ({quota_type}): {message}")
            }

            BigQueryError::ConnectionFailed { reason } => {
                write!(f, "Connection failed: {reason}")
            }

            BigQueryError::InvalidCredentials { reason, path } => {
                write!(f, "Invalid credentials: {reason}")?;
                if let Some(p) = path {
                    write!(f, " (path: {p})")?;
                }
                Ok(())
            }

            BigQueryError::Unknown { code, message } => {
                if let Some(c) = code {
                    write!(f, "BigQuery error [{c}]: {message}")
                } else {
                    write!(f, "BigQuery error: {message}")
                }
            }
        }
    }
}

impl std::error::Error for BigQueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(BigQueryError::TableNotFound {
            project: "p".into(),
            dataset: "d".into(),
            table: "t".into(),
        }.is_not_found());

        assert!(BigQueryError::Unknown {
            code: Some("notFound".into()),
            message: "gone".into(),
        }.is_not_found());

        assert!(!BigQueryError::AlreadyExists {
            resource: "p.d".into(),
        }.is_not_found());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(BigQueryError::AuthenticationFailed {
            reason: "test".into(),
        }.error_code(), "AUTH_FAILED");

        assert_eq!(BigQueryError::AlreadyExists {
            resource: "r".into(),
        }.error_code(), "ALREADY_EXISTS");

        assert_eq!(BigQueryError::DatasetNotFound {
            project: "p".into(),
            dataset: "d".into(),
        }.error_code(), "DATASET_NOT_FOUND");

        assert_eq!(BigQueryError::Unknown {
            code: None,
            message: "m".into(),
        }.error_code(), "UNKNOWN");
    }

    #[test]
    fn test_display_invalid_query_with_location() {
        let err = BigQueryError::InvalidQuery {
            sql_preview: "SELECT cast(a AS INT64) AS a FROM `ds.t`".into(),
            message: "Bad int64 value".into(),
            location: Some(QueryErrorLocation {
                line: Some(1),
                column: Some(8),
            }),
        };
        let display = err.to_string();
        assert!(display.contains("Invalid SQL: Bad int64 value"));
        assert!(display.contains("line 1"));
        assert!(display.contains("column 8"));
        assert!(display.contains("cast(a AS INT64)"));
    }

    #[test]
    fn test_display_table_not_found() {
        let err = BigQueryError::TableNotFound {
            project: "my-project".into(),
            dataset: "my_dataset".into(),
            table: "my_table".into(),
        };
        assert_eq!(err.to_string(), "Table not found: my-project.my_dataset.my_table");
    }

    #[test]
    fn test_display_unknown_with_code() {
        let err = BigQueryError::Unknown {
            code: Some("INTERNAL".into()),
            message: "Something went wrong".into(),
        };
        assert_eq!(err.to_string(), "BigQuery error [INTERNAL]: Something went wrong");
    }

    #[test]
    fn test_suggestion_dataset_not_found() {
        let err = BigQueryError::DatasetNotFound {
            project: "proj".into(),
            dataset: "ds".into(),
        };
        let suggestion = err.suggestion();
        assert!(suggestion.contains("bq show proj:ds"));
        assert!(suggestion.contains("--backup-dataset"));
    }

    #[test]
    fn test_suggestions_point_at_bqdm_flags() {
        let denied = BigQueryError::AccessDenied {
            resource: "proj.sales".into(),
            required_permission: None,
        }.suggestion();
        assert!(denied.contains("bigquery.datasets.update"));
        assert!(denied.contains("--project"));

        let creds = BigQueryError::InvalidCredentials {
            path: Some("/tmp/key.json".into()),
            reason: "bad".into(),
        }.suggestion();
        assert!(creds.contains("(/tmp/key.json)"));
        assert!(creds.contains("--credential-file"));

        let unknown = BigQueryError::Unknown { code: None, message: "m".into() }.suggestion();
        assert!(unknown.contains("--debug"));
        assert!(unknown.contains("bqdm plan"));
    }

    #[test]
    fn test_suggestion_quota_mentions_parallelism() {
        let err = BigQueryError::QuotaExceeded {
            quota_type: "rate limit".into(),
            message: "slow down".into(),
        };
        assert!(err.suggestion().contains("--parallelism"));
    }
}
