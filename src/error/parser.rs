use gcp_bigquery_client::error::{BQError, ResponseError};
use super::bq_error::{BigQueryError, QueryErrorLocation};
use regex::Regex;

pub fn parse_bq_error(error: BQError, context: ErrorContext) -> BigQueryError {
    match &error {
        BQError::ResponseError { error: resp } => parse_response_error(resp, context),

        BQError::RequestError(req_err) => {
            BigQueryError::ConnectionFailed {
                reason: req_err.to_string(),
            }
        }

        BQError::NoToken => {
            BigQueryError::AuthenticationFailed {
                reason: "No authentication token available".to_string(),
            }
        }

        BQError::AuthError(auth_err) => {
            BigQueryError::AuthenticationFailed {
                reason: format!("{:?}", auth_err),
            }
        }

        BQError::YupAuthError(yup_err) => {
            BigQueryError::AuthenticationFailed {
                reason: yup_err.to_string(),
            }
        }

        BQError::InvalidServiceAccountKey(io_err)
        | BQError::InvalidServiceAccountAuthenticator(io_err) => {
            BigQueryError::InvalidCredentials {
                path: context.credential_file.clone(),
                reason: io_err.to_string(),
            }
        }

        BQError::InvalidApplicationDefaultCredentialsAuthenticator(io_err) => {
            BigQueryError::AuthenticationFailed {
                reason: io_err.to_string(),
            }
        }

        BQError::SerializationError(serde_err) => {
            BigQueryError::Unknown {
                code: Some("SERIALIZATION".to_string()),
                message: serde_err.to_string(),
            }
        }

        BQError::ConnectionPoolError(msg) => {
            BigQueryError::ConnectionFailed {
                reason: msg.clone(),
            }
        }

        _ => BigQueryError::Unknown {
            code: None,
            message: error.to_string(),
        }
    }
}

fn parse_response_error(
    resp: &ResponseError,
    context: ErrorContext,
) -> BigQueryError {
    let status = resp.error.code;
    let message = &resp.error.message;
    let reason = resp.error.errors.first().and_then(|e| e.get("reason").map(|s| s.as_str()));

    match (status, reason) {
        (400, Some("invalidQuery")) | (400, Some("invalid")) if context.sql.is_some() => {
            BigQueryError::InvalidQuery {
                sql_preview: context.sql.unwrap_or_default(),
                message: message.clone(),
                location: extract_query_location(message),
            }
        }

        (403, Some("accessDenied")) => {
            BigQueryError::AccessDenied {
                resource: context.resource.unwrap_or_else(|| "resource".to_string()),
                required_permission: extract_required_permission(message),
            }
        }

        (403, Some("quotaExceeded")) | (403, Some("rateLimitExceeded")) => {
            BigQueryError::QuotaExceeded {
                quota_type: extract_quota_type(message).unwrap_or_else(|| "API".to_string()),
                message: message.clone(),
            }
        }

        (404, _) => parse_not_found_error(message, &context),

        (409, _) => {
            BigQueryError::AlreadyExists {
                resource: context.resource.unwrap_or_else(|| message.clone()),
            }
        }

        (500..=599, _) => {
            BigQueryError::Unknown {
                code: Some(format!("HTTP_{}", status)),
                message: format!("BigQuery server error: {}", message),
            }
        }

        _ => BigQueryError::Unknown {
            code: reason.map(|s| s.to_string()),
            message: message.clone(),
        }
    }
}

fn parse_not_found_error(message: &str, context: &ErrorContext) -> BigQueryError {
    // "Not found: Table project:dataset.table"
    if let Some(caps) = Regex::new(r"(?i)table\s+([^:\s]+):([^.\s]+)\.([^\s]+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::TableNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
            table: caps[3].to_string(),
        };
    }

    // "Not found: Dataset project:dataset"
    if let Some(caps) = Regex::new(r"(?i)dataset\s+([^:\s]+):([^\s]+)")
        .ok()
        .and_then(|re| re.captures(message))
    {
        return BigQueryError::DatasetNotFound {
            project: caps[1].to_string(),
            dataset: caps[2].to_string(),
        };
    }

    match (&context.project, &context.dataset, &context.table) {
        (Some(project), Some(dataset), Some(table)) => BigQueryError::TableNotFound {
            project: project.clone(),
            dataset: dataset.clone(),
            table: table.clone(),
        },
        (Some(project), Some(dataset), None) => BigQueryError::DatasetNotFound {
            project: project.clone(),
            dataset: dataset.clone(),
        },
        _ => BigQueryError::Unknown {
            code: Some("notFound".to_string()),
            message: message.to_string(),
        },
    }
}

fn extract_query_location(message: &str) -> Option<QueryErrorLocation> {
    let line_col_re = Regex::new(r"\[(\d+):(\d+)\]").ok()?;
    line_col_re.captures(message).map(|caps| QueryErrorLocation {
        line: caps.get(1).and_then(|m| m.as_str().parse().ok()),
        column: caps.get(2).and_then(|m| m.as_str().parse().ok()),
    })
}

fn extract_required_permission(message: &str) -> Option<String> {
    let perm_re = Regex::new(r"(bigquery\.[a-zA-Z.]+)").ok()?;
    perm_re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

fn extract_quota_type(message: &str) -> Option<String> {
    let msg_lower = message.to_lowercase();

    if msg_lower.contains("concurrent") {
        Some("concurrent queries".to_string())
    } else if msg_lower.contains("rate") {
        Some("rate limit".to_string())
    } else if msg_lower.contains("table") && msg_lower.contains("update") {
        Some("table metadata updates".to_string())
    } else {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub sql: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
    pub credential_file: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        let full_sql = sql.into();
        self.sql = Some(match full_sql.char_indices().nth(500) {
            Some((idx, _)) => format!("{}...", &full_sql[..idx]),
            None => full_sql,
        });
        self
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_dataset(mut self, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        self.resource = Some(format!("{}.{}", project, dataset));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self
    }

    pub fn with_table(mut self, project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        let project = project.into();
        let dataset = dataset.into();
        let table = table.into();
        self.resource = Some(format!("{}.{}.{}", project, dataset, table));
        self.project = Some(project);
        self.dataset = Some(dataset);
        self.table = Some(table);
        self
    }

    pub fn with_credential_file(mut self, path: Option<&str>) -> Self {
        self.credential_file = path.map(|p| p.to_string());
        self
    }
}
