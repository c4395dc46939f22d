//! Remote resource access used by the reconciler and migrations.

mod bigquery;
mod memory;
mod rest;

use std::fmt;
use async_trait::async_trait;

use crate::error::{BqdmError, Result};
use crate::model::{Dataset, DatasetField, LabelPatch, Table, TableField};
use crate::schema::Schema;

pub use bigquery::BigQueryStore;
pub use memory::{MemoryStore, StoreCall};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(dataset_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Backtick-quoted `dataset.table` for use in SQL.
    pub fn sql_name(&self) -> String {
        format!("`{}.{}`", self.dataset_id, self.table_id)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
            WriteDisposition::WriteAppend => "WRITE_APPEND",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryJob {
    pub sql: String,
    pub destination: TableRef,
    pub write_disposition: WriteDisposition,
    /// Columns the query yields. A truncating write replaces the destination
    /// schema with [`Schema::as_query_result`] of this.
    pub result_schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        match value {
            "DONE" => JobState::Done,
            "RUNNING" => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: String,
    pub state: JobState,
    pub errors: Vec<String>,
}

impl JobResult {
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    /// A finished job with a non-empty error result becomes [`BqdmError::JobFailed`].
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BqdmError::JobFailed {
                job_id: self.job_id,
                message: self.errors.join("; "),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetUpdate {
    pub dataset: Dataset,
    pub fields: Vec<DatasetField>,
    pub labels: LabelPatch,
}

#[derive(Debug, Clone)]
pub struct TableUpdate {
    pub dataset_id: String,
    pub table: Table,
    pub fields: Vec<TableField>,
    pub labels: LabelPatch,
}

impl TableUpdate {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.dataset_id, &self.table.table_id)
    }
}

/// Copy the requested attributes of `update` onto `current`.
pub fn apply_dataset_update(current: &Dataset, update: &DatasetUpdate) -> Dataset {
    let mut next = current.clone();
    let desired = &update.dataset;
    for field in &update.fields {
        match field {
            DatasetField::FriendlyName => next.friendly_name = desired.friendly_name.clone(),
            DatasetField::Description => next.description = desired.description.clone(),
            DatasetField::DefaultTableExpirationMs => {
                next.default_table_expiration_ms = desired.default_table_expiration_ms
            }
            DatasetField::AccessEntries => next.access_entries = desired.access_entries.clone(),
            DatasetField::Labels => {
                let mut labels = next.labels.take().unwrap_or_default();
                crate::model::apply_label_patch(&mut labels, &update.labels);
                next.labels = Some(labels);
            }
        }
    }
    next
}

/// Copy the requested attributes of `update` onto `current`.
pub fn apply_table_update(current: &Table, update: &TableUpdate) -> Table {
    let mut next = current.clone();
    let desired = &update.table;
    for field in &update.fields {
        match field {
            TableField::FriendlyName => next.friendly_name = desired.friendly_name.clone(),
            TableField::Description => next.description = desired.description.clone(),
            TableField::Expires => next.expires = desired.expires,
            TableField::ViewUseLegacySql => next.view_use_legacy_sql = desired.view_use_legacy_sql,
            TableField::ViewQuery => next.view_query = desired.view_query.clone(),
            TableField::Schema => next.schema = desired.schema.clone(),
            TableField::Labels => {
                let mut labels = next.labels.take().unwrap_or_default();
                crate::model::apply_label_patch(&mut labels, &update.labels);
                next.labels = Some(labels);
            }
        }
    }
    next
}

/// Remote warehouse operations.
///
/// Describe calls return `Ok(None)` for a missing resource. Implementations
/// must be safe to share across worker tasks.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    fn project_id(&self) -> &str;

    async fn list_datasets(&self) -> Result<Vec<String>>;
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>>;
    async fn create_dataset(&self, dataset: &Dataset) -> Result<()>;
    async fn update_dataset(&self, update: &DatasetUpdate) -> Result<()>;
    async fn delete_dataset(&self, dataset_id: &str) -> Result<()>;

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>>;
    async fn get_table(&self, table: &TableRef) -> Result<Option<Table>>;
    async fn create_table(&self, dataset_id: &str, table: &Table) -> Result<()>;
    async fn update_table(&self, update: &TableUpdate) -> Result<()>;
    async fn delete_table(&self, table: &TableRef) -> Result<()>;

    async fn submit_query(&self, job: &QueryJob) -> Result<JobHandle>;
    async fn copy_table(&self, source: &TableRef, destination: &TableRef) -> Result<JobHandle>;

    /// Wait until the job is done and report its outcome.
    async fn await_job(&self, job: &JobHandle) -> Result<JobResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Labels;

    #[test]
    fn test_job_result_with_errors_fails() {
        let result = JobResult {
            job_id: "job_1".into(),
            state: JobState::Done,
            errors: vec!["Bad int64 value".into()],
        };
        let err = result.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Job job_1 failed: Bad int64 value");
    }

    #[test]
    fn test_apply_dataset_update_only_touches_requested_fields() {
        let mut current = Dataset::new("ds");
        current.description = Some("old".into());
        current.friendly_name = Some("Old".into());
        let mut desired = current.clone();
        desired.description = Some("new".into());
        desired.friendly_name = Some("New".into());
        let update = DatasetUpdate {
            dataset: desired,
            fields: vec![DatasetField::Description],
            labels: LabelPatch::new(),
        };
        let next = apply_dataset_update(&current, &update);
        assert_eq!(next.description.as_deref(), Some("new"));
        assert_eq!(next.friendly_name.as_deref(), Some("Old"));
    }

    #[test]
    fn test_apply_table_update_removes_null_labels() {
        let mut current = Table::new("t");
        current.labels = Some(Labels::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]));
        let update = TableUpdate {
            dataset_id: "ds".into(),
            table: Table::new("t"),
            fields: vec![TableField::Labels],
            labels: LabelPatch::from([("b".to_string(), None)]),
        };
        let next = apply_table_update(&current, &update);
        assert_eq!(next.labels, Some(Labels::from([("a".to_string(), "1".to_string())])));
    }

    #[test]
    fn test_table_ref_sql_name() {
        assert_eq!(TableRef::new("ds", "t").sql_name(), "`ds.t`");
        assert_eq!(TableRef::new("ds", "t").to_string(), "ds.t");
    }
}
