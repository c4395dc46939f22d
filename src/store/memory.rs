use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    apply_dataset_update, apply_table_update, DatasetUpdate, JobHandle, JobResult, JobState,
    QueryJob, ResourceStore, TableRef, TableUpdate, WriteDisposition,
};
use crate::error::{BigQueryError, BqdmError, Result};
use crate::model::{Dataset, DatasetField, Table, TableField};
use crate::schema::Schema;

/// One recorded call against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    ListDatasets,
    GetDataset(String),
    CreateDataset(String),
    UpdateDataset(String, Vec<DatasetField>),
    DeleteDataset(String),
    ListTables(String),
    GetTable(TableRef),
    CreateTable(TableRef),
    UpdateTable(TableRef, Vec<TableField>),
    DeleteTable(TableRef),
    SubmitQuery { sql: String, destination: TableRef },
    CopyTable { source: TableRef, destination: TableRef },
    AwaitJob(String),
}

impl StoreCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            StoreCall::ListDatasets
                | StoreCall::GetDataset(_)
                | StoreCall::ListTables(_)
                | StoreCall::GetTable(_)
                | StoreCall::AwaitJob(_)
        )
    }
}

#[derive(Default)]
struct MemoryState {
    datasets: BTreeMap<String, Dataset>,
    tables: BTreeMap<TableRef, Table>,
    jobs: HashMap<String, JobResult>,
    calls: Vec<StoreCall>,
    failing_jobs: Vec<String>,
}

/// In-process store holding datasets and tables in maps.
///
/// Every call is appended to a call log. Query jobs do not evaluate SQL and
/// rows are not modelled, but destination schemas follow the warehouse: a
/// truncating write leaves the query-result layout, an append keeps the
/// existing table, and a missing destination is created.
pub struct MemoryStore {
    project_id: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub async fn insert_dataset(&self, dataset: Dataset) {
        let mut state = self.state.lock().await;
        state.datasets.insert(dataset.dataset_id.clone(), dataset);
    }

    pub async fn insert_table(&self, dataset_id: &str, table: Table) {
        let mut state = self.state.lock().await;
        state.tables.insert(TableRef::new(dataset_id, &table.table_id), table);
    }

    /// Jobs whose SQL or destination contains `pattern` finish with an error result.
    pub async fn fail_jobs_matching(&self, pattern: impl Into<String>) {
        self.state.lock().await.failing_jobs.push(pattern.into());
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn dataset(&self, dataset_id: &str) -> Option<Dataset> {
        self.state.lock().await.datasets.get(dataset_id).cloned()
    }

    pub async fn table(&self, dataset_id: &str, table_id: &str) -> Option<Table> {
        self.state
            .lock()
            .await
            .tables
            .get(&TableRef::new(dataset_id, table_id))
            .cloned()
    }

    fn dataset_not_found(&self, dataset_id: &str) -> BqdmError {
        BqdmError::BigQuery(BigQueryError::DatasetNotFound {
            project: self.project_id.clone(),
            dataset: dataset_id.to_string(),
        })
    }

    fn table_not_found(&self, table: &TableRef) -> BqdmError {
        BqdmError::BigQuery(BigQueryError::TableNotFound {
            project: self.project_id.clone(),
            dataset: table.dataset_id.clone(),
            table: table.table_id.clone(),
        })
    }

    fn finish_job(state: &mut MemoryState, subject: &str) -> JobHandle {
        let job_id = format!("job_{}", Uuid::new_v4().simple());
        let errors = state
            .failing_jobs
            .iter()
            .filter(|p| subject.contains(p.as_str()))
            .map(|p| format!("injected failure matching '{}'", p))
            .collect();
        state.jobs.insert(
            job_id.clone(),
            JobResult {
                job_id: job_id.clone(),
                state: JobState::Done,
                errors,
            },
        );
        JobHandle { job_id, location: None }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::ListDatasets);
        Ok(state.datasets.keys().cloned().collect())
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::GetDataset(dataset_id.to_string()));
        Ok(state.datasets.get(dataset_id).cloned())
    }

    async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::CreateDataset(dataset.dataset_id.clone()));
        if state.datasets.contains_key(&dataset.dataset_id) {
            return Err(BqdmError::BigQuery(BigQueryError::AlreadyExists {
                resource: format!("{}.{}", self.project_id, dataset.dataset_id),
            }));
        }
        // Creation does not carry access entries; they arrive with a follow-up update.
        let mut created = dataset.clone();
        created.access_entries.clear();
        state.datasets.insert(dataset.dataset_id.clone(), created);
        Ok(())
    }

    async fn update_dataset(&self, update: &DatasetUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = update.dataset.dataset_id.clone();
        state.calls.push(StoreCall::UpdateDataset(id.clone(), update.fields.clone()));
        let current = state
            .datasets
            .get(&id)
            .ok_or_else(|| self.dataset_not_found(&id))?;
        let next = apply_dataset_update(current, update);
        state.datasets.insert(id, next);
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::DeleteDataset(dataset_id.to_string()));
        if state.tables.keys().any(|t| t.dataset_id == dataset_id) {
            return Err(BqdmError::Client(format!("Dataset {} is still in use", dataset_id)));
        }
        state
            .datasets
            .remove(dataset_id)
            .map(|_| ())
            .ok_or_else(|| self.dataset_not_found(dataset_id))
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::ListTables(dataset_id.to_string()));
        if !state.datasets.contains_key(dataset_id) {
            return Err(self.dataset_not_found(dataset_id));
        }
        Ok(state
            .tables
            .keys()
            .filter(|t| t.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn get_table(&self, table: &TableRef) -> Result<Option<Table>> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::GetTable(table.clone()));
        Ok(state.tables.get(table).cloned())
    }

    async fn create_table(&self, dataset_id: &str, table: &Table) -> Result<()> {
        let mut state = self.state.lock().await;
        let table_ref = TableRef::new(dataset_id, &table.table_id);
        state.calls.push(StoreCall::CreateTable(table_ref.clone()));
        if !state.datasets.contains_key(dataset_id) {
            return Err(self.dataset_not_found(dataset_id));
        }
        if state.tables.contains_key(&table_ref) {
            return Err(BqdmError::BigQuery(BigQueryError::AlreadyExists {
                resource: format!("{}.{}", self.project_id, table_ref),
            }));
        }
        state.tables.insert(table_ref, table.clone());
        Ok(())
    }

    async fn update_table(&self, update: &TableUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let table_ref = update.table_ref();
        state.calls.push(StoreCall::UpdateTable(table_ref.clone(), update.fields.clone()));
        let current = state
            .tables
            .get(&table_ref)
            .ok_or_else(|| self.table_not_found(&table_ref))?;
        let next = apply_table_update(current, update);
        state.tables.insert(table_ref, next);
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::DeleteTable(table.clone()));
        state
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| self.table_not_found(table))
    }

    async fn submit_query(&self, job: &QueryJob) -> Result<JobHandle> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::SubmitQuery {
            sql: job.sql.clone(),
            destination: job.destination.clone(),
        });
        if !state.datasets.contains_key(&job.destination.dataset_id) {
            return Err(self.dataset_not_found(&job.destination.dataset_id));
        }
        let handle = Self::finish_job(&mut state, &format!("{} {}", job.sql, job.destination));
        let shaped = job.result_schema.as_query_result();
        match (job.write_disposition, state.tables.get_mut(&job.destination)) {
            (WriteDisposition::WriteTruncate, Some(table)) => table.schema = shaped,
            (WriteDisposition::WriteAppend, Some(_)) => {}
            (_, None) => {
                state.tables.insert(
                    job.destination.clone(),
                    Table::new(&job.destination.table_id).with_schema(shaped),
                );
            }
        }
        debug!(job_id = %handle.job_id, destination = %job.destination, "Query job recorded");
        Ok(handle)
    }

    async fn copy_table(&self, source: &TableRef, destination: &TableRef) -> Result<JobHandle> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::CopyTable {
            source: source.clone(),
            destination: destination.clone(),
        });
        let copied = state
            .tables
            .get(source)
            .cloned()
            .ok_or_else(|| self.table_not_found(source))?;
        if !state.datasets.contains_key(&destination.dataset_id) {
            return Err(self.dataset_not_found(&destination.dataset_id));
        }
        let handle = Self::finish_job(&mut state, &format!("copy {} {}", source, destination));
        let mut copied = copied;
        copied.table_id = destination.table_id.clone();
        state.tables.insert(destination.clone(), copied);
        Ok(handle)
    }

    async fn await_job(&self, job: &JobHandle) -> Result<JobResult> {
        let mut state = self.state.lock().await;
        state.calls.push(StoreCall::AwaitJob(job.job_id.clone()));
        state
            .jobs
            .get(&job.job_id)
            .cloned()
            .ok_or_else(|| BqdmError::NotFound(format!("job {}", job.job_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LabelPatch, Labels};
    use crate::schema::{FieldType, SchemaField};

    #[tokio::test]
    async fn test_describe_missing_is_none() {
        let store = MemoryStore::new("p");
        assert!(store.get_dataset("nope").await.unwrap().is_none());
        assert!(store.get_table(&TableRef::new("ds", "t")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryStore::new("p");
        store.create_dataset(&Dataset::new("ds")).await.unwrap();
        let err = store.create_dataset(&Dataset::new("ds")).await.unwrap_err();
        assert!(matches!(err, BqdmError::BigQuery(BigQueryError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_update_label_patch_removes_keys() {
        let store = MemoryStore::new("p");
        let mut ds = Dataset::new("ds");
        ds.labels = Some(Labels::from([
            ("env".to_string(), "dev".to_string()),
            ("team".to_string(), "data".to_string()),
        ]));
        store.insert_dataset(ds.clone()).await;

        let update = DatasetUpdate {
            dataset: ds,
            fields: vec![DatasetField::Labels],
            labels: LabelPatch::from([
                ("env".to_string(), Some("prod".to_string())),
                ("team".to_string(), None),
            ]),
        };
        store.update_dataset(&update).await.unwrap();
        let stored = store.dataset("ds").await.unwrap();
        assert_eq!(stored.labels, Some(Labels::from([("env".to_string(), "prod".to_string())])));
    }

    #[tokio::test]
    async fn test_injected_job_failure() {
        let store = MemoryStore::new("p");
        store.insert_dataset(Dataset::new("ds")).await;
        store.fail_jobs_matching("events").await;
        let job = QueryJob {
            sql: "SELECT 1".into(),
            destination: TableRef::new("ds", "events"),
            write_disposition: WriteDisposition::WriteTruncate,
            result_schema: Schema::new(),
        };
        let handle = store.submit_query(&job).await.unwrap();
        let result = store.await_job(&handle).await.unwrap();
        assert!(result.is_done());
        assert!(result.into_result().is_err());
    }

    #[tokio::test]
    async fn test_truncating_query_replaces_destination_schema() {
        let store = MemoryStore::new("p");
        store.insert_dataset(Dataset::new("ds")).await;
        let declared = Schema::from_fields(vec![
            SchemaField::new("id", FieldType::Int64).required().with_description("key"),
        ]);
        store.insert_table("ds", Table::new("kept").with_schema(declared.clone())).await;
        store.insert_table("ds", Table::new("rewritten").with_schema(declared.clone())).await;

        for (table, write_disposition) in [
            ("kept", WriteDisposition::WriteAppend),
            ("rewritten", WriteDisposition::WriteTruncate),
        ] {
            let job = QueryJob {
                sql: "SELECT cast(id AS INT64) AS id FROM `ds.src`".into(),
                destination: TableRef::new("ds", table),
                write_disposition,
                result_schema: declared.clone(),
            };
            store.submit_query(&job).await.unwrap();
        }

        assert_eq!(store.table("ds", "kept").await.unwrap().schema, declared);
        assert_eq!(
            store.table("ds", "rewritten").await.unwrap().schema,
            Schema::from_fields(vec![SchemaField::new("id", FieldType::Int64)])
        );
    }

    #[tokio::test]
    async fn test_call_log_records_order() {
        let store = MemoryStore::new("p");
        store.create_dataset(&Dataset::new("ds")).await.unwrap();
        store.create_table("ds", &Table::new("t")).await.unwrap();
        store.delete_table(&TableRef::new("ds", "t")).await.unwrap();
        assert_eq!(
            store.calls().await,
            vec![
                StoreCall::CreateDataset("ds".into()),
                StoreCall::CreateTable(TableRef::new("ds", "t")),
                StoreCall::DeleteTable(TableRef::new("ds", "t")),
            ]
        );
    }
}
