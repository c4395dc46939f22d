use std::time::Duration;
use async_trait::async_trait;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset as BqDataset;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::table::Table as BqTable;
use gcp_bigquery_client::Client;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::rest;
use super::{DatasetUpdate, JobHandle, JobResult, QueryJob, ResourceStore, TableRef, TableUpdate};
use crate::error::{parse_bq_error, BqdmError, ErrorContext, Result};
use crate::model::{Dataset, Table};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// [`ResourceStore`] backed by the BigQuery REST API.
#[derive(Clone)]
pub struct BigQueryStore {
    client: Client,
    project_id: String,
}

fn bq_error(e: BQError, ctx: ErrorContext) -> BqdmError {
    BqdmError::BigQuery(parse_bq_error(e, ctx))
}

impl BigQueryStore {
    /// Authenticate with a service account key file, or application default
    /// credentials when no file is given.
    pub async fn new(project_id: impl Into<String>, credential_file: Option<&str>) -> Result<Self> {
        let ctx = ErrorContext::new()
            .with_operation("client_init")
            .with_credential_file(credential_file);
        let client = match credential_file {
            Some(path) => Client::from_service_account_key_file(path).await,
            None => Client::from_application_default_credentials().await,
        }
        .map_err(|e| bq_error(e, ctx))?;

        Ok(Self {
            client,
            project_id: project_id.into(),
        })
    }

    fn to_bq<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }

    async fn insert_job(&self, job: Value, ctx: ErrorContext) -> Result<JobHandle> {
        let job: Job = Self::to_bq(job)?;
        let inserted = self
            .client
            .job()
            .insert(&self.project_id, job)
            .await
            .map_err(|e| bq_error(e, ctx))?;
        let inserted = serde_json::to_value(&inserted)?;
        let reference = inserted.get("jobReference");
        let job_id = reference
            .and_then(|r| r.get("jobId"))
            .and_then(Value::as_str)
            .ok_or_else(|| BqdmError::Client("inserted job without jobId".into()))?;
        Ok(JobHandle {
            job_id: job_id.to_string(),
            location: reference
                .and_then(|r| r.get("location"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn fetch_dataset_json(&self, dataset_id: &str) -> Result<Value> {
        let dataset = self
            .client
            .dataset()
            .get(&self.project_id, dataset_id)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("get_dataset")
                    .with_dataset(&self.project_id, dataset_id);
                bq_error(e, ctx)
            })?;
        Ok(serde_json::to_value(&dataset)?)
    }

    async fn fetch_table_json(&self, table: &TableRef) -> Result<Value> {
        let fetched = self
            .client
            .table()
            .get(&self.project_id, &table.dataset_id, &table.table_id, None)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("get_table")
                    .with_table(&self.project_id, &table.dataset_id, &table.table_id);
                bq_error(e, ctx)
            })?;
        Ok(serde_json::to_value(&fetched)?)
    }
}

fn none_if_missing<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ResourceStore for BigQueryStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn list_datasets(&self) -> Result<Vec<String>> {
        let list = self
            .client
            .dataset()
            .list(&self.project_id, Default::default())
            .await
            .map_err(|e| bq_error(e, ErrorContext::new().with_operation("list_datasets")))?;
        Ok(rest::dataset_ids_from_list(&serde_json::to_value(&list)?))
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>> {
        match none_if_missing(self.fetch_dataset_json(dataset_id).await)? {
            Some(json) => Ok(Some(rest::dataset_from_json(&json)?)),
            None => Ok(None),
        }
    }

    async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut payload = rest::dataset_to_json(&self.project_id, dataset);
        if let Value::Object(obj) = &mut payload {
            obj.remove("access");
        }
        let bq: BqDataset = Self::to_bq(payload)?;
        self.client.dataset().create(bq).await.map_err(|e| {
            let ctx = ErrorContext::new()
                .with_operation("create_dataset")
                .with_dataset(&self.project_id, &dataset.dataset_id);
            bq_error(e, ctx)
        })?;
        Ok(())
    }

    async fn update_dataset(&self, update: &DatasetUpdate) -> Result<()> {
        let dataset_id = &update.dataset.dataset_id;
        let current = self.fetch_dataset_json(dataset_id).await?;
        let bq: BqDataset = Self::to_bq(rest::overlay_dataset(&self.project_id, current, update))?;
        self.client
            .dataset()
            .update(&self.project_id, dataset_id, bq)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("update_dataset")
                    .with_dataset(&self.project_id, dataset_id);
                bq_error(e, ctx)
            })?;
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> Result<()> {
        self.client
            .dataset()
            .delete(&self.project_id, dataset_id, false)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("delete_dataset")
                    .with_dataset(&self.project_id, dataset_id);
                bq_error(e, ctx)
            })
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<TableRef>> {
        let tables = self
            .client
            .table()
            .list(&self.project_id, dataset_id, Default::default())
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("list_tables")
                    .with_dataset(&self.project_id, dataset_id);
                bq_error(e, ctx)
            })?;

        Ok(tables
            .tables
            .unwrap_or_default()
            .into_iter()
            .map(|t| TableRef::new(dataset_id, t.table_reference.table_id))
            .collect())
    }

    async fn get_table(&self, table: &TableRef) -> Result<Option<Table>> {
        match none_if_missing(self.fetch_table_json(table).await)? {
            Some(json) => Ok(Some(rest::table_from_json(&json)?)),
            None => Ok(None),
        }
    }

    async fn create_table(&self, dataset_id: &str, table: &Table) -> Result<()> {
        let bq: BqTable = Self::to_bq(rest::table_to_json(&self.project_id, dataset_id, table))?;
        self.client.table().create(bq).await.map_err(|e| {
            let ctx = ErrorContext::new()
                .with_operation("create_table")
                .with_table(&self.project_id, dataset_id, &table.table_id);
            bq_error(e, ctx)
        })?;
        Ok(())
    }

    async fn update_table(&self, update: &TableUpdate) -> Result<()> {
        let table_ref = update.table_ref();
        let current = self.fetch_table_json(&table_ref).await?;
        let bq: BqTable = Self::to_bq(rest::overlay_table(&self.project_id, current, update))?;
        self.client
            .table()
            .update(&self.project_id, &table_ref.dataset_id, &table_ref.table_id, bq)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("update_table")
                    .with_table(&self.project_id, &table_ref.dataset_id, &table_ref.table_id);
                bq_error(e, ctx)
            })?;
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        self.client
            .table()
            .delete(&self.project_id, &table.dataset_id, &table.table_id)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("delete_table")
                    .with_table(&self.project_id, &table.dataset_id, &table.table_id);
                bq_error(e, ctx)
            })
    }

    async fn submit_query(&self, job: &QueryJob) -> Result<JobHandle> {
        let job_id = format!("bqdm_{}", Uuid::new_v4().simple());
        debug!(
            job_id = %job_id,
            destination = %job.destination,
            disposition = job.write_disposition.as_str(),
            columns = job.result_schema.fields.len(),
            sql = %job.sql,
            "Submitting query job"
        );
        let ctx = ErrorContext::new()
            .with_operation("submit_query")
            .with_sql(&job.sql);
        self.insert_job(rest::query_job_json(&self.project_id, &job_id, job), ctx)
            .await
    }

    async fn copy_table(&self, source: &TableRef, destination: &TableRef) -> Result<JobHandle> {
        let job_id = format!("bqdm_{}", Uuid::new_v4().simple());
        debug!(job_id = %job_id, source = %source, destination = %destination, "Submitting copy job");
        let ctx = ErrorContext::new()
            .with_operation("copy_table")
            .with_table(&self.project_id, &source.dataset_id, &source.table_id);
        self.insert_job(
            rest::copy_job_json(&self.project_id, &job_id, source, destination),
            ctx,
        )
        .await
    }

    async fn await_job(&self, job: &JobHandle) -> Result<JobResult> {
        let mut interval = MIN_POLL_INTERVAL;
        loop {
            let fetched = self
                .client
                .job()
                .get_job(&self.project_id, &job.job_id, job.location.as_deref())
                .await
                .map_err(|e| bq_error(e, ErrorContext::new().with_operation("get_job")))?;
            let result = rest::job_result_from_json(&job.job_id, &serde_json::to_value(&fetched)?);
            if result.is_done() {
                return Ok(result);
            }
            debug!(job_id = %job.job_id, state = ?result.state, "Waiting for job");
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }
}
