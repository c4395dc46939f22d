use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::plan::{MigrationPlan, MigrationStep};
use crate::diff::{indent, to_yaml};
use crate::error::{BqdmError, Result};
use crate::output::{Console, Tone};
use crate::store::{JobHandle, QueryJob, ResourceStore, TableRef};

/// Runs a [`MigrationPlan`] step by step against a store.
pub struct Migrator {
    store: Arc<dyn ResourceStore>,
    console: Arc<Console>,
    job_timeout: Duration,
    cancel: CancellationToken,
}

impl Migrator {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        console: Arc<Console>,
        job_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self { store, console, job_timeout, cancel }
    }

    /// Execute every step in order, stopping at the first failure.
    ///
    /// Cancellation is honoured between steps, except that a deleted target
    /// is always recreated first.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<()> {
        info!(table = %plan.target, mode = %plan.mode, steps = plan.steps.len(), "Migrating table");
        let mut target_missing = false;

        for step in &plan.steps {
            let recreates_target = matches!(
                step,
                MigrationStep::CreateTable { dataset_id, table }
                    if *dataset_id == plan.target.dataset_id && table.table_id == plan.target.table_id
            );
            if self.cancel.is_cancelled() && !(target_missing && recreates_target) {
                self.report_leftovers(plan, step);
                return Err(BqdmError::Cancelled(format!("migration of {}", plan.target)));
            }

            self.run_step(plan, step).await?;

            match step {
                MigrationStep::DeleteTable { table } if *table == plan.target => target_missing = true,
                _ if recreates_target => target_missing = false,
                _ => {}
            }
        }

        debug!(table = %plan.target, "Migration finished");
        Ok(())
    }

    async fn run_step(&self, plan: &MigrationPlan, step: &MigrationStep) -> Result<()> {
        match step {
            MigrationStep::Backup { source, destination } => {
                let handle = self.store.copy_table(source, destination).await?;
                self.console.line(Tone::Change, format!("    Backing up... {}", handle.job_id));
                self.wait(&handle).await
            }
            MigrationStep::CreateTable { dataset_id, table } => {
                let created = TableRef::new(dataset_id.as_str(), &table.table_id);
                let path = created.to_string();
                if created != plan.target {
                    self.console.line(Tone::Change, format!("    Temporary table creating... {}", path));
                } else {
                    let dump = Tone::Add.paint_lines(&indent(&to_yaml(table)?, "    "));
                    self.console.section(Tone::Add, &format!("  Adding... {}", path), &dump);
                }
                self.store.create_table(dataset_id, table).await
            }
            MigrationStep::SelectInsert { destination, write_disposition, result_schema, .. } => {
                let sql = step.sql().unwrap_or_default();
                let job = QueryJob {
                    sql: sql.clone(),
                    destination: destination.clone(),
                    write_disposition: *write_disposition,
                    result_schema: result_schema.clone(),
                };
                let handle = self.store.submit_query(&job).await?;
                self.console.line(Tone::Change, format!("    Inserting... {}", handle.job_id));
                self.console.line(Tone::Change, format!("      {}", sql));
                self.wait(&handle).await
            }
            MigrationStep::DeleteTable { table } => {
                self.console.line(Tone::Destroy, format!("  Destroying... {}", table));
                self.store.delete_table(table).await
            }
        }
    }

    async fn wait(&self, handle: &JobHandle) -> Result<()> {
        let result = tokio::select! {
            awaited = tokio::time::timeout(self.job_timeout, self.store.await_job(handle)) => {
                awaited.map_err(|_| BqdmError::JobTimeout {
                    job_id: handle.job_id.clone(),
                    timeout: self.job_timeout,
                })??
            }
            _ = self.cancel.cancelled() => {
                return Err(BqdmError::Cancelled(format!("waiting for job {}", handle.job_id)));
            }
        };
        result.into_result()
    }

    fn report_leftovers(&self, plan: &MigrationPlan, next: &MigrationStep) {
        let remaining = plan.steps.iter().skip_while(|s| *s != next);
        for step in remaining {
            if let MigrationStep::DeleteTable { table } = step {
                if *table != plan.target {
                    warn!(table = %table, "Temporary table left behind by cancelled migration");
                }
            }
        }
    }
}
