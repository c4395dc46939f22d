use tracing::{debug, info, info_span};

use super::{find, render_diff, render_dump, Context, Pending, WorkerPool};
use crate::diff::{self, DiffResult};
use crate::error::Result;
use crate::migration::{MigrationPlan, Migrator, Naming};
use crate::model::{label_patch, Table, TableField};
use crate::output::Tone;
use crate::store::{TableRef, TableUpdate};

/// Table-level plan and apply operations within one dataset.
pub struct TableReconciler {
    ctx: Context,
    dataset_id: String,
}

impl TableReconciler {
    pub fn new(ctx: Context, dataset_id: impl Into<String>) -> Self {
        Self {
            ctx,
            dataset_id: dataset_id.into(),
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    fn path(&self, table: &Table) -> String {
        format!("{}.{}", self.dataset_id, table.table_id)
    }

    /// Describe every remote table of the dataset. A missing dataset has none.
    pub async fn list(&self) -> Result<Vec<Table>> {
        let refs = match self.ctx.store.list_tables(&self.dataset_id).await {
            Ok(refs) => refs,
            Err(e) if e.is_not_found() => {
                debug!(dataset = %self.dataset_id, "Dataset does not exist remotely");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let pending: Vec<Pending<Option<Table>>> = refs
            .into_iter()
            .map(|table_ref: TableRef| {
                let store = self.ctx.store.clone();
                let span = info_span!(
                    "describe_table",
                    dataset = %table_ref.dataset_id,
                    table = %table_ref.table_id
                );
                self.ctx.pool.spawn(table_ref.to_string(), span, async move {
                    store.get_table(&table_ref).await
                })
            })
            .collect();

        let found = WorkerPool::join_all(pending).await.into_result()?;
        Ok(found.into_iter().flatten().collect())
    }

    pub fn plan_add(&self, source: &[Table], target: &[Table]) -> Result<usize> {
        let result = diff::add(source, target);
        for table in &result.items {
            self.ctx.console.section(
                Tone::Add,
                &format!("  + {}", self.path(table)),
                &render_dump(Tone::Add, table)?,
            );
        }
        Ok(result.count)
    }

    pub fn plan_change(&self, source: &[Table], target: &[Table]) -> Result<usize> {
        let result = diff::change(source, target);
        for desired in &result.items {
            let Some(actual) = find(source, &desired.table_id) else {
                continue;
            };
            self.ctx.console.section(
                Tone::Change,
                &format!("  ~ {}", self.path(desired)),
                &render_diff(actual, desired)?,
            );
        }
        Ok(result.count)
    }

    pub fn plan_destroy(&self, source: &[Table], target: &[Table]) -> usize {
        self.print_destroy(diff::destroy(source, target))
    }

    pub fn plan_intersection_destroy(&self, source: &[Table], target: &[Table]) -> usize {
        self.print_destroy(diff::intersection(source, target))
    }

    fn print_destroy(&self, result: DiffResult<Table>) -> usize {
        for table in &result.items {
            self.ctx.console.section(Tone::Destroy, &format!("  - {}", self.path(table)), "");
        }
        result.count
    }

    pub fn add(&self, source: &[Table], target: &[Table]) -> Result<(usize, Vec<Pending>)> {
        let result = diff::add(source, target);
        let mut pending = Vec::with_capacity(result.count);

        for table in result.items {
            let store = self.ctx.store.clone();
            let console = self.ctx.console.clone();
            let dataset_id = self.dataset_id.clone();
            let path = self.path(&table);
            let dump = render_dump(Tone::Add, &table)?;
            let span = info_span!("add_table", dataset = %dataset_id, table = %table.table_id);

            pending.push(self.ctx.pool.spawn(path.clone(), span, async move {
                console.section(Tone::Add, &format!("  Adding... {}", path), &dump);
                store.create_table(&dataset_id, &table).await?;
                info!("Table created");
                Ok(())
            }));
        }

        Ok((result.count, pending))
    }

    /// Migrate rows when the layout changed, then update mutable attributes.
    ///
    /// The migration plan is built before any remote call, so a schema that
    /// cannot be projected fails without side effects.
    pub fn change(&self, source: &[Table], target: &[Table]) -> Result<(usize, Vec<Pending>)> {
        let result = diff::change(source, target);
        let mut pending = Vec::with_capacity(result.count);
        let options = &self.ctx.options;

        for desired in result.items {
            let Some(actual) = find(source, &desired.table_id).cloned() else {
                continue;
            };
            let store = self.ctx.store.clone();
            let console = self.ctx.console.clone();
            let migrator = Migrator::new(
                self.ctx.store.clone(),
                self.ctx.console.clone(),
                options.job_timeout,
                options.cancel.clone(),
            );
            let mode = options.mode;
            let backup_dataset = options.backup_dataset.clone();
            let dataset_id = self.dataset_id.clone();
            let path = self.path(&desired);
            let diff = render_diff(&actual, &desired)?;
            let span = info_span!("change_table", dataset = %dataset_id, table = %desired.table_id);

            pending.push(self.ctx.pool.spawn(path.clone(), span, async move {
                let plan = if desired.requires_migration(&actual) {
                    Some(MigrationPlan::build(
                        mode,
                        &dataset_id,
                        backup_dataset.as_deref(),
                        &actual,
                        &desired,
                        &Naming::generate(&desired.table_id),
                    )?)
                } else {
                    None
                };

                console.section(Tone::Change, &format!("  Changing... {}", path), &diff);
                if let Some(plan) = &plan {
                    migrator.run(plan).await?;
                }

                let mut fields = desired.update_fields(&actual);
                if plan.as_ref().is_some_and(MigrationPlan::truncates_target)
                    && !fields.contains(&TableField::Schema)
                {
                    fields.push(TableField::Schema);
                }
                let update = TableUpdate {
                    fields,
                    labels: label_patch(actual.labels.as_ref(), desired.labels.as_ref()),
                    dataset_id,
                    table: desired,
                };
                store.update_table(&update).await?;
                info!(migrated = plan.is_some(), "Table updated");
                Ok(())
            }));
        }

        Ok((result.count, pending))
    }

    pub fn destroy(&self, source: &[Table], target: &[Table]) -> (usize, Vec<Pending>) {
        self.delete_all(diff::destroy(source, target))
    }

    /// Delete remote tables that are still declared.
    pub fn intersection_destroy(&self, source: &[Table], target: &[Table]) -> (usize, Vec<Pending>) {
        self.delete_all(diff::intersection(source, target))
    }

    fn delete_all(&self, result: DiffResult<Table>) -> (usize, Vec<Pending>) {
        let pending = result
            .items
            .into_iter()
            .map(|table| {
                let store = self.ctx.store.clone();
                let console = self.ctx.console.clone();
                let table_ref = TableRef::new(&self.dataset_id, &table.table_id);
                let span = info_span!("destroy_table", dataset = %self.dataset_id, table = %table.table_id);

                self.ctx.pool.spawn(table_ref.to_string(), span, async move {
                    console.section(Tone::Destroy, &format!("  Destroying... {}", table_ref), "");
                    store.delete_table(&table_ref).await?;
                    info!("Table deleted");
                    Ok(())
                })
            })
            .collect();
        (result.count, pending)
    }
}
