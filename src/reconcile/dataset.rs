use tracing::{debug, info, info_span};

use super::{find, render_diff, render_dump, Context, Pending, WorkerPool};
use crate::diff::{self, DiffResult};
use crate::error::Result;
use crate::model::{label_patch, Dataset, DatasetField, LabelPatch};
use crate::output::Tone;
use crate::store::DatasetUpdate;

/// Dataset-level plan and apply operations.
///
/// `source` is the remote state and `target` the resolved desired state.
/// Each `plan_*` prints what would happen and returns a count; each apply
/// operation returns the count and the spawned tasks to await.
pub struct DatasetReconciler {
    ctx: Context,
}

impl DatasetReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Describe every remote dataset that passes the configured filter.
    pub async fn list(&self) -> Result<Vec<Dataset>> {
        let ids = self.ctx.options.filter.apply(self.ctx.store.list_datasets().await?);
        debug!(count = ids.len(), "Describing remote datasets");

        let pending: Vec<Pending<Option<Dataset>>> = ids
            .into_iter()
            .map(|id| {
                let store = self.ctx.store.clone();
                let span = info_span!("describe_dataset", dataset = %id);
                self.ctx.pool.spawn(id.clone(), span, async move { store.get_dataset(&id).await })
            })
            .collect();

        let found = WorkerPool::join_all(pending).await.into_result()?;
        Ok(found.into_iter().flatten().collect())
    }

    pub fn plan_add(&self, source: &[Dataset], target: &[Dataset]) -> Result<usize> {
        let result = diff::add(source, target);
        for dataset in &result.items {
            self.ctx.console.section(
                Tone::Add,
                &format!("  + {}", dataset.dataset_id),
                &render_dump(Tone::Add, dataset)?,
            );
        }
        Ok(result.count)
    }

    pub fn plan_change(&self, source: &[Dataset], target: &[Dataset]) -> Result<usize> {
        let result = diff::change(source, target);
        for desired in &result.items {
            let Some(actual) = find(source, &desired.dataset_id) else {
                continue;
            };
            self.ctx.console.section(
                Tone::Change,
                &format!("  ~ {}", desired.dataset_id),
                &render_diff(actual, desired)?,
            );
        }
        Ok(result.count)
    }

    pub fn plan_destroy(&self, source: &[Dataset], target: &[Dataset]) -> usize {
        self.print_destroy(diff::destroy(source, target))
    }

    pub fn plan_intersection_destroy(&self, source: &[Dataset], target: &[Dataset]) -> usize {
        self.print_destroy(diff::intersection(source, target))
    }

    fn print_destroy(&self, result: DiffResult<Dataset>) -> usize {
        for dataset in &result.items {
            self.ctx.console.section(Tone::Destroy, &format!("  - {}", dataset.dataset_id), "");
        }
        result.count
    }

    /// Create missing datasets, then push their access entries.
    ///
    /// The create call does not carry access entries, so a follow-up update
    /// writes them.
    pub fn add(&self, source: &[Dataset], target: &[Dataset]) -> Result<(usize, Vec<Pending>)> {
        let result = diff::add(source, target);
        let mut pending = Vec::with_capacity(result.count);

        for dataset in result.items {
            let store = self.ctx.store.clone();
            let console = self.ctx.console.clone();
            let dump = render_dump(Tone::Add, &dataset)?;
            let span = info_span!("add_dataset", dataset = %dataset.dataset_id);

            pending.push(self.ctx.pool.spawn(dataset.dataset_id.clone(), span, async move {
                console.section(Tone::Add, &format!("  Adding... {}", dataset.dataset_id), &dump);
                store.create_dataset(&dataset).await?;
                if !dataset.access_entries.is_empty() {
                    let update = DatasetUpdate {
                        fields: vec![DatasetField::AccessEntries],
                        labels: LabelPatch::new(),
                        dataset,
                    };
                    store.update_dataset(&update).await?;
                }
                info!("Dataset created");
                Ok(())
            }));
        }

        Ok((result.count, pending))
    }

    /// Update changed datasets, clearing labels that exist only remotely.
    pub fn change(&self, source: &[Dataset], target: &[Dataset]) -> Result<(usize, Vec<Pending>)> {
        let result = diff::change(source, target);
        let mut pending = Vec::with_capacity(result.count);

        for desired in result.items {
            let Some(actual) = find(source, &desired.dataset_id).cloned() else {
                continue;
            };
            let store = self.ctx.store.clone();
            let console = self.ctx.console.clone();
            let diff = render_diff(&actual, &desired)?;
            let span = info_span!("change_dataset", dataset = %desired.dataset_id);

            pending.push(self.ctx.pool.spawn(desired.dataset_id.clone(), span, async move {
                console.section(Tone::Change, &format!("  Changing... {}", desired.dataset_id), &diff);
                let update = DatasetUpdate {
                    labels: label_patch(actual.labels.as_ref(), desired.labels.as_ref()),
                    fields: DatasetField::ALL.to_vec(),
                    dataset: desired,
                };
                store.update_dataset(&update).await?;
                info!("Dataset updated");
                Ok(())
            }));
        }

        Ok((result.count, pending))
    }

    pub fn destroy(&self, source: &[Dataset], target: &[Dataset]) -> (usize, Vec<Pending>) {
        self.delete_all(diff::destroy(source, target))
    }

    /// Delete remote datasets that are still declared.
    pub fn intersection_destroy(&self, source: &[Dataset], target: &[Dataset]) -> (usize, Vec<Pending>) {
        self.delete_all(diff::intersection(source, target))
    }

    fn delete_all(&self, result: DiffResult<Dataset>) -> (usize, Vec<Pending>) {
        let pending = result
            .items
            .into_iter()
            .map(|dataset| {
                let store = self.ctx.store.clone();
                let console = self.ctx.console.clone();
                let id = dataset.dataset_id;
                let span = info_span!("destroy_dataset", dataset = %id);

                self.ctx.pool.spawn(id.clone(), span, async move {
                    console.section(Tone::Destroy, &format!("  Destroying... {}", id), "");
                    store.delete_dataset(&id).await?;
                    info!("Dataset deleted");
                    Ok(())
                })
            })
            .collect();
        (result.count, pending)
    }
}
