use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{resolve_all, Context, DatasetReconciler, Pending, ReconcileOptions, TableReconciler, WorkerPool};
use crate::error::{BqdmError, Result};
use crate::local::{write_dataset, write_tables, ConfigLoader};
use crate::model::{Dataset, Table};
use crate::output::{Console, Tone};
use crate::store::ResourceStore;

pub const PLAN_HEADER: &str = "\
An execution plan has been generated and is shown below.

Resource actions are indicated with the following symbols:
  + create
  ~ update
  - destroy

bqdm will perform the following actions:
";

const NO_CHANGES: &str = "No changes. Dataset is up-to-date.";

/// Resources added, changed and destroyed by one command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub add: usize,
    pub change: usize,
    pub destroy: usize,
}

impl Counts {
    pub fn is_empty(&self) -> bool {
        self.add == 0 && self.change == 0 && self.destroy == 0
    }
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        self.add += other.add;
        self.change += other.change;
        self.destroy += other.destroy;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub datasets: Counts,
    pub tables: Counts,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty() && self.tables.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Plan,
    Apply,
    PlanDestroy,
    Destroy,
}

struct SummaryLine<'a>(Verb, &'a Counts);

impl fmt::Display for SummaryLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let SummaryLine(verb, c) = self;
        match verb {
            Verb::Plan => write!(f, "Plan: {} to add, {} to change, {} to destroy", c.add, c.change, c.destroy),
            Verb::Apply => write!(f, "Apply: {} added, {} changed, {} destroyed", c.add, c.change, c.destroy),
            Verb::PlanDestroy => write!(f, "Plan: {} to destroy", c.destroy),
            Verb::Destroy => write!(f, "Destroy: {} destroyed", c.destroy),
        }
    }
}

/// Declared state read from disk for one command.
struct Declared {
    datasets: Vec<Dataset>,
    /// `None` marks a dataset whose tables are unmanaged.
    tables: Vec<(String, Option<Vec<Table>>)>,
}

impl Declared {
    fn load(conf_dir: &Path, options: &ReconcileOptions) -> Result<Self> {
        let loader = ConfigLoader::new(conf_dir, options.filter.clone())?;
        let datasets = loader.load_datasets()?;
        let tables = datasets
            .iter()
            .map(|ds| Ok((ds.dataset_id.clone(), loader.load_tables(&ds.dataset_id)?)))
            .collect::<Result<Vec<_>>>()?;
        for ds in &datasets {
            info!(dataset = %ds.dataset_id, path = %conf_dir.join(format!("{}.yml", ds.dataset_id)).display(), "Load dataset");
        }
        Ok(Self { datasets, tables })
    }

    fn managed_tables(&self) -> impl Iterator<Item = (&str, &[Table])> {
        self.tables
            .iter()
            .filter_map(|(ds, tables)| tables.as_deref().map(|t| (ds.as_str(), t)))
    }
}

/// One command run against a store: plan, apply, destroy or export.
///
/// Declared state is loaded and validated in full before any remote call.
pub struct Session {
    ctx: Context,
}

impl Session {
    pub fn new(store: Arc<dyn ResourceStore>, console: Arc<Console>, options: ReconcileOptions) -> Self {
        Self {
            ctx: Context::new(store, console, options),
        }
    }

    fn datasets(&self) -> DatasetReconciler {
        DatasetReconciler::new(self.ctx.clone())
    }

    fn tables(&self, dataset_id: &str) -> TableReconciler {
        TableReconciler::new(self.ctx.clone(), dataset_id)
    }

    fn check_cancelled(&self, stage: &str) -> Result<()> {
        if self.ctx.pool.is_cancelled() {
            return Err(BqdmError::Cancelled(stage.to_string()));
        }
        Ok(())
    }

    /// Remote and desired datasets. Undeclared attributes resolve to the remote's.
    async fn datasets_state(&self, declared: &Declared) -> Result<(Vec<Dataset>, Vec<Dataset>)> {
        let actual = self.datasets().list().await?;
        let desired = resolve_all(&actual, &declared.datasets, Dataset::resolve_against);
        Ok((actual, desired))
    }

    async fn tables_state(&self, dataset_id: &str, declared: &[Table]) -> Result<(Vec<Table>, Vec<Table>)> {
        let actual = self.tables(dataset_id).list().await?;
        let desired = resolve_all(&actual, declared, Table::resolve_against);
        Ok((actual, desired))
    }

    /// Print what `apply` would do. Never mutates remote state.
    pub async fn plan(&self, conf_dir: &Path) -> Result<Summary> {
        let declared = Declared::load(conf_dir, &self.ctx.options)?;
        self.ctx.console.raw(PLAN_HEADER);
        self.ctx.console.blank();

        let (actual, desired) = self.datasets_state(&declared).await?;
        let datasets = self.datasets();
        let mut summary = Summary {
            datasets: Counts {
                add: datasets.plan_add(&actual, &desired)?,
                change: datasets.plan_change(&actual, &desired)?,
                destroy: datasets.plan_destroy(&actual, &desired),
            },
            ..Summary::default()
        };

        for (dataset_id, declared_tables) in declared.managed_tables() {
            let (actual, desired) = self.tables_state(dataset_id, declared_tables).await?;
            let tables = self.tables(dataset_id);
            summary.tables += Counts {
                add: tables.plan_add(&actual, &desired)?,
                change: tables.plan_change(&actual, &desired)?,
                destroy: tables.plan_destroy(&actual, &desired),
            };
        }

        self.print_summary(Verb::Plan, &summary);
        Ok(summary)
    }

    /// Reconcile remote state with the declared state.
    ///
    /// Datasets are applied first so tables of new datasets have a home.
    /// Any failed operation fails the command once its siblings finish.
    pub async fn apply(&self, conf_dir: &Path) -> Result<Summary> {
        let declared = Declared::load(conf_dir, &self.ctx.options)?;
        let (actual, desired) = self.datasets_state(&declared).await?;

        let datasets = self.datasets();
        let (add, mut pending) = datasets.add(&actual, &desired)?;
        let (change, changing) = datasets.change(&actual, &desired)?;
        let (destroy, destroying) = datasets.destroy(&actual, &desired);
        pending.extend(changing);
        pending.extend(destroying);
        WorkerPool::join_all(pending).await.into_result()?;

        let mut summary = Summary {
            datasets: Counts { add, change, destroy },
            ..Summary::default()
        };

        self.check_cancelled("apply before tables")?;
        let mut pending: Vec<Pending> = Vec::new();
        for (dataset_id, declared_tables) in declared.managed_tables() {
            let (actual, desired) = self.tables_state(dataset_id, declared_tables).await?;
            let tables = self.tables(dataset_id);
            let (add, adding) = tables.add(&actual, &desired)?;
            let (change, changing) = tables.change(&actual, &desired)?;
            let (destroy, destroying) = tables.destroy(&actual, &desired);
            pending.extend(adding);
            pending.extend(changing);
            pending.extend(destroying);
            summary.tables += Counts { add, change, destroy };
        }
        WorkerPool::join_all(pending).await.into_result()?;

        self.print_summary(Verb::Apply, &summary);
        Ok(summary)
    }

    /// Print which declared resources `destroy_apply` would delete.
    pub async fn destroy_plan(&self, conf_dir: &Path) -> Result<Summary> {
        let declared = Declared::load(conf_dir, &self.ctx.options)?;
        self.ctx.console.raw(PLAN_HEADER);
        self.ctx.console.blank();

        let (actual, desired) = self.datasets_state(&declared).await?;
        let mut summary = Summary::default();
        summary.datasets.destroy = self.datasets().plan_intersection_destroy(&actual, &desired);

        for (dataset_id, declared_tables) in self.doomed_tables(&actual, &declared) {
            let tables = self.tables(dataset_id);
            let actual_tables = tables.list().await?;
            summary.tables.destroy += tables.plan_intersection_destroy(&actual_tables, declared_tables);
        }

        self.print_summary(Verb::PlanDestroy, &summary);
        Ok(summary)
    }

    /// Delete every declared resource that exists remotely.
    ///
    /// Declared tables are deleted before their dataset. A dataset still
    /// holding undeclared tables fails to delete and is reported.
    pub async fn destroy_apply(&self, conf_dir: &Path) -> Result<Summary> {
        let declared = Declared::load(conf_dir, &self.ctx.options)?;
        let (actual, desired) = self.datasets_state(&declared).await?;
        let mut summary = Summary::default();

        let mut pending: Vec<Pending> = Vec::new();
        for (dataset_id, declared_tables) in self.doomed_tables(&actual, &declared) {
            let tables = self.tables(dataset_id);
            let actual_tables = tables.list().await?;
            let (count, destroying) = tables.intersection_destroy(&actual_tables, declared_tables);
            summary.tables.destroy += count;
            pending.extend(destroying);
        }
        WorkerPool::join_all(pending).await.into_result()?;

        self.check_cancelled("destroy before datasets")?;
        let (count, pending) = self.datasets().intersection_destroy(&actual, &desired);
        summary.datasets.destroy = count;
        WorkerPool::join_all(pending).await.into_result()?;

        self.print_summary(Verb::Destroy, &summary);
        Ok(summary)
    }

    fn doomed_tables<'a>(
        &self,
        actual: &'a [Dataset],
        declared: &'a Declared,
    ) -> impl Iterator<Item = (&'a str, &'a [Table])> {
        declared
            .managed_tables()
            .filter(move |(ds, _)| actual.iter().any(|a| a.dataset_id == *ds))
    }

    /// Write the remote state as a declared-state directory.
    ///
    /// Returns the number of datasets exported.
    pub async fn export(&self, output_dir: &Path) -> Result<usize> {
        let datasets = self.datasets().list().await?;
        for dataset in &datasets {
            self.check_cancelled("export")?;
            let path = write_dataset(output_dir, dataset)?;
            self.ctx
                .console
                .line(Tone::Plain, format!("Export dataset config: {}", path.display()));

            let tables = self.tables(&dataset.dataset_id).list().await?;
            let written = write_tables(output_dir, &dataset.dataset_id, &tables)?;
            debug!(dataset = %dataset.dataset_id, tables = written.len(), "Exported tables");
        }
        Ok(datasets.len())
    }

    fn print_summary(&self, verb: Verb, summary: &Summary) {
        let console = &self.ctx.console;
        if summary.is_empty() {
            console.line(Tone::Plain, NO_CHANGES);
        } else {
            console.line(Tone::Plain, format!("Datasets: {}", SummaryLine(verb, &summary.datasets)));
            console.line(Tone::Plain, format!("Tables: {}", SummaryLine(verb, &summary.tables)));
        }
        console.blank();
    }
}
