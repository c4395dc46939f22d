//! Drives differencer results through a [`ResourceStore`].

mod dataset;
mod pool;
mod session;
mod table;

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::diff::{format_yaml_diff, indent, to_yaml};
use crate::error::Result;
use crate::local::DatasetFilter;
use crate::migration::MigrationMode;
use crate::model::Resource;
use crate::output::{Console, Tone};
use crate::store::ResourceStore;

pub use dataset::DatasetReconciler;
pub use pool::{Pending, PoolReport, TaskFailure, WorkerPool};
pub use session::{Counts, Session, Summary, PLAN_HEADER};
pub use table::TableReconciler;

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);

/// Worker count used when none is configured: five per available CPU.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 5
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub mode: MigrationMode,
    pub backup_dataset: Option<String>,
    pub filter: DatasetFilter,
    pub parallelism: usize,
    pub job_timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            mode: MigrationMode::default(),
            backup_dataset: None,
            filter: DatasetFilter::default(),
            parallelism: default_parallelism(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl ReconcileOptions {
    pub fn with_mode(mut self, mode: MigrationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backup_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.backup_dataset = Some(dataset_id.into());
        self
    }

    pub fn with_filter(mut self, filter: DatasetFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Handles shared by every reconciler of one command run.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ResourceStore>,
    pub console: Arc<Console>,
    pub pool: Arc<WorkerPool>,
    pub options: Arc<ReconcileOptions>,
}

impl Context {
    pub fn new(store: Arc<dyn ResourceStore>, console: Arc<Console>, options: ReconcileOptions) -> Self {
        let pool = WorkerPool::new(options.parallelism, options.cancel.clone());
        Self {
            store,
            console,
            pool: Arc::new(pool),
            options: Arc::new(options),
        }
    }
}

/// Desired values for `declared`, each resolved against its remote counterpart.
pub(crate) fn resolve_all<T: Resource>(
    actual: &[T],
    declared: &[T],
    resolve: impl Fn(&T, &T) -> T,
) -> Vec<T> {
    declared
        .iter()
        .map(|d| match actual.iter().find(|a| a.identity() == d.identity()) {
            Some(a) => resolve(d, a),
            None => d.clone(),
        })
        .collect()
}

pub(crate) fn find<'a, T: Resource>(items: &'a [T], identity: &str) -> Option<&'a T> {
    items.iter().find(|i| i.identity() == identity)
}

/// Indented, painted YAML dump shown under a `+` line.
pub(crate) fn render_dump<T: Serialize>(tone: Tone, resource: &T) -> Result<String> {
    Ok(tone.paint_lines(&indent(&to_yaml(resource)?, "    ")))
}

/// Line diff shown under a `~` line.
pub(crate) fn render_diff<T: Serialize>(actual: &T, desired: &T) -> Result<String> {
    Ok(format_yaml_diff(&to_yaml(actual)?, &to_yaml(desired)?))
}
