pub mod error;
pub mod schema;
pub mod model;
pub mod diff;
pub mod store;
pub mod migration;
pub mod reconcile;
pub mod local;
pub mod output;

pub use error::{BqdmError, BigQueryError, Result};
pub use schema::{FieldMode, FieldType, SchemaField, Schema, PartitioningType, build_projection, projection_sql};
pub use model::{AccessGrant, Dataset, DatasetField, EntityId, Labels, LabelPatch, Resource, Table, TableField, ViewRef};
pub use diff::{DiffResult, format_yaml_diff, to_yaml};
pub use store::{BigQueryStore, MemoryStore, ResourceStore, StoreCall, TableRef};
pub use migration::{MigrationMode, MigrationPlan, MigrationStep, Migrator, Naming};
pub use reconcile::{Counts, DatasetReconciler, ReconcileOptions, Session, Summary, TableReconciler, WorkerPool};
pub use local::{ConfigLoader, DatasetFilter};
pub use output::{Console, Tone};
