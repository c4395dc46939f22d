mod migrator;
mod mode;
mod plan;

pub use migrator::Migrator;
pub use mode::{MigrationMode, Strategy};
pub use plan::{MigrationPlan, MigrationStep, Naming};
