mod field;
mod table;
mod partition;
mod projection;

pub use field::{FieldMode, FieldType, SchemaField};
pub use table::Schema;
pub use partition::PartitioningType;
pub use projection::{build_projection, projection_sql};
