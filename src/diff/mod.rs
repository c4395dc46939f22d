mod differ;
mod render;

pub use differ::{add, change, destroy, intersection, DiffResult};
pub use render::{format_yaml_diff, indent, to_yaml};
