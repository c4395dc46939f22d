use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::diff::to_yaml;
use crate::error::Result;
use crate::model::{Dataset, Table};

/// Write `<dir>/<dataset_id>.yml`.
pub fn write_dataset(output_dir: &Path, dataset: &Dataset) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.yml", dataset.dataset_id));
    fs::write(&path, to_yaml(dataset)?)?;
    debug!(path = %path.display(), "Exported dataset");
    Ok(path)
}

/// Write one file per table under `<dir>/<dataset_id>/`.
///
/// An empty dataset gets a `.gitkeep` so its tables stay managed.
pub fn write_tables(output_dir: &Path, dataset_id: &str, tables: &[Table]) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join(dataset_id);
    fs::create_dir_all(&dir)?;

    if tables.is_empty() {
        let keep = dir.join(".gitkeep");
        if !keep.exists() {
            fs::write(&keep, "")?;
        }
        return Ok(Vec::new());
    }

    tables
        .iter()
        .map(|table| {
            let path = dir.join(format!("{}.yml", table.table_id));
            fs::write(&path, to_yaml(table)?)?;
            debug!(path = %path.display(), "Exported table");
            Ok(path)
        })
        .collect()
}
