use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use glob::glob;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::DatasetFilter;
use crate::error::{BqdmError, Result};
use crate::model::{Dataset, Resource, Table};

/// Reads declared datasets and tables from a configuration directory.
///
/// Layout: `<dir>/<dataset_id>.yml` per dataset and
/// `<dir>/<dataset_id>/<table_id>.yml` per table. A dataset without a table
/// directory has unmanaged tables.
pub struct ConfigLoader {
    conf_dir: PathBuf,
    filter: DatasetFilter,
}

impl ConfigLoader {
    pub fn new(conf_dir: impl AsRef<Path>, filter: DatasetFilter) -> Result<Self> {
        let conf_dir = conf_dir.as_ref().to_path_buf();
        if !conf_dir.is_dir() {
            return Err(BqdmError::ConfigDirNotFound(conf_dir.display().to_string()));
        }
        Ok(Self { conf_dir, filter })
    }

    pub fn load_datasets(&self) -> Result<Vec<Dataset>> {
        let datasets: Vec<Dataset> = yaml_files(&self.conf_dir)?
            .into_iter()
            .filter(|path| self.filter.allows(&file_stem(path)))
            .map(|path| {
                let dataset: Dataset = load_file(&path)?;
                dataset.validate()?;
                check_stem(&path, &dataset)?;
                Ok(dataset)
            })
            .collect::<Result<_>>()?;
        ensure_unique(&datasets, &self.conf_dir)?;
        Ok(datasets)
    }

    /// Declared tables of one dataset, or `None` when its tables are unmanaged.
    pub fn load_tables(&self, dataset_id: &str) -> Result<Option<Vec<Table>>> {
        let dir = self.conf_dir.join(dataset_id);
        if !dir.is_dir() {
            debug!(dataset = dataset_id, "No table directory, tables unmanaged");
            return Ok(None);
        }
        let tables: Vec<Table> = yaml_files(&dir)?
            .into_iter()
            .map(|path| {
                let table: Table = load_file(&path)?;
                table.validate()?;
                check_stem(&path, &table)?;
                Ok(table)
            })
            .collect::<Result<_>>()?;
        ensure_unique(&tables, &dir)?;
        Ok(Some(tables))
    }
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join("*.yml");
    let pattern_str = pattern.to_string_lossy();

    let mut files: Vec<PathBuf> = glob(&pattern_str)
        .map_err(|e| BqdmError::Config(e.to_string()))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|_| BqdmError::ConfigFileNotFound(path.display().to_string()))?;
    debug!(path = %path.display(), "Loading declaration");
    serde_yaml::from_str(&content)
        .map_err(|e| BqdmError::Config(format!("{}: {}", path.display(), e)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn check_stem<R: Resource>(path: &Path, resource: &R) -> Result<()> {
    let stem = file_stem(path);
    if stem != resource.identity() {
        return Err(BqdmError::Config(format!(
            "{} declares '{}' but is named '{}'",
            path.display(),
            resource.identity(),
            stem
        )));
    }
    Ok(())
}

fn ensure_unique<R: Resource>(resources: &[R], dir: &Path) -> Result<()> {
    let mut seen = HashSet::new();
    for r in resources {
        if !seen.insert(r.identity()) {
            return Err(BqdmError::Config(format!(
                "'{}' is declared more than once in {}",
                r.identity(),
                dir.display()
            )));
        }
    }
    Ok(())
}
