use serde::{Deserialize, Serialize};
use tracing::warn;

use super::access::{canonical_grants, AccessGrant};
use super::{labels_key, Labels, Resource};
use crate::error::{BqdmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_table_expiration_ms: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub access_entries: Vec<AccessGrant>,
    #[serde(default)]
    pub labels: Option<Labels>,
}

/// Mutable dataset attributes an update call may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetField {
    FriendlyName,
    Description,
    DefaultTableExpirationMs,
    Labels,
    AccessEntries,
}

impl DatasetField {
    /// Every attribute written when a changed dataset is applied.
    pub const ALL: [DatasetField; 5] = [
        DatasetField::FriendlyName,
        DatasetField::Description,
        DatasetField::DefaultTableExpirationMs,
        DatasetField::Labels,
        DatasetField::AccessEntries,
    ];
}

impl Dataset {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            friendly_name: None,
            description: None,
            default_table_expiration_ms: None,
            location: None,
            access_entries: Vec::new(),
            labels: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_id.trim().is_empty() {
            return Err(BqdmError::Config("dataset_id is required".into()));
        }
        Ok(())
    }

    /// Desired value for this declaration given the remote `actual`.
    ///
    /// Undeclared labels follow the remote. Location always does, since a
    /// dataset cannot move; a conflicting declaration is only warned about.
    pub fn resolve_against(&self, actual: &Dataset) -> Dataset {
        let mut desired = self.clone();
        if desired.labels.is_none() {
            desired.labels = actual.labels.clone();
        }
        if desired.location.is_some() && desired.location != actual.location {
            warn!(
                dataset = %self.dataset_id,
                declared = ?desired.location,
                actual = ?actual.location,
                "Dataset location cannot be changed in place"
            );
        }
        desired.location = actual.location.clone();
        desired
    }
}

impl Resource for Dataset {
    fn identity(&self) -> &str {
        &self.dataset_id
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.dataset_id == other.dataset_id
            && self.friendly_name == other.friendly_name
            && self.description == other.description
            && self.default_table_expiration_ms == other.default_table_expiration_ms
            && self.location == other.location
            && canonical_grants(&self.access_entries) == canonical_grants(&other.access_entries)
            && labels_key(&self.labels) == labels_key(&other.labels)
    }
}

impl Eq for Dataset {}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<AccessGrant>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<AccessGrant>>::deserialize(deserializer)?.unwrap_or_default())
}
