use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{labels_key, Labels, Resource};
use crate::error::{BqdmError, Result};
use crate::schema::{PartitioningType, Schema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub table_id: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub partitioning_type: Option<PartitioningType>,
    #[serde(default)]
    pub view_use_legacy_sql: Option<bool>,
    #[serde(default)]
    pub view_query: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub schema: Schema,
    #[serde(default)]
    pub labels: Option<Labels>,
}

/// Mutable table attributes an update call may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableField {
    FriendlyName,
    Description,
    Expires,
    ViewUseLegacySql,
    ViewQuery,
    Labels,
    Schema,
}

impl Table {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            friendly_name: None,
            description: None,
            expires: None,
            location: None,
            partitioning_type: None,
            view_use_legacy_sql: None,
            view_query: None,
            schema: Schema::new(),
            labels: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_partitioning(mut self, partitioning: PartitioningType) -> Self {
        self.partitioning_type = Some(partitioning);
        self
    }

    pub fn is_view(&self) -> bool {
        self.view_query.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_id.trim().is_empty() {
            return Err(BqdmError::Config("table_id is required".into()));
        }
        if self.is_view() && self.partitioning_type.is_some() {
            return Err(BqdmError::Config(format!(
                "View '{}' cannot declare partitioning_type", self.table_id
            )));
        }
        self.schema.validate()
    }

    /// Desired value for this declaration given the remote `actual`.
    ///
    /// Undeclared labels follow the remote, location always does, and a view
    /// takes the schema the warehouse derived for it.
    pub fn resolve_against(&self, actual: &Table) -> Table {
        let mut desired = self.clone();
        if desired.labels.is_none() {
            desired.labels = actual.labels.clone();
        }
        if desired.location.is_some() && desired.location != actual.location {
            warn!(
                table = %self.table_id,
                declared = ?desired.location,
                actual = ?actual.location,
                "Table location follows its dataset and is left unchanged"
            );
        }
        desired.location = actual.location.clone();
        if desired.is_view() {
            desired.schema = actual.schema.clone();
        }
        desired
    }

    /// True when existing rows must be rewritten to reach `self` from `actual`.
    pub fn requires_migration(&self, actual: &Table) -> bool {
        if self.is_view() || actual.is_view() {
            return false;
        }
        !self.schema.same_layout(&actual.schema) || self.partitioning_type != actual.partitioning_type
    }

    /// Attributes to write when applying `self` over `actual`.
    pub fn update_fields(&self, actual: &Table) -> Vec<TableField> {
        let mut fields = vec![
            TableField::FriendlyName,
            TableField::Description,
            TableField::Expires,
            TableField::ViewUseLegacySql,
            TableField::ViewQuery,
            TableField::Labels,
        ];
        if !self.is_view() && self.schema.same_layout(&actual.schema) && self.schema != actual.schema {
            fields.push(TableField::Schema);
        }
        fields
    }
}

impl Resource for Table {
    fn identity(&self) -> &str {
        &self.table_id
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
            && self.friendly_name == other.friendly_name
            && self.description == other.description
            && self.expires == other.expires
            && self.location == other.location
            && self.partitioning_type == other.partitioning_type
            && self.view_use_legacy_sql == other.view_use_legacy_sql
            && self.view_query == other.view_query
            && self.schema == other.schema
            && labels_key(&self.labels) == labels_key(&other.labels)
    }
}

impl Eq for Table {}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Schema, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Schema>::deserialize(deserializer)?.unwrap_or_default())
}
