use serde::{Deserialize, Serialize};
use super::field::{canonical_fields, SchemaField};
use super::projection::build_projection;
use crate::error::Result;

/// Ordered top-level column list of a table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn from_fields(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn add_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.fields.iter().try_for_each(SchemaField::validate)
    }

    /// Column layout equality: names, types, modes and nesting, ignoring descriptions.
    pub fn same_layout(&self, other: &Schema) -> bool {
        canonical_fields(&self.fields, false) == canonical_fields(&other.fields, false)
    }

    /// Layout a query writing these columns leaves behind: every column not
    /// REPEATED becomes NULLABLE and descriptions are dropped.
    pub fn as_query_result(&self) -> Schema {
        Schema::from_fields(self.fields.iter().map(SchemaField::as_query_result).collect())
    }

    /// Projection of rows shaped like `self` onto `target`.
    pub fn projection_to(&self, target: &Schema) -> Result<Vec<String>> {
        build_projection(&self.fields, &target.fields)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        canonical_fields(&self.fields, true) == canonical_fields(&other.fields, true)
    }
}

impl Eq for Schema {}
