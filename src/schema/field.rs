use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{BqdmError, Result};

/// Column type, normalized to its canonical standard-SQL spelling.
///
/// Input is case-insensitive and accepts the legacy aliases (`INTEGER`,
/// `FLOAT`, `BOOLEAN`, `STRUCT`). Types outside the cast table (`NUMERIC`,
/// `GEOGRAPHY`, `JSON`, ...) are kept verbatim as [`FieldType::Other`] so
/// remote tables always describe; only casting to them fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    String,
    Int64,
    Float64,
    Bool,
    Bytes,
    Date,
    Datetime,
    Time,
    Timestamp,
    Record,
    /// Uppercased name of a type with no cast mapping.
    Other(std::string::String),
}

impl FieldType {
    pub fn parse(value: &str) -> Result<Self> {
        let upper = value.trim().to_uppercase();
        match upper.as_str() {
            "" => Err(BqdmError::UnknownFieldType(value.to_string())),
            "INTEGER" | "INT64" => Ok(FieldType::Int64),
            "FLOAT" | "FLOAT64" => Ok(FieldType::Float64),
            "BOOLEAN" | "BOOL" => Ok(FieldType::Bool),
            "BYTES" => Ok(FieldType::Bytes),
            "DATE" => Ok(FieldType::Date),
            "DATETIME" => Ok(FieldType::Datetime),
            "TIME" => Ok(FieldType::Time),
            "TIMESTAMP" => Ok(FieldType::Timestamp),
            "STRING" => Ok(FieldType::String),
            "RECORD" | "STRUCT" => Ok(FieldType::Record),
            _ => Ok(FieldType::Other(upper)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "STRING",
            FieldType::Int64 => "INT64",
            FieldType::Float64 => "FLOAT64",
            FieldType::Bool => "BOOL",
            FieldType::Bytes => "BYTES",
            FieldType::Date => "DATE",
            FieldType::Datetime => "DATETIME",
            FieldType::Time => "TIME",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Record => "RECORD",
            FieldType::Other(name) => name,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, FieldType::Record)
    }

    /// Target type of a `cast(... AS <type>)` expression.
    ///
    /// Records are projected with `struct(...)` and types outside the
    /// normalization table have no cast; both fail.
    pub fn cast_type(&self) -> Result<&'static str> {
        match self {
            FieldType::String => Ok("STRING"),
            FieldType::Int64 => Ok("INT64"),
            FieldType::Float64 => Ok("FLOAT64"),
            FieldType::Bool => Ok("BOOL"),
            FieldType::Bytes => Ok("BYTES"),
            FieldType::Date => Ok("DATE"),
            FieldType::Datetime => Ok("DATETIME"),
            FieldType::Time => Ok("TIME"),
            FieldType::Timestamp => Ok("TIMESTAMP"),
            FieldType::Record | FieldType::Other(_) => {
                Err(BqdmError::UnknownFieldType(self.as_str().to_string()))
            }
        }
    }
}

impl FromStr for FieldType {
    type Err = BqdmError;

    fn from_str(s: &str) -> Result<Self> {
        FieldType::parse(s)
    }
}

impl TryFrom<String> for FieldType {
    type Error = BqdmError;

    fn try_from(value: String) -> Result<Self> {
        FieldType::parse(&value)
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Required => "REQUIRED",
            FieldMode::Repeated => "REPEATED",
        }
    }
}

impl TryFrom<String> for FieldMode {
    type Error = BqdmError;

    fn try_from(value: String) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "" | "NULLABLE" => Ok(FieldMode::Nullable),
            "REQUIRED" => Ok(FieldMode::Required),
            "REPEATED" => Ok(FieldMode::Repeated),
            other => Err(BqdmError::Config(format!("Unknown field mode: {}", other))),
        }
    }
}

impl From<FieldMode> for String {
    fn from(value: FieldMode) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::default(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn record(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self::new(name, FieldType::Record).with_fields(fields)
    }

    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.mode = FieldMode::Repeated;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<SchemaField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BqdmError::Config("Schema field without a name".into()));
        }
        match (self.field_type.is_record(), self.fields.is_empty()) {
            (true, true) => Err(BqdmError::Config(format!(
                "RECORD field '{}' must declare nested fields", self.name
            ))),
            (false, false) => Err(BqdmError::Config(format!(
                "Field '{}' of type {} cannot have nested fields", self.name, self.field_type
            ))),
            _ => self.fields.iter().try_for_each(SchemaField::validate),
        }
    }

    pub(crate) fn as_query_result(&self) -> SchemaField {
        SchemaField {
            name: self.name.clone(),
            field_type: self.field_type.clone(),
            mode: match self.mode {
                FieldMode::Repeated => FieldMode::Repeated,
                _ => FieldMode::Nullable,
            },
            description: None,
            fields: self.fields.iter().map(SchemaField::as_query_result).collect(),
        }
    }

    pub(crate) fn key(&self, with_description: bool) -> FieldKey {
        FieldKey {
            name: self.name.clone(),
            field_type: self.field_type.clone(),
            mode: self.mode,
            description: if with_description { self.description.clone() } else { None },
            fields: canonical_fields(&self.fields, with_description),
        }
    }
}

impl PartialEq for SchemaField {
    fn eq(&self, other: &Self) -> bool {
        self.key(true) == other.key(true)
    }
}

impl Eq for SchemaField {}

impl Hash for SchemaField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key(true).hash(state);
    }
}

/// Order-independent identity of a field subtree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct FieldKey {
    name: String,
    field_type: FieldType,
    mode: FieldMode,
    description: Option<String>,
    fields: Vec<FieldKey>,
}

/// Sibling fields compared as a multiset: keys are sorted, duplicates kept.
pub(crate) fn canonical_fields(fields: &[SchemaField], with_description: bool) -> Vec<FieldKey> {
    let mut keys: Vec<FieldKey> = fields.iter().map(|f| f.key(with_description)).collect();
    keys.sort();
    keys
}
