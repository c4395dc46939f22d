use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::mode::{MigrationMode, Strategy};
use crate::error::{BqdmError, Result};
use crate::model::Table;
use crate::schema::Schema;
use crate::store::{TableRef, WriteDisposition};

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    Backup { source: TableRef, destination: TableRef },
    CreateTable { dataset_id: String, table: Table },
    SelectInsert {
        source: TableRef,
        destination: TableRef,
        projection: String,
        write_disposition: WriteDisposition,
        result_schema: Schema,
    },
    DeleteTable { table: TableRef },
}

impl MigrationStep {
    /// SQL submitted by a [`MigrationStep::SelectInsert`].
    pub fn sql(&self) -> Option<String> {
        match self {
            MigrationStep::SelectInsert { source, projection, .. } => {
                Some(format!("SELECT {} FROM {}", projection, source.sql_name()))
            }
            _ => None,
        }
    }
}

/// Names of the auxiliary tables a migration may create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    pub backup_table_id: String,
    pub temp_table_id: String,
}

impl Naming {
    pub fn new(table_id: &str, now: DateTime<Utc>, suffix: Uuid) -> Self {
        Self {
            backup_table_id: format!("backup_{}_{}", table_id, now.format("%Y%m%d%H%M%S%6f")),
            temp_table_id: format!("tmp_{}_{}", table_id, suffix.simple()),
        }
    }

    pub fn generate(table_id: &str) -> Self {
        Self::new(table_id, Utc::now(), Uuid::new_v4())
    }
}

/// Ordered steps that take `actual` to `desired` under one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    pub target: TableRef,
    pub mode: MigrationMode,
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn issues_queries(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, MigrationStep::SelectInsert { .. }))
    }

    /// True when a query overwrites the target in place, leaving it with the
    /// query-result layout instead of the declared one.
    pub fn truncates_target(&self) -> bool {
        self.steps.iter().any(|s| {
            matches!(
                s,
                MigrationStep::SelectInsert { destination, write_disposition: WriteDisposition::WriteTruncate, .. }
                    if *destination == self.target
            )
        })
    }

    /// Build the step list without touching the store.
    ///
    /// Projection errors surface here, before any remote mutation.
    pub fn build(
        mode: MigrationMode,
        dataset_id: &str,
        backup_dataset_id: Option<&str>,
        actual: &Table,
        desired: &Table,
        naming: &Naming,
    ) -> Result<Self> {
        let target = TableRef::new(dataset_id, &desired.table_id);
        let mut steps = Vec::new();

        if mode.strategy() == Strategy::SelectInsert
            && actual.partitioning_type != desired.partitioning_type
        {
            return Err(BqdmError::Migration(format!(
                "{} cannot change partitioning from {} to {} in place; use replace or drop_create",
                target,
                partitioning_name(actual),
                partitioning_name(desired),
            )));
        }

        if mode.with_backup() {
            steps.push(MigrationStep::Backup {
                source: target.clone(),
                destination: TableRef::new(
                    backup_dataset_id.unwrap_or(dataset_id),
                    &naming.backup_table_id,
                ),
            });
        }

        match mode.strategy() {
            Strategy::SelectInsert => {
                steps.push(MigrationStep::SelectInsert {
                    source: target.clone(),
                    destination: target.clone(),
                    projection: projection(&actual.schema, &desired.schema)?,
                    write_disposition: WriteDisposition::WriteTruncate,
                    result_schema: desired.schema.clone(),
                });
            }
            Strategy::Replace => {
                let temp = TableRef::new(dataset_id, &naming.temp_table_id);
                steps.push(MigrationStep::CreateTable {
                    dataset_id: dataset_id.to_string(),
                    table: temporary_table(desired, &naming.temp_table_id),
                });
                steps.push(MigrationStep::SelectInsert {
                    source: target.clone(),
                    destination: temp.clone(),
                    projection: projection(&actual.schema, &desired.schema)?,
                    write_disposition: WriteDisposition::WriteAppend,
                    result_schema: desired.schema.clone(),
                });
                steps.push(MigrationStep::DeleteTable { table: target.clone() });
                steps.push(MigrationStep::CreateTable {
                    dataset_id: dataset_id.to_string(),
                    table: desired.clone(),
                });
                steps.push(MigrationStep::SelectInsert {
                    source: temp.clone(),
                    destination: target.clone(),
                    projection: projection(&desired.schema, &desired.schema)?,
                    write_disposition: WriteDisposition::WriteAppend,
                    result_schema: desired.schema.clone(),
                });
                steps.push(MigrationStep::DeleteTable { table: temp });
            }
            Strategy::DropCreate => {
                steps.push(MigrationStep::DeleteTable { table: target.clone() });
                steps.push(MigrationStep::CreateTable {
                    dataset_id: dataset_id.to_string(),
                    table: desired.clone(),
                });
            }
        }

        Ok(Self { target, mode, steps })
    }
}

fn projection(source: &Schema, target: &Schema) -> Result<String> {
    let columns = source.projection_to(target)?;
    if columns.is_empty() {
        return Err(BqdmError::Migration(
            "desired schema has no columns to project".into(),
        ));
    }
    Ok(columns.join(", "))
}

fn partitioning_name(table: &Table) -> &'static str {
    table.partitioning_type.map(|p| p.as_str()).unwrap_or("none")
}

/// Staging table: the desired layout and partitioning without its metadata.
fn temporary_table(desired: &Table, temp_table_id: &str) -> Table {
    let mut temp = Table::new(temp_table_id).with_schema(desired.schema.clone());
    temp.partitioning_type = desired.partitioning_type;
    temp
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::schema::{FieldType, PartitioningType, SchemaField};

    fn naming() -> Naming {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 45).unwrap()
            + chrono::Duration::microseconds(123_456);
        Naming::new("events", now, Uuid::nil())
    }

    fn actual() -> Table {
        Table::new("events").with_schema(Schema::from_fields(vec![
            SchemaField::new("a", FieldType::Int64),
        ]))
    }

    fn desired() -> Table {
        Table::new("events").with_schema(Schema::from_fields(vec![
            SchemaField::new("a", FieldType::String),
            SchemaField::record("b", vec![SchemaField::new("c", FieldType::Int64)]),
        ]))
    }

    #[test]
    fn test_naming() {
        let n = naming();
        assert_eq!(n.backup_table_id, "backup_events_20240309123045123456");
        assert_eq!(n.temp_table_id, "tmp_events_00000000000000000000000000000000");
    }

    #[test]
    fn test_select_insert_plan() {
        let plan = MigrationPlan::build(
            MigrationMode::SelectInsert, "ds", None, &actual(), &desired(), &naming(),
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(
            plan.steps[0].sql().unwrap(),
            "SELECT cast(a AS STRING) AS a, struct(null AS c) AS b FROM `ds.events`"
        );
        assert!(plan.truncates_target());
    }

    #[test]
    fn test_backup_goes_to_backup_dataset() {
        let plan = MigrationPlan::build(
            MigrationMode::SelectInsertBackup, "ds", Some("archive"), &actual(), &desired(), &naming(),
        )
        .unwrap();
        assert_eq!(
            plan.steps[0],
            MigrationStep::Backup {
                source: TableRef::new("ds", "events"),
                destination: TableRef::new("archive", "backup_events_20240309123045123456"),
            }
        );
    }

    #[test]
    fn test_replace_plan_order() {
        let plan = MigrationPlan::build(
            MigrationMode::ReplaceBackup, "ds", None, &actual(), &desired(), &naming(),
        )
        .unwrap();
        let kinds: Vec<&str> = plan
            .steps
            .iter()
            .map(|s| match s {
                MigrationStep::Backup { .. } => "backup",
                MigrationStep::CreateTable { .. } => "create",
                MigrationStep::SelectInsert { .. } => "insert",
                MigrationStep::DeleteTable { .. } => "delete",
            })
            .collect();
        assert_eq!(kinds, vec!["backup", "create", "insert", "delete", "create", "insert", "delete"]);

        let temp = "tmp_events_00000000000000000000000000000000";
        match &plan.steps[1] {
            MigrationStep::CreateTable { table, .. } => {
                assert_eq!(table.table_id, temp);
                assert!(table.schema.same_layout(&desired().schema));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(
            plan.steps[5].sql().unwrap(),
            format!(
                "SELECT cast(a AS STRING) AS a, struct(cast(b.c AS INT64) AS c) AS b FROM `ds.{}`",
                temp
            )
        );
        assert_eq!(plan.steps[6], MigrationStep::DeleteTable { table: TableRef::new("ds", temp) });

        for step in [&plan.steps[2], &plan.steps[5]] {
            assert!(matches!(
                step,
                MigrationStep::SelectInsert { write_disposition: WriteDisposition::WriteAppend, .. }
            ));
        }
        assert!(!plan.truncates_target());
    }

    #[test]
    fn test_drop_create_issues_no_query() {
        let plan = MigrationPlan::build(
            MigrationMode::DropCreate, "ds", None, &actual(), &desired(), &naming(),
        )
        .unwrap();
        assert!(!plan.issues_queries());
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_select_insert_rejects_partitioning_change() {
        let err = MigrationPlan::build(
            MigrationMode::SelectInsert,
            "ds",
            None,
            &actual(),
            &desired().with_partitioning(PartitioningType::Day),
            &naming(),
        )
        .unwrap_err();
        assert!(matches!(err, BqdmError::Migration(_)));
    }

    #[test]
    fn test_replace_allows_partitioning_change() {
        let plan = MigrationPlan::build(
            MigrationMode::Replace,
            "ds",
            None,
            &actual(),
            &desired().with_partitioning(PartitioningType::Day),
            &naming(),
        )
        .unwrap();
        match &plan.steps[0] {
            MigrationStep::CreateTable { table, .. } => {
                assert_eq!(table.partitioning_type, Some(PartitioningType::Day));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }
}
