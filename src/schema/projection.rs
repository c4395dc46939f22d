//! Column projection from an existing field tree onto a desired one.
//!
//! The output feeds `SELECT <list> FROM <table>` in migration queries.
//! Matching is by name at each nesting level; output order follows the
//! target tree.

use super::field::SchemaField;
use crate::error::{BqdmError, Result};

/// Build the projection list for migrating rows shaped like `source` into `target`.
pub fn build_projection(source: &[SchemaField], target: &[SchemaField]) -> Result<Vec<String>> {
    project_level(source, target, None)
}

/// Same as [`build_projection`], joined for use in a `SELECT` clause.
pub fn projection_sql(source: &[SchemaField], target: &[SchemaField]) -> Result<String> {
    Ok(build_projection(source, target)?.join(", "))
}

fn project_level(
    source: &[SchemaField],
    target: &[SchemaField],
    prefix: Option<&str>,
) -> Result<Vec<String>> {
    target
        .iter()
        .map(|field| {
            let matched = source.iter().find(|s| s.name == field.name);
            project_field(field, matched, prefix)
        })
        .collect()
}

fn project_field(
    target: &SchemaField,
    source: Option<&SchemaField>,
    prefix: Option<&str>,
) -> Result<String> {
    let qualified = match prefix {
        Some(p) => format!("{}.{}", p, target.name),
        None => target.name.clone(),
    };

    if target.field_type.is_record() {
        let nested_source = source.map(|s| s.fields.as_slice()).unwrap_or(&[]);
        let inner = project_level(nested_source, &target.fields, Some(&qualified))?;
        if inner.is_empty() {
            return Err(BqdmError::Config(format!(
                "RECORD field '{}' has no nested fields", qualified
            )));
        }
        return Ok(format!("struct({}) AS {}", inner.join(", "), target.name));
    }

    match source {
        Some(_) => Ok(format!(
            "cast({} AS {}) AS {}",
            qualified,
            target.field_type.cast_type()?,
            target.name
        )),
        None => Ok(format!("null AS {}", target.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::schema::FieldType::*;

    fn f(name: &str, ty: FieldType) -> SchemaField {
        SchemaField::new(name, ty)
    }

    #[test]
    fn test_type_change_and_new_record() {
        let source = vec![f("a", Int64)];
        let target = vec![
            f("a", String),
            SchemaField::record("b", vec![f("c", Int64)]),
        ];
        assert_eq!(
            projection_sql(&source, &target).unwrap(),
            "cast(a AS STRING) AS a, struct(null AS c) AS b"
        );
    }

    #[test]
    fn test_nested_records_use_qualified_names() {
        let source = vec![
            f("test1", Int64),
            f("test2", String),
            SchemaField::record("test3", vec![f("foo_bar", Int64)]),
            SchemaField::record("test4", vec![f("fizz", Float64), f("buzz", String)]),
        ];
        assert_eq!(
            projection_sql(&source, &source).unwrap(),
            "cast(test1 AS INT64) AS test1, cast(test2 AS STRING) AS test2, \
             struct(cast(test3.foo_bar AS INT64) AS foo_bar) AS test3, \
             struct(cast(test4.fizz AS FLOAT64) AS fizz, cast(test4.buzz AS STRING) AS buzz) AS test4"
        );
    }

    #[test]
    fn test_deep_nesting_compounds_prefix() {
        let schema = vec![SchemaField::record(
            "outer",
            vec![SchemaField::record("inner", vec![f("leaf", Date)])],
        )];
        assert_eq!(
            projection_sql(&schema, &schema).unwrap(),
            "struct(struct(cast(outer.inner.leaf AS DATE) AS leaf) AS inner) AS outer"
        );
    }

    #[test]
    fn test_output_follows_target_order() {
        let source = vec![f("x", String), f("y", String)];
        let target = vec![f("y", String), f("x", String)];
        assert_eq!(
            build_projection(&source, &target).unwrap(),
            vec!["cast(y AS STRING) AS y", "cast(x AS STRING) AS x"]
        );
    }

    #[test]
    fn test_removed_source_columns_are_dropped() {
        let source = vec![f("keep", Bool), f("gone", Bytes)];
        let target = vec![f("keep", Bool)];
        assert_eq!(
            build_projection(&source, &target).unwrap(),
            vec!["cast(keep AS BOOL) AS keep"]
        );
    }

    #[test]
    fn test_empty_source_backfills_everything() {
        let target = vec![f("ts", Timestamp), SchemaField::record("r", vec![f("t", Time)])];
        assert_eq!(
            projection_sql(&[], &target).unwrap(),
            "null AS ts, struct(null AS t) AS r"
        );
    }

    #[test]
    fn test_no_rename_detection() {
        let source = vec![f("old_name", String)];
        let target = vec![f("new_name", String)];
        assert_eq!(
            build_projection(&source, &target).unwrap(),
            vec!["null AS new_name"]
        );
    }

    #[test]
    fn test_source_scalar_became_record() {
        let source = vec![f("r", String)];
        let target = vec![SchemaField::record("r", vec![f("x", Datetime)])];
        assert_eq!(
            build_projection(&source, &target).unwrap(),
            vec!["struct(null AS x) AS r"]
        );
    }

    #[test]
    fn test_unmapped_type_fails_only_when_cast() {
        let numeric = FieldType::parse("NUMERIC").unwrap();
        let err = build_projection(&[f("amount", numeric.clone())], &[f("amount", numeric.clone())])
            .unwrap_err();
        assert!(matches!(err, BqdmError::UnknownFieldType(ref t) if t == "NUMERIC"));
        assert_eq!(
            build_projection(&[], &[f("amount", numeric)]).unwrap(),
            vec!["null AS amount"]
        );
    }

    #[test]
    fn test_record_without_children_is_rejected() {
        let target = vec![f("r", Record)];
        assert!(build_projection(&[], &target).is_err());
    }
}
