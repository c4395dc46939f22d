use bqdm::error::BqdmError;
use bqdm::schema::{build_projection, projection_sql, FieldMode, FieldType, PartitioningType, Schema, SchemaField};

#[test]
fn test_field_defaults() {
    let field = SchemaField::new("user_id", FieldType::String);
    assert_eq!(field.name, "user_id");
    assert_eq!(field.mode, FieldMode::Nullable);
    assert!(field.description.is_none());
    assert!(field.fields.is_empty());
}

#[test]
fn test_field_modes() {
    assert_eq!(SchemaField::new("id", FieldType::Int64).required().mode, FieldMode::Required);
    assert_eq!(SchemaField::new("tags", FieldType::String).repeated().mode, FieldMode::Repeated);
}

#[test]
fn test_type_normalization_table() {
    let cases = [
        ("INTEGER", FieldType::Int64),
        ("int64", FieldType::Int64),
        ("FLOAT", FieldType::Float64),
        ("FLOAT64", FieldType::Float64),
        ("BOOLEAN", FieldType::Bool),
        ("bool", FieldType::Bool),
        ("BYTES", FieldType::Bytes),
        ("DATE", FieldType::Date),
        ("DATETIME", FieldType::Datetime),
        ("TIME", FieldType::Time),
        ("TIMESTAMP", FieldType::Timestamp),
        ("STRING", FieldType::String),
        ("RECORD", FieldType::Record),
    ];
    for (input, expected) in cases {
        assert_eq!(FieldType::parse(input).unwrap(), expected, "{input}");
    }
}

#[test]
fn test_unmapped_type_is_fatal_when_cast() {
    for input in ["NUMERIC", "GEOGRAPHY", "STRUCTURE"] {
        let ty = FieldType::parse(input).unwrap();
        let source = vec![SchemaField::new("v", FieldType::String)];
        let target = vec![SchemaField::new("v", ty)];
        let err = build_projection(&source, &target).unwrap_err();
        assert!(matches!(err, BqdmError::UnknownFieldType(_)), "{input}");
        assert!(err.is_config_error());
    }
    assert!(FieldType::parse("").is_err());
}

#[test]
fn test_projection_scenario_with_new_record() {
    let source = vec![SchemaField::new("a", FieldType::parse("INTEGER").unwrap())];
    let target = vec![
        SchemaField::new("a", FieldType::String),
        SchemaField::record("b", vec![SchemaField::new("c", FieldType::Int64)]),
    ];
    assert_eq!(
        build_projection(&source, &target).unwrap(),
        vec!["cast(a AS STRING) AS a", "struct(null AS c) AS b"]
    );
}

#[test]
fn test_projection_against_itself_has_no_nulls() {
    let schema = vec![
        SchemaField::new("id", FieldType::Int64).required(),
        SchemaField::record(
            "address",
            vec![
                SchemaField::new("city", FieldType::String),
                SchemaField::record("geo", vec![SchemaField::new("lat", FieldType::Float64)]),
            ],
        ),
        SchemaField::new("seen_at", FieldType::Timestamp),
    ];
    let sql = projection_sql(&schema, &schema).unwrap();
    assert_eq!(
        sql,
        "cast(id AS INT64) AS id, \
         struct(cast(address.city AS STRING) AS city, struct(cast(address.geo.lat AS FLOAT64) AS lat) AS geo) AS address, \
         cast(seen_at AS TIMESTAMP) AS seen_at"
    );
    assert!(!sql.contains("null AS"));
}

#[test]
fn test_projection_drops_removed_columns_and_follows_target_order() {
    let source = vec![
        SchemaField::new("a", FieldType::String),
        SchemaField::new("b", FieldType::String),
        SchemaField::new("gone", FieldType::String),
    ];
    let target = vec![
        SchemaField::new("b", FieldType::String),
        SchemaField::new("a", FieldType::String),
        SchemaField::new("new", FieldType::Date),
    ];
    assert_eq!(
        build_projection(&source, &target).unwrap(),
        vec!["cast(b AS STRING) AS b", "cast(a AS STRING) AS a", "null AS new"]
    );
}

#[test]
fn test_schema_equality_is_order_independent() {
    let a = Schema::from_fields(vec![
        SchemaField::new("x", FieldType::String),
        SchemaField::new("y", FieldType::Int64),
    ]);
    let b = Schema::from_fields(vec![
        SchemaField::new("y", FieldType::Int64),
        SchemaField::new("x", FieldType::String),
    ]);
    assert_eq!(a, b);
    assert!(a.same_layout(&b));
}

#[test]
fn test_schema_yaml_format() {
    let yaml = "\
- name: id
  field_type: INTEGER
  mode: REQUIRED
- name: attrs
  field_type: RECORD
  fields:
  - name: key
    field_type: STRING
";
    let schema: Schema = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(schema.fields[0].field_type, FieldType::Int64);
    assert_eq!(schema.fields[0].mode, FieldMode::Required);
    assert_eq!(schema.get_field("attrs").unwrap().fields.len(), 1);
    assert!(schema.validate().is_ok());
}

#[test]
fn test_record_without_fields_is_invalid() {
    let schema = Schema::from_fields(vec![SchemaField::new("r", FieldType::Record)]);
    assert!(schema.validate().is_err());
}

#[test]
fn test_partitioning_type_parse() {
    assert_eq!(PartitioningType::parse("DAY"), Some(PartitioningType::Day));
    assert_eq!(PartitioningType::parse("HOUR"), Some(PartitioningType::Hour));
    assert_eq!(PartitioningType::parse("WEEK"), None);
}
