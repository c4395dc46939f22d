//! Conversion between the resource model and BigQuery REST resource JSON.

use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use super::{DatasetUpdate, JobResult, JobState, QueryJob, TableRef, TableUpdate};
use crate::error::{BqdmError, Result};
use crate::model::{
    apply_label_patch, AccessGrant, Dataset, DatasetField, EntityId, Labels, Table, TableField, ViewRef,
};
use crate::schema::{FieldMode, FieldType, PartitioningType, Schema, SchemaField};

fn put<T: Into<Value>>(obj: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        obj.insert(key.to_string(), v.into());
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// int64 values arrive as JSON strings in REST payloads.
fn int_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn labels_to_json(labels: &Labels) -> Value {
    Value::Object(
        labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn labels_from_json(value: &Value) -> Option<Labels> {
    let obj = value.get("labels")?.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

pub(crate) fn access_to_json(project_id: &str, grant: &AccessGrant) -> Value {
    let mut obj = Map::new();
    put(&mut obj, "role", grant.role.clone());
    let entity = match &grant.entity_id {
        EntityId::Id(id) => Value::String(id.clone()),
        EntityId::View(view) => json!({
            "projectId": if view.project_id.is_empty() { project_id } else { view.project_id.as_str() },
            "datasetId": view.dataset_id,
            "tableId": view.table_id,
        }),
    };
    obj.insert(grant.entity_type.clone(), entity);
    Value::Object(obj)
}

pub(crate) fn access_from_json(value: &Value) -> Option<AccessGrant> {
    let obj = value.as_object()?;
    let (entity_type, entity) = obj.iter().find(|(k, _)| k.as_str() != "role")?;
    let entity_id = match entity {
        Value::String(s) => EntityId::Id(s.clone()),
        Value::Object(_) => EntityId::View(ViewRef {
            dataset_id: str_field(entity, "datasetId")?,
            project_id: str_field(entity, "projectId").unwrap_or_default(),
            table_id: str_field(entity, "tableId")?,
        }),
        _ => return None,
    };
    Some(AccessGrant {
        role: str_field(value, "role"),
        entity_type: entity_type.clone(),
        entity_id,
    })
}

pub(crate) fn field_to_json(field: &SchemaField) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), Value::String(field.name.clone()));
    obj.insert("type".into(), Value::String(field.field_type.as_str().to_string()));
    obj.insert("mode".into(), Value::String(field.mode.as_str().to_string()));
    put(&mut obj, "description", field.description.clone());
    if !field.fields.is_empty() {
        obj.insert(
            "fields".into(),
            Value::Array(field.fields.iter().map(field_to_json).collect()),
        );
    }
    Value::Object(obj)
}

pub(crate) fn field_from_json(value: &Value) -> Result<SchemaField> {
    let name = str_field(value, "name")
        .ok_or_else(|| BqdmError::Client("schema field without name".into()))?;
    let raw_type = str_field(value, "type").unwrap_or_default();
    let field_type = FieldType::parse(&raw_type)?;
    let mode = match str_field(value, "mode") {
        Some(m) => FieldMode::try_from(m)?,
        None => FieldMode::Nullable,
    };
    let fields = value
        .get("fields")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(field_from_json).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    Ok(SchemaField {
        name,
        field_type,
        mode,
        description: str_field(value, "description"),
        fields,
    })
}

fn schema_to_json(schema: &Schema) -> Value {
    json!({ "fields": schema.fields.iter().map(field_to_json).collect::<Vec<_>>() })
}

pub(crate) fn dataset_to_json(project_id: &str, dataset: &Dataset) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "datasetReference".into(),
        json!({ "projectId": project_id, "datasetId": dataset.dataset_id }),
    );
    put(&mut obj, "friendlyName", dataset.friendly_name.clone());
    put(&mut obj, "description", dataset.description.clone());
    put(
        &mut obj,
        "defaultTableExpirationMs",
        dataset.default_table_expiration_ms.map(|ms| ms.to_string()),
    );
    put(&mut obj, "location", dataset.location.clone());
    if !dataset.access_entries.is_empty() {
        obj.insert(
            "access".into(),
            Value::Array(
                dataset
                    .access_entries
                    .iter()
                    .map(|a| access_to_json(project_id, a))
                    .collect(),
            ),
        );
    }
    obj.insert(
        "labels".into(),
        labels_to_json(&dataset.labels.clone().unwrap_or_default()),
    );
    Value::Object(obj)
}

pub(crate) fn dataset_from_json(value: &Value) -> Result<Dataset> {
    let dataset_id = value
        .get("datasetReference")
        .and_then(|r| str_field(r, "datasetId"))
        .ok_or_else(|| BqdmError::Client("dataset without datasetReference".into()))?;
    let access_entries = value
        .get("access")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(access_from_json).collect())
        .unwrap_or_default();
    Ok(Dataset {
        dataset_id,
        friendly_name: str_field(value, "friendlyName"),
        description: str_field(value, "description"),
        default_table_expiration_ms: int_field(value, "defaultTableExpirationMs"),
        location: str_field(value, "location"),
        access_entries,
        labels: labels_from_json(value),
    })
}

pub(crate) fn table_to_json(project_id: &str, dataset_id: &str, table: &Table) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "tableReference".into(),
        json!({ "projectId": project_id, "datasetId": dataset_id, "tableId": table.table_id }),
    );
    put(&mut obj, "friendlyName", table.friendly_name.clone());
    put(&mut obj, "description", table.description.clone());
    put(
        &mut obj,
        "expirationTime",
        table.expires.map(|t| t.timestamp_millis().to_string()),
    );
    if let Some(partitioning) = table.partitioning_type {
        obj.insert("timePartitioning".into(), json!({ "type": partitioning.as_str() }));
    }
    if let Some(query) = &table.view_query {
        obj.insert(
            "view".into(),
            json!({ "query": query, "useLegacySql": table.view_use_legacy_sql.unwrap_or(false) }),
        );
    }
    obj.insert("schema".into(), schema_to_json(&table.schema));
    obj.insert(
        "labels".into(),
        labels_to_json(&table.labels.clone().unwrap_or_default()),
    );
    Value::Object(obj)
}

pub(crate) fn table_from_json(value: &Value) -> Result<Table> {
    let table_id = value
        .get("tableReference")
        .and_then(|r| str_field(r, "tableId"))
        .ok_or_else(|| BqdmError::Client("table without tableReference".into()))?;
    let fields = value
        .get("schema")
        .and_then(|s| s.get("fields"))
        .and_then(Value::as_array)
        .map(|items| items.iter().map(field_from_json).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    let view = value.get("view");
    Ok(Table {
        table_id,
        friendly_name: str_field(value, "friendlyName"),
        description: str_field(value, "description"),
        expires: int_field(value, "expirationTime")
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        location: str_field(value, "location"),
        partitioning_type: value
            .get("timePartitioning")
            .and_then(|p| str_field(p, "type"))
            .and_then(|t| PartitioningType::parse(&t)),
        view_use_legacy_sql: view.and_then(|v| v.get("useLegacySql")).and_then(Value::as_bool),
        view_query: view.and_then(|v| str_field(v, "query")),
        schema: Schema::from_fields(fields),
        labels: labels_from_json(value),
    })
}

fn set_or_remove(obj: &mut Map<String, Value>, desired: &Value, key: &str) {
    match desired.get(key) {
        Some(v) => {
            obj.insert(key.to_string(), v.clone());
        }
        None => {
            obj.remove(key);
        }
    }
}

fn overlay_labels(obj: &mut Map<String, Value>, patch: &crate::model::LabelPatch) {
    let mut labels = labels_from_json(&Value::Object(obj.clone())).unwrap_or_default();
    apply_label_patch(&mut labels, patch);
    obj.insert("labels".into(), labels_to_json(&labels));
}

/// Full resource to PUT: the fetched `current` with the requested attributes replaced.
///
/// Removed labels are dropped from the map rather than sent as nulls.
pub(crate) fn overlay_dataset(project_id: &str, current: Value, update: &DatasetUpdate) -> Value {
    let desired = dataset_to_json(project_id, &update.dataset);
    let mut obj = match current {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    for field in &update.fields {
        match field {
            DatasetField::FriendlyName => set_or_remove(&mut obj, &desired, "friendlyName"),
            DatasetField::Description => set_or_remove(&mut obj, &desired, "description"),
            DatasetField::DefaultTableExpirationMs => {
                set_or_remove(&mut obj, &desired, "defaultTableExpirationMs")
            }
            DatasetField::AccessEntries => set_or_remove(&mut obj, &desired, "access"),
            DatasetField::Labels => overlay_labels(&mut obj, &update.labels),
        }
    }
    Value::Object(obj)
}

pub(crate) fn overlay_table(project_id: &str, current: Value, update: &TableUpdate) -> Value {
    let desired = table_to_json(project_id, &update.dataset_id, &update.table);
    let mut obj = match current {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    for field in &update.fields {
        match field {
            TableField::FriendlyName => set_or_remove(&mut obj, &desired, "friendlyName"),
            TableField::Description => set_or_remove(&mut obj, &desired, "description"),
            TableField::Expires => set_or_remove(&mut obj, &desired, "expirationTime"),
            TableField::Schema => set_or_remove(&mut obj, &desired, "schema"),
            TableField::ViewQuery | TableField::ViewUseLegacySql => {
                set_or_remove(&mut obj, &desired, "view")
            }
            TableField::Labels => overlay_labels(&mut obj, &update.labels),
        }
    }
    Value::Object(obj)
}

fn table_ref_json(project_id: &str, table: &TableRef) -> Value {
    json!({ "projectId": project_id, "datasetId": table.dataset_id, "tableId": table.table_id })
}

pub(crate) fn query_job_json(project_id: &str, job_id: &str, job: &QueryJob) -> Value {
    json!({
        "jobReference": { "projectId": project_id, "jobId": job_id },
        "configuration": {
            "query": {
                "query": job.sql,
                "useLegacySql": false,
                "useQueryCache": false,
                "destinationTable": table_ref_json(project_id, &job.destination),
                "writeDisposition": job.write_disposition.as_str(),
                "createDisposition": "CREATE_IF_NEEDED",
            }
        }
    })
}

pub(crate) fn copy_job_json(
    project_id: &str,
    job_id: &str,
    source: &TableRef,
    destination: &TableRef,
) -> Value {
    json!({
        "jobReference": { "projectId": project_id, "jobId": job_id },
        "configuration": {
            "copy": {
                "sourceTable": table_ref_json(project_id, source),
                "destinationTable": table_ref_json(project_id, destination),
                "createDisposition": "CREATE_IF_NEEDED",
                "writeDisposition": "WRITE_EMPTY",
            }
        }
    })
}

pub(crate) fn job_result_from_json(job_id: &str, value: &Value) -> JobResult {
    let status = value.get("status");
    let state = status
        .and_then(|s| str_field(s, "state"))
        .map(|s| JobState::parse(&s))
        .unwrap_or(JobState::Pending);
    let errors = status
        .and_then(|s| s.get("errorResult"))
        .map(|e| {
            let mut messages = vec![str_field(e, "message").unwrap_or_else(|| e.to_string())];
            let details = status
                .and_then(|s| s.get("errors"))
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|d| str_field(d, "message"));
            for detail in details {
                if !messages.contains(&detail) {
                    messages.push(detail);
                }
            }
            messages
        })
        .unwrap_or_default();
    JobResult {
        job_id: job_id.to_string(),
        state,
        errors,
    }
}

pub(crate) fn dataset_ids_from_list(value: &Value) -> Vec<String> {
    value
        .get("datasets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|d| d.get("datasetReference").and_then(|r| str_field(r, "datasetId")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelPatch;

    fn sample_table() -> Table {
        let mut t = Table::new("events").with_schema(Schema::from_fields(vec![
            SchemaField::new("id", FieldType::Int64).required(),
            SchemaField::record("payload", vec![SchemaField::new("kind", FieldType::String)]),
        ]));
        t.description = Some("raw events".into());
        t.partitioning_type = Some(PartitioningType::Day);
        t.expires = Utc.timestamp_millis_opt(1_900_000_000_000).single();
        t.labels = Some(Labels::from([("env".to_string(), "prod".to_string())]));
        t
    }

    #[test]
    fn test_table_json_shape() {
        let json = table_to_json("p", "ds", &sample_table());
        assert_eq!(json["tableReference"]["tableId"], "events");
        assert_eq!(json["timePartitioning"]["type"], "DAY");
        assert_eq!(json["expirationTime"], "1900000000000");
        assert_eq!(json["schema"]["fields"][1]["fields"][0]["name"], "kind");
        assert!(json.get("view").is_none());
    }

    #[test]
    fn test_table_from_remote_json() {
        let remote = json!({
            "tableReference": { "projectId": "p", "datasetId": "ds", "tableId": "events" },
            "expirationTime": "1900000000000",
            "timePartitioning": { "type": "DAY" },
            "schema": { "fields": [
                { "name": "id", "type": "INTEGER", "mode": "REQUIRED" },
                { "name": "payload", "type": "RECORD", "fields": [
                    { "name": "kind", "type": "STRING", "mode": "NULLABLE" }
                ]}
            ]},
            "description": "raw events",
            "labels": { "env": "prod" }
        });
        assert_eq!(table_from_json(&remote).unwrap(), sample_table());
    }

    #[test]
    fn test_unmapped_remote_type_is_described() {
        let remote = json!({ "name": "g", "type": "GEOGRAPHY" });
        let field = field_from_json(&remote).unwrap();
        assert_eq!(field.field_type, FieldType::Other("GEOGRAPHY".into()));
        assert_eq!(field_to_json(&field)["type"], "GEOGRAPHY");

        let nested = json!({ "name": "s", "type": "STRUCT", "fields": [{ "name": "x", "type": "NUMERIC" }] });
        assert_eq!(field_from_json(&nested).unwrap().field_type, FieldType::Record);
    }

    #[test]
    fn test_access_entries_roundtrip() {
        let mut ds = Dataset::new("ds");
        ds.access_entries = vec![
            AccessGrant::new("OWNER", "specialGroup", "projectOwners"),
            AccessGrant::view(ViewRef {
                dataset_id: "other".into(),
                project_id: "p".into(),
                table_id: "v".into(),
            }),
        ];
        let json = dataset_to_json("p", &ds);
        assert_eq!(json["access"][0]["specialGroup"], "projectOwners");
        assert_eq!(json["access"][1]["view"]["tableId"], "v");
        assert_eq!(dataset_from_json(&json).unwrap(), ds);
    }

    #[test]
    fn test_overlay_dataset_drops_removed_labels() {
        let current = json!({
            "datasetReference": { "projectId": "p", "datasetId": "ds" },
            "description": "keep me",
            "defaultPartitionExpirationMs": "1000",
            "labels": { "env": "dev", "team": "data" }
        });
        let mut desired = Dataset::new("ds");
        desired.description = Some("keep me".into());
        let update = DatasetUpdate {
            dataset: desired,
            fields: vec![DatasetField::Labels],
            labels: LabelPatch::from([
                ("env".to_string(), Some("prod".to_string())),
                ("team".to_string(), None),
            ]),
        };
        let next = overlay_dataset("p", current, &update);
        assert_eq!(next["labels"], json!({ "env": "prod" }));
        assert_eq!(next["defaultPartitionExpirationMs"], "1000");
        assert_eq!(next["description"], "keep me");
    }

    #[test]
    fn test_overlay_table_clears_unset_description() {
        let current = json!({
            "tableReference": { "projectId": "p", "datasetId": "ds", "tableId": "t" },
            "description": "old"
        });
        let update = TableUpdate {
            dataset_id: "ds".into(),
            table: Table::new("t"),
            fields: vec![TableField::Description],
            labels: LabelPatch::new(),
        };
        let next = overlay_table("p", current, &update);
        assert!(next.get("description").is_none());
    }

    #[test]
    fn test_query_job_json() {
        let job = QueryJob {
            sql: "SELECT cast(a AS STRING) AS a FROM `ds.t`".into(),
            destination: TableRef::new("ds", "t"),
            write_disposition: crate::store::WriteDisposition::WriteTruncate,
            result_schema: Schema::new(),
        };
        let json = query_job_json("p", "job_1", &job);
        let query = &json["configuration"]["query"];
        assert_eq!(query["writeDisposition"], "WRITE_TRUNCATE");
        assert_eq!(query["useLegacySql"], false);
        assert_eq!(query["useQueryCache"], false);
        assert_eq!(query["destinationTable"]["tableId"], "t");
    }

    #[test]
    fn test_job_result_error_result() {
        let json = json!({
            "status": {
                "state": "DONE",
                "errorResult": { "reason": "invalidQuery", "message": "Bad int64 value" },
                "errors": [
                    { "reason": "invalidQuery", "message": "Bad int64 value" },
                    { "reason": "invalid", "message": "at row 12" }
                ]
            }
        });
        let result = job_result_from_json("job_1", &json);
        assert!(result.is_done());
        assert_eq!(result.errors, vec!["Bad int64 value", "at row 12"]);
    }

    #[test]
    fn test_job_result_running() {
        let result = job_result_from_json("job_1", &json!({ "status": { "state": "RUNNING" } }));
        assert_eq!(result.state, JobState::Running);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_dataset_ids_from_list() {
        let json = json!({ "datasets": [
            { "datasetReference": { "projectId": "p", "datasetId": "a" } },
            { "datasetReference": { "projectId": "p", "datasetId": "b" } }
        ]});
        assert_eq!(dataset_ids_from_list(&json), vec!["a", "b"]);
    }
}
