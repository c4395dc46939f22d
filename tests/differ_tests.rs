use std::collections::BTreeSet;

use bqdm::diff::{add, change, destroy, intersection};
use bqdm::model::{AccessGrant, Dataset, Labels, Table};
use bqdm::schema::{FieldType, Schema, SchemaField};

fn dataset(id: &str, description: Option<&str>) -> Dataset {
    let mut ds = Dataset::new(id);
    ds.description = description.map(str::to_string);
    ds
}

fn ids<'a>(items: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    items.into_iter().map(str::to_string).collect()
}

#[test]
fn test_added_access_entry_is_one_change() {
    let owner = AccessGrant::new("OWNER", "specialGroup", "projectOwners");
    let reader = AccessGrant::new("READER", "groupByEmail", "analysts@example.com");

    let mut remote = Dataset::new("sales");
    remote.access_entries = vec![owner.clone()];
    let mut declared = remote.clone();
    declared.access_entries = vec![reader, owner];

    let actual = vec![remote];
    let desired = vec![declared.clone()];
    let changed = change(&actual, &desired);
    assert_eq!(changed.count, 1);
    assert_eq!(changed.items, vec![declared]);
    assert!(add(&actual, &desired).is_empty());
    assert!(destroy(&actual, &desired).is_empty());
}

#[test]
fn test_access_entry_order_is_not_a_change() {
    let a = AccessGrant::new("OWNER", "specialGroup", "projectOwners");
    let b = AccessGrant::new("READER", "specialGroup", "projectReaders");

    let mut remote = Dataset::new("sales");
    remote.access_entries = vec![a.clone(), b.clone()];
    let mut declared = Dataset::new("sales");
    declared.access_entries = vec![b, a];

    assert!(change(&[remote], &[declared]).is_empty());
}

#[test]
fn test_missing_and_empty_labels_are_equal() {
    let remote = Dataset::new("sales");
    let mut declared = Dataset::new("sales");
    declared.labels = Some(Labels::new());
    assert!(change(&[remote], &[declared]).is_empty());
}

#[test]
fn test_partition_of_identities() {
    let actual = vec![
        dataset("kept", Some("same")),
        dataset("edited", Some("before")),
        dataset("gone", None),
    ];
    let desired = vec![
        dataset("kept", Some("same")),
        dataset("edited", Some("after")),
        dataset("new", None),
    ];

    let added = add(&actual, &desired);
    let changed = change(&actual, &desired);
    let destroyed = destroy(&actual, &desired);

    assert_eq!(ids(added.identities()), ids(["new"]));
    assert_eq!(ids(changed.identities()), ids(["edited"]));
    assert_eq!(ids(destroyed.identities()), ids(["gone"]));
    assert_eq!(destroyed.items, vec![dataset("gone", None)]);

    let touched: BTreeSet<String> = added
        .identities()
        .into_iter()
        .chain(changed.identities())
        .chain(destroyed.identities())
        .map(str::to_string)
        .collect();
    assert_eq!(touched.len(), added.count + changed.count + destroyed.count);
    assert!(!touched.contains("kept"));
}

#[test]
fn test_applying_the_diff_converges() {
    let actual = vec![dataset("a", Some("1")), dataset("b", None), dataset("c", None)];
    let desired = vec![dataset("a", Some("2")), dataset("d", None)];

    let mut next: Vec<Dataset> = actual
        .iter()
        .filter(|ds| destroy(&actual, &desired).items.iter().all(|d| d.dataset_id != ds.dataset_id))
        .cloned()
        .collect();
    for changed in change(&actual, &desired).items {
        if let Some(slot) = next.iter_mut().find(|ds| ds.dataset_id == changed.dataset_id) {
            *slot = changed;
        }
    }
    next.extend(add(&actual, &desired).items);

    assert!(add(&next, &desired).is_empty());
    assert!(change(&next, &desired).is_empty());
    assert!(destroy(&next, &desired).is_empty());
}

#[test]
fn test_schema_field_order_is_not_a_table_change() {
    let remote = Table::new("orders").with_schema(Schema::from_fields(vec![
        SchemaField::new("id", FieldType::Int64),
        SchemaField::new("amount", FieldType::Float64),
    ]));
    let declared = Table::new("orders").with_schema(Schema::from_fields(vec![
        SchemaField::new("amount", FieldType::Float64),
        SchemaField::new("id", FieldType::Int64),
    ]));
    assert!(change(&[remote], &[declared]).is_empty());
}

#[test]
fn test_intersection_names_declared_remote_tables() {
    let remote = vec![Table::new("orders"), Table::new("scratch")];
    let declared = vec![Table::new("orders"), Table::new("planned")];
    let doomed = intersection(&remote, &declared);
    assert_eq!(doomed.identities(), vec!["orders"]);
}
