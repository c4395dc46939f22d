mod access;
mod dataset;
mod table;

use std::collections::BTreeMap;

pub use access::{AccessGrant, EntityId, ViewRef};
pub use dataset::{Dataset, DatasetField};
pub use table::{Table, TableField};

pub type Labels = BTreeMap<String, String>;

/// Label changes for one update call. `None` values mark keys to remove.
pub type LabelPatch = BTreeMap<String, Option<String>>;

/// A value with a stable identity key used to pair it with its remote counterpart.
pub trait Resource: Clone + PartialEq {
    fn identity(&self) -> &str;
}

/// Labels to send so the remote ends up with exactly `desired`.
///
/// Keys only present in `actual` are carried as removals. A `desired` of
/// `None` leaves labels untouched.
pub fn label_patch(actual: Option<&Labels>, desired: Option<&Labels>) -> LabelPatch {
    let Some(desired) = desired else {
        return LabelPatch::new();
    };
    let mut patch: LabelPatch = desired
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect();
    if let Some(actual) = actual {
        for key in actual.keys().filter(|k| !desired.contains_key(*k)) {
            patch.insert(key.clone(), None);
        }
    }
    patch
}

/// Apply a patch to a label map: `Some` sets, `None` removes.
pub fn apply_label_patch(labels: &mut Labels, patch: &LabelPatch) {
    for (key, value) in patch {
        match value {
            Some(v) => {
                labels.insert(key.clone(), v.clone());
            }
            None => {
                labels.remove(key);
            }
        }
    }
}

pub(crate) fn labels_key(labels: &Option<Labels>) -> Option<&Labels> {
    labels.as_ref().filter(|l| !l.is_empty())
}
