use serde::{Deserialize, Serialize};

/// One entry of a dataset's access list.
///
/// Grants compare by their `(role, entity_type, entity_id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(default)]
    pub role: Option<String>,
    pub entity_type: String,
    pub entity_id: EntityId,
}

/// Grantee: an opaque id (email, domain, special group) or an authorized view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    View(ViewRef),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRef {
    pub dataset_id: String,
    pub project_id: String,
    pub table_id: String,
}

impl AccessGrant {
    pub fn new(role: impl Into<String>, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            entity_type: entity_type.into(),
            entity_id: EntityId::Id(entity_id.into()),
        }
    }

    pub fn view(view: ViewRef) -> Self {
        Self {
            role: None,
            entity_type: "view".to_string(),
            entity_id: EntityId::View(view),
        }
    }
}

/// Canonical set form of an access list: sorted, duplicates removed.
pub(crate) fn canonical_grants(grants: &[AccessGrant]) -> Vec<&AccessGrant> {
    let mut sorted: Vec<&AccessGrant> = grants.iter().collect();
    sorted.sort();
    sorted.dedup();
    sorted
}
