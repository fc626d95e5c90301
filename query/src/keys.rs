use serde::{Deserialize, Serialize};

/// Entity that seeded the discovery of a child entity during expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentEntity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub hop: u32,
}

/// Weighted entity flowing between pipeline stages (`key_final` element).
///
/// `steps` holds the single global step at which the entity was first
/// discovered: 1 for recall, 2 for expand hop 1, and so on. `hop` is 0 for
/// recall entities and the hop number for expanded ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEntity {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    pub weight: f32,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<u32>,
    #[serde(default)]
    pub hop: u32,
    /// Recall similarity against the query, when the entity was recalled
    /// directly (expansion discoveries have none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_entity: Option<ParentEntity>,
}

impl KeyEntity {
    pub fn recalled(
        entity_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
        weight: f32,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            weight,
            description: String::new(),
            steps: vec![1],
            hop: 0,
            similarity: None,
            parent_entity: None,
        }
    }
}

/// Step-1 recall candidate: an entity hit that survived its threshold gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledEntity {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    pub similarity: f32,
    /// The extracted attribute (or raw query, in fast mode) that produced
    /// this hit.
    pub source_attribute: String,
    pub type_threshold: f32,
    pub final_threshold: f32,
}

/// Event matched against the query by vector similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMatch {
    pub event_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub similarity: f32,
}
