use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of an event: extracted from a document or a chat window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Article,
    Chat,
}

/// Typed value attached to an entity (e.g. a price or a date extracted
/// alongside the entity name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Enum(String),
    Raw(String),
}

/// A typed noun drawn from a document.
///
/// `(source_config_id, entity_type, normalized_name)` is unique within a
/// corpus scope; `normalized_name` is lowercased and trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub source_config_id: String,
    pub entity_type: String,
    pub name: String,
    pub normalized_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TypedValue>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        source_config_id: impl Into<String>,
        entity_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let normalized_name = normalize_name(&name);
        Self {
            id: id.into(),
            source_config_id: source_config_id.into(),
            entity_type: entity_type.into(),
            name,
            normalized_name,
            description: String::new(),
            value: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Definition of an entity type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub type_tag: String,
    pub name: String,
    pub weight: f32,
    pub similarity_threshold: f32,
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_config_id: Option<String>,
}

impl EntityType {
    fn default_type(type_tag: &str, name: &str, weight: f32, similarity_threshold: f32) -> Self {
        Self {
            type_tag: type_tag.to_string(),
            name: name.to_string(),
            weight,
            similarity_threshold,
            is_default: true,
            source_config_id: None,
        }
    }
}

/// System default entity types in their fixed order.
///
/// Base dimensions (weight 1.0) cover the who/where/when of an event,
/// the core dimensions (action, topic) weigh more, and `tags` is the
/// low-weight catch-all for everything without a dedicated dimension.
/// Per-type similarity thresholds reflect how exact a match must be:
/// times and person names need near-exact vectors, topics are loose.
pub fn default_entity_types() -> Vec<EntityType> {
    vec![
        EntityType::default_type("time", "Time", 1.0, 0.900),
        EntityType::default_type("location", "Location", 1.0, 0.750),
        EntityType::default_type("person", "Person", 1.0, 0.950),
        EntityType::default_type("action", "Action", 1.5, 0.800),
        EntityType::default_type("topic", "Topic", 1.8, 0.600),
        EntityType::default_type("tags", "Tags", 0.5, 0.700),
    ]
}

/// An extracted fact: the unit the pipeline ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub source_config_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Event {
    /// The text used wherever an event is matched against entity names
    /// or measured for content richness.
    pub fn full_text(&self) -> String {
        format!("{} {} {}", self.title, self.summary, self.content)
    }
}

/// Many-to-many link between an event and an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntity {
    pub event_id: String,
    pub entity_id: String,
    #[serde(default = "default_link_weight")]
    pub weight: f32,
}

fn default_link_weight() -> f32 {
    1.0
}

impl EventEntity {
    pub fn new(event_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            entity_id: entity_id.into(),
            weight: 1.0,
        }
    }
}

/// A contiguous text span from a document or chat window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub source_config_id: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub heading: String,
    pub content: String,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Chunk {
    pub fn full_text(&self) -> String {
        format!("{} {}", self.heading, self.content)
    }
}
