use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("vector store error: {0}")]
    Vector(String),
    #[error("relational store error: {0}")]
    Relational(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Vector(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Relational(err.to_string())
    }
}

/// KNN hit from the entity vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHit {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
    pub score: f32,
    /// Per-type similarity threshold, populated on request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_threshold: Option<f32>,
}

/// KNN hit from the event vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHit {
    pub event_id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub score: f32,
}

/// Full event document from the vector store, vectors included.
/// Either vector may be absent; callers drop what they cannot score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDoc {
    pub event_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_vector: Option<Vec<f32>>,
}

/// KNN hit from the chunk vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    #[serde(default)]
    pub heading: String,
    pub score: f32,
}

/// Full chunk document from the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDoc {
    pub chunk_id: String,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_vector: Option<Vec<f32>>,
}

/// One row of the event↔entity join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEventLink {
    pub entity_id: String,
    pub event_id: String,
    pub weight: f32,
}
