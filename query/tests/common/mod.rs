//! Shared fixtures: an embedder with hand-picked vectors, seeded in-memory
//! stores, and record builders.

#![allow(dead_code)]

use async_trait::async_trait;
use eventlens_core::model::{Chunk, Entity, Event, SourceType};
use query::SearchBackend;
use slm::{AiError, ChatClient, EmbeddingClient};
use std::collections::HashMap;
use std::sync::Arc;
use storage::MemoryStore;

pub const SCOPE: &str = "scope-1";

/// Embedder that returns pre-registered vectors so tests control every
/// similarity exactly; unknown texts embed to the zero vector.
pub struct FixedEmbedder {
    model_id: String,
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self::named("fixed-test-embedder", dims)
    }

    pub fn named(model_id: &str, dims: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            dims,
            vectors: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    fn lookup(&self, text: &str) -> Vec<f32> {
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dims])
    }
}

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn generate(&self, text: &str) -> Result<Vec<f32>, AiError> {
        Ok(self.lookup(text))
    }

    async fn batch_generate(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Ok(texts.iter().map(|text| self.lookup(text)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

pub fn backend(
    store: Arc<MemoryStore>,
    chat: Arc<dyn ChatClient>,
    embedder: FixedEmbedder,
) -> SearchBackend {
    SearchBackend::from_memory_store(store, chat, Arc::new(embedder))
}

pub fn entity(id: &str, entity_type: &str, name: &str) -> Entity {
    Entity::new(id, SCOPE, entity_type, name)
}

pub fn event(id: &str, title: &str, summary: &str, content: &str) -> Event {
    Event {
        id: id.to_string(),
        source_config_id: SCOPE.to_string(),
        source_type: SourceType::Article,
        source_id: "article-1".to_string(),
        chunk_id: None,
        title: title.to_string(),
        summary: summary.to_string(),
        content: content.to_string(),
        category: String::new(),
        rank: 0,
        start_time: None,
        end_time: None,
        references: Vec::new(),
    }
}

pub fn event_in_chunk(id: &str, title: &str, content: &str, chunk_id: &str) -> Event {
    let mut out = event(id, title, "", content);
    out.chunk_id = Some(chunk_id.to_string());
    out
}

pub fn chunk(id: &str, heading: &str, content: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        source_id: "article-1".to_string(),
        source_config_id: SCOPE.to_string(),
        rank: 0,
        heading: heading.to_string(),
        content: content.to_string(),
        references: Vec::new(),
    }
}

/// Unit axis vector of the fixture dimensionality (4).
pub fn axis(index: usize) -> Vec<f32> {
    let mut out = vec![0.0; 4];
    out[index] = 1.0;
    out
}
