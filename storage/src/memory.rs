//! In-memory reference implementation of every store contract.
//!
//! Linear-scan cosine KNN with term filtering, deterministic ordering
//! (stable sort, insertion order breaks ties). Backs the test suites and
//! doubles as a zero-dependency local mode.

use crate::relational::RelationalStore;
use crate::types::{ChunkDoc, ChunkHit, EntityEventLink, EntityHit, EventDoc, EventHit, StorageError};
use crate::vector::{ChunkVectorStore, EntityVectorStore, EventVectorStore};
use async_trait::async_trait;
use eventlens_core::model::{default_entity_types, Chunk, Entity, Event, EventEntity};
use eventlens_core::similarity::cosine;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

struct EntityRecord {
    entity: Entity,
    vector: Option<Vec<f32>>,
}

struct EventRecord {
    event: Event,
    title_vector: Option<Vec<f32>>,
    content_vector: Option<Vec<f32>>,
}

struct ChunkRecord {
    chunk: Chunk,
    content_vector: Option<Vec<f32>>,
}

#[derive(Default)]
struct Inner {
    entities: Vec<EntityRecord>,
    events: Vec<EventRecord>,
    chunks: Vec<ChunkRecord>,
    links: Vec<EventEntity>,
    type_thresholds: HashMap<String, f32>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut type_thresholds = HashMap::new();
        for entity_type in default_entity_types() {
            type_thresholds.insert(entity_type.type_tag, entity_type.similarity_threshold);
        }

        Self {
            inner: RwLock::new(Inner {
                type_thresholds,
                ..Inner::default()
            }),
        }
    }

    pub async fn put_entity(&self, entity: Entity, vector: Option<Vec<f32>>) {
        let mut inner = self.inner.write().await;
        inner.entities.push(EntityRecord { entity, vector });
    }

    pub async fn put_event(
        &self,
        event: Event,
        title_vector: Option<Vec<f32>>,
        content_vector: Option<Vec<f32>>,
    ) {
        let mut inner = self.inner.write().await;
        inner.events.push(EventRecord {
            event,
            title_vector,
            content_vector,
        });
    }

    pub async fn put_chunk(&self, chunk: Chunk, content_vector: Option<Vec<f32>>) {
        let mut inner = self.inner.write().await;
        inner.chunks.push(ChunkRecord {
            chunk,
            content_vector,
        });
    }

    pub async fn link(&self, event_id: &str, entity_id: &str, weight: f32) {
        let mut inner = self.inner.write().await;
        inner.links.push(EventEntity {
            event_id: event_id.to_string(),
            entity_id: entity_id.to_string(),
            weight,
        });
    }

    pub async fn set_type_threshold(&self, type_tag: &str, threshold: f32) {
        let mut inner = self.inner.write().await;
        inner.type_thresholds.insert(type_tag.to_string(), threshold);
    }
}

fn in_scope(source_config_id: &str, scope: &[String]) -> bool {
    scope.is_empty() || scope.iter().any(|id| id == source_config_id)
}

fn sort_hits_desc<T>(hits: &mut [(f32, T)]) {
    // Stable sort keeps insertion order on score ties.
    hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
}

#[async_trait]
impl EntityVectorStore for MemoryStore {
    async fn search_similar(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
        entity_type: Option<&str>,
        include_type_threshold: bool,
    ) -> Result<Vec<EntityHit>, StorageError> {
        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &EntityRecord)> = inner
            .entities
            .iter()
            .filter(|record| in_scope(&record.entity.source_config_id, source_config_ids))
            .filter(|record| {
                entity_type.is_none_or(|t| record.entity.entity_type == t)
            })
            .filter_map(|record| {
                record
                    .vector
                    .as_ref()
                    .map(|v| (cosine(vector, v), record))
            })
            .collect();

        sort_hits_desc(&mut scored);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| EntityHit {
                entity_id: record.entity.id.clone(),
                name: record.entity.name.clone(),
                entity_type: record.entity.entity_type.clone(),
                score,
                type_threshold: include_type_threshold
                    .then(|| {
                        inner
                            .type_thresholds
                            .get(&record.entity.entity_type)
                            .copied()
                            .unwrap_or(0.800)
                    }),
            })
            .collect())
    }
}

#[async_trait]
impl EventVectorStore for MemoryStore {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<EventHit>, StorageError> {
        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &EventRecord)> = inner
            .events
            .iter()
            .filter(|record| in_scope(&record.event.source_config_id, source_config_ids))
            .filter_map(|record| {
                record
                    .content_vector
                    .as_ref()
                    .map(|v| (cosine(vector, v), record))
            })
            .collect();

        sort_hits_desc(&mut scored);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| EventHit {
                event_id: record.event.id.clone(),
                title: record.event.title.clone(),
                summary: record.event.summary.clone(),
                score,
            })
            .collect())
    }

    async fn search_similar_by_title(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
        category: Option<&str>,
    ) -> Result<Vec<EventHit>, StorageError> {
        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &EventRecord)> = inner
            .events
            .iter()
            .filter(|record| in_scope(&record.event.source_config_id, source_config_ids))
            .filter(|record| category.is_none_or(|c| record.event.category == c))
            .filter_map(|record| {
                record
                    .title_vector
                    .as_ref()
                    .map(|v| (cosine(vector, v), record))
            })
            .collect();

        sort_hits_desc(&mut scored);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| EventHit {
                event_id: record.event.id.clone(),
                title: record.event.title.clone(),
                summary: record.event.summary.clone(),
                score,
            })
            .collect())
    }

    async fn get_events_by_ids(&self, event_ids: &[String]) -> Result<Vec<EventDoc>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = event_ids.iter().map(String::as_str).collect();

        Ok(inner
            .events
            .iter()
            .filter(|record| wanted.contains(record.event.id.as_str()))
            .map(|record| EventDoc {
                event_id: record.event.id.clone(),
                title: record.event.title.clone(),
                summary: record.event.summary.clone(),
                content: record.event.content.clone(),
                category: record.event.category.clone(),
                title_vector: record.title_vector.clone(),
                content_vector: record.content_vector.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ChunkVectorStore for MemoryStore {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<ChunkHit>, StorageError> {
        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &ChunkRecord)> = inner
            .chunks
            .iter()
            .filter(|record| in_scope(&record.chunk.source_config_id, source_config_ids))
            .filter_map(|record| {
                record
                    .content_vector
                    .as_ref()
                    .map(|v| (cosine(vector, v), record))
            })
            .collect();

        sort_hits_desc(&mut scored);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| ChunkHit {
                chunk_id: record.chunk.id.clone(),
                heading: record.chunk.heading.clone(),
                score,
            })
            .collect())
    }

    async fn get_chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<ChunkDoc>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();

        Ok(inner
            .chunks
            .iter()
            .filter(|record| wanted.contains(record.chunk.id.as_str()))
            .map(|record| ChunkDoc {
                chunk_id: record.chunk.id.clone(),
                heading: record.chunk.heading.clone(),
                content: record.chunk.content.clone(),
                content_vector: record.content_vector.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn links_for_entities(
        &self,
        entity_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();

        let scoped_events: HashSet<&str> = inner
            .events
            .iter()
            .filter(|record| in_scope(&record.event.source_config_id, source_config_ids))
            .map(|record| record.event.id.as_str())
            .collect();

        Ok(inner
            .links
            .iter()
            .filter(|link| wanted.contains(link.entity_id.as_str()))
            .filter(|link| scoped_events.contains(link.event_id.as_str()))
            .map(|link| EntityEventLink {
                entity_id: link.entity_id.clone(),
                event_id: link.event_id.clone(),
                weight: link.weight,
            })
            .collect())
    }

    async fn links_for_events(
        &self,
        event_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = event_ids.iter().map(String::as_str).collect();

        Ok(inner
            .links
            .iter()
            .filter(|link| wanted.contains(link.event_id.as_str()))
            .map(|link| EntityEventLink {
                entity_id: link.entity_id.clone(),
                event_id: link.event_id.clone(),
                weight: link.weight,
            })
            .collect())
    }

    async fn get_events(
        &self,
        event_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Event>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = event_ids.iter().map(String::as_str).collect();

        Ok(inner
            .events
            .iter()
            .filter(|record| wanted.contains(record.event.id.as_str()))
            .filter(|record| in_scope(&record.event.source_config_id, source_config_ids))
            .map(|record| record.event.clone())
            .collect())
    }

    async fn get_entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();

        Ok(inner
            .entities
            .iter()
            .filter(|record| wanted.contains(record.entity.id.as_str()))
            .map(|record| record.entity.clone())
            .collect())
    }

    async fn get_chunks(
        &self,
        chunk_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Chunk>, StorageError> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();

        Ok(inner
            .chunks
            .iter()
            .filter(|record| wanted.contains(record.chunk.id.as_str()))
            .filter(|record| in_scope(&record.chunk.source_config_id, source_config_ids))
            .map(|record| record.chunk.clone())
            .collect())
    }

    async fn entity_type_thresholds(
        &self,
        _source_config_ids: &[String],
    ) -> Result<HashMap<String, f32>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.type_thresholds.clone())
    }
}
