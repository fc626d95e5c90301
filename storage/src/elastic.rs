//! Elasticsearch-style HTTP adapter for the three vector indexes
//! (`entity_vectors`, `event_vectors`, `source_chunks`).
//!
//! Queries are plain `_search` bodies: KNN with `num_candidates = k * 10`,
//! term/terms scope filters, and the routing key set to the scope id when
//! exactly one scope is requested.

use crate::relational::RelationalStore;
use crate::types::{ChunkDoc, ChunkHit, EntityHit, EventDoc, EventHit, StorageError};
use crate::vector::{ChunkVectorStore, EntityVectorStore, EventVectorStore};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const ENTITY_INDEX: &str = "entity_vectors";
const EVENT_INDEX: &str = "event_vectors";
const CHUNK_INDEX: &str = "source_chunks";
const DEFAULT_TYPE_THRESHOLD: f32 = 0.800;

pub struct EsVectorStore {
    client: reqwest::Client,
    base_url: String,
    /// Type thresholds live in the relational store; the entity search
    /// joins them onto hits when asked to.
    relational: Arc<dyn RelationalStore>,
}

impl EsVectorStore {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        pool_size: usize,
        relational: Arc<dyn RelationalStore>,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            relational,
        })
    }

    fn scope_filter(source_config_ids: &[String], extra: Option<Value>) -> Option<Value> {
        let mut must = Vec::new();
        match source_config_ids.len() {
            0 => {}
            1 => must.push(json!({"term": {"source_config_id": source_config_ids[0]}})),
            _ => must.push(json!({"terms": {"source_config_id": source_config_ids}})),
        }
        if let Some(extra) = extra {
            must.push(extra);
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({"bool": {"must": must}}))
        }
    }

    fn routing(source_config_ids: &[String]) -> Option<&str> {
        if source_config_ids.len() == 1 {
            Some(source_config_ids[0].as_str())
        } else {
            None
        }
    }

    async fn search(
        &self,
        index: &str,
        body: Value,
        routing: Option<&str>,
    ) -> Result<Vec<(f32, Value)>, StorageError> {
        let mut url = format!("{}/{}/_search", self.base_url, index);
        if let Some(routing) = routing {
            url = format!("{url}?routing={routing}");
        }

        tracing::debug!(index, routing = ?routing, "vector store search");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::Vector(format!("status {}: {}", status, text)));
        }

        let payload: Value = response.json().await?;
        let hits = payload["hits"]["hits"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .into_iter()
            .map(|hit| {
                let score = hit["_score"].as_f64().unwrap_or(0.0) as f32;
                (score, hit["_source"].clone())
            })
            .collect())
    }

    async fn knn_search(
        &self,
        index: &str,
        field: &str,
        vector: &[f32],
        k: usize,
        filter: Option<Value>,
        routing: Option<&str>,
    ) -> Result<Vec<(f32, Value)>, StorageError> {
        let mut knn = json!({
            "field": field,
            "query_vector": vector,
            "k": k,
            "num_candidates": k * 10,
        });
        if let Some(filter) = filter {
            knn["filter"] = filter;
        }

        self.search(index, json!({"knn": knn, "size": k}), routing)
            .await
    }

    fn vector_field(source: &Value, field: &str) -> Option<Vec<f32>> {
        source[field].as_array().map(|values| {
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect()
        })
    }

    fn str_field(source: &Value, field: &str) -> String {
        source[field].as_str().unwrap_or("").to_string()
    }
}

#[async_trait]
impl EntityVectorStore for EsVectorStore {
    async fn search_similar(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
        entity_type: Option<&str>,
        include_type_threshold: bool,
    ) -> Result<Vec<EntityHit>, StorageError> {
        let type_filter = entity_type.map(|t| json!({"term": {"type": t}}));
        let filter = Self::scope_filter(source_config_ids, type_filter);
        let routing = Self::routing(source_config_ids);

        let hits = self
            .knn_search(ENTITY_INDEX, "vector", vector, k, filter, routing)
            .await?;

        let thresholds = if include_type_threshold {
            Some(
                self.relational
                    .entity_type_thresholds(source_config_ids)
                    .await?,
            )
        } else {
            None
        };

        Ok(hits
            .into_iter()
            .filter_map(|(score, source)| {
                let entity_id = Self::str_field(&source, "entity_id");
                if entity_id.is_empty() {
                    return None;
                }
                let entity_type = Self::str_field(&source, "type");
                let type_threshold = thresholds.as_ref().map(|map| {
                    map.get(&entity_type)
                        .copied()
                        .unwrap_or(DEFAULT_TYPE_THRESHOLD)
                });
                Some(EntityHit {
                    entity_id,
                    name: Self::str_field(&source, "name"),
                    entity_type,
                    score,
                    type_threshold,
                })
            })
            .collect())
    }
}

#[async_trait]
impl EventVectorStore for EsVectorStore {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<EventHit>, StorageError> {
        let filter = Self::scope_filter(source_config_ids, None);
        let routing = Self::routing(source_config_ids);

        let hits = self
            .knn_search(EVENT_INDEX, "content_vector", vector, k, filter, routing)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(score, source)| {
                let event_id = Self::str_field(&source, "event_id");
                if event_id.is_empty() {
                    return None;
                }
                Some(EventHit {
                    event_id,
                    title: Self::str_field(&source, "title"),
                    summary: Self::str_field(&source, "summary"),
                    score,
                })
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
        let category_filter = category.map(|c| json!({"term": {"category": c}}));
        let filter = Self::scope_filter(source_config_ids, category_filter);
        let routing = Self::routing(source_config_ids);

        let hits = self
            .knn_search(EVENT_INDEX, "title_vector", vector, k, filter, routing)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(score, source)| {
                let event_id = Self::str_field(&source, "event_id");
                if event_id.is_empty() {
                    return None;
                }
                Some(EventHit {
                    event_id,
                    title: Self::str_field(&source, "title"),
                    summary: Self::str_field(&source, "summary"),
                    score,
                })
            })
            .collect())
    }

    async fn get_events_by_ids(&self, event_ids: &[String]) -> Result<Vec<EventDoc>, StorageError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "query": {"terms": {"event_id": event_ids}},
            "size": event_ids.len(),
        });
        let hits = self.search(EVENT_INDEX, body, None).await?;

        Ok(hits
            .into_iter()
            .filter_map(|(_, source)| {
                let event_id = Self::str_field(&source, "event_id");
                if event_id.is_empty() {
                    tracing::warn!("event document without event_id dropped");
                    return None;
                }
                Some(EventDoc {
                    event_id,
                    title: Self::str_field(&source, "title"),
                    summary: Self::str_field(&source, "summary"),
                    content: Self::str_field(&source, "content"),
                    category: Self::str_field(&source, "category"),
                    title_vector: Self::vector_field(&source, "title_vector"),
                    content_vector: Self::vector_field(&source, "content_vector"),
                })
            })
            .collect())
    }
}

#[async_trait]
impl ChunkVectorStore for EsVectorStore {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<ChunkHit>, StorageError> {
        let filter = Self::scope_filter(source_config_ids, None);
        let routing = Self::routing(source_config_ids);

        let hits = self
            .knn_search(CHUNK_INDEX, "content_vector", vector, k, filter, routing)
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(score, source)| {
                let chunk_id = Self::str_field(&source, "chunk_id");
                if chunk_id.is_empty() {
                    return None;
                }
                Some(ChunkHit {
                    chunk_id,
                    heading: Self::str_field(&source, "heading"),
                    score,
                })
            })
            .collect())
    }

    async fn get_chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<ChunkDoc>, StorageError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "query": {"terms": {"chunk_id": chunk_ids}},
            "size": chunk_ids.len(),
        });
        let hits = self.search(CHUNK_INDEX, body, None).await?;

        Ok(hits
            .into_iter()
            .filter_map(|(_, source)| {
                let chunk_id = Self::str_field(&source, "chunk_id");
                if chunk_id.is_empty() {
                    return None;
                }
                Some(ChunkDoc {
                    chunk_id,
                    heading: Self::str_field(&source, "heading"),
                    content: Self::str_field(&source, "content"),
                    content_vector: Self::vector_field(&source, "content_vector"),
                })
            })
            .collect())
    }
}
