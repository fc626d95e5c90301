//! Postgres adapter for the relational store.
//!
//! Read-only over `entity`, `entity_type`, `event_entity`, `source_event`
//! and `source_chunk`. Batch filters use `= ANY($n)`; empty id lists short
//! circuit without touching the pool.

use crate::relational::RelationalStore;
use crate::types::{EntityEventLink, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventlens_core::model::{Chunk, Entity, Event, SourceType};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

pub struct PgRelationalStore {
    pool: PgPool,
}

impl PgRelationalStore {
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_source_type(raw: &str) -> SourceType {
    match raw {
        "CHAT" => SourceType::Chat,
        _ => SourceType::Article,
    }
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    async fn links_for_entities(
        &self,
        entity_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(entities = entity_ids.len(), "links_for_entities");

        let rows = sqlx::query(
            "SELECT ee.entity_id, ee.event_id, ee.weight \
             FROM event_entity ee \
             JOIN source_event se ON se.id = ee.event_id \
             WHERE ee.entity_id = ANY($1) \
               AND (cardinality($2::text[]) = 0 OR se.source_config_id = ANY($2))",
        )
        .bind(entity_ids)
        .bind(source_config_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EntityEventLink {
                    entity_id: row.try_get("entity_id")?,
                    event_id: row.try_get("event_id")?,
                    weight: row.try_get::<Option<f32>, _>("weight")?.unwrap_or(1.0),
                })
            })
            .collect()
    }

    async fn links_for_events(
        &self,
        event_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(events = event_ids.len(), "links_for_events");

        let rows = sqlx::query(
            "SELECT entity_id, event_id, weight FROM event_entity WHERE event_id = ANY($1)",
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EntityEventLink {
                    entity_id: row.try_get("entity_id")?,
                    event_id: row.try_get("event_id")?,
                    weight: row.try_get::<Option<f32>, _>("weight")?.unwrap_or(1.0),
                })
            })
            .collect()
    }

    async fn get_events(
        &self,
        event_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Event>, StorageError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(events = event_ids.len(), "get_events");

        let rows = sqlx::query(
            "SELECT id, source_config_id, source_type, source_id, chunk_id, title, \
                    summary, content, category, rank, start_time, end_time, \
                    \"references\" AS references_json \
             FROM source_event \
             WHERE id = ANY($1) \
               AND (cardinality($2::text[]) = 0 OR source_config_id = ANY($2))",
        )
        .bind(event_ids)
        .bind(source_config_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let source_type: String = row.try_get("source_type")?;
                let references: Option<sqlx::types::Json<Vec<String>>> =
                    row.try_get("references_json")?;
                Ok(Event {
                    id: row.try_get("id")?,
                    source_config_id: row.try_get("source_config_id")?,
                    source_type: parse_source_type(&source_type),
                    source_id: row.try_get("source_id")?,
                    chunk_id: row.try_get("chunk_id")?,
                    title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
                    summary: row
                        .try_get::<Option<String>, _>("summary")?
                        .unwrap_or_default(),
                    content: row
                        .try_get::<Option<String>, _>("content")?
                        .unwrap_or_default(),
                    category: row
                        .try_get::<Option<String>, _>("category")?
                        .unwrap_or_default(),
                    rank: row.try_get::<Option<i32>, _>("rank")?.unwrap_or(0) as u32,
                    start_time: row.try_get::<Option<DateTime<Utc>>, _>("start_time")?,
                    end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
                    references: references.map(|json| json.0).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn get_entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>, StorageError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(entities = entity_ids.len(), "get_entities");

        let rows = sqlx::query(
            "SELECT id, source_config_id, type, name, normalized_name, description \
             FROM entity WHERE id = ANY($1)",
        )
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Entity {
                    id: row.try_get("id")?,
                    source_config_id: row.try_get("source_config_id")?,
                    entity_type: row.try_get("type")?,
                    name: row.try_get("name")?,
                    normalized_name: row.try_get("normalized_name")?,
                    description: row
                        .try_get::<Option<String>, _>("description")?
                        .unwrap_or_default(),
                    value: None,
                })
            })
            .collect()
    }

    async fn get_chunks(
        &self,
        chunk_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Chunk>, StorageError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(chunks = chunk_ids.len(), "get_chunks");

        let rows = sqlx::query(
            "SELECT id, source_id, source_config_id, rank, heading, content, \
                    \"references\" AS references_json \
             FROM source_chunk \
             WHERE id = ANY($1) \
               AND (cardinality($2::text[]) = 0 OR source_config_id = ANY($2)) \
             ORDER BY rank",
        )
        .bind(chunk_ids)
        .bind(source_config_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let references: Option<sqlx::types::Json<Vec<String>>> =
                    row.try_get("references_json")?;
                Ok(Chunk {
                    id: row.try_get("id")?,
                    source_id: row.try_get("source_id")?,
                    source_config_id: row.try_get("source_config_id")?,
                    rank: row.try_get::<Option<i32>, _>("rank")?.unwrap_or(0) as u32,
                    heading: row
                        .try_get::<Option<String>, _>("heading")?
                        .unwrap_or_default(),
                    content: row
                        .try_get::<Option<String>, _>("content")?
                        .unwrap_or_default(),
                    references: references.map(|json| json.0).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn entity_type_thresholds(
        &self,
        source_config_ids: &[String],
    ) -> Result<HashMap<String, f32>, StorageError> {
        let rows = sqlx::query(
            "SELECT type, similarity_threshold, source_config_id \
             FROM entity_type \
             WHERE is_active \
               AND (source_config_id IS NULL \
                    OR (cardinality($1::text[]) > 0 AND source_config_id = ANY($1))) \
             ORDER BY source_config_id NULLS FIRST",
        )
        .bind(source_config_ids)
        .fetch_all(&self.pool)
        .await?;

        // Scope-specific rows come last and overwrite the system defaults.
        let mut thresholds = HashMap::new();
        for row in &rows {
            let type_tag: String = row.try_get("type")?;
            let threshold: f32 = row.try_get("similarity_threshold")?;
            thresholds.insert(type_tag, threshold);
        }

        Ok(thresholds)
    }
}
