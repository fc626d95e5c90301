use crate::types::{EntityEventLink, StorageError};
use async_trait::async_trait;
use eventlens_core::model::{Chunk, Entity, Event};
use std::collections::HashMap;

/// Contract over the relational store: the entity↔event join plus id-batch
/// getters. The pipeline is read-only over these tables.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// All join rows whose entity is in `entity_ids`, restricted to events
    /// in the given corpus scopes.
    async fn links_for_entities(
        &self,
        entity_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError>;

    /// All join rows whose event is in `event_ids`.
    async fn links_for_events(
        &self,
        event_ids: &[String],
    ) -> Result<Vec<EntityEventLink>, StorageError>;

    async fn get_events(
        &self,
        event_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Event>, StorageError>;

    async fn get_entities(&self, entity_ids: &[String]) -> Result<Vec<Entity>, StorageError>;

    async fn get_chunks(
        &self,
        chunk_ids: &[String],
        source_config_ids: &[String],
    ) -> Result<Vec<Chunk>, StorageError>;

    /// Similarity threshold per entity type tag; scope-specific definitions
    /// override the system defaults.
    async fn entity_type_thresholds(
        &self,
        source_config_ids: &[String],
    ) -> Result<HashMap<String, f32>, StorageError>;
}
