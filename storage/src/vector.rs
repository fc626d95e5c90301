//! Vector-store contracts.
//!
//! KNN semantics shared by every implementation: `num_candidates ≈ k * 10`,
//! corpus-scope filtering via term (single id) or terms (several ids), and a
//! routing key equal to the scope id when exactly one is given. Missing
//! documents within a batch lookup are dropped, never fatal.

use crate::types::{ChunkDoc, ChunkHit, EntityHit, EventDoc, EventHit, StorageError};
use async_trait::async_trait;

#[async_trait]
pub trait EntityVectorStore: Send + Sync {
    /// KNN over entity vectors, optionally restricted to one entity type.
    /// With `include_type_threshold` each hit carries the similarity
    /// threshold of its type so callers can gate per entity.
    async fn search_similar(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
        entity_type: Option<&str>,
        include_type_threshold: bool,
    ) -> Result<Vec<EntityHit>, StorageError>;
}

#[async_trait]
pub trait EventVectorStore: Send + Sync {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<EventHit>, StorageError>;

    async fn search_similar_by_title(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
        category: Option<&str>,
    ) -> Result<Vec<EventHit>, StorageError>;

    /// Fetch full documents (vectors included) for a batch of event ids.
    /// Ids without a document are silently absent from the result.
    async fn get_events_by_ids(&self, event_ids: &[String]) -> Result<Vec<EventDoc>, StorageError>;
}

#[async_trait]
pub trait ChunkVectorStore: Send + Sync {
    async fn search_similar_by_content(
        &self,
        vector: &[f32],
        k: usize,
        source_config_ids: &[String],
    ) -> Result<Vec<ChunkHit>, StorageError>;

    async fn get_chunks_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<ChunkDoc>, StorageError>;
}
