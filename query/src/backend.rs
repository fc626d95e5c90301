use slm::{ChatClient, EmbeddingClient};
use std::sync::Arc;
use storage::{ChunkVectorStore, EntityVectorStore, EventVectorStore, RelationalStore};

/// Shared handles to the stores and AI clients one searcher runs against.
#[derive(Clone)]
pub struct SearchBackend {
    pub entity_vectors: Arc<dyn EntityVectorStore>,
    pub event_vectors: Arc<dyn EventVectorStore>,
    pub chunk_vectors: Arc<dyn ChunkVectorStore>,
    pub relational: Arc<dyn RelationalStore>,
    pub chat: Arc<dyn ChatClient>,
    pub embeddings: Arc<dyn EmbeddingClient>,
}

impl SearchBackend {
    /// Wire every store role to one backing implementation, as tests and
    /// the in-memory mode do.
    pub fn from_memory_store(
        store: Arc<storage::MemoryStore>,
        chat: Arc<dyn ChatClient>,
        embeddings: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            entity_vectors: store.clone(),
            event_vectors: store.clone(),
            chunk_vectors: store.clone(),
            relational: store,
            chat,
            embeddings,
        }
    }
}
