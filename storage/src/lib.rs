pub mod elastic;
pub mod memory;
pub mod relational;
pub mod sql;
pub mod types;
pub mod vector;

pub use elastic::EsVectorStore;
pub use memory::MemoryStore;
pub use relational::RelationalStore;
pub use sql::PgRelationalStore;
pub use types::{
    ChunkDoc, ChunkHit, EntityEventLink, EntityHit, EventDoc, EventHit, StorageError,
};
pub use vector::{ChunkVectorStore, EntityVectorStore, EventVectorStore};
