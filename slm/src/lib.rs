pub mod chat;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod registry;

pub use chat::{ChatClient, HttpChatClient, LlmMessage, LlmRole, ScriptedChatClient};
pub use embedding::{DeterministicEmbedder, EmbeddingClient, HttpEmbeddingClient};
pub use error::AiError;
pub use extract::{AttributeExtraction, AttributeExtractor, Importance, QueryAttribute};
pub use registry::{EmbedderRegistry, ModelRef, RegistryError};
