use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::keys::KeyEntity;
use crate::tracker::{build_query_node, Node, Tracker};
use slm::EmbeddingClient;

/// Mutable state threaded through one search request: the (possibly
/// rewritten) query, the cached query embedding, the entities recall
/// attributed directly to the query, and the growing clue list.
#[derive(Debug)]
pub struct SearchContext {
    pub config: SearchConfig,
    pub query: String,
    pub original_query: String,
    pub query_embedding: Option<Vec<f32>>,
    pub query_recalled_keys: Vec<KeyEntity>,
    pub tracker: Tracker,
    scope: Vec<String>,
}

impl SearchContext {
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        config.validate().map_err(SearchError::Input)?;

        let query = config.query.clone();
        let original_query = if config.original_query.is_empty() {
            query.clone()
        } else {
            config.original_query.clone()
        };
        let scope = config.scope();

        Ok(Self {
            config,
            query,
            original_query,
            query_embedding: None,
            query_recalled_keys: Vec::new(),
            tracker: Tracker::new(),
            scope,
        })
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn rewritten(&self) -> bool {
        self.original_query != self.query
    }

    pub fn query_node(&self) -> Node {
        build_query_node(&self.query, &self.original_query, false)
    }

    pub fn origin_query_node(&self) -> Node {
        build_query_node(&self.query, &self.original_query, true)
    }

    /// The cached query embedding, generating it on first use. Failure here
    /// is fatal for the request: nothing downstream can run without it.
    pub async fn query_embedding(
        &mut self,
        embeddings: &dyn EmbeddingClient,
    ) -> Result<Vec<f32>, SearchError> {
        if let Some(vector) = &self.query_embedding {
            return Ok(vector.clone());
        }

        let vector = embeddings.generate(&self.query).await?;
        if !eventlens_core::similarity::is_valid_vector(&vector) {
            return Err(SearchError::Ai(slm::AiError::Embedding(
                "query embedding contains invalid values".to_string(),
            )));
        }

        tracing::debug!(dims = vector.len(), "query embedding cached");
        self.query_embedding = Some(vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slm::DeterministicEmbedder;

    #[tokio::test]
    async fn query_embedding_is_cached() {
        let embedder = DeterministicEmbedder::new("m", 8);
        let mut ctx = SearchContext::new(SearchConfig::new("hello", "s1")).unwrap();

        let first = ctx.query_embedding(&embedder).await.unwrap();
        let second = ctx.query_embedding(&embedder).await.unwrap();
        assert_eq!(first, second);
        assert!(ctx.query_embedding.is_some());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_stage() {
        let err = SearchContext::new(SearchConfig::new("", "s1")).unwrap_err();
        assert!(matches!(err, SearchError::Input(_)));
    }
}
