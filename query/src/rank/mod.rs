pub mod bm25;
pub mod chunk_pagerank;
pub mod event_pagerank;
pub mod pagerank;
pub mod rrf;

pub use chunk_pagerank::{ChunkPagerankReranker, RankedChunk};
pub use event_pagerank::EventPagerankReranker;
pub use rrf::RrfReranker;

use crate::context::SearchContext;
use crate::keys::KeyEntity;
use eventlens_core::model::Event;
use std::collections::HashMap;

/// Provenance summary attached to a rerank result: which entities were
/// recalled from the query directly, which came from recall/expand, and
/// which entities vouch for each returned event.
#[derive(Debug, Clone, Default)]
pub struct RerankSummary {
    pub origin_query: String,
    pub final_query: Option<String>,
    pub query_entities: Vec<KeyEntity>,
    pub recall_entities: Vec<KeyEntity>,
    pub event_entities: HashMap<String, Vec<KeyEntity>>,
}

/// Events ordered by the reranker, plus their provenance summary.
#[derive(Debug, Clone, Default)]
pub struct RankedEvents {
    pub events: Vec<Event>,
    pub summary: RerankSummary,
}

pub(crate) fn build_summary(
    ctx: &SearchContext,
    key_final: &[KeyEntity],
    event_entities: HashMap<String, Vec<KeyEntity>>,
) -> RerankSummary {
    let query_entities = ctx.query_recalled_keys.clone();
    let query_ids: std::collections::HashSet<&str> = query_entities
        .iter()
        .map(|key| key.entity_id.as_str())
        .collect();

    let recall_entities: Vec<KeyEntity> = key_final
        .iter()
        .filter(|key| !query_ids.contains(key.entity_id.as_str()))
        .cloned()
        .collect();

    // A rewritten final query is only reported when the rewrite path could
    // actually run (rewrite on, fast mode off).
    let final_query = (ctx.config.enable_query_rewrite && !ctx.config.recall.use_fast_mode)
        .then(|| ctx.query.clone());

    RerankSummary {
        origin_query: ctx.original_query.clone(),
        final_query,
        query_entities,
        recall_entities,
        event_entities,
    }
}
