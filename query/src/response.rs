use crate::rank::RankedChunk;
use crate::tracker::Clue;
use eventlens_core::model::Event;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct QueryInfo {
    pub original: String,
    pub current: String,
    pub rewritten: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RecallStats {
    pub entities_count: usize,
    pub by_type: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ExpandStats {
    /// Entities discovered by expansion (step >= 2).
    pub entities_count: usize,
    pub total_entities: usize,
    pub hops: u32,
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections_count: Option<usize>,
    pub strategy: String,
    pub return_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub recall: RecallStats,
    pub expand: ExpandStats,
    pub rerank: RerankStats,
}

/// The response contract: ranked events or sections, the full clue list,
/// per-stage stats and the query provenance.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<RankedChunk>>,
    pub clues: Vec<Clue>,
    pub stats: SearchStats,
    pub query: QueryInfo,
}
