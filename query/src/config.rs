use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnType {
    #[default]
    Event,
    Paragraph,
}

impl std::fmt::Display for ReturnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnType::Event => write!(f, "EVENT"),
            ReturnType::Paragraph => write!(f, "PARAGRAPH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RerankStrategy {
    #[default]
    Pagerank,
    Rrf,
}

impl std::fmt::Display for RerankStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RerankStrategy::Pagerank => write!(f, "PAGERANK"),
            RerankStrategy::Rrf => write!(f, "RRF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default)]
    pub use_fast_mode: bool,
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,
    #[serde(default = "default_vector_candidates")]
    pub vector_candidates: usize,
    #[serde(default = "default_entity_similarity_threshold")]
    pub entity_similarity_threshold: f32,
    #[serde(default = "default_event_similarity_threshold")]
    pub event_similarity_threshold: f32,
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_entity_weight_threshold")]
    pub entity_weight_threshold: f32,
    /// When set, recall keeps the top-N entities by weight instead of
    /// applying `entity_weight_threshold`.
    #[serde(default)]
    pub final_entity_count: Option<usize>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            use_fast_mode: false,
            vector_top_k: default_vector_top_k(),
            vector_candidates: default_vector_candidates(),
            entity_similarity_threshold: default_entity_similarity_threshold(),
            event_similarity_threshold: default_event_similarity_threshold(),
            max_entities: default_max_entities(),
            max_events: default_max_events(),
            entity_weight_threshold: default_entity_weight_threshold(),
            final_entity_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_entities_per_hop")]
    pub entities_per_hop: usize,
    #[serde(default = "default_weight_change_threshold")]
    pub weight_change_threshold: f32,
    #[serde(default = "default_event_similarity_threshold")]
    pub event_similarity_threshold: f32,
    #[serde(default = "default_min_events_per_hop")]
    pub min_events_per_hop: usize,
    #[serde(default = "default_max_events_per_hop")]
    pub max_events_per_hop: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_hops: default_max_hops(),
            entities_per_hop: default_entities_per_hop(),
            weight_change_threshold: default_weight_change_threshold(),
            event_similarity_threshold: default_event_similarity_threshold(),
            min_events_per_hop: default_min_events_per_hop(),
            max_events_per_hop: default_max_events_per_hop(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub strategy: RerankStrategy,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_key_recall_results")]
    pub max_key_recall_results: usize,
    #[serde(default = "default_max_query_recall_results")]
    pub max_query_recall_results: usize,
    #[serde(default = "default_pagerank_damping_factor")]
    pub pagerank_damping_factor: f32,
    #[serde(default = "default_pagerank_max_iterations")]
    pub pagerank_max_iterations: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::default(),
            score_threshold: default_score_threshold(),
            max_results: default_max_results(),
            max_key_recall_results: default_max_key_recall_results(),
            max_query_recall_results: default_max_query_recall_results(),
            pagerank_damping_factor: default_pagerank_damping_factor(),
            pagerank_max_iterations: default_pagerank_max_iterations(),
            rrf_k: default_rrf_k(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub query: String,
    /// Populated by recall when query rewrite fires; callers normally leave
    /// it empty.
    #[serde(default)]
    pub original_query: String,
    #[serde(default)]
    pub source_config_id: Option<String>,
    #[serde(default)]
    pub source_config_ids: Vec<String>,
    #[serde(default)]
    pub return_type: ReturnType,
    /// Optional `model` or `model@version` pin for the embedding client,
    /// resolved through the registry attached to the searcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default = "default_true")]
    pub enable_query_rewrite: bool,
    #[serde(default)]
    pub recall: RecallConfig,
    #[serde(default)]
    pub expand: ExpandConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
}

impl SearchConfig {
    pub fn new(query: impl Into<String>, source_config_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            original_query: String::new(),
            source_config_id: Some(source_config_id.into()),
            source_config_ids: Vec::new(),
            return_type: ReturnType::default(),
            embedding_model: None,
            enable_query_rewrite: true,
            recall: RecallConfig::default(),
            expand: ExpandConfig::default(),
            rerank: RerankConfig::default(),
        }
    }

    /// Union of the single id and the list, order-preserving, deduped.
    pub fn scope(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(id) = &self.source_config_id {
            if !id.is_empty() {
                out.push(id.clone());
            }
        }
        for id in &self.source_config_ids {
            if !id.is_empty() && !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.scope().is_empty() {
            return Err("at least one source_config_id is required".to_string());
        }
        if let Some(model_ref) = &self.embedding_model {
            if model_ref.trim().is_empty() {
                return Err("embedding_model must not be empty when provided".to_string());
            }
        }
        for (name, value) in [
            (
                "recall.entity_similarity_threshold",
                self.recall.entity_similarity_threshold,
            ),
            (
                "recall.event_similarity_threshold",
                self.recall.event_similarity_threshold,
            ),
            (
                "expand.event_similarity_threshold",
                self.expand.event_similarity_threshold,
            ),
            ("rerank.score_threshold", self.rerank.score_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1]"));
            }
        }
        if !(0.0..1.0).contains(&self.rerank.pagerank_damping_factor) {
            return Err("rerank.pagerank_damping_factor must be within [0, 1)".to_string());
        }
        if self.rerank.max_results == 0 {
            return Err("rerank.max_results must be positive".to_string());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_vector_top_k() -> usize {
    10
}

fn default_vector_candidates() -> usize {
    100
}

fn default_entity_similarity_threshold() -> f32 {
    0.5
}

fn default_event_similarity_threshold() -> f32 {
    0.3
}

fn default_max_entities() -> usize {
    20
}

fn default_max_events() -> usize {
    50
}

fn default_entity_weight_threshold() -> f32 {
    0.3
}

fn default_max_hops() -> u32 {
    2
}

fn default_entities_per_hop() -> usize {
    10
}

fn default_weight_change_threshold() -> f32 {
    0.01
}

fn default_min_events_per_hop() -> usize {
    1
}

fn default_max_events_per_hop() -> usize {
    200
}

fn default_score_threshold() -> f32 {
    0.5
}

fn default_max_results() -> usize {
    8
}

fn default_max_key_recall_results() -> usize {
    30
}

fn default_max_query_recall_results() -> usize {
    30
}

fn default_pagerank_damping_factor() -> f32 {
    0.85
}

fn default_pagerank_max_iterations() -> usize {
    100
}

fn default_rrf_k() -> usize {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_unions_and_dedupes() {
        let mut config = SearchConfig::new("q", "s1");
        config.source_config_ids = vec!["s1".to_string(), "s2".to_string()];
        assert_eq!(config.scope(), vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn validate_rejects_empty_query_and_scope() {
        let config = SearchConfig::new("   ", "s1");
        assert!(config.validate().is_err());

        let mut config = SearchConfig::new("q", "");
        config.source_config_id = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_embedding_model_pin() {
        let mut config = SearchConfig::new("q", "s1");
        config.embedding_model = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.embedding_model = Some("embed-small@1.0.0".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SearchConfig = serde_json::from_str(
            r#"{"query": "iphone launch", "source_config_ids": ["s1"], "rerank": {"strategy": "RRF"}}"#,
        )
        .unwrap();

        assert!(config.enable_query_rewrite);
        assert_eq!(config.return_type, ReturnType::Event);
        assert!(config.embedding_model.is_none());
        assert_eq!(config.rerank.strategy, RerankStrategy::Rrf);
        assert_eq!(config.rerank.rrf_k, 60);
        assert_eq!(config.expand.max_hops, 2);
        assert!(config.validate().is_ok());
    }
}
