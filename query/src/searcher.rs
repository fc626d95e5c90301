//! Search orchestration: recall → expand → rerank, response assembly.

use crate::backend::SearchBackend;
use crate::config::{RerankStrategy, ReturnType, SearchConfig};
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::expand::{ExpandResult, ExpandSearcher};
use crate::rank::{ChunkPagerankReranker, EventPagerankReranker, RankedEvents, RrfReranker};
use crate::recall::RecallSearcher;
use crate::response::{
    ExpandStats, QueryInfo, RecallStats, RerankStats, SearchResponse, SearchStats,
};
use slm::EmbedderRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct Searcher {
    backend: SearchBackend,
    registry: Option<Arc<EmbedderRegistry>>,
}

impl Searcher {
    pub fn new(backend: SearchBackend) -> Self {
        Self {
            backend,
            registry: None,
        }
    }

    /// Attach an embedder registry so requests can pin `embedding_model`.
    pub fn with_registry(mut self, registry: Arc<EmbedderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn backend(&self) -> &SearchBackend {
        &self.backend
    }

    /// Backend serving one request: the default client, or the registry
    /// resolution of the request's `embedding_model` pin. A pin that
    /// resolves to nothing is a caller error, surfaced before any stage
    /// runs.
    fn request_backend(&self, config: &SearchConfig) -> Result<SearchBackend, SearchError> {
        let Some(model_ref) = &config.embedding_model else {
            return Ok(self.backend.clone());
        };

        let Some(registry) = &self.registry else {
            return Err(SearchError::Input(format!(
                "embedding_model '{model_ref}' requested but no embedder registry is attached"
            )));
        };

        let client = registry
            .resolve(model_ref)
            .map_err(|err| SearchError::Input(err.to_string()))?;
        tracing::debug!(model = %model_ref, "embedding model resolved for request");

        let mut backend = self.backend.clone();
        backend.embeddings = client;
        Ok(backend)
    }

    /// Run the full pipeline. Empty stage outputs are not errors: the
    /// caller always receives a well-formed response with whatever clues
    /// accumulated.
    pub async fn search(&self, config: SearchConfig) -> Result<SearchResponse, SearchError> {
        let mut ctx = SearchContext::new(config)?;
        let backend = self.request_backend(&ctx.config)?;
        let total_start = Instant::now();
        tracing::info!(query = %ctx.query, scope = ?ctx.scope(), "search started");

        let recall_start = Instant::now();
        let recall = RecallSearcher::new(&backend).search(&mut ctx).await?;
        let recall_time = recall_start.elapsed();

        let expand_start = Instant::now();
        let expand = if ctx.config.expand.enabled {
            ExpandSearcher::new(&backend)
                .search(&mut ctx, &recall)
                .await?
        } else {
            ExpandResult::from_recall(&recall)
        };
        let expand_time = expand_start.elapsed();

        let rerank_start = Instant::now();
        let return_type = ctx.config.return_type;
        let strategy = ctx.config.rerank.strategy;

        let (events, sections) = match return_type {
            ReturnType::Paragraph => {
                // Paragraph mode only supports PageRank; an RRF request is
                // honored with PageRank over chunks.
                if strategy == RerankStrategy::Rrf {
                    tracing::warn!(
                        "paragraph return type only supports PAGERANK; ignoring RRF strategy"
                    );
                }
                let sections = ChunkPagerankReranker::new(&backend)
                    .search(&mut ctx, &expand.key_final)
                    .await?;
                (None, Some(sections))
            }
            ReturnType::Event => {
                let ranked: RankedEvents = match strategy {
                    RerankStrategy::Pagerank => {
                        EventPagerankReranker::new(&backend)
                            .search(&mut ctx, &expand.key_final)
                            .await?
                    }
                    RerankStrategy::Rrf => {
                        RrfReranker::new(&backend)
                            .search(&mut ctx, &expand.key_final)
                            .await?
                    }
                };
                tracing::debug!(
                    query_entities = ranked.summary.query_entities.len(),
                    recall_entities = ranked.summary.recall_entities.len(),
                    "rerank provenance summary"
                );
                (Some(ranked.events), None)
            }
        };
        let rerank_time = rerank_start.elapsed();

        let stats = build_stats(&recall, &expand, &events, &sections, return_type, strategy);
        let query = QueryInfo {
            original: ctx.original_query.clone(),
            current: ctx.query.clone(),
            rewritten: ctx.rewritten(),
        };

        tracing::info!(
            recall_ms = recall_time.as_millis() as u64,
            expand_ms = expand_time.as_millis() as u64,
            rerank_ms = rerank_time.as_millis() as u64,
            total_ms = total_start.elapsed().as_millis() as u64,
            events = events.as_ref().map(Vec::len).unwrap_or(0),
            sections = sections.as_ref().map(Vec::len).unwrap_or(0),
            clues = ctx.tracker.clues().len(),
            "search complete"
        );

        Ok(SearchResponse {
            events,
            sections,
            clues: ctx.tracker.into_clues(),
            stats,
            query,
        })
    }

    /// `search` bounded by a wall-clock deadline. On expiry the in-flight
    /// awaitables are dropped and the caller gets a cancellation error; no
    /// partial response is emitted.
    pub async fn search_with_timeout(
        &self,
        config: SearchConfig,
        deadline: Duration,
    ) -> Result<SearchResponse, SearchError> {
        match tokio::time::timeout(deadline, self.search(config)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "search timed out");
                Err(SearchError::Cancelled)
            }
        }
    }

    /// Run several searches concurrently, at most `max_concurrency` in
    /// flight, returning per-request results in input order. A single
    /// search is never parallelized internally beyond its own stages; this
    /// is the fan-out point for multi-query callers.
    pub async fn search_many(
        &self,
        configs: Vec<SearchConfig>,
        max_concurrency: usize,
    ) -> Vec<Result<SearchResponse, SearchError>> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (index, config) in configs.into_iter().enumerate() {
            let backend = self.backend.clone();
            let registry = self.registry.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                let result = match permit {
                    Ok(_permit) => {
                        let searcher = Searcher {
                            backend,
                            registry,
                        };
                        searcher.search(config).await
                    }
                    Err(_) => Err(SearchError::Cancelled),
                };
                (index, result)
            });
        }

        let mut results: Vec<Result<SearchResponse, SearchError>> = Vec::new();
        results.resize_with(join_set.len(), || Err(SearchError::Cancelled));
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(err) => tracing::error!(error = %err, "search task panicked"),
            }
        }
        results
    }
}

fn build_stats(
    recall: &crate::recall::RecallResult,
    expand: &ExpandResult,
    events: &Option<Vec<eventlens_core::model::Event>>,
    sections: &Option<Vec<crate::rank::RankedChunk>>,
    return_type: ReturnType,
    strategy: RerankStrategy,
) -> SearchStats {
    let mut by_type: HashMap<String, usize> = HashMap::new();
    for key in &recall.key_final {
        *by_type.entry(key.entity_type.clone()).or_insert(0) += 1;
    }

    let expanded_count = expand
        .key_final
        .iter()
        .filter(|key| key.steps.first().copied().unwrap_or(0) >= 2)
        .count();

    SearchStats {
        recall: RecallStats {
            entities_count: recall.key_final.len(),
            by_type,
        },
        expand: ExpandStats {
            entities_count: expanded_count,
            total_entities: expand.key_final.len(),
            hops: expand.total_hops,
            converged: expand.convergence_reached,
        },
        rerank: RerankStats {
            events_count: events.as_ref().map(Vec::len),
            sections_count: sections.as_ref().map(Vec::len),
            strategy: strategy.to_string(),
            return_type: return_type.to_string(),
        },
    }
}
