//! Reciprocal Rank Fusion reranking.
//!
//! Candidates come from the entity join only. A weighted embedding score
//! (0.2 title + 0.8 content) gates candidates, BM25 over the tokenized
//! title+summary+content reranks by keywords, and RRF fuses the two
//! rankings: `1/(k + rank_embedding) + 1/(k + rank_bm25)`.

use crate::backend::SearchBackend;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::keys::KeyEntity;
use crate::rank::bm25::Bm25Index;
use crate::rank::{build_summary, RankedEvents};
use crate::text::tokenize;
use crate::tracker::{build_entity_node, metadata, DisplayLevel, Stage};
use eventlens_core::model::Event;
use eventlens_core::similarity::cosine;
use serde_json::json;
use std::collections::HashMap;
use storage::{EventVectorStore, RelationalStore};

const VECTOR_BATCH: usize = 100;
const TITLE_WEIGHT: f32 = 0.2;
const CONTENT_WEIGHT: f32 = 0.8;
/// Intermediate clues cover this multiple of the returned result count.
const INTERMEDIATE_FACTOR: usize = 3;

#[derive(Debug, Clone)]
struct RrfCandidate {
    event: Event,
    similarity: f32,
    embedding_rank: usize,
    bm25_score: f32,
    bm25_rank: usize,
    rrf_score: f32,
    source_entities: Vec<String>,
}

/// Competition ("1224") ranking for scores already sorted descending.
fn competition_ranks(sorted_scores: &[f32]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted_scores.len());
    for (position, score) in sorted_scores.iter().enumerate() {
        if position > 0 && *score == sorted_scores[position - 1] {
            ranks.push(ranks[position - 1]);
        } else {
            ranks.push(position + 1);
        }
    }
    ranks
}

pub struct RrfReranker<'a> {
    backend: &'a SearchBackend,
}

impl<'a> RrfReranker<'a> {
    pub fn new(backend: &'a SearchBackend) -> Self {
        Self { backend }
    }

    pub async fn search(
        &self,
        ctx: &mut SearchContext,
        key_final: &[KeyEntity],
    ) -> Result<RankedEvents, SearchError> {
        let top_k = ctx.config.rerank.max_results;
        let rrf_k = ctx.config.rerank.rrf_k;
        tracing::info!(entities = key_final.len(), top_k, "rrf rerank started");

        if key_final.is_empty() {
            return Ok(RankedEvents {
                events: Vec::new(),
                summary: build_summary(ctx, key_final, HashMap::new()),
            });
        }

        let query_vector = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;

        // Entity join → candidate events with provenance.
        let (events, event_entities) = self.events_from_keys(ctx, key_final).await?;
        if events.is_empty() {
            tracing::warn!("no events linked to rrf entities");
            return Ok(RankedEvents {
                events: Vec::new(),
                summary: build_summary(ctx, key_final, HashMap::new()),
            });
        }

        // Weighted embedding similarity on stored title/content vectors.
        let mut candidates = self
            .score_embeddings(&events, &event_entities, &query_vector)
            .await?;

        // Threshold gate.
        let before = candidates.len();
        candidates.retain(|candidate| candidate.similarity >= ctx.config.rerank.score_threshold);
        if candidates.is_empty() {
            tracing::info!(before, threshold = ctx.config.rerank.score_threshold, "all rrf candidates below threshold");
            return Ok(RankedEvents {
                events: Vec::new(),
                summary: build_summary(ctx, key_final, HashMap::new()),
            });
        }

        // Embedding ranking; equal scores share a rank so a tie cannot be
        // decided by insertion order alone.
        let mut embedding_order: Vec<usize> = (0..candidates.len()).collect();
        embedding_order.sort_by(|a, b| {
            candidates[*b]
                .similarity
                .partial_cmp(&candidates[*a].similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let embedding_ranks = competition_ranks(
            &embedding_order
                .iter()
                .map(|index| candidates[*index].similarity)
                .collect::<Vec<f32>>(),
        );
        for (index, rank) in embedding_order.iter().zip(embedding_ranks) {
            candidates[*index].embedding_rank = rank;
        }

        // BM25 ranking over the tokenized event text.
        let corpus: Vec<Vec<String>> = candidates
            .iter()
            .map(|candidate| tokenize(&candidate.event.full_text().to_lowercase()))
            .collect();
        let bm25 = Bm25Index::new(&corpus);
        let query_tokens = tokenize(&ctx.query.to_lowercase());
        let scores = bm25.scores(&query_tokens);
        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.bm25_score = score;
        }

        let mut bm25_order: Vec<usize> = (0..candidates.len()).collect();
        bm25_order.sort_by(|a, b| {
            candidates[*b]
                .bm25_score
                .partial_cmp(&candidates[*a].bm25_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let bm25_ranks = competition_ranks(
            &bm25_order
                .iter()
                .map(|index| candidates[*index].bm25_score)
                .collect::<Vec<f32>>(),
        );
        for (index, rank) in bm25_order.iter().zip(bm25_ranks) {
            candidates[*index].bm25_rank = rank;
        }

        // Fusion.
        for candidate in &mut candidates {
            candidate.rrf_score = 1.0 / (rrf_k + candidate.embedding_rank) as f32
                + 1.0 / (rrf_k + candidate.bm25_rank) as f32;
        }
        candidates.sort_by(|a, b| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::info!(
            survivors = candidates.len(),
            "rrf fusion complete"
        );

        // Clues: intermediate for the top 3·k, final for the top k.
        let entity_lookup: HashMap<&str, &KeyEntity> = key_final
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();
        let intermediate_count = (top_k * INTERMEDIATE_FACTOR).min(candidates.len());
        for (rank, candidate) in candidates.iter().take(intermediate_count).enumerate() {
            self.emit_clues(ctx, candidate, rank + 1, &entity_lookup, DisplayLevel::Intermediate);
        }
        for (rank, candidate) in candidates.iter().take(top_k).enumerate() {
            self.emit_clues(ctx, candidate, rank + 1, &entity_lookup, DisplayLevel::Final);
        }

        let top: Vec<&RrfCandidate> = candidates.iter().take(top_k).collect();
        let event_entity_summary: HashMap<String, Vec<KeyEntity>> = top
            .iter()
            .map(|candidate| {
                let entities: Vec<KeyEntity> = candidate
                    .source_entities
                    .iter()
                    .filter_map(|id| entity_lookup.get(id.as_str()).map(|key| (*key).clone()))
                    .collect();
                (candidate.event.id.clone(), entities)
            })
            .collect();
        let events: Vec<Event> = top.into_iter().map(|c| c.event.clone()).collect();

        Ok(RankedEvents {
            events,
            summary: build_summary(ctx, key_final, event_entity_summary),
        })
    }

    async fn events_from_keys(
        &self,
        ctx: &SearchContext,
        key_final: &[KeyEntity],
    ) -> Result<(Vec<Event>, HashMap<String, Vec<String>>), SearchError> {
        let entity_ids: Vec<String> = key_final.iter().map(|key| key.entity_id.clone()).collect();
        let links = self
            .backend
            .relational
            .links_for_entities(&entity_ids, ctx.scope())
            .await?;

        let mut event_order: Vec<String> = Vec::new();
        let mut event_entities: HashMap<String, Vec<String>> = HashMap::new();
        for link in &links {
            let entry = event_entities.entry(link.event_id.clone()).or_default();
            if entry.is_empty() {
                event_order.push(link.event_id.clone());
            }
            if !entry.contains(&link.entity_id) {
                entry.push(link.entity_id.clone());
            }
        }

        let events = self
            .backend
            .relational
            .get_events(&event_order, ctx.scope())
            .await?;
        let mut event_map: HashMap<String, Event> = events
            .into_iter()
            .map(|event| (event.id.clone(), event))
            .collect();
        // Keep join discovery order.
        let ordered: Vec<Event> = event_order
            .iter()
            .filter_map(|id| event_map.remove(id))
            .collect();

        Ok((ordered, event_entities))
    }

    /// Weighted similarity: 0.2·cos(title) + 0.8·cos(content). A missing
    /// vector contributes zero; events missing both are dropped.
    async fn score_embeddings(
        &self,
        events: &[Event],
        event_entities: &HashMap<String, Vec<String>>,
        query_vector: &[f32],
    ) -> Result<Vec<RrfCandidate>, SearchError> {
        let mut candidates = Vec::new();
        let mut missing = 0usize;

        for batch in events.chunks(VECTOR_BATCH) {
            let ids: Vec<String> = batch.iter().map(|event| event.id.clone()).collect();
            let docs = self.backend.event_vectors.get_events_by_ids(&ids).await?;
            let doc_map: HashMap<&str, &storage::EventDoc> = docs
                .iter()
                .map(|doc| (doc.event_id.as_str(), doc))
                .collect();

            for event in batch {
                let Some(doc) = doc_map.get(event.id.as_str()) else {
                    missing += 1;
                    continue;
                };
                if doc.title_vector.is_none() && doc.content_vector.is_none() {
                    missing += 1;
                    continue;
                }

                let title_similarity = doc
                    .title_vector
                    .as_ref()
                    .map(|v| cosine(query_vector, v))
                    .unwrap_or(0.0);
                let content_similarity = doc
                    .content_vector
                    .as_ref()
                    .map(|v| cosine(query_vector, v))
                    .unwrap_or(0.0);

                candidates.push(RrfCandidate {
                    event: event.clone(),
                    similarity: TITLE_WEIGHT * title_similarity
                        + CONTENT_WEIGHT * content_similarity,
                    embedding_rank: 0,
                    bm25_score: 0.0,
                    bm25_rank: 0,
                    rrf_score: 0.0,
                    source_entities: event_entities
                        .get(&event.id)
                        .cloned()
                        .unwrap_or_default(),
                });
            }
        }

        if missing > 0 {
            tracing::warn!(missing, "events without vectors dropped from rrf");
        }

        Ok(candidates)
    }

    fn emit_clues(
        &self,
        ctx: &mut SearchContext,
        candidate: &RrfCandidate,
        rank: usize,
        entity_lookup: &HashMap<&str, &KeyEntity>,
        level: DisplayLevel,
    ) {
        let relation = if level == DisplayLevel::Final {
            "final_event"
        } else {
            "rerank"
        };

        for entity_id in &candidate.source_entities {
            let Some(key) = entity_lookup.get(entity_id.as_str()) else {
                continue;
            };

            // RRF score is the primary confidence; fall back to the
            // embedding similarity, then the entity weight.
            let confidence = if candidate.rrf_score > 0.0 {
                candidate.rrf_score
            } else if candidate.similarity > 0.0 {
                candidate.similarity
            } else {
                key.weight
            };

            let event_node =
                ctx.tracker
                    .event_node(&candidate.event, Stage::Rerank, None, Some("entity"));
            ctx.tracker.add_clue(
                Stage::Rerank,
                build_entity_node(key),
                event_node,
                confidence,
                Some(relation),
                metadata(&[
                    ("method", json!("rrf")),
                    ("rrf_score", json!(candidate.rrf_score)),
                    ("similarity_score", json!(candidate.similarity)),
                    ("bm25_score", json!(candidate.bm25_score)),
                    ("embedding_rank", json!(candidate.embedding_rank)),
                    ("bm25_rank", json!(candidate.bm25_rank)),
                    ("entity_weight", json!(key.weight)),
                    ("rank", json!(rank)),
                ]),
                level,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn competition_ranks_share_rank_on_ties() {
        assert_eq!(competition_ranks(&[0.9, 0.9, 0.5]), vec![1, 1, 3]);
        assert_eq!(competition_ranks(&[0.9, 0.5, 0.1]), vec![1, 2, 3]);
        assert!(competition_ranks(&[]).is_empty());
    }
}
