//! Chunk (paragraph) reranking with directional PageRank.
//!
//! Same skeleton as the event reranker, but candidates are the source
//! chunks events were extracted from: entity → event → chunk on the join
//! side, plus a query KNN over chunk content vectors. The graph uses entity
//! edges only, with shared entities detected by name occurrence in the
//! chunk text.

use crate::backend::SearchBackend;
use crate::config::SearchConfig;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::keys::KeyEntity;
use crate::rank::pagerank::DirectedGraph;
use crate::tracker::{build_entity_node, build_section_node, metadata, DisplayLevel, Stage};
use eventlens_core::model::Chunk;
use eventlens_core::similarity::cosine;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use storage::{ChunkVectorStore, RelationalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkSource {
    Entity,
    Query,
}

#[derive(Debug, Clone)]
struct ChunkCandidate {
    chunk: Chunk,
    score: f32,
    weight: f32,
    pagerank: f32,
    source: ChunkSource,
    source_entities: Vec<String>,
    event_ids: Vec<String>,
}

/// Final paragraph result row.
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub heading: String,
    pub content: String,
    pub rank: u32,
    pub score: f32,
    pub weight: f32,
    pub pagerank: f32,
    /// Entities that vouched for this chunk.
    pub clues: Vec<KeyEntity>,
}

pub struct ChunkPagerankReranker<'a> {
    backend: &'a SearchBackend,
}

impl<'a> ChunkPagerankReranker<'a> {
    pub fn new(backend: &'a SearchBackend) -> Self {
        Self { backend }
    }

    pub async fn search(
        &self,
        ctx: &mut SearchContext,
        key_final: &[KeyEntity],
    ) -> Result<Vec<RankedChunk>, SearchError> {
        let query_vector = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;
        tracing::info!(entities = key_final.len(), "chunk pagerank rerank started");

        let scope: Vec<String> = ctx.scope().to_vec();
        let config = ctx.config.clone();
        let (step1, step2) = tokio::join!(
            step1_keys_to_chunks(self.backend, key_final, &scope, &config, &query_vector),
            step2_query_to_chunks(self.backend, &scope, &config, &query_vector),
        );
        let step1 = step1?;
        let step2 = step2?;

        // Merge on chunk id; the entity path wins.
        let mut merged = step1;
        let known: HashSet<String> = merged
            .iter()
            .map(|candidate| candidate.chunk.id.clone())
            .collect();
        merged.extend(
            step2
                .into_iter()
                .filter(|candidate| !known.contains(&candidate.chunk.id)),
        );

        if merged.is_empty() {
            tracing::info!("no chunk candidates survived the thresholds");
            return Ok(Vec::new());
        }

        // Initial weights, as for events.
        let key_weights: HashMap<&str, f32> = key_final
            .iter()
            .map(|key| (key.entity_id.as_str(), key.weight))
            .collect();
        for candidate in &mut merged {
            let entity_weight_sum: f32 = candidate
                .source_entities
                .iter()
                .map(|id| key_weights.get(id.as_str()).copied().unwrap_or(0.0))
                .sum();
            candidate.weight = 0.5 * candidate.score + (1.0 + entity_weight_sum).ln();
        }

        let graph = build_chunk_graph(&merged, key_final);
        tracing::debug!(edges = graph.edge_count(), nodes = merged.len(), "chunk graph built");

        let initial: Vec<f32> = merged.iter().map(|candidate| candidate.weight).collect();
        let ranks = graph.pagerank(
            &initial,
            ctx.config.rerank.pagerank_damping_factor,
            ctx.config.rerank.pagerank_max_iterations,
        );
        for (candidate, rank) in merged.iter_mut().zip(ranks) {
            candidate.pagerank = rank;
        }
        merged.sort_by(|a, b| {
            b.pagerank
                .partial_cmp(&a.pagerank)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top_n = ctx.config.rerank.max_results;
        let entity_lookup: HashMap<&str, &KeyEntity> = key_final
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();

        for (rank, candidate) in merged.iter().enumerate() {
            emit_chunk_clues(ctx, candidate, rank + 1, &entity_lookup, DisplayLevel::Intermediate);
        }
        for (rank, candidate) in merged.iter().take(top_n).enumerate() {
            emit_chunk_clues(ctx, candidate, rank + 1, &entity_lookup, DisplayLevel::Final);
        }

        let out: Vec<RankedChunk> = merged
            .into_iter()
            .take(top_n)
            .map(|candidate| RankedChunk {
                chunk_id: candidate.chunk.id.clone(),
                heading: candidate.chunk.heading.clone(),
                content: candidate.chunk.content.clone(),
                rank: candidate.chunk.rank,
                score: candidate.score,
                weight: candidate.weight,
                pagerank: candidate.pagerank,
                clues: candidate
                    .source_entities
                    .iter()
                    .filter_map(|id| entity_lookup.get(id.as_str()).map(|key| (*key).clone()))
                    .collect(),
            })
            .collect();

        tracing::info!(returned = out.len(), "chunk pagerank rerank complete");
        Ok(out)
    }
}

/// Entity path: entities → events → the chunks those events were extracted
/// from, deduplicated by chunk id, scored on stored chunk vectors.
async fn step1_keys_to_chunks(
    backend: &SearchBackend,
    key_final: &[KeyEntity],
    scope: &[String],
    config: &SearchConfig,
    query_vector: &[f32],
) -> Result<Vec<ChunkCandidate>, SearchError> {
    if key_final.is_empty() {
        return Ok(Vec::new());
    }

    let entity_ids: Vec<String> = key_final.iter().map(|key| key.entity_id.clone()).collect();
    let links = backend.relational.links_for_entities(&entity_ids, scope).await?;
    if links.is_empty() {
        return Ok(Vec::new());
    }

    let mut event_order: Vec<String> = Vec::new();
    let mut event_to_entities: HashMap<String, Vec<String>> = HashMap::new();
    for link in &links {
        let entry = event_to_entities.entry(link.event_id.clone()).or_default();
        if entry.is_empty() {
            event_order.push(link.event_id.clone());
        }
        entry.push(link.entity_id.clone());
    }

    let events = backend.relational.get_events(&event_order, scope).await?;

    // chunk id → contributing events/entities, in event order.
    let mut chunk_order: Vec<String> = Vec::new();
    let mut chunk_events: HashMap<String, Vec<String>> = HashMap::new();
    let mut chunk_entities: HashMap<String, Vec<String>> = HashMap::new();
    for event in &events {
        let Some(chunk_id) = &event.chunk_id else {
            tracing::debug!(event = %event.id, "event without chunk_id skipped");
            continue;
        };
        if !chunk_events.contains_key(chunk_id) {
            chunk_order.push(chunk_id.clone());
        }
        chunk_events
            .entry(chunk_id.clone())
            .or_default()
            .push(event.id.clone());
        let entry = chunk_entities.entry(chunk_id.clone()).or_default();
        for entity_id in event_to_entities.get(&event.id).into_iter().flatten() {
            if !entry.contains(entity_id) {
                entry.push(entity_id.clone());
            }
        }
    }

    if chunk_order.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = backend.relational.get_chunks(&chunk_order, scope).await?;
    let chunk_map: HashMap<&str, &Chunk> =
        chunks.iter().map(|chunk| (chunk.id.as_str(), chunk)).collect();

    let docs = backend.chunk_vectors.get_chunks_by_ids(&chunk_order).await?;
    let vector_map: HashMap<&str, &Vec<f32>> = docs
        .iter()
        .filter_map(|doc| doc.content_vector.as_ref().map(|v| (doc.chunk_id.as_str(), v)))
        .collect();

    let mut candidates = Vec::new();
    let mut missing_vectors = 0usize;
    for chunk_id in &chunk_order {
        let Some(chunk) = chunk_map.get(chunk_id.as_str()) else {
            continue;
        };
        let Some(vector) = vector_map.get(chunk_id.as_str()) else {
            missing_vectors += 1;
            continue;
        };

        candidates.push(ChunkCandidate {
            chunk: (*chunk).clone(),
            score: cosine(query_vector, vector),
            weight: 0.0,
            pagerank: 0.0,
            source: ChunkSource::Entity,
            source_entities: chunk_entities.get(chunk_id).cloned().unwrap_or_default(),
            event_ids: chunk_events.get(chunk_id).cloned().unwrap_or_default(),
        });
    }
    if missing_vectors > 0 {
        tracing::warn!(missing_vectors, "chunks without stored vectors dropped");
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.retain(|candidate| candidate.score >= config.rerank.score_threshold);
    candidates.truncate(config.rerank.max_key_recall_results);

    Ok(candidates)
}

async fn step2_query_to_chunks(
    backend: &SearchBackend,
    scope: &[String],
    config: &SearchConfig,
    query_vector: &[f32],
) -> Result<Vec<ChunkCandidate>, SearchError> {
    let hits = backend
        .chunk_vectors
        .search_similar_by_content(query_vector, config.rerank.max_query_recall_results, scope)
        .await?;
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let hit_ids: Vec<String> = hits.iter().map(|hit| hit.chunk_id.clone()).collect();
    let chunks = backend.relational.get_chunks(&hit_ids, scope).await?;
    let chunk_map: HashMap<&str, &Chunk> =
        chunks.iter().map(|chunk| (chunk.id.as_str(), chunk)).collect();

    let docs = backend.chunk_vectors.get_chunks_by_ids(&hit_ids).await?;
    let vector_map: HashMap<&str, &Vec<f32>> = docs
        .iter()
        .filter_map(|doc| doc.content_vector.as_ref().map(|v| (doc.chunk_id.as_str(), v)))
        .collect();

    let mut candidates = Vec::new();
    for hit in &hits {
        let Some(chunk) = chunk_map.get(hit.chunk_id.as_str()) else {
            continue;
        };
        let Some(vector) = vector_map.get(hit.chunk_id.as_str()) else {
            continue;
        };

        candidates.push(ChunkCandidate {
            chunk: (*chunk).clone(),
            score: cosine(query_vector, vector),
            weight: 0.0,
            pagerank: 0.0,
            source: ChunkSource::Query,
            source_entities: Vec::new(),
            event_ids: Vec::new(),
        });
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.retain(|candidate| candidate.score >= config.rerank.score_threshold);

    Ok(candidates)
}

/// Entity edges only. A key connects two chunks when its name occurs in
/// both texts; votes weigh by occurrences in the target chunk.
fn build_chunk_graph(candidates: &[ChunkCandidate], key_final: &[KeyEntity]) -> DirectedGraph {
    let mut graph = DirectedGraph::new(candidates.len());
    if key_final.is_empty() {
        return graph;
    }

    let texts: Vec<String> = candidates
        .iter()
        .map(|candidate| candidate.chunk.full_text())
        .collect();

    for key in key_final {
        if key.name.is_empty() {
            continue;
        }

        let counts: Vec<usize> = texts
            .iter()
            .map(|text| text.matches(key.name.as_str()).count())
            .collect();
        let containing: Vec<usize> = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(index, _)| index)
            .collect();

        for (a, &i) in containing.iter().enumerate() {
            for &j in containing.iter().skip(a + 1) {
                graph.add_edge(i, j, key.weight * counts[j] as f32);
                graph.add_edge(j, i, key.weight * counts[i] as f32);
            }
        }
    }

    graph
}

fn emit_chunk_clues(
    ctx: &mut SearchContext,
    candidate: &ChunkCandidate,
    rank: usize,
    entity_lookup: &HashMap<&str, &KeyEntity>,
    level: DisplayLevel,
) {
    let relation = match (candidate.source, level) {
        (_, DisplayLevel::Final) => "final_section",
        (ChunkSource::Entity, _) => "entity_recall",
        (ChunkSource::Query, _) => "query_recall",
    };
    let meta = metadata(&[
        ("method", json!("pagerank_section")),
        ("pagerank_score", json!(candidate.pagerank)),
        ("similarity_score", json!(candidate.score)),
        ("rank", json!(rank)),
        ("event_ids", json!(candidate.event_ids)),
    ]);

    match candidate.source {
        ChunkSource::Entity => {
            for entity_id in &candidate.source_entities {
                let Some(key) = entity_lookup.get(entity_id.as_str()) else {
                    continue;
                };
                ctx.tracker.add_clue(
                    Stage::Rerank,
                    build_entity_node(key),
                    build_section_node(&candidate.chunk),
                    candidate.score,
                    Some(relation),
                    meta.clone(),
                    level,
                );
            }
        }
        ChunkSource::Query => {
            let query_node = ctx.query_node();
            ctx.tracker.add_clue(
                Stage::Rerank,
                query_node,
                build_section_node(&candidate.chunk),
                candidate.score,
                Some(relation),
                meta,
                level,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_candidate(id: &str, content: &str) -> ChunkCandidate {
        ChunkCandidate {
            chunk: Chunk {
                id: id.to_string(),
                source_id: "a1".to_string(),
                source_config_id: "s1".to_string(),
                rank: 0,
                heading: String::new(),
                content: content.to_string(),
                references: Vec::new(),
            },
            score: 0.7,
            weight: 0.0,
            pagerank: 0.0,
            source: ChunkSource::Entity,
            source_entities: Vec::new(),
            event_ids: Vec::new(),
        }
    }

    #[test]
    fn shared_entity_links_chunks_by_occurrence() {
        let key = KeyEntity::recalled("k1", "battery", "topic", 1.5);
        let candidates = vec![
            chunk_candidate("c1", "battery research"),
            chunk_candidate("c2", "battery battery battery factory"),
            chunk_candidate("c3", "unrelated text"),
        ];

        let graph = build_chunk_graph(&candidates, &[key]);
        assert_eq!(graph.edge_count(), 2);

        let ranks = graph.pagerank(&[1.0, 1.0, 1.0], 0.85, 100);
        assert!(ranks[1] > ranks[0]);
        assert!(ranks[1] > ranks[2]);
    }

    #[test]
    fn no_keys_means_no_edges() {
        let candidates = vec![chunk_candidate("c1", "a"), chunk_candidate("c2", "a")];
        let graph = build_chunk_graph(&candidates, &[]);
        assert_eq!(graph.edge_count(), 0);
    }
}
