//! Event reranking with directional PageRank.
//!
//! Candidates come from two concurrent recalls (entity join and query KNN),
//! merged with entity recall winning on collisions. The co-occurrence graph
//! is directional: entity edges weight votes by how often the shared entity
//! appears in the *target* event's text, category edges by the target's
//! share of the group's content length, so important events vote more for
//! content-rich targets.

use crate::backend::SearchBackend;
use crate::config::{RerankConfig, SearchConfig};
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::keys::KeyEntity;
use crate::rank::pagerank::DirectedGraph;
use crate::rank::{build_summary, RankedEvents};
use crate::tracker::{build_entity_node, metadata, DisplayLevel, Stage};
use eventlens_core::model::Event;
use eventlens_core::similarity::cosine;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use storage::{EventVectorStore, RelationalStore};

const CATEGORY_EDGE_WEIGHT: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateSource {
    Entity,
    Query,
}

impl CandidateSource {
    pub(crate) fn method(&self) -> &'static str {
        match self {
            CandidateSource::Entity => "entity",
            CandidateSource::Query => "query",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub event: Event,
    pub similarity: f32,
    pub source: CandidateSource,
    pub source_entities: Vec<String>,
    pub entity_weights: HashMap<String, f32>,
    pub pagerank: f32,
}

pub struct EventPagerankReranker<'a> {
    backend: &'a SearchBackend,
}

impl<'a> EventPagerankReranker<'a> {
    pub fn new(backend: &'a SearchBackend) -> Self {
        Self { backend }
    }

    pub async fn search(
        &self,
        ctx: &mut SearchContext,
        key_final: &[KeyEntity],
    ) -> Result<RankedEvents, SearchError> {
        let query_vector = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;
        tracing::info!(entities = key_final.len(), "event pagerank rerank started");

        // S1 and S2 are independent recalls; run them concurrently and let
        // the driver do all clue writing after the join.
        let scope: Vec<String> = ctx.scope().to_vec();
        let config = ctx.config.clone();
        let (step1, step2) = tokio::join!(
            step1_keys_to_events(self.backend, key_final, &scope, &config, &query_vector),
            step2_query_to_events(self.backend, &scope, &config, &query_vector),
        );
        let step1 = step1?;
        let step2 = step2?;
        tracing::info!(
            entity_recalled = step1.len(),
            query_recalled = step2.len(),
            "rerank recalls joined"
        );

        // S3: merge, entity recall wins on id collisions.
        let mut merged = step1;
        let known: HashSet<String> = merged
            .iter()
            .map(|candidate| candidate.event.id.clone())
            .collect();
        merged.extend(
            step2
                .into_iter()
                .filter(|candidate| !known.contains(&candidate.event.id)),
        );

        if merged.is_empty() {
            tracing::info!("no rerank candidates survived the thresholds");
            return Ok(RankedEvents {
                events: Vec::new(),
                summary: build_summary(ctx, key_final, HashMap::new()),
            });
        }

        // S4: initial weights.
        let initial_weights: Vec<f32> = merged
            .iter()
            .map(|candidate| {
                let entity_weight_sum: f32 = candidate.entity_weights.values().sum();
                0.5 * candidate.similarity + (1.0 + entity_weight_sum).ln()
            })
            .collect();

        // S5: directional graph + PageRank.
        let graph = build_event_graph(&merged, key_final);
        tracing::debug!(edges = graph.edge_count(), nodes = merged.len(), "event graph built");
        let ranks = graph.pagerank(
            &initial_weights,
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

        // S6: clues for every candidate, final level for the top N.
        let top_n = ctx.config.rerank.max_results;
        let entity_lookup: HashMap<&str, &KeyEntity> = key_final
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();

        for (rank, candidate) in merged.iter().enumerate() {
            emit_candidate_clues(
                ctx,
                candidate,
                rank + 1,
                &entity_lookup,
                DisplayLevel::Intermediate,
            );
        }
        for (rank, candidate) in merged.iter().take(top_n).enumerate() {
            emit_candidate_clues(
                ctx,
                candidate,
                rank + 1,
                &entity_lookup,
                DisplayLevel::Final,
            );
        }

        let top: Vec<&Candidate> = merged.iter().take(top_n).collect();
        let event_entities: HashMap<String, Vec<KeyEntity>> = top
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
        tracing::info!(returned = events.len(), "event pagerank rerank complete");

        Ok(RankedEvents {
            events,
            summary: build_summary(ctx, key_final, event_entities),
        })
    }
}

/// S1: entity join → events, scored by cosine against the query on stored
/// content vectors, thresholded and capped.
pub(crate) async fn step1_keys_to_events(
    backend: &SearchBackend,
    key_final: &[KeyEntity],
    scope: &[String],
    config: &SearchConfig,
    query_vector: &[f32],
) -> Result<Vec<Candidate>, SearchError> {
    if key_final.is_empty() {
        return Ok(Vec::new());
    }

    let entity_ids: Vec<String> = key_final.iter().map(|key| key.entity_id.clone()).collect();
    let key_weights: HashMap<&str, f32> = key_final
        .iter()
        .map(|key| (key.entity_id.as_str(), key.weight))
        .collect();

    let links = backend.relational.links_for_entities(&entity_ids, scope).await?;
    if links.is_empty() {
        tracing::debug!("no events linked to rerank entities");
        return Ok(Vec::new());
    }

    let mut event_order: Vec<String> = Vec::new();
    let mut event_to_entities: HashMap<String, Vec<String>> = HashMap::new();
    let mut link_weights: HashMap<(String, String), f32> = HashMap::new();
    for link in &links {
        let entry = event_to_entities.entry(link.event_id.clone()).or_default();
        if entry.is_empty() {
            event_order.push(link.event_id.clone());
        }
        entry.push(link.entity_id.clone());
        link_weights.insert((link.event_id.clone(), link.entity_id.clone()), link.weight);
    }

    let events = backend.relational.get_events(&event_order, scope).await?;
    let event_map: HashMap<&str, &Event> =
        events.iter().map(|event| (event.id.as_str(), event)).collect();

    let docs = backend.event_vectors.get_events_by_ids(&event_order).await?;
    let vector_map: HashMap<&str, &Vec<f32>> = docs
        .iter()
        .filter_map(|doc| doc.content_vector.as_ref().map(|v| (doc.event_id.as_str(), v)))
        .collect();

    let mut candidates = Vec::new();
    let mut missing_vectors = 0usize;
    for event_id in &event_order {
        let Some(event) = event_map.get(event_id.as_str()) else {
            continue;
        };
        let Some(vector) = vector_map.get(event_id.as_str()) else {
            missing_vectors += 1;
            continue;
        };

        let similarity = cosine(query_vector, vector);
        let source_entities = event_to_entities
            .get(event_id)
            .cloned()
            .unwrap_or_default();
        let entity_weights: HashMap<String, f32> = source_entities
            .iter()
            .map(|entity_id| {
                let key_weight = key_weights.get(entity_id.as_str()).copied().unwrap_or(1.0);
                let link_weight = link_weights
                    .get(&(event_id.clone(), entity_id.clone()))
                    .copied()
                    .unwrap_or(1.0);
                (entity_id.clone(), key_weight * link_weight)
            })
            .collect();

        candidates.push(Candidate {
            event: (*event).clone(),
            similarity,
            source: CandidateSource::Entity,
            source_entities,
            entity_weights,
            pagerank: 0.0,
        });
    }
    if missing_vectors > 0 {
        tracing::warn!(missing_vectors, "entity-recalled events without vectors dropped");
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.retain(|candidate| candidate.similarity >= config.rerank.score_threshold);
    candidates.truncate(config.rerank.max_key_recall_results);

    Ok(candidates)
}

/// S2: query KNN over event content vectors; events resolved through the
/// relational store, scored on the stored vectors.
pub(crate) async fn step2_query_to_events(
    backend: &SearchBackend,
    scope: &[String],
    config: &SearchConfig,
    query_vector: &[f32],
) -> Result<Vec<Candidate>, SearchError> {
    let hits = backend
        .event_vectors
        .search_similar_by_content(query_vector, config.rerank.max_query_recall_results, scope)
        .await?;
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let hit_ids: Vec<String> = hits.iter().map(|hit| hit.event_id.clone()).collect();
    let events = backend.relational.get_events(&hit_ids, scope).await?;
    let event_map: HashMap<&str, &Event> =
        events.iter().map(|event| (event.id.as_str(), event)).collect();

    let docs = backend.event_vectors.get_events_by_ids(&hit_ids).await?;
    let vector_map: HashMap<&str, &Vec<f32>> = docs
        .iter()
        .filter_map(|doc| doc.content_vector.as_ref().map(|v| (doc.event_id.as_str(), v)))
        .collect();

    let mut candidates = Vec::new();
    for hit in &hits {
        let Some(event) = event_map.get(hit.event_id.as_str()) else {
            tracing::debug!(event = %hit.event_id, "query hit without relational record dropped");
            continue;
        };
        let Some(vector) = vector_map.get(hit.event_id.as_str()) else {
            continue;
        };

        let similarity = cosine(query_vector, vector);
        candidates.push(Candidate {
            event: (*event).clone(),
            similarity,
            source: CandidateSource::Query,
            source_entities: Vec::new(),
            entity_weights: HashMap::new(),
            pagerank: 0.0,
        });
    }

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.retain(|candidate| candidate.similarity >= config.rerank.score_threshold);

    Ok(candidates)
}

/// Entity edges: for a shared entity of weight κ, event i votes for event j
/// with κ × (occurrences of the entity name in j's text); zero-count edges
/// do not exist. Category edges: within a category group, i votes for j
/// with 0.1 × len_j / Σ len.
pub(crate) fn build_event_graph(candidates: &[Candidate], key_final: &[KeyEntity]) -> DirectedGraph {
    let mut graph = DirectedGraph::new(candidates.len());

    let entity_names: HashMap<&str, (&str, f32)> = key_final
        .iter()
        .map(|key| (key.entity_id.as_str(), (key.name.as_str(), key.weight)))
        .collect();

    let mut entity_to_indices: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        for entity_id in &candidate.source_entities {
            entity_to_indices
                .entry(entity_id.as_str())
                .or_default()
                .push(index);
        }
    }

    let texts: Vec<String> = candidates
        .iter()
        .map(|candidate| candidate.event.full_text())
        .collect();

    let mut entity_ids: Vec<&str> = entity_to_indices.keys().copied().collect();
    entity_ids.sort_unstable();

    for entity_id in entity_ids {
        let indices = &entity_to_indices[entity_id];
        if indices.len() < 2 {
            continue;
        }
        let Some((name, weight)) = entity_names.get(entity_id) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let counts: Vec<usize> = indices
            .iter()
            .map(|index| texts[*index].matches(name).count())
            .collect();

        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate().skip(a + 1) {
                graph.add_edge(i, j, weight * counts[b] as f32);
                graph.add_edge(j, i, weight * counts[a] as f32);
            }
        }
    }

    let mut category_groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.event.category.is_empty() {
            category_groups
                .entry(candidate.event.category.as_str())
                .or_default()
                .push(index);
        }
    }

    for indices in category_groups.values() {
        if indices.len() < 2 {
            continue;
        }
        let lengths: Vec<f32> = indices
            .iter()
            .map(|index| texts[*index].chars().count().max(1) as f32)
            .collect();
        let total: f32 = lengths.iter().sum();
        if total <= 0.0 {
            continue;
        }

        for (a, &i) in indices.iter().enumerate() {
            for (b, &j) in indices.iter().enumerate().skip(a + 1) {
                graph.add_edge(i, j, CATEGORY_EDGE_WEIGHT * lengths[b] / total);
                graph.add_edge(j, i, CATEGORY_EDGE_WEIGHT * lengths[a] / total);
            }
        }
    }

    graph
}

fn emit_candidate_clues(
    ctx: &mut SearchContext,
    candidate: &Candidate,
    rank: usize,
    entity_lookup: &HashMap<&str, &KeyEntity>,
    level: DisplayLevel,
) {
    let relation = match (candidate.source, level) {
        (_, DisplayLevel::Final) => "final_event",
        (CandidateSource::Entity, _) => "entity_recall",
        (CandidateSource::Query, _) => "query_recall",
    };
    let meta = metadata(&[
        (
            "method",
            json!(format!("pagerank_{}", candidate.source.method())),
        ),
        ("pagerank_score", json!(candidate.pagerank)),
        ("similarity_score", json!(candidate.similarity)),
        ("rank", json!(rank)),
    ]);

    match candidate.source {
        CandidateSource::Entity => {
            for entity_id in &candidate.source_entities {
                let Some(key) = entity_lookup.get(entity_id.as_str()) else {
                    tracing::warn!(entity = %entity_id, "rerank source entity not in key_final");
                    continue;
                };
                let event_node =
                    ctx.tracker
                        .event_node(&candidate.event, Stage::Rerank, None, Some("entity"));
                ctx.tracker.add_clue(
                    Stage::Rerank,
                    build_entity_node(key),
                    event_node,
                    candidate.similarity,
                    Some(relation),
                    meta.clone(),
                    level,
                );
            }
        }
        CandidateSource::Query => {
            let query_node = ctx.query_node();
            let event_node =
                ctx.tracker
                    .event_node(&candidate.event, Stage::Rerank, None, Some("query"));
            ctx.tracker.add_clue(
                Stage::Rerank,
                query_node,
                event_node,
                candidate.similarity,
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
    use eventlens_core::model::SourceType;

    fn candidate(id: &str, category: &str, content: &str, entities: &[&str]) -> Candidate {
        Candidate {
            event: Event {
                id: id.to_string(),
                source_config_id: "s1".to_string(),
                source_type: SourceType::Article,
                source_id: "a1".to_string(),
                chunk_id: None,
                title: String::new(),
                summary: String::new(),
                content: content.to_string(),
                category: category.to_string(),
                rank: 0,
                start_time: None,
                end_time: None,
                references: Vec::new(),
            },
            similarity: 0.8,
            source: CandidateSource::Entity,
            source_entities: entities.iter().map(|s| s.to_string()).collect(),
            entity_weights: HashMap::new(),
            pagerank: 0.0,
        }
    }

    #[test]
    fn entity_edges_weight_by_target_occurrences() {
        let key = KeyEntity::recalled("k1", "alpha", "topic", 2.0);
        let candidates = vec![
            candidate("e1", "", "alpha appears once", &["k1"]),
            candidate("e2", "", "alpha alpha appears twice", &["k1"]),
        ];

        let graph = build_event_graph(&candidates, &[key]);
        // e1 → e2 with weight 2.0 × 2 and e2 → e1 with 2.0 × 1.
        assert_eq!(graph.edge_count(), 2);

        let ranks = graph.pagerank(&[1.0, 1.0], 0.85, 100);
        assert!(ranks[1] > ranks[0], "content-richer target must win");
    }

    #[test]
    fn zero_occurrence_edges_are_omitted() {
        let key = KeyEntity::recalled("k1", "alpha", "topic", 1.0);
        let candidates = vec![
            candidate("e1", "", "alpha here", &["k1"]),
            candidate("e2", "", "no mention at all", &["k1"]),
        ];

        let graph = build_event_graph(&candidates, &[key]);
        // Only e2 → e1 exists (alpha never occurs in e2's text).
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn category_edges_prefer_longer_targets() {
        let candidates = vec![
            candidate("e1", "tech", "short", &[]),
            candidate("e2", "tech", "a much longer content body for this event", &[]),
        ];

        let graph = build_event_graph(&candidates, &[]);
        assert_eq!(graph.edge_count(), 2);

        let ranks = graph.pagerank(&[1.0, 1.0], 0.85, 100);
        assert!(ranks[1] > ranks[0]);
    }
}
