//! Entity expansion: N-hop walk over the entity↔event co-occurrence graph.
//!
//! Each hop joins the frontier to its events, scores those events against
//! the query, propagates the composite weight back onto every entity the
//! events contain, and selects the strongest newly discovered entities as
//! the next frontier. Weights aggregate across hops with later hops
//! counting more.

use crate::backend::SearchBackend;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::keys::{KeyEntity, ParentEntity};
use crate::recall::RecallResult;
use crate::tracker::{build_entity_node, build_parent_entity_node, metadata, DisplayLevel, Stage};
use eventlens_core::similarity::batch_cosine;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use storage::{EventVectorStore, RelationalStore};

const EVENT_VECTOR_BATCH: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct JumpDiagnostics {
    pub hop: u32,
    pub events_found: usize,
    pub events_similar: usize,
    pub keys_count: usize,
    pub total_weight: f32,
    pub weight_change: f32,
}

#[derive(Debug, Clone)]
pub struct ExpandResult {
    /// All discovered entities across recall and every hop, ordered by
    /// aggregated weight.
    pub key_final: Vec<KeyEntity>,
    pub jump_results: Vec<JumpDiagnostics>,
    pub total_hops: u32,
    pub convergence_reached: bool,
    pub all_events_by_hop: HashMap<u32, Vec<String>>,
    pub all_keys_by_hop: HashMap<u32, Vec<String>>,
    pub weight_evolution: HashMap<u32, HashMap<String, f32>>,
}

impl ExpandResult {
    /// Pass-through used when expansion is disabled or `max_hops` is zero:
    /// exactly the recall result.
    pub fn from_recall(recall: &RecallResult) -> Self {
        Self {
            key_final: recall.key_final.clone(),
            jump_results: Vec::new(),
            total_hops: 0,
            convergence_reached: false,
            all_events_by_hop: HashMap::new(),
            all_keys_by_hop: HashMap::new(),
            weight_evolution: HashMap::new(),
        }
    }
}

/// One discovery path: (parent entity, the event they co-occur in, the
/// event's composite weight at that hop).
type ExpansionPath = (String, String, f32);

struct ParentRecord {
    parent_id: String,
    event_id: String,
    event_weight: f32,
    hop: u32,
}

pub struct ExpandSearcher<'a> {
    backend: &'a SearchBackend,
}

impl<'a> ExpandSearcher<'a> {
    pub fn new(backend: &'a SearchBackend) -> Self {
        Self { backend }
    }

    pub async fn search(
        &self,
        ctx: &mut SearchContext,
        recall: &RecallResult,
    ) -> Result<ExpandResult, SearchError> {
        if recall.key_final.is_empty() {
            tracing::warn!("no recall entities, expansion skipped");
            return Ok(ExpandResult::from_recall(recall));
        }
        if ctx.config.expand.max_hops == 0 {
            return Ok(ExpandResult::from_recall(recall));
        }

        tracing::info!(
            entities = recall.key_final.len(),
            max_hops = ctx.config.expand.max_hops,
            "expansion started"
        );

        let recall_ids: Vec<String> = recall
            .key_final
            .iter()
            .map(|key| key.entity_id.clone())
            .collect();
        let recall_id_set: HashSet<String> = recall_ids.iter().cloned().collect();

        let mut frontier_ids = recall_ids.clone();
        let mut frontier_weights: HashMap<String, f32> = recall
            .key_final
            .iter()
            .map(|key| (key.entity_id.clone(), key.weight))
            .collect();

        let mut discovered_order = recall_ids.clone();
        let mut discovered: HashSet<String> = recall_id_set.clone();

        let mut jump_results = Vec::new();
        let mut all_events_by_hop = HashMap::new();
        let mut all_keys_by_hop = HashMap::new();
        let mut weight_evolution: HashMap<u32, HashMap<String, f32>> = HashMap::new();
        let mut parent_map: HashMap<String, ParentRecord> = HashMap::new();
        let mut no_expansion_recall_keys: Vec<String> = Vec::new();

        let mut previous_total_weight = 0.0f32;
        let mut converged = false;

        for hop in 1..=ctx.config.expand.max_hops {
            // 1. Frontier → events.
            let mut event_ids = self.frontier_events(ctx, &frontier_ids).await?;
            if event_ids.len() > ctx.config.expand.max_events_per_hop {
                tracing::debug!(
                    hop,
                    found = event_ids.len(),
                    cap = ctx.config.expand.max_events_per_hop,
                    "hop event set capped"
                );
                event_ids.truncate(ctx.config.expand.max_events_per_hop);
            }
            all_events_by_hop.insert(hop, event_ids.clone());

            if event_ids.is_empty() {
                tracing::info!(hop, "no events for frontier, expansion stops");
                break;
            }

            // 2. Event ↔ query similarity on stored vectors.
            let event_query_weights = self.event_query_similarity(ctx, &event_ids).await?;
            if event_query_weights.len() < ctx.config.expand.min_events_per_hop.max(1) {
                tracing::info!(
                    hop,
                    similar = event_query_weights.len(),
                    "too few similar events, expansion stops"
                );
                break;
            }

            // 3/4. Composite event weight from frontier weights × query
            // similarity, max-normalized.
            let links = self
                .backend
                .relational
                .links_for_events(&event_ids)
                .await?;

            let mut event_to_entities: HashMap<&str, Vec<&str>> = HashMap::new();
            let mut entity_to_events: HashMap<&str, Vec<&str>> = HashMap::new();
            let mut entity_order: Vec<&str> = Vec::new();
            let mut entity_seen: HashSet<&str> = HashSet::new();
            for link in &links {
                event_to_entities
                    .entry(link.event_id.as_str())
                    .or_default()
                    .push(link.entity_id.as_str());
                entity_to_events
                    .entry(link.entity_id.as_str())
                    .or_default()
                    .push(link.event_id.as_str());
                if entity_seen.insert(link.entity_id.as_str()) {
                    entity_order.push(link.entity_id.as_str());
                }
            }

            let event_jump_weights = composite_event_weights(
                &event_ids,
                &event_query_weights,
                &event_to_entities,
                &frontier_weights,
            );

            // 5. Reverse onto every entity in the events; trace how new
            // entities were reached.
            let frontier_set: HashSet<&str> =
                frontier_ids.iter().map(String::as_str).collect();
            let mut new_key_weights: HashMap<String, f32> = HashMap::new();
            let mut expansion_trace: HashMap<String, Vec<ExpansionPath>> = HashMap::new();

            for entity_id in &entity_order {
                let events = entity_to_events.get(entity_id).cloned().unwrap_or_default();
                let weight: f32 = events
                    .iter()
                    .map(|event_id| event_jump_weights.get(*event_id).copied().unwrap_or(0.0))
                    .sum();
                new_key_weights.insert(entity_id.to_string(), weight);

                if !discovered.contains(*entity_id) {
                    let mut paths = Vec::new();
                    for event_id in &events {
                        let event_weight =
                            event_jump_weights.get(*event_id).copied().unwrap_or(0.0);
                        if event_weight <= 0.0 {
                            continue;
                        }
                        for parent in event_to_entities
                            .get(*event_id)
                            .into_iter()
                            .flatten()
                            .filter(|candidate| frontier_set.contains(**candidate))
                        {
                            paths.push((parent.to_string(), event_id.to_string(), event_weight));
                        }
                    }
                    if !paths.is_empty() {
                        expansion_trace.insert(entity_id.to_string(), paths);
                    }
                }
            }

            if hop == 1 {
                // Recall entities that seeded no discovery at all.
                let parents_with_children: HashSet<&str> = expansion_trace
                    .values()
                    .flatten()
                    .map(|(parent, _, _)| parent.as_str())
                    .collect();
                no_expansion_recall_keys = frontier_ids
                    .iter()
                    .filter(|id| !parents_with_children.contains(id.as_str()))
                    .cloned()
                    .collect();
            }

            weight_evolution.insert(hop, new_key_weights.clone());

            let current_total_weight: f32 = new_key_weights.values().sum();
            let weight_change = (current_total_weight - previous_total_weight).abs();
            previous_total_weight = current_total_weight;

            jump_results.push(JumpDiagnostics {
                hop,
                events_found: event_ids.len(),
                events_similar: event_query_weights.len(),
                keys_count: new_key_weights.len(),
                total_weight: current_total_weight,
                weight_change,
            });

            tracing::info!(
                hop,
                total_weight = current_total_weight,
                weight_change,
                "hop complete"
            );

            // 6. Convergence: stop after this hop, keeping its weights but
            // not promoting a new frontier.
            if weight_change < ctx.config.expand.weight_change_threshold {
                tracing::info!(hop, weight_change, "weight change converged");
                converged = true;
                break;
            }

            // 7. Next frontier: strongest new entities.
            let mut fresh: Vec<(String, f32)> = entity_order
                .iter()
                .copied()
                .filter(|id| !discovered.contains(*id))
                .map(|id| {
                    (
                        id.to_string(),
                        new_key_weights.get(id).copied().unwrap_or(0.0),
                    )
                })
                .collect();
            fresh.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            fresh.truncate(ctx.config.expand.entities_per_hop);

            if fresh.is_empty() {
                tracing::info!(hop, "no new entities discovered, expansion stops");
                break;
            }

            for (entity_id, _) in &fresh {
                if let Some(paths) = expansion_trace.get(entity_id) {
                    // Strongest event wins as the recorded discovery path.
                    let best = paths
                        .iter()
                        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
                    if let Some((parent_id, event_id, event_weight)) = best {
                        parent_map.insert(
                            entity_id.clone(),
                            ParentRecord {
                                parent_id: parent_id.clone(),
                                event_id: event_id.clone(),
                                event_weight: *event_weight,
                                hop,
                            },
                        );
                    }
                }
                discovered.insert(entity_id.clone());
                discovered_order.push(entity_id.clone());
            }

            all_keys_by_hop.insert(hop, fresh.iter().map(|(id, _)| id.clone()).collect());

            frontier_ids = fresh.iter().map(|(id, _)| id.clone()).collect();
            frontier_weights = fresh.into_iter().collect();
        }

        // Aggregate weights across hops: later hops weigh more.
        let aggregated = aggregate_weights(&weight_evolution);

        let key_final = self
            .build_key_final(
                &discovered_order,
                &recall_id_set,
                &aggregated,
                &weight_evolution,
                &parent_map,
            )
            .await?;

        self.emit_clues(ctx, &key_final, &parent_map, &no_expansion_recall_keys)
            .await?;

        tracing::info!(
            hops = jump_results.len(),
            entities = key_final.len(),
            converged,
            "expansion complete"
        );

        Ok(ExpandResult {
            key_final,
            total_hops: jump_results.len() as u32,
            jump_results,
            convergence_reached: converged,
            all_events_by_hop,
            all_keys_by_hop,
            weight_evolution,
        })
    }

    async fn frontier_events(
        &self,
        ctx: &SearchContext,
        frontier_ids: &[String],
    ) -> Result<Vec<String>, SearchError> {
        if frontier_ids.is_empty() {
            return Ok(Vec::new());
        }

        let links = self
            .backend
            .relational
            .links_for_entities(frontier_ids, ctx.scope())
            .await?;

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for link in links {
            if seen.insert(link.event_id.clone()) {
                out.push(link.event_id);
            }
        }
        Ok(out)
    }

    /// Fetch stored event vectors in batches and score them against the
    /// cached query embedding; events below the hop threshold drop out.
    async fn event_query_similarity(
        &self,
        ctx: &mut SearchContext,
        event_ids: &[String],
    ) -> Result<HashMap<String, f32>, SearchError> {
        let query_embedding = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;

        let mut weights = HashMap::new();
        let mut missing = 0usize;

        for batch in event_ids.chunks(EVENT_VECTOR_BATCH) {
            let docs = self.backend.event_vectors.get_events_by_ids(batch).await?;

            let mut ids = Vec::new();
            let mut vectors = Vec::new();
            for doc in docs {
                // Content vector preferred, title vector as a degraded stand-in.
                let vector = doc.content_vector.or(doc.title_vector);
                match vector {
                    Some(vector) => {
                        ids.push(doc.event_id);
                        vectors.push(vector);
                    }
                    None => missing += 1,
                }
            }

            let similarities = batch_cosine(&query_embedding, &vectors);
            for (event_id, similarity) in ids.into_iter().zip(similarities) {
                if similarity >= ctx.config.expand.event_similarity_threshold {
                    weights.insert(event_id, similarity);
                }
            }
        }

        if missing > 0 {
            tracing::warn!(missing, "events without stored vectors dropped");
        }

        Ok(weights)
    }

    async fn build_key_final(
        &self,
        discovered_order: &[String],
        recall_ids: &HashSet<String>,
        aggregated: &HashMap<String, f32>,
        weight_evolution: &HashMap<u32, HashMap<String, f32>>,
        parent_map: &HashMap<String, ParentRecord>,
    ) -> Result<Vec<KeyEntity>, SearchError> {
        if discovered_order.is_empty() {
            return Ok(Vec::new());
        }

        let mut sorted: Vec<(String, f32)> = discovered_order
            .iter()
            .map(|id| (id.clone(), aggregated.get(id).copied().unwrap_or(0.0)))
            .collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let ids: Vec<String> = sorted.iter().map(|(id, _)| id.clone()).collect();
        let entities = self.backend.relational.get_entities(&ids).await?;
        let entity_map: HashMap<&str, &eventlens_core::model::Entity> = entities
            .iter()
            .map(|entity| (entity.id.as_str(), entity))
            .collect();

        let mut hops_sorted: Vec<u32> = weight_evolution.keys().copied().collect();
        hops_sorted.sort_unstable();

        let mut key_final = Vec::new();
        for (entity_id, weight) in sorted {
            let Some(entity) = entity_map.get(entity_id.as_str()) else {
                tracing::warn!(entity = %entity_id, "discovered entity missing from store");
                continue;
            };

            let step = if recall_ids.contains(&entity_id) {
                1
            } else {
                hops_sorted
                    .iter()
                    .find(|hop| {
                        weight_evolution
                            .get(hop)
                            .is_some_and(|weights| weights.contains_key(&entity_id))
                    })
                    .map(|hop| hop + 1)
                    .unwrap_or(2)
            };

            let mut key = KeyEntity {
                entity_id: entity_id.clone(),
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                weight,
                description: entity.description.clone(),
                steps: vec![step],
                hop: 0,
                similarity: None,
                parent_entity: None,
            };

            if let Some(record) = parent_map.get(&entity_id) {
                let parent_hop = record.hop.saturating_sub(1);
                let parent = entity_map.get(record.parent_id.as_str());
                key.parent_entity = Some(ParentEntity {
                    id: record.parent_id.clone(),
                    name: parent.map(|p| p.name.clone()).unwrap_or_else(|| {
                        format!("unknown-{}", &record.parent_id)
                    }),
                    entity_type: parent
                        .map(|p| p.entity_type.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    hop: parent_hop,
                });
                key.hop = record.hop;
            } else if step >= 2 {
                tracing::warn!(entity = %entity_id, step, "expanded entity missing parent record");
            }

            key_final.push(key);
        }

        Ok(key_final)
    }

    /// Final-level clues for the merged entity list. Expanded entities emit
    /// the split pattern parent → event → child so the co-occurrence event
    /// is never lost; recall leaves emit a terminal clue.
    async fn emit_clues(
        &self,
        ctx: &mut SearchContext,
        key_final: &[KeyEntity],
        parent_map: &HashMap<String, ParentRecord>,
        no_expansion_recall_keys: &[String],
    ) -> Result<(), SearchError> {
        let event_ids: Vec<String> = key_final
            .iter()
            .filter(|key| key.steps.first().copied().unwrap_or(0) >= 2)
            .filter_map(|key| parent_map.get(&key.entity_id))
            .map(|record| record.event_id.clone())
            .collect();

        let events = self
            .backend
            .relational
            .get_events(&event_ids, ctx.scope())
            .await?;
        let event_map: HashMap<&str, &eventlens_core::model::Event> =
            events.iter().map(|event| (event.id.as_str(), event)).collect();

        let no_expansion: HashSet<&str> = no_expansion_recall_keys
            .iter()
            .map(String::as_str)
            .collect();

        for key in key_final {
            let step = key.steps.first().copied().unwrap_or(1);

            if step == 1 {
                let relation = if no_expansion.contains(key.entity_id.as_str()) {
                    "recall_no_expansion"
                } else {
                    "recall_seed"
                };
                let mut meta = metadata(&[
                    ("method", json!("final_result")),
                    ("step", json!("recall")),
                    ("steps", json!([1])),
                    ("hop", json!(0)),
                    ("weight", json!(key.weight)),
                ]);
                if relation == "recall_no_expansion" {
                    meta.insert("is_leaf".to_string(), json!(true));
                }

                let query_node = ctx.query_node();
                ctx.tracker.add_clue(
                    Stage::Expand,
                    query_node,
                    build_entity_node(key),
                    key.similarity.unwrap_or(0.0),
                    Some(relation),
                    meta,
                    DisplayLevel::Final,
                );
                continue;
            }

            let Some(parent) = &key.parent_entity else {
                continue;
            };
            let record = parent_map.get(&key.entity_id);
            let hop = key.hop;

            match record.and_then(|r| event_map.get(r.event_id.as_str()).map(|e| (r, *e))) {
                Some((record, event)) => {
                    let parent_node = build_parent_entity_node(parent);
                    let event_node =
                        ctx.tracker
                            .event_node(event, Stage::Expand, Some(hop), None);
                    let child_node = build_entity_node(key);

                    ctx.tracker.add_clue(
                        Stage::Expand,
                        parent_node,
                        event_node.clone(),
                        record.event_weight,
                        Some("cooccurrence_event"),
                        metadata(&[
                            ("method", json!("final_result")),
                            ("step", json!(format!("expand_hop{hop}"))),
                            ("steps", json!([step])),
                            ("hop", json!(hop)),
                        ]),
                        DisplayLevel::Final,
                    );
                    ctx.tracker.add_clue(
                        Stage::Expand,
                        event_node,
                        child_node,
                        record.event_weight,
                        Some("expansion"),
                        metadata(&[
                            ("method", json!("final_result")),
                            ("step", json!(format!("expand_hop{hop}"))),
                            ("steps", json!([step])),
                            ("hop", json!(hop)),
                            ("weight", json!(key.weight)),
                        ]),
                        DisplayLevel::Final,
                    );
                }
                None => {
                    // Event record unavailable: degrade to a direct edge
                    // rather than losing the discovery entirely.
                    tracing::warn!(entity = %key.entity_id, "expand event missing, direct clue used");
                    ctx.tracker.add_clue(
                        Stage::Expand,
                        build_parent_entity_node(parent),
                        build_entity_node(key),
                        key.similarity.unwrap_or(0.0),
                        Some("expansion"),
                        metadata(&[
                            ("method", json!("final_result")),
                            ("step", json!(format!("expand_hop{hop}"))),
                            ("hop", json!(hop)),
                            ("weight", json!(key.weight)),
                        ]),
                        DisplayLevel::Final,
                    );
                }
            }
        }

        Ok(())
    }
}

fn composite_event_weights(
    event_ids: &[String],
    event_query_weights: &HashMap<String, f32>,
    event_to_entities: &HashMap<&str, Vec<&str>>,
    frontier_weights: &HashMap<String, f32>,
) -> HashMap<String, f32> {
    let mut weights: HashMap<String, f32> = HashMap::new();

    for event_id in event_ids {
        let key_weight: f32 = event_to_entities
            .get(event_id.as_str())
            .map(|entities| {
                entities
                    .iter()
                    .map(|entity_id| frontier_weights.get(*entity_id).copied().unwrap_or(0.0))
                    .sum()
            })
            .unwrap_or(0.0);
        let query_weight = event_query_weights.get(event_id).copied().unwrap_or(0.0);
        weights.insert(event_id.clone(), key_weight * query_weight);
    }

    let max = weights.values().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        weights.retain(|_, weight| *weight > 0.0);
        for weight in weights.values_mut() {
            *weight /= max;
        }
    } else if !weights.is_empty() {
        tracing::warn!("all composite event weights zero, using fallback");
        for weight in weights.values_mut() {
            *weight = 0.1;
        }
    }

    weights
}

/// Weighted average across hops with later hops counting more:
/// `w(k) = Σ_i w_k,i · (i/H) / Σ_i (i/H)` over the hops where k appears.
fn aggregate_weights(weight_evolution: &HashMap<u32, HashMap<String, f32>>) -> HashMap<String, f32> {
    if weight_evolution.is_empty() {
        return HashMap::new();
    }

    let total_hops = weight_evolution.len() as f32;
    let mut hops: Vec<u32> = weight_evolution.keys().copied().collect();
    hops.sort_unstable();

    let mut all_ids: HashSet<&String> = HashSet::new();
    for weights in weight_evolution.values() {
        all_ids.extend(weights.keys());
    }

    let mut aggregated = HashMap::new();
    for id in all_ids {
        let mut weighted_sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        // Fixed hop order keeps float accumulation reproducible.
        for hop in &hops {
            if let Some(weight) = weight_evolution.get(hop).and_then(|weights| weights.get(id)) {
                let importance = *hop as f32 / total_hops;
                weighted_sum += weight * importance;
                weight_sum += importance;
            }
        }
        if weight_sum > 0.0 {
            aggregated.insert(id.clone(), weighted_sum / weight_sum);
        }
    }

    aggregated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_favors_later_hops() {
        let mut evolution = HashMap::new();
        let mut hop1 = HashMap::new();
        hop1.insert("k".to_string(), 1.0f32);
        let mut hop2 = HashMap::new();
        hop2.insert("k".to_string(), 0.4f32);
        evolution.insert(1, hop1);
        evolution.insert(2, hop2);

        let aggregated = aggregate_weights(&evolution);
        // (1.0·0.5 + 0.4·1.0) / (0.5 + 1.0) = 0.6
        assert!((aggregated["k"] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn composite_weights_normalize_by_max() {
        let event_ids = vec!["e1".to_string(), "e2".to_string()];
        let mut query_weights = HashMap::new();
        query_weights.insert("e1".to_string(), 0.8f32);
        query_weights.insert("e2".to_string(), 0.4f32);

        let mut event_to_entities: HashMap<&str, Vec<&str>> = HashMap::new();
        event_to_entities.insert("e1", vec!["a"]);
        event_to_entities.insert("e2", vec!["a"]);

        let mut frontier = HashMap::new();
        frontier.insert("a".to_string(), 1.0f32);

        let weights =
            composite_event_weights(&event_ids, &query_weights, &event_to_entities, &frontier);
        assert!((weights["e1"] - 1.0).abs() < 1e-6);
        assert!((weights["e2"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn composite_weights_fall_back_when_all_zero() {
        let event_ids = vec!["e1".to_string()];
        let query_weights = HashMap::new();
        let mut event_to_entities: HashMap<&str, Vec<&str>> = HashMap::new();
        event_to_entities.insert("e1", vec!["a"]);
        let frontier = HashMap::new();

        let weights =
            composite_event_weights(&event_ids, &query_weights, &event_to_entities, &frontier);
        assert_eq!(weights["e1"], 0.1);
    }
}
