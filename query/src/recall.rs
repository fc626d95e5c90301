//! Entity recall: turn a query into a weighted entity set.
//!
//! Full mode runs the 8-step compound algorithm (attribute extraction →
//! entity vectors → entity/event joins → query/event vectors → intersection
//! → weight propagation → selection). Fast mode skips the LLM and recalls
//! entities straight from the query embedding.

use crate::backend::SearchBackend;
use crate::context::SearchContext;
use crate::error::SearchError;
use crate::keys::{EventMatch, KeyEntity, RecalledEntity};
use crate::tracker::{
    build_entity_node, build_extracted_entity_node, metadata, DisplayLevel, Stage,
};
use eventlens_core::model::Event;
use serde_json::json;
use slm::{AttributeExtractor, EmbeddingClient, QueryAttribute};
use std::collections::{HashMap, HashSet};
use storage::{EntityVectorStore, EventVectorStore, RelationalStore};

const DEFAULT_TYPE_THRESHOLD: f32 = 0.800;
const ZERO_WEIGHT_FALLBACK: f32 = 0.1;

/// Recall output: the selected entities plus every intermediate artifact,
/// kept for diagnostics.
#[derive(Debug, Clone)]
pub struct RecallResult {
    pub original_query: String,
    pub key_final: Vec<KeyEntity>,
    pub key_query_related: Vec<RecalledEntity>,
    pub event_key_query_related: Vec<String>,
    pub event_query_related: Vec<EventMatch>,
    pub event_related: Vec<String>,
    pub key_related: Vec<String>,
    pub event_key_weights: HashMap<String, f32>,
    pub event_key_query_weights: HashMap<String, f32>,
    pub key_event_weights: HashMap<String, f32>,
}

fn recalled_as_key(entity: &RecalledEntity) -> KeyEntity {
    let mut key = KeyEntity::recalled(
        entity.entity_id.clone(),
        entity.name.clone(),
        entity.entity_type.clone(),
        entity.similarity,
    );
    key.similarity = Some(entity.similarity);
    key
}

pub struct RecallSearcher<'a> {
    backend: &'a SearchBackend,
}

impl<'a> RecallSearcher<'a> {
    pub fn new(backend: &'a SearchBackend) -> Self {
        Self { backend }
    }

    pub async fn search(&self, ctx: &mut SearchContext) -> Result<RecallResult, SearchError> {
        let original_query = ctx.query.clone();
        tracing::info!(query = %ctx.query, scope = ?ctx.scope(), "recall started");

        // Step 1/2: query → weighted entity candidates.
        let (key_query_related, k1_weights) = if ctx.config.recall.use_fast_mode {
            self.step1_fast(ctx).await?
        } else {
            self.step1_full(ctx).await?
        };

        // query → entity clues for every candidate that survived the gate.
        for entity in &key_query_related {
            let query_node = ctx.query_node();
            ctx.tracker.add_clue(
                Stage::Recall,
                query_node,
                build_entity_node(&recalled_as_key(entity)),
                entity.similarity,
                None,
                metadata(&[
                    ("method", json!("vector_search")),
                    ("step", json!("step1")),
                    ("source_attribute", json!(entity.source_attribute)),
                ]),
                DisplayLevel::Intermediate,
            );
        }

        ctx.query_recalled_keys = key_query_related.iter().map(recalled_as_key).collect();

        if key_query_related.is_empty() {
            tracing::warn!("recall step1 produced no entities");
        }

        // Step 3: entity → event join.
        let (event_key_query_related, entity_to_events, event_to_entities) =
            self.step2_keys_to_events(ctx, &key_query_related).await?;
        tracing::info!(events = event_key_query_related.len(), "recall step2 done");

        // Step 4: query → event KNN.
        let (event_query_related, e1_weights) = self.step3_query_to_events(ctx).await?;
        tracing::info!(events = event_query_related.len(), "recall step3 done");

        // Step 5: intersection of the two event sets; keep only entities
        // whose events touch it.
        let (event_related, key_related) = step4_filter_events(
            &event_key_query_related,
            &event_query_related,
            &key_query_related,
            &entity_to_events,
        );
        tracing::info!(
            events = event_related.len(),
            entities = key_related.len(),
            "recall step4 done"
        );

        // Step 6: per-event entity weight, max-normalized.
        let event_key_weights = step5_event_key_weights(
            &event_related,
            &key_related,
            &k1_weights,
            &event_to_entities,
        );

        // Step 7 input: event weight × query similarity.
        let event_key_query_weights: HashMap<String, f32> = event_key_weights
            .iter()
            .map(|(event_id, weight)| {
                let query_weight = e1_weights.get(event_id).copied().unwrap_or(0.0);
                (event_id.clone(), weight * query_weight)
            })
            .collect();

        // Step 7: reverse propagation back onto entities.
        let key_event_weights = step7_key_weights(
            &key_related,
            &event_related,
            &entity_to_events,
            &event_key_query_weights,
        );

        // Step 8: final selection.
        let key_final = self
            .step8_extract_important_keys(ctx, &key_related, &key_event_weights, &key_query_related)
            .await?;
        tracing::info!(entities = key_final.len(), "recall step8 done");

        // Keep only the query-recalled entities that made the final cut,
        // replaced by their final (weighted) form.
        let final_map: HashMap<&str, &KeyEntity> = key_final
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();
        ctx.query_recalled_keys = key_query_related
            .iter()
            .filter_map(|entity| final_map.get(entity.entity_id.as_str()).map(|k| (*k).clone()))
            .collect();

        Ok(RecallResult {
            original_query,
            key_final,
            key_query_related,
            event_key_query_related,
            event_query_related,
            event_related,
            key_related,
            event_key_weights,
            event_key_query_weights,
            key_event_weights,
        })
    }

    /// Fast mode: one query embedding, one KNN, per-entity threshold gate.
    async fn step1_fast(
        &self,
        ctx: &mut SearchContext,
    ) -> Result<(Vec<RecalledEntity>, HashMap<String, f32>), SearchError> {
        tracing::info!("recall fast mode: skipping attribute extraction");

        let query_embedding = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;

        let hits = self
            .backend
            .entity_vectors
            .search_similar(
                &query_embedding,
                ctx.config.recall.vector_top_k,
                ctx.scope(),
                None,
                true,
            )
            .await?;

        let mut candidates = Vec::new();
        for hit in hits {
            let type_threshold = hit.type_threshold.unwrap_or(DEFAULT_TYPE_THRESHOLD);
            let final_threshold = ctx
                .config
                .recall
                .entity_similarity_threshold
                .max(type_threshold);
            if hit.score < final_threshold {
                continue;
            }
            candidates.push(RecalledEntity {
                entity_id: hit.entity_id,
                name: hit.name,
                entity_type: hit.entity_type,
                similarity: hit.score,
                source_attribute: ctx.query.clone(),
                type_threshold,
                final_threshold,
            });
        }

        Ok(dedupe_and_cap(candidates, ctx.config.recall.max_entities))
    }

    /// Full mode step 1/2: extract attributes (with optional rewrite), then
    /// KNN per attribute with per-entity threshold gates.
    async fn step1_full(
        &self,
        ctx: &mut SearchContext,
    ) -> Result<(Vec<RecalledEntity>, HashMap<String, f32>), SearchError> {
        let extractor = AttributeExtractor::new(self.backend.chat.clone());
        let extraction = extractor
            .extract(&ctx.query, ctx.config.enable_query_rewrite)
            .await;

        if ctx.config.enable_query_rewrite {
            if let Some(rewritten) = &extraction.rewritten_query {
                ctx.original_query = ctx.query.clone();
                ctx.query = rewritten.clone();
                ctx.query_embedding = None;
                tracing::info!(
                    origin = %ctx.original_query,
                    rewritten = %ctx.query,
                    "query rewritten"
                );

                let origin_node = ctx.origin_query_node();
                let current_node = ctx.query_node();
                ctx.tracker.add_clue(
                    Stage::Prepare,
                    origin_node,
                    current_node,
                    1.0,
                    Some("query_rewrite"),
                    metadata(&[("method", json!("llm_rewrite"))]),
                    DisplayLevel::Intermediate,
                );
            }
        }

        let extraction_method = if extraction.used_fallback {
            "rule_fallback"
        } else {
            "llm_extraction"
        };
        for attribute in &extraction.attributes {
            let query_node = ctx.query_node();
            ctx.tracker.add_clue(
                Stage::Prepare,
                query_node,
                build_extracted_entity_node(attribute),
                attribute.confidence(),
                Some("attribute_extraction"),
                metadata(&[
                    ("method", json!(extraction_method)),
                    ("attribute_type", json!(attribute.attr_type)),
                    ("importance", json!(attribute.importance.as_str())),
                ]),
                DisplayLevel::Intermediate,
            );
        }

        tracing::info!(
            attributes = extraction.attributes.len(),
            used_fallback = extraction.used_fallback,
            "attributes extracted"
        );

        let vectors = self.embed_attributes(&extraction.attributes).await;

        let mut candidates = Vec::new();
        for (attribute, vector) in extraction.attributes.iter().zip(vectors.iter()) {
            let Some(vector) = vector else {
                tracing::warn!(attribute = %attribute.name, "attribute skipped: no embedding");
                continue;
            };

            let hits = match self
                .backend
                .entity_vectors
                .search_similar(
                    vector,
                    ctx.config.recall.vector_top_k,
                    ctx.scope(),
                    Some(&attribute.attr_type),
                    true,
                )
                .await
            {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!(attribute = %attribute.name, error = %err, "entity search failed");
                    continue;
                }
            };

            for hit in hits {
                let type_threshold = hit.type_threshold.unwrap_or(DEFAULT_TYPE_THRESHOLD);
                let final_threshold = ctx
                    .config
                    .recall
                    .entity_similarity_threshold
                    .max(type_threshold);
                if hit.score < final_threshold {
                    continue;
                }

                let recalled = RecalledEntity {
                    entity_id: hit.entity_id,
                    name: hit.name,
                    entity_type: hit.entity_type,
                    similarity: hit.score,
                    source_attribute: attribute.name.clone(),
                    type_threshold,
                    final_threshold,
                };

                ctx.tracker.add_clue(
                    Stage::Recall,
                    build_extracted_entity_node(attribute),
                    build_entity_node(&recalled_as_key(&recalled)),
                    recalled.similarity,
                    Some("vector_recall"),
                    metadata(&[
                        ("method", json!("vector_search")),
                        ("step", json!("step1")),
                        ("source_attribute", json!(attribute.name)),
                        ("type_threshold", json!(type_threshold)),
                        ("final_threshold", json!(final_threshold)),
                    ]),
                    DisplayLevel::Intermediate,
                );

                candidates.push(recalled);
            }
        }

        Ok(dedupe_and_cap(candidates, ctx.config.recall.max_entities))
    }

    /// One batched embedding call; a failed batch degrades to per-name
    /// calls so a single bad attribute only loses itself.
    async fn embed_attributes(&self, attributes: &[QueryAttribute]) -> Vec<Option<Vec<f32>>> {
        if attributes.is_empty() {
            return Vec::new();
        }

        let names: Vec<String> = attributes.iter().map(|a| a.name.clone()).collect();
        match self.backend.embeddings.batch_generate(&names).await {
            Ok(vectors) if vectors.len() == names.len() => {
                vectors.into_iter().map(Some).collect()
            }
            Ok(vectors) => {
                tracing::warn!(
                    requested = names.len(),
                    received = vectors.len(),
                    "batch embedding size mismatch, retrying per attribute"
                );
                self.embed_attributes_individually(&names).await
            }
            Err(err) => {
                tracing::warn!(error = %err, "batch embedding failed, retrying per attribute");
                self.embed_attributes_individually(&names).await
            }
        }
    }

    async fn embed_attributes_individually(&self, names: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.backend.embeddings.generate(name).await {
                Ok(vector) => out.push(Some(vector)),
                Err(err) => {
                    tracing::warn!(attribute = %name, error = %err, "attribute embedding failed");
                    out.push(None);
                }
            }
        }
        out
    }

    /// All events joined to any recalled entity, with entity → event clues
    /// per join row.
    async fn step2_keys_to_events(
        &self,
        ctx: &mut SearchContext,
        key_query_related: &[RecalledEntity],
    ) -> Result<
        (
            Vec<String>,
            HashMap<String, Vec<String>>,
            HashMap<String, Vec<String>>,
        ),
        SearchError,
    > {
        if key_query_related.is_empty() {
            return Ok((Vec::new(), HashMap::new(), HashMap::new()));
        }

        let entity_ids: Vec<String> = key_query_related
            .iter()
            .map(|key| key.entity_id.clone())
            .collect();

        let links = self
            .backend
            .relational
            .links_for_entities(&entity_ids, ctx.scope())
            .await?;

        let mut event_ids = Vec::new();
        let mut seen_events = HashSet::new();
        let mut entity_to_events: HashMap<String, Vec<String>> = HashMap::new();
        let mut event_to_entities: HashMap<String, Vec<String>> = HashMap::new();

        for link in &links {
            if seen_events.insert(link.event_id.clone()) {
                event_ids.push(link.event_id.clone());
            }
            entity_to_events
                .entry(link.entity_id.clone())
                .or_default()
                .push(link.event_id.clone());
            event_to_entities
                .entry(link.event_id.clone())
                .or_default()
                .push(link.entity_id.clone());
        }

        // entity → event clues need full event records for the nodes.
        let events = self
            .backend
            .relational
            .get_events(&event_ids, ctx.scope())
            .await?;
        let event_map: HashMap<&str, &Event> =
            events.iter().map(|event| (event.id.as_str(), event)).collect();
        let recalled_map: HashMap<&str, &RecalledEntity> = key_query_related
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();

        for link in &links {
            let Some(event) = event_map.get(link.event_id.as_str()) else {
                continue;
            };
            let Some(recalled) = recalled_map.get(link.entity_id.as_str()) else {
                continue;
            };

            let event_node = ctx.tracker.event_node(event, Stage::Recall, None, None);
            ctx.tracker.add_clue(
                Stage::Recall,
                build_entity_node(&recalled_as_key(recalled)),
                event_node,
                recalled.similarity,
                None,
                metadata(&[
                    ("method", json!("database_lookup")),
                    ("step", json!("step2")),
                    ("source_attribute", json!(recalled.source_attribute)),
                ]),
                DisplayLevel::Intermediate,
            );
        }

        Ok((event_ids, entity_to_events, event_to_entities))
    }

    /// KNN over event content vectors with the query embedding,
    /// thresholded and capped.
    async fn step3_query_to_events(
        &self,
        ctx: &mut SearchContext,
    ) -> Result<(Vec<EventMatch>, HashMap<String, f32>), SearchError> {
        let query_embedding = ctx.query_embedding(self.backend.embeddings.as_ref()).await?;

        let hits = match self
            .backend
            .event_vectors
            .search_similar_by_content(
                &query_embedding,
                ctx.config.recall.vector_top_k,
                ctx.scope(),
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "query/event vector search failed");
                return Ok((Vec::new(), HashMap::new()));
            }
        };

        let mut matches: Vec<EventMatch> = hits
            .into_iter()
            .map(|hit| EventMatch {
                event_id: hit.event_id,
                title: hit.title,
                summary: hit.summary,
                similarity: hit.score,
            })
            .filter(|m| m.similarity >= ctx.config.recall.event_similarity_threshold)
            .collect();
        matches.truncate(ctx.config.recall.max_events);

        let e1_weights: HashMap<String, f32> = matches
            .iter()
            .map(|m| (m.event_id.clone(), m.similarity))
            .collect();

        // query → event clues on the full event records.
        let event_ids: Vec<String> = matches.iter().map(|m| m.event_id.clone()).collect();
        let events = self
            .backend
            .relational
            .get_events(&event_ids, ctx.scope())
            .await?;
        let event_map: HashMap<&str, &Event> =
            events.iter().map(|event| (event.id.as_str(), event)).collect();

        for m in &matches {
            let Some(event) = event_map.get(m.event_id.as_str()) else {
                continue;
            };
            let query_node = ctx.query_node();
            let event_node = ctx.tracker.event_node(event, Stage::Recall, None, None);
            ctx.tracker.add_clue(
                Stage::Recall,
                query_node,
                event_node,
                m.similarity,
                None,
                metadata(&[("method", json!("vector_search")), ("step", json!("step3"))]),
                DisplayLevel::Intermediate,
            );
        }

        Ok((matches, e1_weights))
    }

    /// Step 8: keep the top entities by propagated weight and emit the
    /// final-level query → entity clues.
    async fn step8_extract_important_keys(
        &self,
        ctx: &mut SearchContext,
        key_related: &[String],
        key_event_weights: &HashMap<String, f32>,
        key_query_related: &[RecalledEntity],
    ) -> Result<Vec<KeyEntity>, SearchError> {
        if key_event_weights.is_empty() {
            return Ok(Vec::new());
        }

        // Iterate in recall order so equal weights keep insertion order.
        let mut sorted: Vec<(String, f32)> = key_related
            .iter()
            .filter_map(|id| key_event_weights.get(id).map(|w| (id.clone(), *w)))
            .collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let selected: Vec<(String, f32)> = match ctx.config.recall.final_entity_count {
            Some(count) => sorted.into_iter().take(count).collect(),
            None => sorted
                .into_iter()
                .filter(|(_, weight)| *weight >= ctx.config.recall.entity_weight_threshold)
                .collect(),
        };

        if selected.is_empty() {
            tracing::warn!("recall step8 selected no entities");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = selected.iter().map(|(id, _)| id.clone()).collect();
        let entities = self.backend.relational.get_entities(&ids).await?;
        let entity_map: HashMap<&str, &eventlens_core::model::Entity> = entities
            .iter()
            .map(|entity| (entity.id.as_str(), entity))
            .collect();
        let recalled_map: HashMap<&str, &RecalledEntity> = key_query_related
            .iter()
            .map(|key| (key.entity_id.as_str(), key))
            .collect();

        let mut key_final = Vec::new();
        for (entity_id, weight) in selected {
            let Some(entity) = entity_map.get(entity_id.as_str()) else {
                tracing::warn!(entity = %entity_id, "selected entity missing from store");
                continue;
            };
            let similarity = recalled_map
                .get(entity_id.as_str())
                .map(|recalled| recalled.similarity);

            let key = KeyEntity {
                entity_id: entity_id.clone(),
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                weight,
                description: entity.description.clone(),
                steps: vec![1],
                hop: 0,
                similarity,
                parent_entity: None,
            };

            let query_node = ctx.query_node();
            ctx.tracker.add_clue(
                Stage::Recall,
                query_node,
                build_entity_node(&key),
                similarity.unwrap_or(0.0),
                Some("semantic_match"),
                metadata(&[
                    ("method", json!("final_result")),
                    ("step", json!("step8")),
                    ("steps", json!([1])),
                    ("weight", json!(weight)),
                ]),
                DisplayLevel::Final,
            );

            key_final.push(key);
        }

        Ok(key_final)
    }
}

fn dedupe_and_cap(
    candidates: Vec<RecalledEntity>,
    max_entities: usize,
) -> (Vec<RecalledEntity>, HashMap<String, f32>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut k1_weights = HashMap::new();

    for candidate in candidates {
        if !seen.insert(candidate.entity_id.clone()) {
            continue;
        }
        k1_weights.insert(candidate.entity_id.clone(), candidate.similarity);
        unique.push(candidate);
        if unique.len() >= max_entities {
            break;
        }
    }

    (unique, k1_weights)
}

fn step4_filter_events(
    event_key_query_related: &[String],
    event_query_related: &[EventMatch],
    key_query_related: &[RecalledEntity],
    entity_to_events: &HashMap<String, Vec<String>>,
) -> (Vec<String>, Vec<String>) {
    let key_event_ids: HashSet<&str> = event_key_query_related
        .iter()
        .map(String::as_str)
        .collect();

    // Keep step-3 similarity order for the intersection.
    let event_related: Vec<String> = event_query_related
        .iter()
        .filter(|m| key_event_ids.contains(m.event_id.as_str()))
        .map(|m| m.event_id.clone())
        .collect();
    let event_related_set: HashSet<&str> = event_related.iter().map(String::as_str).collect();

    let key_related: Vec<String> = key_query_related
        .iter()
        .filter(|key| {
            entity_to_events
                .get(&key.entity_id)
                .is_some_and(|events| {
                    events
                        .iter()
                        .any(|event_id| event_related_set.contains(event_id.as_str()))
                })
        })
        .map(|key| key.entity_id.clone())
        .collect();

    (event_related, key_related)
}

fn step5_event_key_weights(
    event_related: &[String],
    key_related: &[String],
    k1_weights: &HashMap<String, f32>,
    event_to_entities: &HashMap<String, Vec<String>>,
) -> HashMap<String, f32> {
    if event_related.is_empty() || key_related.is_empty() {
        return HashMap::new();
    }

    let kept: HashSet<&str> = key_related.iter().map(String::as_str).collect();

    let mut weights: HashMap<String, f32> = event_related
        .iter()
        .map(|event_id| {
            let total: f32 = event_to_entities
                .get(event_id)
                .map(|entities| {
                    entities
                        .iter()
                        .filter(|entity_id| kept.contains(entity_id.as_str()))
                        .map(|entity_id| k1_weights.get(entity_id).copied().unwrap_or(0.0))
                        .sum()
                })
                .unwrap_or(0.0);
            (event_id.clone(), total)
        })
        .collect();

    let max = weights.values().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for weight in weights.values_mut() {
            *weight /= max;
        }
    } else {
        for weight in weights.values_mut() {
            *weight = ZERO_WEIGHT_FALLBACK;
        }
    }

    weights
}

fn step7_key_weights(
    key_related: &[String],
    event_related: &[String],
    entity_to_events: &HashMap<String, Vec<String>>,
    event_key_query_weights: &HashMap<String, f32>,
) -> HashMap<String, f32> {
    if key_related.is_empty() || event_related.is_empty() {
        return HashMap::new();
    }

    let event_set: HashSet<&str> = event_related.iter().map(String::as_str).collect();

    key_related
        .iter()
        .map(|entity_id| {
            let total: f32 = entity_to_events
                .get(entity_id)
                .map(|events| {
                    events
                        .iter()
                        .filter(|event_id| event_set.contains(event_id.as_str()))
                        .map(|event_id| {
                            event_key_query_weights.get(event_id).copied().unwrap_or(0.0)
                        })
                        .sum()
                })
                .unwrap_or(0.0);
            (entity_id.clone(), total)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recalled(id: &str, similarity: f32) -> RecalledEntity {
        RecalledEntity {
            entity_id: id.to_string(),
            name: id.to_string(),
            entity_type: "topic".to_string(),
            similarity,
            source_attribute: "attr".to_string(),
            type_threshold: 0.6,
            final_threshold: 0.6,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_caps() {
        let (unique, weights) = dedupe_and_cap(
            vec![recalled("a", 0.9), recalled("a", 0.5), recalled("b", 0.8)],
            1,
        );
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].entity_id, "a");
        assert_eq!(weights.get("a"), Some(&0.9));
    }

    #[test]
    fn step4_intersects_and_filters_keys() {
        let key_events = vec!["e1".to_string(), "e2".to_string()];
        let query_events = vec![
            EventMatch {
                event_id: "e2".to_string(),
                title: String::new(),
                summary: String::new(),
                similarity: 0.9,
            },
            EventMatch {
                event_id: "e3".to_string(),
                title: String::new(),
                summary: String::new(),
                similarity: 0.8,
            },
        ];
        let keys = vec![recalled("a", 0.9), recalled("b", 0.7)];
        let mut entity_to_events = HashMap::new();
        entity_to_events.insert("a".to_string(), vec!["e2".to_string()]);
        entity_to_events.insert("b".to_string(), vec!["e1".to_string()]);

        let (events, kept) = step4_filter_events(&key_events, &query_events, &keys, &entity_to_events);
        assert_eq!(events, vec!["e2".to_string()]);
        assert_eq!(kept, vec!["a".to_string()]);
    }

    #[test]
    fn step5_normalizes_by_max() {
        let events = vec!["e1".to_string(), "e2".to_string()];
        let keys = vec!["a".to_string(), "b".to_string()];
        let mut k1 = HashMap::new();
        k1.insert("a".to_string(), 0.8);
        k1.insert("b".to_string(), 0.4);
        let mut event_to_entities = HashMap::new();
        event_to_entities.insert("e1".to_string(), vec!["a".to_string(), "b".to_string()]);
        event_to_entities.insert("e2".to_string(), vec!["b".to_string()]);

        let weights = step5_event_key_weights(&events, &keys, &k1, &event_to_entities);
        assert!((weights["e1"] - 1.0).abs() < 1e-6);
        assert!((weights["e2"] - 0.4 / 1.2).abs() < 1e-6);
    }

    #[test]
    fn step5_falls_back_when_all_zero() {
        let events = vec!["e1".to_string()];
        let keys = vec!["a".to_string()];
        let k1 = HashMap::new();
        let mut event_to_entities = HashMap::new();
        event_to_entities.insert("e1".to_string(), vec!["a".to_string()]);

        let weights = step5_event_key_weights(&events, &keys, &k1, &event_to_entities);
        assert_eq!(weights["e1"], ZERO_WEIGHT_FALLBACK);
    }
}
