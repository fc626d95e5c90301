//! Clue tracking: standardized node builders plus the append-only clue list
//! with (from, to) deduplication.
//!
//! Event nodes are stage-scoped. The same event appearing in recall, expand
//! and rerank gets distinct node ids per stage; within expand, distinct ids
//! per hop; within rerank, distinct ids per recall method. This lets a
//! frontend draw the same event along different reasoning paths.

use crate::keys::{KeyEntity, ParentEntity};
use eventlens_core::model::{Chunk, Event};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slm::QueryAttribute;
use std::collections::HashMap;
use uuid::Uuid;

const SECTION_CONTENT_PREVIEW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Recall,
    Expand,
    Rerank,
}

impl Stage {
    fn default_relation(&self) -> &'static str {
        match self {
            Stage::Prepare => "query_preparation",
            Stage::Recall => "semantic_match",
            Stage::Expand => "graph_expansion",
            Stage::Rerank => "rerank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Query,
    Entity,
    Event,
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayLevel {
    Debug,
    #[default]
    Intermediate,
    Final,
}

impl DisplayLevel {
    pub fn priority(&self) -> u8 {
        match self {
            DisplayLevel::Debug => 0,
            DisplayLevel::Intermediate => 1,
            DisplayLevel::Final => 2,
        }
    }
}

/// Clue-graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub category: String,
    pub content: String,
    pub description: String,
    /// Original store id for stage-scoped event nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hop: Option<u32>,
}

/// Clue-graph edge: one causal link observed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clue {
    pub id: String,
    pub stage: Stage,
    pub from: Node,
    pub to: Node,
    pub confidence: f32,
    pub relation: String,
    pub display_level: DisplayLevel,
    pub metadata: Map<String, Value>,
}

/// Deterministic id for a query node: the same query text always collapses
/// to the same node.
pub fn generate_query_id(query: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, query.as_bytes()).to_string()
}

fn generate_clue_id() -> String {
    Uuid::new_v4().to_string()
}

fn short_suffix() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

pub fn build_query_node(current: &str, original: &str, use_origin: bool) -> Node {
    let rewritten = !original.is_empty() && original != current;
    let text = if use_origin && rewritten {
        original
    } else {
        current
    };
    let (category, description) = if rewritten && !use_origin {
        ("rewrite", "rewritten search request")
    } else {
        ("origin", "original search request")
    };

    Node {
        id: generate_query_id(text),
        node_type: NodeType::Query,
        category: category.to_string(),
        content: text.to_string(),
        description: description.to_string(),
        event_id: None,
        stage: None,
        hop: None,
    }
}

pub fn build_entity_node(key: &KeyEntity) -> Node {
    Node {
        id: key.entity_id.clone(),
        node_type: NodeType::Entity,
        category: key.entity_type.clone(),
        content: key.name.clone(),
        description: key.description.clone(),
        event_id: None,
        stage: None,
        hop: Some(key.hop),
    }
}

pub fn build_parent_entity_node(parent: &ParentEntity) -> Node {
    Node {
        id: parent.id.clone(),
        node_type: NodeType::Entity,
        category: parent.entity_type.clone(),
        content: parent.name.clone(),
        description: String::new(),
        event_id: None,
        stage: None,
        hop: Some(parent.hop),
    }
}

/// Node for an attribute the LLM pulled out of the query, distinct from any
/// stored entity.
pub fn build_extracted_entity_node(attribute: &QueryAttribute) -> Node {
    let seed = format!("{}:{}", attribute.attr_type, attribute.name);
    Node {
        id: format!("extracted-{}", Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes())),
        node_type: NodeType::Entity,
        category: attribute.attr_type.clone(),
        content: attribute.name.clone(),
        description: if attribute.context.is_empty() {
            "attribute extracted from the query".to_string()
        } else {
            attribute.context.clone()
        },
        event_id: None,
        stage: None,
        hop: None,
    }
}

pub fn build_section_node(chunk: &Chunk) -> Node {
    let source = if chunk.heading.is_empty() {
        &chunk.content
    } else {
        &chunk.heading
    };
    let content: String = source.chars().take(SECTION_CONTENT_PREVIEW).collect();

    Node {
        id: chunk.id.clone(),
        node_type: NodeType::Section,
        category: String::new(),
        content,
        description: String::new(),
        event_id: None,
        stage: None,
        hop: None,
    }
}

/// Tracker owns the clue list of one search request plus the per-stage
/// event-node identity map.
#[derive(Debug, Default)]
pub struct Tracker {
    clues: Vec<Clue>,
    stage_event_nodes: HashMap<(Stage, String, String), String>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage-scoped event node, reusing the node id for repeats within the
    /// same scope key:
    /// - recall: one node per event id,
    /// - expand: one node per (event id, hop),
    /// - rerank: one node per (event id, recall method).
    pub fn event_node(
        &mut self,
        event: &Event,
        stage: Stage,
        hop: Option<u32>,
        recall_method: Option<&str>,
    ) -> Node {
        let (sub_key, make_id): (String, Box<dyn Fn() -> String>) = match (stage, hop, recall_method)
        {
            (Stage::Expand, Some(hop), _) => {
                let event_id = event.id.clone();
                (
                    format!("hop{hop}"),
                    Box::new(move || format!("expand_hop{hop}_{}_{}", event_id, short_suffix())),
                )
            }
            (Stage::Rerank, _, Some(method)) => {
                let event_id = event.id.clone();
                let method = method.to_string();
                (
                    method.clone(),
                    Box::new(move || format!("rerank_{method}_{}_{}", event_id, short_suffix())),
                )
            }
            _ => {
                let event_id = event.id.clone();
                (String::new(), Box::new(move || event_id.clone()))
            }
        };

        let node_id = self
            .stage_event_nodes
            .entry((stage, event.id.clone(), sub_key))
            .or_insert_with(make_id)
            .clone();

        Node {
            id: node_id,
            node_type: NodeType::Event,
            category: event.category.clone(),
            content: event.title.clone(),
            description: event.content.clone(),
            event_id: Some(event.id.clone()),
            stage: Some(stage),
            hop,
        }
    }

    /// Append a clue, deduplicating on `(from.id, to.id)`. A duplicate with
    /// strictly higher display priority replaces the stored edge's level,
    /// stage, confidence, relation and metadata; otherwise it is dropped.
    pub fn add_clue(
        &mut self,
        stage: Stage,
        from: Node,
        to: Node,
        confidence: f32,
        relation: Option<&str>,
        metadata: Map<String, Value>,
        display_level: DisplayLevel,
    ) {
        debug_assert!(!from.id.is_empty() && !to.id.is_empty());

        let confidence = confidence.clamp(0.0, 1.0);
        let relation = relation
            .map(str::to_string)
            .unwrap_or_else(|| stage.default_relation().to_string());

        if let Some(existing) = self
            .clues
            .iter_mut()
            .find(|clue| clue.from.id == from.id && clue.to.id == to.id)
        {
            if display_level.priority() > existing.display_level.priority() {
                tracing::debug!(
                    from = %from.id,
                    to = %to.id,
                    "clue display level upgraded"
                );
                existing.display_level = display_level;
                existing.stage = stage;
                existing.confidence = confidence;
                existing.relation = relation;
                existing.metadata = metadata;
            }
            return;
        }

        self.clues.push(Clue {
            id: generate_clue_id(),
            stage,
            from,
            to,
            confidence,
            relation,
            display_level,
            metadata,
        });
    }

    pub fn clues(&self) -> &[Clue] {
        &self.clues
    }

    pub fn into_clues(self) -> Vec<Clue> {
        self.clues
    }
}

/// Convenience for building clue metadata maps.
pub fn metadata(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}
