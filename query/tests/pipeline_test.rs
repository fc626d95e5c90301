//! End-to-end pipeline scenarios over the in-memory stores.

mod common;

use common::*;
use query::{
    DisplayLevel, NodeType, SearchConfig, SearchError, Searcher, Stage,
};
use serde_json::json;
use slm::ScriptedChatClient;
use std::sync::Arc;
use storage::MemoryStore;

fn base_config(query: &str) -> SearchConfig {
    let mut config = SearchConfig::new(query, SCOPE);
    config.recall.use_fast_mode = true;
    config.recall.entity_similarity_threshold = 0.5;
    config
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_stage() {
    let store = Arc::new(MemoryStore::new());
    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4),
    ));

    let err = searcher
        .search(SearchConfig::new("   ", SCOPE))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Input(_)));
}

#[tokio::test]
async fn empty_graph_yields_wellformed_empty_response() {
    let store = Arc::new(MemoryStore::new());
    let embedder = FixedEmbedder::new(4).with("hello", axis(0));

    let mut config = SearchConfig::new("hello", SCOPE);
    config.recall.use_fast_mode = false;

    // Chat fails, so the rule extractor produces the prepare-stage clues.
    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        embedder,
    ));
    let response = searcher.search(config).await.unwrap();

    assert_eq!(response.events.as_deref(), Some(&[][..]));
    assert!(response.sections.is_none());
    assert_eq!(response.stats.recall.entities_count, 0);
    assert_eq!(response.stats.expand.total_entities, 0);
    assert_eq!(response.stats.rerank.events_count, Some(0));

    // Only prepare-stage extraction clues exist.
    assert!(!response.clues.is_empty());
    assert!(response
        .clues
        .iter()
        .all(|clue| clue.stage == Stage::Prepare));

    assert_eq!(response.query.original, "hello");
    assert_eq!(response.query.current, "hello");
    assert!(!response.query.rewritten);
}

#[tokio::test]
async fn query_rewrite_swaps_query_and_emits_prepare_clue() {
    let store = Arc::new(MemoryStore::new());
    let embedder = FixedEmbedder::new(4).with("iphone launch event", axis(0));

    let chat = Arc::new(ScriptedChatClient::new(vec![json!({
        "attributes": [
            {"name": "iPhone", "type": "topic", "importance": "high"}
        ],
        "rewritten_query": "iphone launch event"
    })]));

    let mut config = SearchConfig::new("tell me about iphone launch??", SCOPE);
    config.recall.use_fast_mode = false;

    let searcher = Searcher::new(backend(store, chat, embedder));
    let response = searcher.search(config).await.unwrap();

    assert_eq!(response.query.original, "tell me about iphone launch??");
    assert_eq!(response.query.current, "iphone launch event");
    assert!(response.query.rewritten);

    let rewrite_clue = response
        .clues
        .iter()
        .find(|clue| clue.relation == "query_rewrite")
        .expect("rewrite clue present");
    assert_eq!(rewrite_clue.from.node_type, NodeType::Query);
    assert_eq!(rewrite_clue.to.node_type, NodeType::Query);
    assert_eq!(rewrite_clue.from.category, "origin");
    assert_eq!(rewrite_clue.to.category, "rewrite");
}

#[tokio::test]
async fn pure_knn_path_returns_query_recalled_event() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_event(
            event("e-apple", "Apple releases iPhone", "", "Apple launched a new iPhone"),
            None,
            Some(axis(0)),
        )
        .await;

    let embedder = FixedEmbedder::new(4).with("iphone launch", axis(0));
    let mut config = base_config("iphone launch");
    config.expand.enabled = false;

    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        embedder,
    ));
    let response = searcher.search(config).await.unwrap();

    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "e-apple");

    // The final clue is query → event via the rerank query-recall node.
    let final_clue = response
        .clues
        .iter()
        .find(|clue| {
            clue.display_level == DisplayLevel::Final && clue.to.node_type == NodeType::Event
        })
        .expect("final event clue");
    assert_eq!(final_clue.from.node_type, NodeType::Query);
    assert!(final_clue.to.id.starts_with("rerank_query_e-apple_"));
    assert_eq!(final_clue.to.event_id.as_deref(), Some("e-apple"));
}

#[tokio::test]
async fn entity_join_path_ranks_linked_event_with_final_clue() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-iphone", "topic", "iPhone"), Some(axis(0)))
        .await;
    store
        .put_event(
            event("e-1", "iPhone 16 announced", "", "iPhone 16 announced at the keynote"),
            None,
            Some(axis(0)),
        )
        .await;
    store.link("e-1", "k-iphone", 1.0).await;

    let embedder = FixedEmbedder::new(4).with("iphone", axis(0));
    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        embedder,
    ));

    let response = searcher.search(base_config("iphone")).await.unwrap();

    assert_eq!(response.stats.recall.entities_count, 1);
    assert_eq!(response.stats.recall.by_type.get("topic"), Some(&1));

    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "e-1");

    // Final entity → event clue through the rerank entity-recall node.
    let entity_clue = response
        .clues
        .iter()
        .find(|clue| {
            clue.display_level == DisplayLevel::Final
                && clue.from.id == "k-iphone"
                && clue.to.node_type == NodeType::Event
        })
        .expect("entity → event final clue");
    assert!(entity_clue.to.id.starts_with("rerank_entity_e-1_"));

    // Exactly one query → entity clue survived deduplication, at final level.
    let query_entity_clues: Vec<_> = response
        .clues
        .iter()
        .filter(|clue| clue.from.node_type == NodeType::Query && clue.to.id == "k-iphone")
        .collect();
    assert_eq!(query_entity_clues.len(), 1);
    assert_eq!(query_entity_clues[0].display_level, DisplayLevel::Final);
}

#[tokio::test]
async fn clue_list_upholds_global_invariants() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-a", "topic", "alpha"), Some(axis(0)))
        .await;
    store
        .put_entity(entity("k-b", "topic", "beta"), Some(axis(1)))
        .await;
    store
        .put_event(event("e-1", "alpha beta pair", "", "alpha and beta"), None, Some(axis(0)))
        .await;
    store
        .put_event(event("e-2", "beta solo", "", "beta alone"), None, Some(axis(0)))
        .await;
    store.link("e-1", "k-a", 1.0).await;
    store.link("e-1", "k-b", 1.0).await;
    store.link("e-2", "k-b", 1.0).await;

    let embedder = FixedEmbedder::new(4).with("alpha", axis(0));
    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        embedder,
    ));
    let response = searcher.search(base_config("alpha")).await.unwrap();

    // Confidence bounds.
    assert!(response
        .clues
        .iter()
        .all(|clue| (0.0..=1.0).contains(&clue.confidence)));

    // No duplicate (from, to) edges after priority replacement.
    let mut seen = std::collections::HashSet::new();
    for clue in &response.clues {
        assert!(
            seen.insert((clue.from.id.clone(), clue.to.id.clone())),
            "duplicate edge {} -> {}",
            clue.from.id,
            clue.to.id
        );
    }

    // Every final clue endpoint is reachable from a query node.
    let mut reachable: std::collections::HashSet<String> = response
        .clues
        .iter()
        .filter(|clue| clue.from.node_type == NodeType::Query)
        .map(|clue| clue.from.id.clone())
        .collect();
    let mut changed = true;
    while changed {
        changed = false;
        for clue in &response.clues {
            if reachable.contains(&clue.from.id) && !reachable.contains(&clue.to.id) {
                reachable.insert(clue.to.id.clone());
                changed = true;
            }
        }
    }
    for clue in response
        .clues
        .iter()
        .filter(|clue| clue.display_level == DisplayLevel::Final)
    {
        assert!(
            reachable.contains(&clue.to.id),
            "final clue target {} unreachable from query",
            clue.to.id
        );
    }
}

#[tokio::test]
async fn identical_queries_produce_identical_rankings() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-a", "topic", "alpha"), Some(axis(0)))
        .await;
    store
        .put_event(event("e-1", "alpha one", "", "alpha first"), None, Some(axis(0)))
        .await;
    store
        .put_event(event("e-2", "alpha two", "", "alpha second"), None, Some(axis(0)))
        .await;
    store.link("e-1", "k-a", 1.0).await;
    store.link("e-2", "k-a", 1.0).await;

    let make_searcher = |store: Arc<MemoryStore>| {
        Searcher::new(backend(
            store,
            Arc::new(ScriptedChatClient::failing()),
            FixedEmbedder::new(4).with("alpha", axis(0)),
        ))
    };

    let searcher = make_searcher(store);
    let first = searcher.search(base_config("alpha")).await.unwrap();
    let second = searcher.search(base_config("alpha")).await.unwrap();

    let ids = |response: &query::SearchResponse| -> Vec<String> {
        response
            .events
            .as_ref()
            .map(|events| events.iter().map(|event| event.id.clone()).collect())
            .unwrap_or_default()
    };
    assert_eq!(ids(&first), ids(&second));
}
