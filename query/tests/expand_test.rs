//! Multi-hop expansion scenarios.

mod common;

use common::*;
use query::{DisplayLevel, NodeType, SearchConfig, Searcher, Stage};
use slm::ScriptedChatClient;
use std::sync::Arc;
use storage::MemoryStore;

/// Chain fixture: entity A in event E1 with entity B, entity B in event E2
/// with entity C. The query matches A only.
async fn chain_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-a", "topic", "aurora"), Some(axis(0)))
        .await;
    store
        .put_entity(entity("k-b", "topic", "borealis"), Some(axis(1)))
        .await;
    store
        .put_entity(entity("k-c", "topic", "cascade"), Some(axis(2)))
        .await;

    store
        .put_event(
            event("e-1", "aurora meets borealis", "", "aurora and borealis together"),
            None,
            Some(axis(0)),
        )
        .await;
    store
        .put_event(
            event("e-2", "borealis meets cascade", "", "borealis and cascade together"),
            None,
            Some(axis(0)),
        )
        .await;

    store.link("e-1", "k-a", 1.0).await;
    store.link("e-1", "k-b", 1.0).await;
    store.link("e-2", "k-b", 1.0).await;
    store.link("e-2", "k-c", 1.0).await;
    store
}

fn chain_config() -> SearchConfig {
    let mut config = SearchConfig::new("aurora", SCOPE);
    config.recall.use_fast_mode = true;
    config.expand.max_hops = 2;
    config.expand.entities_per_hop = 5;
    // Keep the walk going through both hops.
    config.expand.weight_change_threshold = 1e-4;
    config.rerank.score_threshold = 0.2;
    config
}

fn chain_searcher(store: Arc<MemoryStore>) -> Searcher {
    Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4).with("aurora", axis(0)),
    ))
}

#[tokio::test]
async fn two_hop_expansion_discovers_chain_with_parents() {
    let searcher = chain_searcher(chain_store().await);
    let response = searcher.search(chain_config()).await.unwrap();

    assert_eq!(response.stats.recall.entities_count, 1);
    assert_eq!(response.stats.expand.total_entities, 3);
    assert_eq!(response.stats.expand.entities_count, 2);
    assert_eq!(response.stats.expand.hops, 2);

    // Hop-1 split clues: A → E1 → B, through a hop-scoped event node.
    let a_to_e1 = response
        .clues
        .iter()
        .find(|clue| clue.from.id == "k-a" && clue.to.id.starts_with("expand_hop1_e-1_"))
        .expect("A → E1 clue");
    assert_eq!(a_to_e1.stage, Stage::Expand);
    assert_eq!(a_to_e1.display_level, DisplayLevel::Final);

    let e1_to_b = response
        .clues
        .iter()
        .find(|clue| clue.from.id == a_to_e1.to.id && clue.to.id == "k-b")
        .expect("E1 → B clue");
    assert_eq!(e1_to_b.to.node_type, NodeType::Entity);

    // Hop-2 split clues: B → E2 → C.
    let b_to_e2 = response
        .clues
        .iter()
        .find(|clue| clue.from.id == "k-b" && clue.to.id.starts_with("expand_hop2_e-2_"))
        .expect("B → E2 clue");
    let _e2_to_c = response
        .clues
        .iter()
        .find(|clue| clue.from.id == b_to_e2.to.id && clue.to.id == "k-c")
        .expect("E2 → C clue");

    // Final query → A clue from recall survives.
    assert!(response
        .clues
        .iter()
        .any(|clue| clue.from.node_type == NodeType::Query
            && clue.to.id == "k-a"
            && clue.display_level == DisplayLevel::Final));
}

#[tokio::test]
async fn max_hops_zero_returns_exactly_the_recall_result() {
    let mut config = chain_config();
    config.expand.max_hops = 0;

    let searcher = chain_searcher(chain_store().await);
    let response = searcher.search(config).await.unwrap();

    assert_eq!(response.stats.expand.hops, 0);
    assert!(!response.stats.expand.converged);
    assert_eq!(response.stats.expand.entities_count, 0);
    // Expansion contributed nothing: total equals the recall count.
    assert_eq!(
        response.stats.expand.total_entities,
        response.stats.recall.entities_count
    );
}

#[tokio::test]
async fn expand_disabled_passes_recall_through() {
    let mut config = chain_config();
    config.expand.enabled = false;

    let searcher = chain_searcher(chain_store().await);
    let response = searcher.search(config).await.unwrap();

    assert_eq!(response.stats.expand.hops, 0);
    assert_eq!(response.stats.expand.entities_count, 0);
    assert_eq!(
        response.stats.expand.total_entities,
        response.stats.recall.entities_count
    );
}

#[tokio::test]
async fn disconnected_frontier_stops_expansion_early() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-solo", "topic", "solitary"), Some(axis(0)))
        .await;
    store
        .put_event(
            event("e-solo", "solitary event", "", "only solitary appears here"),
            None,
            Some(axis(0)),
        )
        .await;
    store.link("e-solo", "k-solo", 1.0).await;

    let mut config = SearchConfig::new("solitary", SCOPE);
    config.recall.use_fast_mode = true;
    config.expand.max_hops = 3;
    config.expand.entities_per_hop = 1;
    config.expand.weight_change_threshold = 1e-6;
    config.rerank.score_threshold = 0.2;

    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4).with("solitary", axis(0)),
    ));
    let response = searcher.search(config).await.unwrap();

    // One hop ran, nothing new was found, and the walk stopped.
    assert_eq!(response.stats.expand.hops, 1);
    assert_eq!(response.stats.expand.entities_count, 0);
    assert_eq!(response.stats.expand.total_entities, 1);

    // The lone recall entity gets a terminal no-expansion clue (merged with
    // the recall final clue by dedup) at final level.
    let leaf_clues: Vec<_> = response
        .clues
        .iter()
        .filter(|clue| clue.to.id == "k-solo" && clue.from.node_type == NodeType::Query)
        .collect();
    assert_eq!(leaf_clues.len(), 1);
    assert_eq!(leaf_clues[0].display_level, DisplayLevel::Final);
}

#[tokio::test]
async fn convergence_flag_set_when_weights_settle() {
    let store = chain_store().await;

    let mut config = chain_config();
    // Huge threshold: the first hop's change is below it.
    config.expand.weight_change_threshold = 100.0;

    let searcher = chain_searcher(store);
    let response = searcher.search(config).await.unwrap();

    assert!(response.stats.expand.converged);
    assert_eq!(response.stats.expand.hops, 1);
}
