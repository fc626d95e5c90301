//! RRF fusion scenarios.

mod common;

use common::*;
use query::{RerankStrategy, SearchConfig, Searcher};
use slm::ScriptedChatClient;
use std::sync::Arc;
use storage::MemoryStore;

fn rrf_config(query: &str) -> SearchConfig {
    let mut config = SearchConfig::new(query, SCOPE);
    config.recall.use_fast_mode = true;
    config.expand.enabled = false;
    config.rerank.strategy = RerankStrategy::Rrf;
    config.rerank.score_threshold = 0.2;
    config
}

/// Two events with identical embedding similarity; the one carrying the
/// query term in its title wins on BM25 and therefore on RRF.
#[tokio::test]
async fn bm25_breaks_embedding_ties() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-apple", "topic", "apple"), Some(axis(0)))
        .await;

    store
        .put_event(
            event(
                "e-earnings",
                "Apple quarterly earnings",
                "revenue summary",
                "apple revenue grew",
            ),
            Some(axis(0)),
            Some(axis(0)),
        )
        .await;
    store
        .put_event(
            event(
                "e-launch",
                "Apple iphone launch",
                "keynote summary",
                "apple presented the iphone",
            ),
            Some(axis(0)),
            Some(axis(0)),
        )
        .await;
    store.link("e-earnings", "k-apple", 1.0).await;
    store.link("e-launch", "k-apple", 1.0).await;

    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4).with("apple iphone", axis(0)),
    ));

    let mut cfg = rrf_config("apple iphone");
    cfg.rerank.max_results = 1;
    let response = searcher.search(cfg).await.unwrap();

    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "e-launch", "higher BM25 must win the tie");

    // RRF confidence is attached to the winning entity → event clue.
    let final_clue = response
        .clues
        .iter()
        .find(|clue| clue.to.id.starts_with("rerank_entity_e-launch_"))
        .expect("rrf final clue");
    // Shared embedding rank 1, distinct bm25 ranks: 1/(60+1) + 1/(60+1).
    let expected: f32 = 1.0 / 61.0 + 1.0 / 61.0;
    assert!((final_clue.confidence - expected).abs() < 1e-6);
    assert_eq!(final_clue.metadata["bm25_rank"], serde_json::json!(1));
}

#[tokio::test]
async fn event_missing_both_vectors_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-a", "topic", "alpha"), Some(axis(0)))
        .await;
    store
        .put_event(event("e-scored", "alpha one", "", "alpha"), None, Some(axis(0)))
        .await;
    store
        .put_event(event("e-blind", "alpha two", "", "alpha"), None, None)
        .await;
    store.link("e-scored", "k-a", 1.0).await;
    store.link("e-blind", "k-a", 1.0).await;

    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4).with("alpha", axis(0)),
    ));

    let response = searcher.search(rrf_config("alpha")).await.unwrap();
    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "e-scored");
}

/// A title-only event still participates, scored at 0.2 × title cosine.
#[tokio::test]
async fn title_only_event_contributes_partial_similarity() {
    let store = Arc::new(MemoryStore::new());
    store
        .put_entity(entity("k-a", "topic", "alpha"), Some(axis(0)))
        .await;
    // A fully vectored event keeps recall alive; the interesting candidate
    // only has a title vector.
    store
        .put_event(
            event("e-full", "alpha story", "", "alpha text"),
            Some(axis(0)),
            Some(axis(0)),
        )
        .await;
    store
        .put_event(
            event("e-title-only", "alpha headline", "", "alpha text"),
            Some(axis(0)),
            None,
        )
        .await;
    store.link("e-full", "k-a", 1.0).await;
    store.link("e-title-only", "k-a", 1.0).await;

    let searcher = Searcher::new(backend(
        store,
        Arc::new(ScriptedChatClient::failing()),
        FixedEmbedder::new(4).with("alpha", axis(0)),
    ));

    // Title-only scores 0.2 × 1.0 = 0.2: in with a 0.15 threshold, out at 0.5.
    let mut cfg = rrf_config("alpha");
    cfg.rerank.score_threshold = 0.15;
    let response = searcher.search(cfg).await.unwrap();
    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|event| event.id == "e-title-only"));

    let mut cfg = rrf_config("alpha");
    cfg.rerank.score_threshold = 0.5;
    let response = searcher.search(cfg).await.unwrap();
    let events = response.events.expect("event mode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "e-full");
}
