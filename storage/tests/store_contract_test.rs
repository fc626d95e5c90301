//! Contract tests for the in-memory store across every repository trait.

use eventlens_core::model::{Chunk, Entity, Event, SourceType};
use std::sync::Arc;
use storage::{
    ChunkVectorStore, EntityVectorStore, EventVectorStore, MemoryStore, RelationalStore,
};

fn event(id: &str, scope: &str, chunk_id: Option<&str>) -> Event {
    Event {
        id: id.to_string(),
        source_config_id: scope.to_string(),
        source_type: SourceType::Article,
        source_id: "article-1".to_string(),
        chunk_id: chunk_id.map(str::to_string),
        title: format!("event {id}"),
        summary: "summary".to_string(),
        content: "content".to_string(),
        category: "tech".to_string(),
        rank: 0,
        start_time: None,
        end_time: None,
        references: Vec::new(),
    }
}

fn chunk(id: &str, scope: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        source_id: "article-1".to_string(),
        source_config_id: scope.to_string(),
        rank: 1,
        heading: format!("heading {id}"),
        content: "chunk body".to_string(),
        references: Vec::new(),
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    store
        .put_entity(
            Entity::new("k-1", "s1", "topic", "Graph Retrieval"),
            Some(vec![1.0, 0.0, 0.0]),
        )
        .await;
    store
        .put_entity(
            Entity::new("k-2", "s1", "person", "Ada"),
            Some(vec![0.0, 1.0, 0.0]),
        )
        .await;
    store
        .put_entity(
            Entity::new("k-3", "s2", "topic", "Other Scope"),
            Some(vec![1.0, 0.0, 0.0]),
        )
        .await;

    store
        .put_event(
            event("e-1", "s1", Some("c-1")),
            Some(vec![1.0, 0.0, 0.0]),
            Some(vec![0.9, 0.1, 0.0]),
        )
        .await;
    store
        .put_event(event("e-2", "s1", None), None, Some(vec![0.0, 1.0, 0.0]))
        .await;

    store
        .put_chunk(chunk("c-1", "s1"), Some(vec![1.0, 0.0, 0.0]))
        .await;

    store.link("e-1", "k-1", 1.0).await;
    store.link("e-1", "k-2", 0.5).await;
    store.link("e-2", "k-2", 1.0).await;

    store
}

#[tokio::test]
async fn entity_knn_scopes_and_orders_results() {
    let store = seeded_store().await;

    let hits = store
        .search_similar(&[1.0, 0.0, 0.0], 10, &["s1".to_string()], None, false)
        .await
        .unwrap();

    let ids: Vec<&str> = hits.iter().map(|hit| hit.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["k-1", "k-2"]);
    assert!(hits[0].score > hits[1].score);
    assert!(hits[0].type_threshold.is_none());
}

#[tokio::test]
async fn event_title_search_filters_by_category() {
    let store = seeded_store().await;

    let hits = store
        .search_similar_by_title(&[1.0, 0.0, 0.0], 10, &["s1".to_string()], Some("tech"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].event_id, "e-1");

    let none = store
        .search_similar_by_title(&[1.0, 0.0, 0.0], 10, &["s1".to_string()], Some("finance"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn relational_joins_carry_link_weights() {
    let store = seeded_store().await;

    let links = store
        .links_for_entities(&["k-2".to_string()], &["s1".to_string()])
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
    assert!(links
        .iter()
        .any(|link| link.event_id == "e-1" && link.weight == 0.5));

    let reverse = store.links_for_events(&["e-1".to_string()]).await.unwrap();
    assert_eq!(reverse.len(), 2);
}

#[tokio::test]
async fn chunk_lookup_returns_vectors_and_drops_missing() {
    let store = seeded_store().await;

    let docs = store
        .get_chunks_by_ids(&["c-1".to_string(), "c-missing".to_string()])
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].chunk_id, "c-1");
    assert!(docs[0].content_vector.is_some());

    let hits = ChunkVectorStore::search_similar_by_content(
        store.as_ref(),
        &[1.0, 0.0, 0.0],
        5,
        &["s1".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(hits[0].chunk_id, "c-1");
}

#[tokio::test]
async fn thresholds_include_custom_overrides() {
    let store = seeded_store().await;
    store.set_type_threshold("product", 0.85).await;

    let thresholds = store.entity_type_thresholds(&[]).await.unwrap();
    assert_eq!(thresholds.get("topic"), Some(&0.600));
    assert_eq!(thresholds.get("person"), Some(&0.950));
    assert_eq!(thresholds.get("product"), Some(&0.85));
}
