//! Integration tests for hybrid retrieval and its fallback stages.

mod common;

use std::sync::Arc;

use dx_core::{
    Catalog, HybridRetriever, InMemoryConditionStore, RetrievalConfig, RetrievalStage,
    UserSymptomData,
};

fn ids(candidates: &[Arc<dx_core::Condition>]) -> Vec<String> {
    candidates.iter().map(|c| c.id.to_string()).collect()
}

#[tokio::test]
async fn test_head_location_excludes_chest_condition() {
    let index = common::index(common::headache_catalog().unwrap());
    let retriever = HybridRetriever::new(index, RetrievalConfig::default());

    let candidates = retriever.retrieve(&UserSymptomData::at(["head"])).await;
    assert_eq!(ids(&candidates), vec!["a", "b"]);
}

#[tokio::test]
async fn test_never_empty_when_every_upstream_fails() {
    let index = common::index(common::mixed_catalog().unwrap());
    let retriever = HybridRetriever::new(index, RetrievalConfig::default())
        .with_embeddings(Arc::new(common::FailingEmbeddings))
        .with_store(Arc::new(common::FailingStore));

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["head"])).await;

    assert_eq!(outcome.stage, RetrievalStage::Structural);
    assert_eq!(
        ids(&outcome.candidates),
        vec!["influenza", "migraine", "mystery", "tension_headache"]
    );
    let stages: Vec<_> = outcome.degradations.iter().map(|d| d.stage).collect();
    assert_eq!(stages, vec![RetrievalStage::Semantic, RetrievalStage::Structural]);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_embedding_service_times_out() {
    let index = common::index(common::mixed_catalog().unwrap());
    let store = InMemoryConditionStore::from_conditions(common::mixed_catalog().unwrap().iter().map(|c| (**c).clone()));
    let retriever = HybridRetriever::new(index, RetrievalConfig::default())
        .with_embeddings(Arc::new(common::StalledEmbeddings))
        .with_store(Arc::new(store));

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["chest"])).await;

    assert_eq!(outcome.stage, RetrievalStage::Structural);
    assert!(outcome.degradations[0].reason.contains("timed out"));
    assert!(ids(&outcome.candidates).contains(&"angina".to_string()));
}

#[tokio::test]
async fn test_semantic_stage_wins_with_enough_hits() {
    let index = common::index(common::mixed_catalog().unwrap());
    let mut store = InMemoryConditionStore::new();
    for (i, condition) in common::mixed_catalog().unwrap().iter().enumerate() {
        // first six lean towards the query vector
        let embedding = if i < 6 { vec![1.0, 0.1 * i as f32] } else { vec![0.0, 1.0] };
        store.insert((**condition).clone(), embedding);
    }
    let retriever = HybridRetriever::new(index, RetrievalConfig::default())
        .with_embeddings(Arc::new(common::FixedEmbeddings(vec![1.0, 0.0])))
        .with_store(Arc::new(store));

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["ankle"])).await;

    assert_eq!(outcome.stage, RetrievalStage::Semantic);
    assert_eq!(outcome.candidates.len(), 6);
    assert!(outcome.degradations.is_empty());
}

#[tokio::test]
async fn test_semantic_candidates_keep_similarity_order() {
    let index = common::index(common::mixed_catalog().unwrap());
    let mut store = InMemoryConditionStore::new();
    for (i, condition) in common::mixed_catalog().unwrap().iter().enumerate() {
        // later IDs lean closer to the query vector
        let embedding = if i < 6 { vec![1.0, 0.1 * (5 - i) as f32] } else { vec![0.0, 1.0] };
        store.insert((**condition).clone(), embedding);
    }
    let retriever = HybridRetriever::new(index, RetrievalConfig::default())
        .with_embeddings(Arc::new(common::FixedEmbeddings(vec![1.0, 0.0])))
        .with_store(Arc::new(store));

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["ankle"])).await;

    assert_eq!(outcome.stage, RetrievalStage::Semantic);
    assert_eq!(
        ids(&outcome.candidates),
        vec!["gerd", "gastritis", "eczema", "conjunctivitis", "ankle_sprain", "angina"]
    );
}

#[tokio::test]
async fn test_few_semantic_hits_fall_back_to_structure() {
    let index = common::index(common::mixed_catalog().unwrap());
    let mut store = InMemoryConditionStore::new();
    store.insert(common::condition("angina", &["chest"], &["tightness"]), vec![1.0, 0.0]);
    let retriever = HybridRetriever::new(index, RetrievalConfig::default())
        .with_embeddings(Arc::new(common::FixedEmbeddings(vec![1.0, 0.0])))
        .with_store(Arc::new(store));

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["ankle"])).await;

    assert_eq!(outcome.stage, RetrievalStage::Structural);
    assert!(ids(&outcome.candidates).contains(&"ankle_sprain".to_string()));
    assert!(!ids(&outcome.candidates).contains(&"angina".to_string()));
}

#[tokio::test]
async fn test_unmatched_location_degrades_to_full_catalog() {
    let catalog = Catalog::new(vec![
        common::condition("angina", &["chest"], &["tightness"]),
        common::condition("ankle_sprain", &["ankle"], &["swelling"]),
    ])
    .unwrap();
    let retriever = HybridRetriever::new(common::index(catalog), RetrievalConfig::default());

    let outcome = retriever.retrieve_traced(&UserSymptomData::at(["zzz"])).await;

    assert_eq!(outcome.stage, RetrievalStage::FullCatalog);
    assert_eq!(outcome.candidates.len(), 2);
}

#[tokio::test]
async fn test_replacing_index_invalidates_old_cache_entries() {
    let store = InMemoryConditionStore::from_conditions(vec![common::condition("cluster", &["temple"], &[])]);
    let mut retriever = HybridRetriever::new(
        common::index(common::headache_catalog().unwrap()),
        RetrievalConfig::default(),
    )
    .with_store(Arc::new(store));

    retriever.retrieve(&UserSymptomData::at(["head"])).await;
    assert_eq!(retriever.cache().len().await, 1);

    retriever.replace_index(common::index(common::mixed_catalog().unwrap())).await;
    assert!(retriever.cache().is_empty().await);
}
