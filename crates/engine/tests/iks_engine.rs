//! Federation outbound runs: local keys become signed gateway batches.

mod common;

use std::sync::Arc;

use common::*;
use dkpublish_core::{DailyKey, DiagnosisKey, FederationTekInfo, TekOrigin};
use dkpublish_engine::verify::verify_federation_archive;
use dkpublish_engine::{EngineError, IksEngine};
use dkpublish_interchange::archive::BATCH_BIN;
use dkpublish_interchange::{decode_federation_batch, read_archive};
use dkpublish_storage::{ContentType, MemoryStore, PublishingStore};

fn engine(store: &Arc<MemoryStore>, ids: &Identities, item_count_max: usize) -> IksEngine<MemoryStore> {
    let mut config = config(5, 10);
    config.iks.item_count_max = item_count_max;
    config.countries_of_interest = vec!["BE".to_string(), "DE".to_string()];
    IksEngine::new(store.clone(), clock(), &config, ids.federation.clone())
}

fn imported_key() -> DiagnosisKey {
    let mut key = DiagnosisKey::federation(
        DailyKey::new(vec![0xee; 16], 2_672_064, 144),
        FederationTekInfo {
            country_of_origin: "DE".to_string(),
            days_since_symptoms_onset: 1,
            ..FederationTekInfo::default()
        },
    );
    key.published_to_federation = false;
    key
}

#[tokio::test]
async fn local_keys_are_batched_without_stuffing() {
    let store = Arc::new(MemoryStore::new());
    let ids = Identities::new();
    seed(&store, onset_yesterday(5)).await;

    let result = engine(&store, &ids, 2).execute().await.unwrap();

    assert_eq!(result.input_count, 5);
    assert_eq!(result.stuffing_count, 0);
    assert_eq!(result.output_count, 5);
    let sizes: Vec<usize> = result.artifacts.iter().map(|a| a.key_count).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(result.is_reconciled());

    let content = store.list_content(ContentType::FederationBatch).await.unwrap();
    assert_eq!(content.len(), 3);
    for artifact in &content {
        let report = verify_federation_archive(&artifact.content, &ids.federation.verifier()).unwrap();
        assert!(report.signature_valid);
    }

    let entries = read_archive(&content[0].content).unwrap();
    let batch = decode_federation_batch(entries.require(BATCH_BIN).unwrap()).unwrap();
    assert!(batch.keys.iter().all(|k| k.origin == "NL"));
    assert!(batch
        .keys
        .iter()
        .all(|k| k.visited_countries == vec!["BE".to_string(), "DE".to_string()]));
    assert!(batch.keys.iter().all(|k| k.days_since_onset_of_symptoms == 1));

    let keys = store.list_diagnosis_keys().await.unwrap();
    assert!(keys.iter().all(|k| k.published_to_federation && !k.published_locally));
}

#[tokio::test]
async fn unusable_keys_are_dropped_and_not_reconsidered() {
    let store = Arc::new(MemoryStore::new());
    let ids = Identities::new();
    seed(&store, vec![local_key(1, None), local_key(2, Some(2))]).await;
    let engine = engine(&store, &ids, 10);

    let first = engine.execute().await.unwrap();
    assert_eq!(first.input_count, 1);
    assert_eq!(first.output_count, 1);

    let keys = store.list_diagnosis_keys().await.unwrap();
    assert!(keys.iter().all(|k| k.published_to_federation));

    let second = engine.execute().await.unwrap();
    assert_eq!(second.input_count, 0);
    assert!(second.artifacts.is_empty());
}

#[tokio::test]
async fn imported_keys_are_never_sent_back() {
    let store = Arc::new(MemoryStore::new());
    let ids = Identities::new();
    seed(&store, vec![imported_key(), local_key(1, Some(1))]).await;

    let result = engine(&store, &ids, 10).execute().await.unwrap();

    assert_eq!(result.output_count, 1);
    let keys = store.list_diagnosis_keys().await.unwrap();
    let imported = keys.iter().find(|k| k.origin == TekOrigin::Federation).unwrap();
    assert!(!imported.published_to_federation);
}

#[tokio::test]
async fn engines_do_not_share_staging() {
    let store = Arc::new(MemoryStore::new());
    let ids = Identities::new();
    seed(&store, onset_yesterday(2)).await;

    let iks = engine(&store, &ids, 10).execute().await.unwrap();
    let eks = dkpublish_engine::EksEngine::new(store.clone(), clock(), &config(1, 10), ids.eks())
        .execute()
        .await
        .unwrap();

    assert_eq!(iks.output_count, 2);
    assert_eq!(eks.output_count, 2);
    let keys = store.list_diagnosis_keys().await.unwrap();
    assert!(keys.iter().all(|k| k.published_locally && k.published_to_federation));
}

#[tokio::test]
async fn reentrant_run_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let ids = Identities::new();
    let engine = engine(&store, &ids, 10);

    let _ticket = engine.guard().enter().unwrap();
    assert!(matches!(
        engine.execute().await,
        Err(EngineError::AlreadyRunning { engine: "iks" })
    ));
}
