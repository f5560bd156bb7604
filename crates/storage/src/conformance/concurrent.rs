use std::future::Future;
use std::sync::Arc;

use super::{make_inbound_batch, make_local_key, TestResult};
use crate::{PublishingStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_same_tag_exactly_one_wins",
        concurrent_same_tag_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_key_inserts_all_land",
        concurrent_key_inserts_all_land(factory).await,
    ));

    results
}

// ── Concurrent inbound insert: exactly one wins ─────────────────────────────

/// N tasks each try to store the same batch tag. Exactly one commit succeeds;
/// the rest must get DuplicateBatchTag, either on insert or on commit.
async fn concurrent_same_tag_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .insert_inbound_batch(&mut snap, make_inbound_batch("T1"))
                .await
            {
                Ok(()) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::DuplicateBatchTag { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::DuplicateBatchTag { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent key inserts: nothing lost, ids unique ────────────────────────

async fn concurrent_key_inserts_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            s.insert_diagnosis_keys(&mut snap, vec![make_local_key(i as u8)])
                .await?;
            s.commit_snapshot(snap).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let keys = storage
        .list_diagnosis_keys()
        .await
        .map_err(|e| e.to_string())?;
    let mut ids: Vec<i64> = keys.iter().filter_map(|k| k.id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }
    Ok(())
}
