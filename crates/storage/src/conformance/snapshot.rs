//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{make_inbound_batch, make_local_key, make_staged_key, TestResult};
use crate::{JobKind, PublishingStore};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "commit_empty_snapshot_succeeds",
        commit_empty_snapshot_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_keys_invisible",
        uncommitted_keys_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_keys_discarded",
        aborted_keys_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_flag_update_invisible",
        uncommitted_flag_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_staging_invisible",
        uncommitted_staging_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "multi_table_commit_is_atomic",
        multi_table_commit_is_atomic(factory).await,
    ));

    results
}

// ── 1. commit_empty_snapshot_succeeds ───────────────────────────────────────

async fn commit_empty_snapshot_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

// ── 2. uncommitted_keys_invisible ───────────────────────────────────────────

async fn uncommitted_keys_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_diagnosis_keys(&mut snap, vec![make_local_key(1)])
        .await
        .map_err(|e| e.to_string())?;

    let before = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    if !before.is_empty() {
        return Err(format!(
            "expected no keys before commit, got {}",
            before.len()
        ));
    }

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let after = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    if after.len() != 1 {
        return Err(format!("expected 1 key after commit, got {}", after.len()));
    }
    Ok(())
}

// ── 3. aborted_keys_discarded ───────────────────────────────────────────────

async fn aborted_keys_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_diagnosis_keys(&mut snap, vec![make_local_key(1), make_local_key(2)])
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let keys = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    if !keys.is_empty() {
        return Err(format!("expected no keys after abort, got {}", keys.len()));
    }
    Ok(())
}

// ── 4. uncommitted_flag_update_invisible ────────────────────────────────────

async fn uncommitted_flag_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = super::insert_committed_keys(&s, vec![make_local_key(1)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.mark_published_locally(&mut snap, &ids)
        .await
        .map_err(|e| e.to_string())?;

    let open = s
        .read_unpublished_locally(0, 10)
        .await
        .map_err(|e| e.to_string())?;
    if open.len() != 1 {
        return Err(format!(
            "expected key still unpublished while snapshot open, got {}",
            open.len()
        ));
    }

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let committed = s
        .read_unpublished_locally(0, 10)
        .await
        .map_err(|e| e.to_string())?;
    if !committed.is_empty() {
        return Err(format!(
            "expected no unpublished keys after commit, got {}",
            committed.len()
        ));
    }
    Ok(())
}

// ── 5. uncommitted_staging_invisible ────────────────────────────────────────

async fn uncommitted_staging_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_staged_keys(&mut snap, JobKind::Eks, vec![make_staged_key(None, 1)])
        .await
        .map_err(|e| e.to_string())?;

    let count = s
        .count_staged_keys(JobKind::Eks)
        .await
        .map_err(|e| e.to_string())?;
    if count != 0 {
        return Err(format!("expected 0 staged keys before commit, got {count}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

// ── 6. multi_table_commit_is_atomic ─────────────────────────────────────────

/// A snapshot touching several tables fails as a whole when one write is
/// rejected at commit time.
async fn multi_table_commit_is_atomic<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_inbound_batch(&mut first, make_inbound_batch("T1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_inbound_batch(&mut second, make_inbound_batch("T1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_diagnosis_keys(&mut second, vec![make_local_key(9)])
        .await
        .map_err(|e| e.to_string())?;

    s.commit_snapshot(first).await.map_err(|e| e.to_string())?;
    if s.commit_snapshot(second).await.is_ok() {
        return Err("expected second commit with duplicate tag to fail".to_string());
    }

    let keys = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    if !keys.is_empty() {
        return Err(format!(
            "expected keys from failed commit to be discarded, got {}",
            keys.len()
        ));
    }
    Ok(())
}
