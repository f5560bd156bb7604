//! Inbound batch and polling cursor conformance tests.

use std::future::Future;

use super::{make_inbound_batch, test_time, TestResult};
use crate::{InboundOutcome, PublishingStore, StorageError};

pub(super) async fn run_federation_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "federation",
        "duplicate_tag_rejected",
        duplicate_tag_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "federation",
        "duplicate_tag_in_same_snapshot_rejected",
        duplicate_tag_in_same_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "federation",
        "outcome_removes_from_pending",
        outcome_removes_from_pending(factory).await,
    ));
    results.push(TestResult::from_result(
        "federation",
        "outcome_for_unknown_tag_fails",
        outcome_for_unknown_tag_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "federation",
        "cursor_overwrites_per_source",
        cursor_overwrites_per_source(factory).await,
    ));

    results
}

// ── 1. duplicate_tag_rejected ───────────────────────────────────────────────

async fn duplicate_tag_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_inbound_batch(&mut snap, make_inbound_batch("T1"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_inbound_batch(&mut snap, make_inbound_batch("T1"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::DuplicateBatchTag { tag }) if tag == "T1" => Ok(()),
        other => Err(format!("expected DuplicateBatchTag(T1), got {other:?}")),
    }
}

// ── 2. duplicate_tag_in_same_snapshot_rejected ──────────────────────────────

async fn duplicate_tag_in_same_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_inbound_batch(&mut snap, make_inbound_batch("T1"))
        .await
        .map_err(|e| e.to_string())?;
    let result = s
        .insert_inbound_batch(&mut snap, make_inbound_batch("T1"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if !matches!(result, Err(StorageError::DuplicateBatchTag { .. })) {
        return Err(format!("expected DuplicateBatchTag, got {result:?}"));
    }
    Ok(())
}

// ── 3. outcome_removes_from_pending ─────────────────────────────────────────

async fn outcome_removes_from_pending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for tag in ["T1", "T2", "T3"] {
        s.insert_inbound_batch(&mut snap, make_inbound_batch(tag))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.set_inbound_outcome(&mut snap, "T1", InboundOutcome::Accepted(test_time()))
        .await
        .map_err(|e| e.to_string())?;
    s.set_inbound_outcome(&mut snap, "T3", InboundOutcome::Error)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let pending: Vec<String> = s
        .list_pending_inbound_batches()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|b| b.tag)
        .collect();
    if pending != vec!["T2".to_string()] {
        return Err(format!("expected only T2 pending, got {pending:?}"));
    }
    if !s.has_inbound_batch("T3").await.map_err(|e| e.to_string())? {
        return Err("errored batch must stay stored".to_string());
    }
    Ok(())
}

// ── 4. outcome_for_unknown_tag_fails ────────────────────────────────────────

async fn outcome_for_unknown_tag_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .set_inbound_outcome(&mut snap, "missing", InboundOutcome::Error)
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::BatchNotFound { tag }) if tag == "missing" => Ok(()),
        other => Err(format!("expected BatchNotFound, got {other:?}")),
    }
}

// ── 5. cursor_overwrites_per_source ─────────────────────────────────────────

async fn cursor_overwrites_per_source<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    if s.get_cursor("gateway").await.map_err(|e| e.to_string())?.is_some() {
        return Err("expected no cursor on a fresh store".to_string());
    }

    for tag in ["T1", "T2"] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.set_cursor(&mut snap, "gateway", tag)
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let cursor = s.get_cursor("gateway").await.map_err(|e| e.to_string())?;
    if cursor.as_deref() != Some("T2") {
        return Err(format!("expected cursor T2, got {cursor:?}"));
    }
    let other = s.get_cursor("other").await.map_err(|e| e.to_string())?;
    if other.is_some() {
        return Err(format!("expected no cursor for other source, got {other:?}"));
    }
    Ok(())
}
