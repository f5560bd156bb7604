//! Source key table conformance tests.
//!
//! Verifies id ordering, the two unpublished selections and flag updates.

use std::future::Future;

use super::{insert_committed_keys, make_federation_key, make_local_key, TestResult};
use crate::PublishingStore;

pub(super) async fn run_key_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "keys",
        "ids_increase_in_insertion_order",
        ids_increase_in_insertion_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "keys",
        "paged_read_covers_every_row_once",
        paged_read_covers_every_row_once(factory).await,
    ));
    results.push(TestResult::from_result(
        "keys",
        "cleanup_flag_excludes_from_local_selection",
        cleanup_flag_excludes_from_local_selection(factory).await,
    ));
    results.push(TestResult::from_result(
        "keys",
        "federation_selection_skips_federation_origin",
        federation_selection_skips_federation_origin(factory).await,
    ));
    results.push(TestResult::from_result(
        "keys",
        "publish_flags_are_independent",
        publish_flags_are_independent(factory).await,
    ));
    results.push(TestResult::from_result(
        "keys",
        "marking_twice_is_a_no_op",
        marking_twice_is_a_no_op(factory).await,
    ));

    results
}

// ── 1. ids_increase_in_insertion_order ──────────────────────────────────────

async fn ids_increase_in_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed_keys(&s, vec![make_local_key(1), make_local_key(2)]).await?;
    let ids = insert_committed_keys(&s, vec![make_local_key(3)]).await?;

    if ids.len() != 3 {
        return Err(format!("expected 3 ids, got {}", ids.len()));
    }
    if !ids.windows(2).all(|w| w[0] < w[1]) {
        return Err(format!("expected strictly increasing ids, got {ids:?}"));
    }
    let keys = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    let bytes: Vec<u8> = keys.iter().map(|k| k.daily_key.key_data[0]).collect();
    if bytes != vec![1, 2, 3] {
        return Err(format!("expected insertion order [1, 2, 3], got {bytes:?}"));
    }
    Ok(())
}

// ── 2. paged_read_covers_every_row_once ─────────────────────────────────────

async fn paged_read_covers_every_row_once<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = insert_committed_keys(&s, (0..7).map(make_local_key).collect()).await?;

    let mut seen = Vec::new();
    let mut skip = 0;
    loop {
        let page = s
            .read_unpublished_locally(skip, 3)
            .await
            .map_err(|e| e.to_string())?;
        if page.is_empty() {
            break;
        }
        skip += page.len();
        seen.extend(page.into_iter().filter_map(|k| k.id));
    }

    if seen != ids {
        return Err(format!("expected {ids:?}, got {seen:?}"));
    }
    Ok(())
}

// ── 3. cleanup_flag_excludes_from_local_selection ───────────────────────────

async fn cleanup_flag_excludes_from_local_selection<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = insert_committed_keys(&s, vec![make_local_key(1), make_local_key(2)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.mark_ready_for_cleanup(&mut snap, &ids[..1])
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let open = s
        .read_unpublished_locally(0, 10)
        .await
        .map_err(|e| e.to_string())?;
    let open_ids: Vec<i64> = open.iter().filter_map(|k| k.id).collect();
    if open_ids != ids[1..] {
        return Err(format!("expected {:?}, got {open_ids:?}", &ids[1..]));
    }
    Ok(())
}

// ── 4. federation_selection_skips_federation_origin ─────────────────────────

async fn federation_selection_skips_federation_origin<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    insert_committed_keys(&s, vec![make_federation_key(1), make_local_key(2)]).await?;

    let outbound = s
        .read_unpublished_to_federation(0, 10)
        .await
        .map_err(|e| e.to_string())?;
    if outbound.len() != 1 || outbound[0].daily_key.key_data[0] != 2 {
        return Err(format!(
            "expected only the local key, got {} keys",
            outbound.len()
        ));
    }

    // Imported keys are still eligible for local publication.
    let local = s
        .read_unpublished_locally(0, 10)
        .await
        .map_err(|e| e.to_string())?;
    if local.len() != 2 {
        return Err(format!("expected 2 locally unpublished, got {}", local.len()));
    }
    Ok(())
}

// ── 5. publish_flags_are_independent ────────────────────────────────────────

async fn publish_flags_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = insert_committed_keys(&s, vec![make_local_key(1)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.mark_published_to_federation(&mut snap, &ids)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let keys = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    let key = keys.first().ok_or("key disappeared")?;
    if !key.published_to_federation || key.published_locally {
        return Err(format!(
            "expected only publishedToFederation set, got local={} federation={}",
            key.published_locally, key.published_to_federation
        ));
    }
    Ok(())
}

// ── 6. marking_twice_is_a_no_op ─────────────────────────────────────────────

async fn marking_twice_is_a_no_op<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ids = insert_committed_keys(&s, vec![make_local_key(1)]).await?;

    for _ in 0..2 {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.mark_published_locally(&mut snap, &ids)
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let keys = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    if keys.len() != 1 || !keys[0].published_locally {
        return Err("expected exactly one key, published locally".to_string());
    }
    Ok(())
}
