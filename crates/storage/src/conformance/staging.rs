//! Job staging and published content conformance tests.

use std::future::Future;

use super::{make_staged_key, test_time, TestResult};
use crate::{ContentRecord, ContentType, JobKind, JobOutput, ProcessState, PublishingStore};

pub(super) async fn run_staging_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "staging",
        "jobs_are_isolated",
        jobs_are_isolated(factory).await,
    ));
    results.push(TestResult::from_result(
        "staging",
        "used_flag_is_persisted",
        used_flag_is_persisted(factory).await,
    ));
    results.push(TestResult::from_result(
        "staging",
        "clear_job_drops_staging_and_output",
        clear_job_drops_staging_and_output(factory).await,
    ));
    results.push(TestResult::from_result(
        "staging",
        "content_filtered_by_type",
        content_filtered_by_type(factory).await,
    ));
    results.push(TestResult::from_result(
        "staging",
        "process_state_defaults_to_new",
        process_state_defaults_to_new(factory).await,
    ));

    results
}

fn make_output(content_type: ContentType, byte: u8) -> JobOutput {
    JobOutput {
        id: 0,
        content_type,
        created: test_time(),
        release: test_time(),
        key_count: 1,
        content: vec![byte],
    }
}

fn make_content(content_type: ContentType, publishing_id: &str) -> ContentRecord {
    ContentRecord {
        id: 0,
        content_type,
        created: test_time(),
        release: test_time(),
        publishing_id: publishing_id.to_string(),
        content: vec![0],
    }
}

// ── 1. jobs_are_isolated ────────────────────────────────────────────────────

async fn jobs_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_staged_keys(
        &mut snap,
        JobKind::Eks,
        vec![make_staged_key(Some(1), 1), make_staged_key(None, 2)],
    )
    .await
    .map_err(|e| e.to_string())?;
    s.insert_staged_keys(&mut snap, JobKind::Iks, vec![make_staged_key(Some(1), 3)])
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let eks = s
        .count_staged_keys(JobKind::Eks)
        .await
        .map_err(|e| e.to_string())?;
    let iks = s
        .read_staged_keys(JobKind::Iks, 0, 10)
        .await
        .map_err(|e| e.to_string())?;
    if eks != 2 || iks.len() != 1 || iks[0].daily_key.key_data[0] != 3 {
        return Err(format!(
            "expected 2 eks and 1 iks staged key, got {eks} and {}",
            iks.len()
        ));
    }
    Ok(())
}

// ── 2. used_flag_is_persisted ───────────────────────────────────────────────

async fn used_flag_is_persisted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_staged_keys(
        &mut snap,
        JobKind::Eks,
        vec![make_staged_key(Some(1), 1), make_staged_key(Some(2), 2)],
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let staged = s
        .read_staged_keys(JobKind::Eks, 0, 10)
        .await
        .map_err(|e| e.to_string())?;
    let first = staged.first().ok_or("no staged rows")?.id;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.mark_staged_used(&mut snap, JobKind::Eks, &[first])
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let used: Vec<bool> = s
        .read_staged_keys(JobKind::Eks, 0, 10)
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .map(|k| k.used)
        .collect();
    if used != vec![true, false] {
        return Err(format!("expected [true, false], got {used:?}"));
    }
    Ok(())
}

// ── 3. clear_job_drops_staging_and_output ───────────────────────────────────

async fn clear_job_drops_staging_and_output<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_staged_keys(&mut snap, JobKind::Eks, vec![make_staged_key(Some(1), 1)])
        .await
        .map_err(|e| e.to_string())?;
    s.insert_job_output(&mut snap, JobKind::Eks, make_output(ContentType::ExposureKeySet, 1))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_job_output(
        &mut snap,
        JobKind::Iks,
        make_output(ContentType::FederationBatch, 2),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.clear_job(&mut snap, JobKind::Eks)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let staged = s
        .count_staged_keys(JobKind::Eks)
        .await
        .map_err(|e| e.to_string())?;
    let eks_out = s
        .list_job_output(JobKind::Eks)
        .await
        .map_err(|e| e.to_string())?;
    let iks_out = s
        .list_job_output(JobKind::Iks)
        .await
        .map_err(|e| e.to_string())?;
    if staged != 0 || !eks_out.is_empty() {
        return Err("expected eks staging and output to be cleared".to_string());
    }
    if iks_out.len() != 1 {
        return Err(format!(
            "expected iks output untouched, got {} rows",
            iks_out.len()
        ));
    }
    Ok(())
}

// ── 4. content_filtered_by_type ─────────────────────────────────────────────

async fn content_filtered_by_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_content(&mut snap, make_content(ContentType::ExposureKeySet, "a"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_content(&mut snap, make_content(ContentType::FederationBatch, "b"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let eks = s
        .list_content(ContentType::ExposureKeySet)
        .await
        .map_err(|e| e.to_string())?;
    if eks.len() != 1 || eks[0].publishing_id != "a" {
        return Err(format!("expected one key set 'a', got {} rows", eks.len()));
    }
    Ok(())
}

// ── 5. process_state_defaults_to_new ────────────────────────────────────────

async fn process_state_defaults_to_new<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_content(&mut snap, make_content(ContentType::FederationBatch, "b"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s
        .list_content(ContentType::FederationBatch)
        .await
        .map_err(|e| e.to_string())?;
    let id = stored.first().ok_or("content missing")?.id;

    let initial = s.get_process_state(id).await.map_err(|e| e.to_string())?;
    if initial != ProcessState::New {
        return Err(format!("expected New, got {initial:?}"));
    }

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.set_process_state(&mut snap, id, ProcessState::Sent)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let sent = s.get_process_state(id).await.map_err(|e| e.to_string())?;
    if sent != ProcessState::Sent {
        return Err(format!("expected Sent, got {sent:?}"));
    }
    Ok(())
}
