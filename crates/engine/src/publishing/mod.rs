//! Stages shared by the EKS and IKS engines.
//!
//! Snapshot → Stuffing → Build/Sign → Mark-Used → Write-Artifacts. Each stage
//! talks to the store through its own snapshots; nothing is held in memory
//! between stages except counts.

pub mod builder;
pub mod content;
pub mod mark_used;
pub mod snapshot;
pub mod stuffing;

use dkpublish_core::TransmissionRiskLevel;
use dkpublish_storage::{JobKind, PublishingStore, StagedKey};
use tracing::warn;

use crate::error::EngineError;

/// True when a staged key carries a usable transmission risk level.
pub fn has_transmission_risk(key: &StagedKey) -> bool {
    matches!(
        key.local.transmission_risk_level,
        Some(level) if level != TransmissionRiskLevel::None
    )
}

/// Abort a snapshot after a failed stage. An abort failure is only logged;
/// the stage error is what the caller reports.
pub(crate) async fn abort<S: PublishingStore>(store: &S, snapshot: S::Snapshot) {
    if let Err(e) = store.abort_snapshot(snapshot).await {
        warn!(error = %e, "snapshot abort failed");
    }
}

/// Create-or-truncate the staging area of `job` at run start.
pub async fn clear_staging<S: PublishingStore>(store: &S, job: JobKind) -> Result<(), EngineError> {
    let mut snapshot = store.begin_snapshot().await?;
    if let Err(e) = store.clear_job(&mut snapshot, job).await {
        abort(store, snapshot).await;
        return Err(e.into());
    }
    store.commit_snapshot(snapshot).await?;
    Ok(())
}

pub(crate) fn require_page_size(page_size: usize) -> Result<(), EngineError> {
    if page_size == 0 {
        return Err(EngineError::Precondition(
            "page size must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Staged keys of `job` already embedded in a committed artifact.
pub async fn count_used<S: PublishingStore>(
    store: &S,
    job: JobKind,
    page_size: usize,
) -> Result<usize, EngineError> {
    require_page_size(page_size)?;
    let mut skip = 0;
    let mut used = 0;
    loop {
        let page = store.read_staged_keys(job, skip, page_size).await?;
        if page.is_empty() {
            return Ok(used);
        }
        skip += page.len();
        used += page.iter().filter(|k| k.used).count();
    }
}
