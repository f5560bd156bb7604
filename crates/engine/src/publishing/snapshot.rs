//! Snapshot/filter stage: moves publishable source keys into job staging.
//!
//! The whole stage runs in one store snapshot committed at the end. Reads see
//! only committed rows, so advancing the page offset by rows read walks the
//! source selection exactly once even though rejected rows are flagged along
//! the way. Rows committed by a concurrent writer after the stage started are
//! picked up by the next run.

use dkpublish_core::{DiagnosisKey, DkProcessingItem, Infectiousness, ProcessorChain};
use dkpublish_storage::{JobKind, PublishingStore, StagedKey, StorageError};
use tracing::debug;

use super::{abort, has_transmission_risk, require_page_size};
use crate::error::EngineError;

/// Row counts of one snapshot stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub read: usize,
    pub staged: usize,
    pub rejected: usize,
    /// Staged rows without a usable risk level.
    pub transmission_risk_none: usize,
}

/// What happens to one source row.
enum Disposition {
    Stage(StagedKey),
    Reject(i64),
}

fn stage(id: i64, key: DiagnosisKey) -> StagedKey {
    StagedKey {
        id: 0,
        source_id: Some(id),
        daily_key: key.daily_key,
        local: key.local,
        federation: key.federation,
        used: false,
    }
}

fn stored_id(key: &DiagnosisKey) -> Result<i64, StorageError> {
    key.id
        .ok_or_else(|| StorageError::Backend("stored key has no id".to_string()))
}

/// Local publication: keep rows the infectiousness filter releases, flag the
/// rest for cleanup.
pub async fn snapshot_for_eks<S: PublishingStore>(
    store: &S,
    infectiousness: &Infectiousness,
    page_size: usize,
) -> Result<SnapshotCounts, EngineError> {
    run(store, JobKind::Eks, page_size, |key| {
        let id = stored_id(&key)?;
        let released = key
            .local
            .days_since_symptoms_onset
            .is_some_and(|days| infectiousness.is_infectious(key.local.symptomatic, days));
        Ok(if released {
            Disposition::Stage(stage(id, key))
        } else {
            Disposition::Reject(id)
        })
    })
    .await
}

/// Federation outbound: run local keys through `chain`. Dropped keys are
/// flagged as sent so the next run does not reconsider them.
pub async fn snapshot_for_iks<S: PublishingStore>(
    store: &S,
    chain: &ProcessorChain,
    page_size: usize,
) -> Result<SnapshotCounts, EngineError> {
    run(store, JobKind::Iks, page_size, |key| {
        let id = stored_id(&key)?;
        Ok(match chain.execute(DkProcessingItem::new(key)) {
            Some(item) => Disposition::Stage(stage(id, item.diagnosis_key)),
            None => Disposition::Reject(id),
        })
    })
    .await
}

async fn run<S, F>(
    store: &S,
    job: JobKind,
    page_size: usize,
    classify: F,
) -> Result<SnapshotCounts, EngineError>
where
    S: PublishingStore,
    F: Fn(DiagnosisKey) -> Result<Disposition, StorageError> + Send + Sync,
{
    require_page_size(page_size)?;
    let mut snapshot = store.begin_snapshot().await?;
    match fill(store, &mut snapshot, job, page_size, &classify).await {
        Ok(counts) => {
            store.commit_snapshot(snapshot).await?;
            Ok(counts)
        }
        Err(e) => {
            abort(store, snapshot).await;
            Err(e)
        }
    }
}

async fn fill<S, F>(
    store: &S,
    snapshot: &mut S::Snapshot,
    job: JobKind,
    page_size: usize,
    classify: &F,
) -> Result<SnapshotCounts, EngineError>
where
    S: PublishingStore,
    F: Fn(DiagnosisKey) -> Result<Disposition, StorageError> + Send + Sync,
{
    let mut counts = SnapshotCounts::default();
    loop {
        let page = match job {
            JobKind::Eks => store.read_unpublished_locally(counts.read, page_size).await?,
            JobKind::Iks => {
                store
                    .read_unpublished_to_federation(counts.read, page_size)
                    .await?
            }
        };
        if page.is_empty() {
            return Ok(counts);
        }
        counts.read += page.len();

        let mut staged = Vec::new();
        let mut rejected = Vec::new();
        for key in page {
            match classify(key)? {
                Disposition::Stage(key) => staged.push(key),
                Disposition::Reject(id) => rejected.push(id),
            }
        }
        debug!(
            job = ?job,
            staged = staged.len(),
            rejected = rejected.len(),
            "snapshot page"
        );

        counts.staged += staged.len();
        counts.rejected += rejected.len();
        counts.transmission_risk_none += staged.iter().filter(|k| !has_transmission_risk(k)).count();

        if !rejected.is_empty() {
            match job {
                JobKind::Eks => store.mark_ready_for_cleanup(snapshot, &rejected).await?,
                JobKind::Iks => {
                    store
                        .mark_published_to_federation(snapshot, &rejected)
                        .await?
                }
            }
        }
        if !staged.is_empty() {
            store.insert_staged_keys(snapshot, job, staged).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkpublish_core::{
        DailyKey, InfectiousPeriodType, InfectiousnessConfig, LocalTekInfo,
        TransmissionRiskLevel,
    };
    use dkpublish_storage::MemoryStore;

    fn key(byte: u8, days: Option<i32>) -> DiagnosisKey {
        DiagnosisKey::local(
            DailyKey::new(vec![byte; 16], 2_668_032, 144),
            LocalTekInfo {
                transmission_risk_level: Some(TransmissionRiskLevel::High),
                days_since_symptoms_onset: days,
                symptomatic: InfectiousPeriodType::Symptomatic,
                ..LocalTekInfo::default()
            },
        )
    }

    async fn seed(store: &MemoryStore, keys: Vec<DiagnosisKey>) {
        let mut snap = store.begin_snapshot().await.unwrap();
        store.insert_diagnosis_keys(&mut snap, keys).await.unwrap();
        store.commit_snapshot(snap).await.unwrap();
    }

    fn infectiousness() -> Infectiousness {
        Infectiousness::from_config(&InfectiousnessConfig::default())
    }

    #[tokio::test]
    async fn every_row_is_staged_or_rejected_for_any_page_size() {
        for page_size in [1, 2, 3, 7, 100] {
            let store = MemoryStore::new();
            // Offsets outside -2..=11 are not infectious for symptomatic keys.
            let keys = (0..17u8)
                .map(|i| key(i, Some(if i % 3 == 0 { 20 } else { 1 })))
                .collect();
            seed(&store, keys).await;

            let counts = snapshot_for_eks(&store, &infectiousness(), page_size)
                .await
                .unwrap();
            assert_eq!(counts.read, 17, "page size {page_size}");
            assert_eq!(counts.staged + counts.rejected, 17);
            assert_eq!(counts.rejected, 6);
            assert_eq!(
                store.count_staged_keys(JobKind::Eks).await.unwrap(),
                counts.staged
            );

            let flagged = store
                .list_diagnosis_keys()
                .await
                .unwrap()
                .iter()
                .filter(|k| k.is_ready_for_cleanup())
                .count();
            assert_eq!(flagged, counts.rejected);
        }
    }

    #[tokio::test]
    async fn rejected_rows_are_not_read_again() {
        let store = MemoryStore::new();
        seed(&store, vec![key(1, None), key(2, Some(0))]).await;
        let first = snapshot_for_eks(&store, &infectiousness(), 10).await.unwrap();
        assert_eq!((first.read, first.staged, first.rejected), (2, 1, 1));

        // Without mark-used the staged row is still unpublished; the rejected
        // one is gone from the selection.
        let second = snapshot_for_eks(&store, &infectiousness(), 10).await.unwrap();
        assert_eq!(second.read, 1);
    }

    #[tokio::test]
    async fn staged_rows_without_risk_level_are_counted() {
        let store = MemoryStore::new();
        let mut none = key(1, Some(0));
        none.local.transmission_risk_level = None;
        seed(&store, vec![none, key(2, Some(0))]).await;
        let counts = snapshot_for_eks(&store, &infectiousness(), 10).await.unwrap();
        assert_eq!(counts.staged, 2);
        assert_eq!(counts.transmission_risk_none, 1);
    }

    #[tokio::test]
    async fn zero_page_size_is_a_precondition_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            snapshot_for_eks(&store, &infectiousness(), 0).await,
            Err(EngineError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn failed_commit_stages_nothing() {
        let store = MemoryStore::new();
        seed(&store, vec![key(1, Some(0))]).await;
        store.set_commit_failure(true).unwrap();
        assert!(snapshot_for_eks(&store, &infectiousness(), 10).await.is_err());
        store.set_commit_failure(false).unwrap();
        assert_eq!(store.count_staged_keys(JobKind::Eks).await.unwrap(), 0);
    }
}
