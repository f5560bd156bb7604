//! Sets the published flag on source keys once their artifact is committed.

use dkpublish_storage::{JobKind, PublishingStore, StagedKey};
use tracing::debug;

use super::{abort, require_page_size};
use crate::error::EngineError;

/// Walk the staging rows of `job` and flag the source row of every staged key
/// matching `select`. Each page commits in its own snapshot; setting a flag
/// twice is a no-op, so a retry after a crash only finishes the remainder.
///
/// Stuffing has no source row and is skipped. Returns the number of source
/// keys flagged.
pub async fn mark_used<S, F>(
    store: &S,
    job: JobKind,
    page_size: usize,
    select: F,
) -> Result<usize, EngineError>
where
    S: PublishingStore,
    F: Fn(&StagedKey) -> bool + Send + Sync,
{
    require_page_size(page_size)?;
    let mut skip = 0;
    let mut marked = 0;
    loop {
        let page = store.read_staged_keys(job, skip, page_size).await?;
        if page.is_empty() {
            return Ok(marked);
        }
        skip += page.len();

        let ids: Vec<i64> = page
            .iter()
            .filter(|k| select(k))
            .filter_map(|k| k.source_id)
            .collect();
        if ids.is_empty() {
            continue;
        }

        let mut snapshot = store.begin_snapshot().await?;
        let flagged = match job {
            JobKind::Eks => store.mark_published_locally(&mut snapshot, &ids).await,
            JobKind::Iks => store.mark_published_to_federation(&mut snapshot, &ids).await,
        };
        if let Err(e) = flagged {
            abort(store, snapshot).await;
            return Err(e.into());
        }
        store.commit_snapshot(snapshot).await?;
        debug!(job = ?job, count = ids.len(), "marked page");
        marked += ids.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkpublish_core::{DailyKey, DiagnosisKey, FederationTekInfo, LocalTekInfo};
    use dkpublish_storage::MemoryStore;

    async fn stage(store: &MemoryStore, used: &[bool]) {
        let mut snap = store.begin_snapshot().await.unwrap();
        let keys: Vec<DiagnosisKey> = (0..used.len())
            .map(|i| {
                DiagnosisKey::local(
                    DailyKey::new(vec![i as u8; 16], 2_668_032, 144),
                    LocalTekInfo::default(),
                )
            })
            .collect();
        store.insert_diagnosis_keys(&mut snap, keys).await.unwrap();
        store.commit_snapshot(snap).await.unwrap();

        let ids: Vec<i64> = store
            .list_diagnosis_keys()
            .await
            .unwrap()
            .iter()
            .filter_map(|k| k.id)
            .collect();
        let mut staged: Vec<StagedKey> = ids
            .iter()
            .zip(used)
            .map(|(id, used)| StagedKey {
                id: 0,
                source_id: Some(*id),
                daily_key: DailyKey::new(vec![0; 16], 2_668_032, 144),
                local: LocalTekInfo::default(),
                federation: FederationTekInfo::default(),
                used: *used,
            })
            .collect();
        let stuffing = StagedKey {
            source_id: None,
            used: true,
            ..staged[0].clone()
        };
        staged.push(stuffing);
        let mut snap = store.begin_snapshot().await.unwrap();
        store
            .insert_staged_keys(&mut snap, JobKind::Eks, staged)
            .await
            .unwrap();
        store.commit_snapshot(snap).await.unwrap();
    }

    #[tokio::test]
    async fn flags_only_selected_rows_with_a_source() {
        let store = MemoryStore::new();
        stage(&store, &[true, false, true, true, false]).await;

        let marked = mark_used(&store, JobKind::Eks, 2, |k| k.used).await.unwrap();
        assert_eq!(marked, 3);

        let published: Vec<bool> = store
            .list_diagnosis_keys()
            .await
            .unwrap()
            .iter()
            .map(|k| k.published_locally)
            .collect();
        assert_eq!(published, vec![true, false, true, true, false]);
    }

    #[tokio::test]
    async fn repeating_is_harmless() {
        let store = MemoryStore::new();
        stage(&store, &[true, true]).await;
        assert_eq!(mark_used(&store, JobKind::Eks, 10, |k| k.used).await.unwrap(), 2);
        assert_eq!(mark_used(&store, JobKind::Eks, 10, |k| k.used).await.unwrap(), 2);
        assert!(store
            .list_diagnosis_keys()
            .await
            .unwrap()
            .iter()
            .all(|k| k.published_locally && !k.published_to_federation));
    }
}
