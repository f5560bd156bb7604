//! In-memory reference backend.
//!
//! A snapshot is a list of pending writes. Nothing is visible to queries
//! until `commit_snapshot` applies the whole list under one lock, which gives
//! the all-or-nothing behaviour the engines rely on.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dkpublish_core::{DiagnosisKey, TekOrigin};

use crate::error::StorageError;
use crate::record::{
    ContentRecord, ContentType, InboundBatchRecord, InboundOutcome, JobKind, JobOutput,
    ProcessState, StagedKey,
};
use crate::traits::PublishingStore;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    keys: BTreeMap<i64, DiagnosisKey>,
    staged: BTreeMap<JobKind, BTreeMap<i64, StagedKey>>,
    outputs: BTreeMap<JobKind, Vec<JobOutput>>,
    content: Vec<ContentRecord>,
    process_states: HashMap<i64, ProcessState>,
    inbound: Vec<InboundBatchRecord>,
    cursors: HashMap<String, String>,
    fail_commits: bool,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.inbound.iter().any(|b| b.tag == tag)
    }

    fn set_key_flag(&mut self, ids: &[i64], set: impl Fn(&mut DiagnosisKey)) {
        for id in ids {
            if let Some(key) = self.keys.get_mut(id) {
                set(key);
            }
        }
    }

    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::InsertKeys(keys) => {
                for mut key in keys {
                    let id = self.allocate_id();
                    key.id = Some(id);
                    self.keys.insert(id, key);
                }
            }
            PendingOp::MarkPublishedLocally(ids) => {
                self.set_key_flag(&ids, |k| k.published_locally = true)
            }
            PendingOp::MarkPublishedToFederation(ids) => {
                self.set_key_flag(&ids, |k| k.published_to_federation = true)
            }
            PendingOp::MarkReadyForCleanup(ids) => {
                self.set_key_flag(&ids, |k| k.ready_for_cleanup = Some(true))
            }
            PendingOp::ClearJob(job) => {
                self.staged.remove(&job);
                self.outputs.remove(&job);
            }
            PendingOp::InsertStaged(job, keys) => {
                for mut key in keys {
                    let id = self.allocate_id();
                    key.id = id;
                    self.staged.entry(job).or_default().insert(id, key);
                }
            }
            PendingOp::MarkStagedUsed(job, ids) => {
                if let Some(rows) = self.staged.get_mut(&job) {
                    for id in ids {
                        if let Some(row) = rows.get_mut(&id) {
                            row.used = true;
                        }
                    }
                }
            }
            PendingOp::InsertJobOutput(job, mut output) => {
                output.id = self.allocate_id();
                self.outputs.entry(job).or_default().push(output);
            }
            PendingOp::InsertContent(mut content) => {
                content.id = self.allocate_id();
                self.content.push(content);
            }
            PendingOp::SetProcessState(id, state) => {
                self.process_states.insert(id, state);
            }
            PendingOp::InsertInbound(batch) => self.inbound.push(batch),
            PendingOp::SetInboundOutcome(tag, outcome) => {
                if let Some(batch) = self.inbound.iter_mut().find(|b| b.tag == tag) {
                    match outcome {
                        InboundOutcome::Accepted(at) => batch.accepted = Some(at),
                        InboundOutcome::Error => batch.error = true,
                    }
                }
            }
            PendingOp::SetCursor(source, tag) => {
                self.cursors.insert(source, tag);
            }
        }
    }
}

#[derive(Debug)]
enum PendingOp {
    InsertKeys(Vec<DiagnosisKey>),
    MarkPublishedLocally(Vec<i64>),
    MarkPublishedToFederation(Vec<i64>),
    MarkReadyForCleanup(Vec<i64>),
    ClearJob(JobKind),
    InsertStaged(JobKind, Vec<StagedKey>),
    MarkStagedUsed(JobKind, Vec<i64>),
    InsertJobOutput(JobKind, JobOutput),
    InsertContent(ContentRecord),
    SetProcessState(i64, ProcessState),
    InsertInbound(InboundBatchRecord),
    SetInboundOutcome(String, InboundOutcome),
    SetCursor(String, String),
}

/// Pending writes of one transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    ops: Vec<PendingOp>,
}

impl MemorySnapshot {
    fn pending_tags(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            PendingOp::InsertInbound(batch) => Some(batch.tag.as_str()),
            _ => None,
        })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail with a backend error until reset.
    pub fn set_commit_failure(&self, fail: bool) -> Result<(), StorageError> {
        self.lock()?.fail_commits = fail;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {e}")))
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, skip: usize, take: usize) -> Vec<T> {
    rows.skip(skip).take(take).collect()
}

#[async_trait]
impl PublishingStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.fail_commits {
            return Err(StorageError::Backend("commit rejected".to_string()));
        }
        if let Some(tag) = snapshot.pending_tags().find(|tag| inner.has_tag(tag)) {
            return Err(StorageError::DuplicateBatchTag {
                tag: tag.to_string(),
            });
        }
        for op in snapshot.ops {
            inner.apply(op);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    // ── Source keys ──────────────────────────────────────────────────────────

    async fn insert_diagnosis_keys(
        &self,
        snapshot: &mut MemorySnapshot,
        keys: Vec<DiagnosisKey>,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::InsertKeys(keys));
        Ok(())
    }

    async fn mark_published_locally(
        &self,
        snapshot: &mut MemorySnapshot,
        ids: &[i64],
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::MarkPublishedLocally(ids.to_vec()));
        Ok(())
    }

    async fn mark_published_to_federation(
        &self,
        snapshot: &mut MemorySnapshot,
        ids: &[i64],
    ) -> Result<(), StorageError> {
        snapshot
            .ops
            .push(PendingOp::MarkPublishedToFederation(ids.to_vec()));
        Ok(())
    }

    async fn mark_ready_for_cleanup(
        &self,
        snapshot: &mut MemorySnapshot,
        ids: &[i64],
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::MarkReadyForCleanup(ids.to_vec()));
        Ok(())
    }

    async fn read_unpublished_locally(
        &self,
        skip: usize,
        take: usize,
    ) -> Result<Vec<DiagnosisKey>, StorageError> {
        let inner = self.lock()?;
        let rows = inner
            .keys
            .values()
            .filter(|k| !k.published_locally && !k.is_ready_for_cleanup())
            .cloned();
        Ok(page(rows, skip, take))
    }

    async fn read_unpublished_to_federation(
        &self,
        skip: usize,
        take: usize,
    ) -> Result<Vec<DiagnosisKey>, StorageError> {
        let inner = self.lock()?;
        let rows = inner
            .keys
            .values()
            .filter(|k| k.origin == TekOrigin::Local && !k.published_to_federation)
            .cloned();
        Ok(page(rows, skip, take))
    }

    async fn list_diagnosis_keys(&self) -> Result<Vec<DiagnosisKey>, StorageError> {
        Ok(self.lock()?.keys.values().cloned().collect())
    }

    // ── Job staging ──────────────────────────────────────────────────────────

    async fn clear_job(
        &self,
        snapshot: &mut MemorySnapshot,
        job: JobKind,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::ClearJob(job));
        Ok(())
    }

    async fn insert_staged_keys(
        &self,
        snapshot: &mut MemorySnapshot,
        job: JobKind,
        keys: Vec<StagedKey>,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::InsertStaged(job, keys));
        Ok(())
    }

    async fn mark_staged_used(
        &self,
        snapshot: &mut MemorySnapshot,
        job: JobKind,
        ids: &[i64],
    ) -> Result<(), StorageError> {
        snapshot
            .ops
            .push(PendingOp::MarkStagedUsed(job, ids.to_vec()));
        Ok(())
    }

    async fn insert_job_output(
        &self,
        snapshot: &mut MemorySnapshot,
        job: JobKind,
        output: JobOutput,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::InsertJobOutput(job, output));
        Ok(())
    }

    async fn read_staged_keys(
        &self,
        job: JobKind,
        skip: usize,
        take: usize,
    ) -> Result<Vec<StagedKey>, StorageError> {
        let inner = self.lock()?;
        Ok(match inner.staged.get(&job) {
            Some(rows) => page(rows.values().cloned(), skip, take),
            None => Vec::new(),
        })
    }

    async fn count_staged_keys(&self, job: JobKind) -> Result<usize, StorageError> {
        Ok(self.lock()?.staged.get(&job).map_or(0, |rows| rows.len()))
    }

    async fn list_job_output(&self, job: JobKind) -> Result<Vec<JobOutput>, StorageError> {
        Ok(self
            .lock()?
            .outputs
            .get(&job)
            .cloned()
            .unwrap_or_default())
    }

    // ── Published content ────────────────────────────────────────────────────

    async fn insert_content(
        &self,
        snapshot: &mut MemorySnapshot,
        content: ContentRecord,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::InsertContent(content));
        Ok(())
    }

    async fn list_content(
        &self,
        content_type: ContentType,
    ) -> Result<Vec<ContentRecord>, StorageError> {
        Ok(self
            .lock()?
            .content
            .iter()
            .filter(|c| c.content_type == content_type)
            .cloned()
            .collect())
    }

    async fn get_process_state(&self, content_id: i64) -> Result<ProcessState, StorageError> {
        Ok(self
            .lock()?
            .process_states
            .get(&content_id)
            .copied()
            .unwrap_or_default())
    }

    async fn set_process_state(
        &self,
        snapshot: &mut MemorySnapshot,
        content_id: i64,
        state: ProcessState,
    ) -> Result<(), StorageError> {
        if !self.lock()?.content.iter().any(|c| c.id == content_id) {
            return Err(StorageError::ContentNotFound { id: content_id });
        }
        snapshot
            .ops
            .push(PendingOp::SetProcessState(content_id, state));
        Ok(())
    }

    // ── Federation inbound ───────────────────────────────────────────────────

    async fn insert_inbound_batch(
        &self,
        snapshot: &mut MemorySnapshot,
        batch: InboundBatchRecord,
    ) -> Result<(), StorageError> {
        let committed = self.lock()?.has_tag(&batch.tag);
        if committed || snapshot.pending_tags().any(|tag| tag == batch.tag) {
            return Err(StorageError::DuplicateBatchTag { tag: batch.tag });
        }
        snapshot.ops.push(PendingOp::InsertInbound(batch));
        Ok(())
    }

    async fn has_inbound_batch(&self, tag: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.has_tag(tag))
    }

    async fn list_pending_inbound_batches(&self) -> Result<Vec<InboundBatchRecord>, StorageError> {
        Ok(self
            .lock()?
            .inbound
            .iter()
            .filter(|b| b.is_pending())
            .cloned()
            .collect())
    }

    async fn set_inbound_outcome(
        &self,
        snapshot: &mut MemorySnapshot,
        tag: &str,
        outcome: InboundOutcome,
    ) -> Result<(), StorageError> {
        let known = self.lock()?.has_tag(tag) || snapshot.pending_tags().any(|t| t == tag);
        if !known {
            return Err(StorageError::BatchNotFound {
                tag: tag.to_string(),
            });
        }
        snapshot
            .ops
            .push(PendingOp::SetInboundOutcome(tag.to_string(), outcome));
        Ok(())
    }

    // ── Polling cursor ───────────────────────────────────────────────────────

    async fn get_cursor(&self, source: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.cursors.get(source).cloned())
    }

    async fn set_cursor(
        &self,
        snapshot: &mut MemorySnapshot,
        source: &str,
        tag: &str,
    ) -> Result<(), StorageError> {
        snapshot
            .ops
            .push(PendingOp::SetCursor(source.to_string(), tag.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkpublish_core::{DailyKey, LocalTekInfo};

    fn key(byte: u8) -> DiagnosisKey {
        DiagnosisKey::local(
            DailyKey::new(vec![byte; 16], 2_668_032, 144),
            LocalTekInfo::default(),
        )
    }

    #[tokio::test]
    async fn ids_follow_insertion_order() {
        let store = MemoryStore::new();
        let mut snap = store.begin_snapshot().await.unwrap();
        store
            .insert_diagnosis_keys(&mut snap, vec![key(1), key(2), key(3)])
            .await
            .unwrap();
        store.commit_snapshot(snap).await.unwrap();

        let keys = store.list_diagnosis_keys().await.unwrap();
        let ids: Vec<i64> = keys.iter().filter_map(|k| k.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(keys[0].daily_key.key_data, vec![1; 16]);
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        store.set_commit_failure(true).unwrap();
        let mut snap = store.begin_snapshot().await.unwrap();
        store
            .insert_diagnosis_keys(&mut snap, vec![key(1)])
            .await
            .unwrap();
        assert!(store.commit_snapshot(snap).await.is_err());
        assert!(store.list_diagnosis_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn process_state_requires_content() {
        let store = MemoryStore::new();
        let mut snap = store.begin_snapshot().await.unwrap();
        let result = store
            .set_process_state(&mut snap, 42, ProcessState::Sent)
            .await;
        assert!(matches!(result, Err(StorageError::ContentNotFound { id: 42 })));
    }
}
