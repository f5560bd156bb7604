use async_trait::async_trait;
use dkpublish_core::DiagnosisKey;

use crate::error::StorageError;
use crate::record::{
    ContentRecord, ContentType, InboundBatchRecord, InboundOutcome, JobKind, JobOutput,
    ProcessState, StagedKey,
};

/// The durable store behind the publication pipeline.
///
/// Three logical tables back every engine: the source diagnosis keys, a
/// job-scoped staging area per [`JobKind`] (staged keys plus job output), and
/// the published content. Federation bookkeeping adds inbound batches, the
/// polling cursor and per-artifact upload state.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back. Query operations run outside any snapshot and only
/// see committed data.
///
/// ## Identity
///
/// Row ids (source keys, staged keys, job output, content) are assigned on
/// commit and increase monotonically in insertion order. Paged reads are
/// ordered by id.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so engines can share one
/// store across async task boundaries.
#[async_trait]
pub trait PublishingStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    ///
    /// Returns `Err(StorageError::DuplicateBatchTag)` and applies nothing if
    /// an inbound batch tag in the snapshot was committed by someone else.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Source keys (within snapshot) ────────────────────────────────────────

    /// Bulk insert keys. Any `id` on the input is ignored.
    async fn insert_diagnosis_keys(
        &self,
        snapshot: &mut Self::Snapshot,
        keys: Vec<DiagnosisKey>,
    ) -> Result<(), StorageError>;

    async fn mark_published_locally(
        &self,
        snapshot: &mut Self::Snapshot,
        ids: &[i64],
    ) -> Result<(), StorageError>;

    async fn mark_published_to_federation(
        &self,
        snapshot: &mut Self::Snapshot,
        ids: &[i64],
    ) -> Result<(), StorageError>;

    async fn mark_ready_for_cleanup(
        &self,
        snapshot: &mut Self::Snapshot,
        ids: &[i64],
    ) -> Result<(), StorageError>;

    // ── Source keys (queries) ────────────────────────────────────────────────

    /// Keys not yet published locally and not flagged for cleanup, by id.
    async fn read_unpublished_locally(
        &self,
        skip: usize,
        take: usize,
    ) -> Result<Vec<DiagnosisKey>, StorageError>;

    /// Local-origin keys not yet sent to the federation, by id.
    async fn read_unpublished_to_federation(
        &self,
        skip: usize,
        take: usize,
    ) -> Result<Vec<DiagnosisKey>, StorageError>;

    /// Every stored key, by id.
    async fn list_diagnosis_keys(&self) -> Result<Vec<DiagnosisKey>, StorageError>;

    // ── Job staging (within snapshot) ────────────────────────────────────────

    /// Drop every staged key and job output of `job`.
    async fn clear_job(
        &self,
        snapshot: &mut Self::Snapshot,
        job: JobKind,
    ) -> Result<(), StorageError>;

    /// Bulk insert staged keys. Any `id` on the input is ignored.
    async fn insert_staged_keys(
        &self,
        snapshot: &mut Self::Snapshot,
        job: JobKind,
        keys: Vec<StagedKey>,
    ) -> Result<(), StorageError>;

    async fn mark_staged_used(
        &self,
        snapshot: &mut Self::Snapshot,
        job: JobKind,
        ids: &[i64],
    ) -> Result<(), StorageError>;

    async fn insert_job_output(
        &self,
        snapshot: &mut Self::Snapshot,
        job: JobKind,
        output: JobOutput,
    ) -> Result<(), StorageError>;

    // ── Job staging (queries) ────────────────────────────────────────────────

    /// Staged keys of `job`, by id.
    async fn read_staged_keys(
        &self,
        job: JobKind,
        skip: usize,
        take: usize,
    ) -> Result<Vec<StagedKey>, StorageError>;

    async fn count_staged_keys(&self, job: JobKind) -> Result<usize, StorageError>;

    /// Job output of `job`, by id.
    async fn list_job_output(&self, job: JobKind) -> Result<Vec<JobOutput>, StorageError>;

    // ── Published content ────────────────────────────────────────────────────

    /// Insert an artifact. Any `id` on the input is ignored.
    async fn insert_content(
        &self,
        snapshot: &mut Self::Snapshot,
        content: ContentRecord,
    ) -> Result<(), StorageError>;

    async fn list_content(
        &self,
        content_type: ContentType,
    ) -> Result<Vec<ContentRecord>, StorageError>;

    /// Upload state of a federation artifact; `New` when never recorded.
    async fn get_process_state(&self, content_id: i64) -> Result<ProcessState, StorageError>;

    /// Returns `Err(StorageError::ContentNotFound)` if no artifact has this id.
    async fn set_process_state(
        &self,
        snapshot: &mut Self::Snapshot,
        content_id: i64,
        state: ProcessState,
    ) -> Result<(), StorageError>;

    // ── Federation inbound ───────────────────────────────────────────────────

    /// Store a downloaded batch.
    ///
    /// Returns `Err(StorageError::DuplicateBatchTag)` if the tag is already
    /// committed or already pending in this snapshot.
    async fn insert_inbound_batch(
        &self,
        snapshot: &mut Self::Snapshot,
        batch: InboundBatchRecord,
    ) -> Result<(), StorageError>;

    async fn has_inbound_batch(&self, tag: &str) -> Result<bool, StorageError>;

    /// Batches with neither `accepted` nor `error` set, in insertion order.
    async fn list_pending_inbound_batches(&self) -> Result<Vec<InboundBatchRecord>, StorageError>;

    /// Returns `Err(StorageError::BatchNotFound)` if no batch has this tag.
    async fn set_inbound_outcome(
        &self,
        snapshot: &mut Self::Snapshot,
        tag: &str,
        outcome: InboundOutcome,
    ) -> Result<(), StorageError>;

    // ── Polling cursor ───────────────────────────────────────────────────────

    /// Last batch tag retrieved from `source`.
    async fn get_cursor(&self, source: &str) -> Result<Option<String>, StorageError>;

    async fn set_cursor(
        &self,
        snapshot: &mut Self::Snapshot,
        source: &str,
        tag: &str,
    ) -> Result<(), StorageError>;
}
