//! Cursor-driven download of peer batches.
//!
//! For each day in the look-back window the job re-requests the batch named
//! by the stored cursor (or the day's first batch) and follows
//! `next_batch_tag` until the chain ends. Each new batch is stored together
//! with the advanced cursor in one snapshot, so the cursor never runs ahead
//! of what was written.

use std::collections::HashSet;
use std::sync::Arc;

use dkpublish_core::Clock;
use dkpublish_storage::{InboundBatchRecord, PublishingStore, StorageError};
use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info};

use super::transport::{PeerTransport, RemoteBatch};
use crate::config::{FederationConfig, PipelineConfig};
use crate::error::EngineError;
use crate::publishing::abort;
use crate::state::RunGuard;

pub const JOB_NAME: &str = "poll";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollingResult {
    /// Download requests made, including ones answered with nothing.
    pub requested: usize,
    /// Tags stored by this run, in order.
    pub written: Vec<String>,
    /// Batches the peer re-offered that were already stored.
    pub skipped: usize,
}

/// Store key of the polling cursor for one peer and day.
pub fn cursor_key(source: &str, date: Date) -> String {
    format!("{}/{}", source, date)
}

pub struct PollingJob<S: PublishingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn PeerTransport>,
    config: FederationConfig,
    guard: RunGuard,
}

impl<S: PublishingStore> PollingJob<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn PeerTransport>,
        config: &PipelineConfig,
    ) -> Self {
        PollingJob {
            store,
            clock,
            transport,
            config: config.federation.clone(),
            guard: RunGuard::new(JOB_NAME),
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub async fn execute(&self) -> Result<PollingResult, EngineError> {
        let ticket = self.guard.enter()?;
        let now = self.clock.now();
        let today = now.date();
        let mut seen = HashSet::new();
        let mut result = PollingResult::default();

        for back in (0..=self.config.days_to_look_back.max(0)).rev() {
            let date = today - Duration::days(back);
            self.poll_date(date, now, &mut seen, &mut result).await?;
        }

        ticket.complete();
        info!(
            job = JOB_NAME,
            requested = result.requested,
            written = result.written.len(),
            skipped = result.skipped,
            "polling completed"
        );
        Ok(result)
    }

    async fn poll_date(
        &self,
        date: Date,
        now: OffsetDateTime,
        seen: &mut HashSet<String>,
        result: &mut PollingResult,
    ) -> Result<(), EngineError> {
        let cursor = cursor_key(&self.config.source, date);
        let mut request = self.store.get_cursor(&cursor).await?;

        loop {
            result.requested += 1;
            let Some(batch) = self.transport.get_batch(date, request.as_deref()).await? else {
                debug!(job = JOB_NAME, %date, tag = ?request, "nothing to download");
                return Ok(());
            };
            if !seen.insert(batch.batch_tag.clone()) {
                debug!(job = JOB_NAME, tag = %batch.batch_tag, "tag already visited this run");
                return Ok(());
            }

            let RemoteBatch {
                batch_tag,
                content,
                next_batch_tag,
            } = batch;
            if self.store.has_inbound_batch(&batch_tag).await? {
                result.skipped += 1;
            } else if self.write(&cursor, date, &batch_tag, content, now).await? {
                info!(job = JOB_NAME, %date, tag = %batch_tag, "batch stored");
                result.written.push(batch_tag);
            } else {
                result.skipped += 1;
            }

            match next_batch_tag {
                Some(next) => request = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Store a batch and advance the cursor. Returns `false` if another
    /// writer stored the same tag first.
    async fn write(
        &self,
        cursor: &str,
        date: Date,
        tag: &str,
        content: Vec<u8>,
        now: OffsetDateTime,
    ) -> Result<bool, EngineError> {
        let store = self.store.as_ref();
        let mut snapshot = store.begin_snapshot().await?;
        let record = InboundBatchRecord::new(tag, date, content, now);
        let staged = async {
            store.insert_inbound_batch(&mut snapshot, record).await?;
            store.set_cursor(&mut snapshot, cursor, tag).await
        }
        .await;
        if let Err(e) = staged {
            abort(store, snapshot).await;
            return match e {
                StorageError::DuplicateBatchTag { .. } => Ok(false),
                e => Err(e.into()),
            };
        }
        match store.commit_snapshot(snapshot).await {
            Ok(()) => Ok(true),
            Err(StorageError::DuplicateBatchTag { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
