//! Uploads federation batch artifacts to the peer gateway.

use std::sync::Arc;

use dkpublish_interchange::archive::{BATCH_BIN, BATCH_SIG};
use dkpublish_interchange::read_archive;
use dkpublish_storage::{ContentRecord, ContentType, ProcessState, PublishingStore};
use serde::Serialize;
use tracing::{info, warn};

use super::transport::{OutboundBatch, PeerTransport};
use crate::error::EngineError;
use crate::publishing::abort;
use crate::signing::ContentVerifier;
use crate::state::RunGuard;

pub const JOB_NAME: &str = "send";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub sent: usize,
    /// Archives that did not unpack or whose signature did not verify.
    pub invalid: usize,
    /// Artifacts already `Sent` or `Invalid`.
    pub skipped: usize,
}

/// Upload tag of an artifact: creation date plus content id.
pub fn batch_tag(content: &ContentRecord) -> String {
    let date = content.created.date();
    format!(
        "{:04}{:02}{:02}-{}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        content.id
    )
}

pub struct SendJob<S: PublishingStore> {
    store: Arc<S>,
    transport: Arc<dyn PeerTransport>,
    verifier: Arc<dyn ContentVerifier>,
    guard: RunGuard,
}

impl<S: PublishingStore> SendJob<S> {
    pub fn new(
        store: Arc<S>,
        transport: Arc<dyn PeerTransport>,
        verifier: Arc<dyn ContentVerifier>,
    ) -> Self {
        SendJob {
            store,
            transport,
            verifier,
            guard: RunGuard::new(JOB_NAME),
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Upload every `New` or `Failed` batch in content order. A transport
    /// failure records `Failed` on that batch and ends the run.
    pub async fn execute(&self) -> Result<SendResult, EngineError> {
        let ticket = self.guard.enter()?;
        let mut result = SendResult::default();

        for content in self.store.list_content(ContentType::FederationBatch).await? {
            match self.store.get_process_state(content.id).await? {
                ProcessState::New | ProcessState::Failed => {}
                ProcessState::Sent | ProcessState::Invalid => {
                    result.skipped += 1;
                    continue;
                }
            }

            let Some(batch) = self.unpack(&content) else {
                self.set_state(content.id, ProcessState::Invalid).await?;
                result.invalid += 1;
                continue;
            };

            match self.transport.send_batch(&batch).await {
                Ok(()) => {
                    self.set_state(content.id, ProcessState::Sent).await?;
                    info!(job = JOB_NAME, tag = %batch.batch_tag, "batch sent");
                    result.sent += 1;
                }
                Err(e) => {
                    warn!(job = JOB_NAME, tag = %batch.batch_tag, error = %e, "upload failed");
                    self.set_state(content.id, ProcessState::Failed).await?;
                    return Err(e.into());
                }
            }
        }

        ticket.complete();
        info!(
            job = JOB_NAME,
            sent = result.sent,
            invalid = result.invalid,
            skipped = result.skipped,
            "send completed"
        );
        Ok(result)
    }

    fn unpack(&self, content: &ContentRecord) -> Option<OutboundBatch> {
        let entries = match read_archive(&content.content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(job = JOB_NAME, id = content.id, error = %e, "unreadable archive");
                return None;
            }
        };
        let (Some(payload), Some(signature)) = (entries.get(BATCH_BIN), entries.get(BATCH_SIG))
        else {
            warn!(job = JOB_NAME, id = content.id, "archive entries missing");
            return None;
        };
        if !self.verifier.verify(payload, signature) {
            warn!(job = JOB_NAME, id = content.id, "batch signature does not verify");
            return None;
        }
        Some(OutboundBatch {
            batch_tag: batch_tag(content),
            content: payload.to_vec(),
            signature: signature.to_vec(),
        })
    }

    async fn set_state(&self, content_id: i64, state: ProcessState) -> Result<(), EngineError> {
        let store = self.store.as_ref();
        let mut snapshot = store.begin_snapshot().await?;
        if let Err(e) = store.set_process_state(&mut snapshot, content_id, state).await {
            abort(store, snapshot).await;
            return Err(e.into());
        }
        store.commit_snapshot(snapshot).await?;
        Ok(())
    }
}
