//! Interop key set engine: packages unsent local keys into signed batches for
//! the federation gateway.

use std::sync::Arc;
use std::time::Instant;

use dkpublish_core::processor::local_outbound_chain;
use dkpublish_core::{Clock, ProcessorChain, StandardTrlCalculation, TransmissionRiskCalculation};
use dkpublish_storage::{JobKind, PublishingStore};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::config::{IksConfig, PipelineConfig};
use crate::error::EngineError;
use crate::publishing::builder::{build_artifacts, IksArtifactBuilder};
use crate::publishing::content::write_job_output;
use crate::publishing::mark_used::mark_used;
use crate::publishing::snapshot::snapshot_for_iks;
use crate::publishing::{clear_staging, count_used};
use crate::result::EngineRunResult;
use crate::signing::ContentSigner;
use crate::state::RunGuard;

pub const ENGINE_NAME: &str = "iks";

pub struct IksEngine<S: PublishingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: IksConfig,
    origin: String,
    countries_of_interest: Vec<String>,
    chain: ProcessorChain,
    signer: Arc<dyn ContentSigner>,
    guard: RunGuard,
}

impl<S: PublishingStore> IksEngine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
        signer: Arc<dyn ContentSigner>,
    ) -> Self {
        IksEngine {
            store,
            clock,
            config: config.iks.clone(),
            origin: config.header.region.clone(),
            countries_of_interest: config.countries_of_interest.clone(),
            chain: local_outbound_chain(
                config.countries_of_interest.clone(),
                Arc::new(StandardTrlCalculation),
            ),
            signer,
            guard: RunGuard::new(ENGINE_NAME),
        }
    }

    pub fn with_calculation(mut self, calculation: Arc<dyn TransmissionRiskCalculation>) -> Self {
        self.chain = local_outbound_chain(self.countries_of_interest.clone(), calculation);
        self
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Run Snapshot → Build/Sign → Mark-Used → Write-Artifacts once.
    /// Interop batches are never padded with stuffing.
    pub async fn execute(&self) -> Result<EngineRunResult, EngineError> {
        let ticket = self.guard.enter()?;
        let started = self.clock.now();
        info!(engine = ENGINE_NAME, %started, "run started");

        match self.run(started).await {
            Ok(result) => {
                ticket.complete();
                info!(
                    engine = ENGINE_NAME,
                    input = result.input_count,
                    output = result.output_count,
                    artifacts = result.artifacts.len(),
                    seconds = result.total_seconds,
                    "run completed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(engine = ENGINE_NAME, error = %e, "run faulted");
                Err(e)
            }
        }
    }

    async fn run(&self, started: OffsetDateTime) -> Result<EngineRunResult, EngineError> {
        let timer = Instant::now();
        let store = self.store.as_ref();
        let page_size = self.config.page_size;
        let mut result = EngineRunResult::new(started);

        clear_staging(store, JobKind::Iks).await?;

        let counts = snapshot_for_iks(store, &self.chain, page_size).await?;
        if counts.rejected > 0 {
            info!(
                engine = ENGINE_NAME,
                dropped = counts.rejected,
                "keys dropped by outbound processing"
            );
        }
        result.input_count = counts.staged;
        result.filtered_input_count = counts.staged;

        let builder = IksArtifactBuilder {
            signer: self.signer.as_ref(),
            origin: &self.origin,
            capacity: self.config.item_count_max,
        };
        result.artifacts =
            build_artifacts(store, JobKind::Iks, &builder, page_size, started).await?;
        result.output_count = count_used(store, JobKind::Iks, page_size).await?;
        result.mark_used_count = mark_used(store, JobKind::Iks, page_size, |k| k.used).await?;

        write_job_output(store, JobKind::Iks).await?;

        result.total_seconds = timer.elapsed().as_secs_f64();
        result.reconcile();
        if !result.is_reconciled() {
            error!(
                engine = ENGINE_NAME,
                reconcile_output = result.reconcile_output_count,
                reconcile_artifact_sum = result.reconcile_artifact_sum_count,
                "reconciliation mismatch"
            );
        }
        Ok(result)
    }
}
