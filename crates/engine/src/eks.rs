//! Exposure key set engine: publishes released local and imported keys to
//! client apps.

use std::sync::Arc;
use std::time::Instant;

use dkpublish_core::{
    Clock, Infectiousness, StandardTrlCalculation, TransmissionRiskCalculation,
};
use dkpublish_storage::{JobKind, PublishingStore};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::config::{EksConfig, HeaderConfig, PipelineConfig};
use crate::error::EngineError;
use crate::publishing::builder::{build_artifacts, EksArtifactBuilder};
use crate::publishing::content::write_job_output;
use crate::publishing::mark_used::mark_used;
use crate::publishing::snapshot::snapshot_for_eks;
use crate::publishing::stuffing::StuffingGenerator;
use crate::publishing::{abort, clear_staging, count_used, has_transmission_risk};
use crate::result::EngineRunResult;
use crate::signing::ContentSigner;
use crate::state::RunGuard;

pub const ENGINE_NAME: &str = "eks";

/// The two independent signing identities of a key set.
#[derive(Clone)]
pub struct EksSigners {
    pub national: Arc<dyn ContentSigner>,
    pub platform: Arc<dyn ContentSigner>,
}

pub struct EksEngine<S: PublishingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EksConfig,
    header: HeaderConfig,
    infectiousness: Infectiousness,
    stuffing: StuffingGenerator,
    signers: EksSigners,
    guard: RunGuard,
}

impl<S: PublishingStore> EksEngine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
        signers: EksSigners,
    ) -> Self {
        EksEngine {
            store,
            clock,
            config: config.eks.clone(),
            header: config.header.clone(),
            infectiousness: Infectiousness::from_config(&config.infectiousness),
            stuffing: StuffingGenerator::new(
                config.eks.tek_count_min,
                config.eks.lifetime_days,
                Arc::new(StandardTrlCalculation),
            ),
            signers,
            guard: RunGuard::new(ENGINE_NAME),
        }
    }

    /// Replace the risk calculator used for stuffing.
    pub fn with_calculation(mut self, calculation: Arc<dyn TransmissionRiskCalculation>) -> Self {
        self.stuffing = StuffingGenerator::new(
            self.config.tek_count_min,
            self.config.lifetime_days,
            calculation,
        );
        self
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Run Snapshot → Stuffing → Build/Sign → Mark-Used → Write-Artifacts once.
    ///
    /// Returns `EngineError::AlreadyRunning` without side effects if this
    /// instance is mid-run.
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
                    filtered = result.filtered_input_count,
                    stuffing = result.stuffing_count,
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

        clear_staging(store, JobKind::Eks).await?;

        let counts = snapshot_for_eks(store, &self.infectiousness, page_size).await?;
        result.input_count = counts.read;
        result.filtered_input_count = counts.staged;
        result.transmission_risk_none_count = counts.transmission_risk_none;
        info!(
            engine = ENGINE_NAME,
            read = counts.read,
            staged = counts.staged,
            rejected = counts.rejected,
            "snapshot complete"
        );

        // An empty run stays empty so repeated runs publish nothing new.
        if counts.read > 0 {
            let real = counts.staged - counts.transmission_risk_none;
            let stuffing = self.stuffing.generate(real, started);
            result.stuffing_count = stuffing.len();
            if !stuffing.is_empty() {
                let mut snapshot = store.begin_snapshot().await?;
                if let Err(e) = store
                    .insert_staged_keys(&mut snapshot, JobKind::Eks, stuffing)
                    .await
                {
                    abort(store, snapshot).await;
                    return Err(e.into());
                }
                store.commit_snapshot(snapshot).await?;
            }
        }

        let builder = EksArtifactBuilder {
            header: &self.header,
            national: self.signers.national.as_ref(),
            platform: self.signers.platform.as_ref(),
            capacity: self.config.tek_count_max,
            window_end: started,
        };
        result.artifacts =
            build_artifacts(store, JobKind::Eks, &builder, page_size, started).await?;
        result.output_count = count_used(store, JobKind::Eks, page_size).await?;

        result.mark_used_count = mark_used(store, JobKind::Eks, page_size, |k| {
            k.used || !has_transmission_risk(k)
        })
        .await?;

        write_job_output(store, JobKind::Eks).await?;

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
