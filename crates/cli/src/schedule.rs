//! Interval trigger: runs every available engine and job once per tick.

use std::time::Duration;

use tracing::{error, info};

use crate::pipeline::{Pipeline, RunKind};

/// Tick until Ctrl-C, or until `ticks` ticks have run. A failed run is
/// logged and the tick moves on; the next tick resumes from the store's flags.
pub async fn run(pipeline: &Pipeline, interval_secs: u64, ticks: Option<u64>) {
    let kinds: Vec<RunKind> = RunKind::ALL
        .into_iter()
        .filter(|k| pipeline.is_available(*k))
        .collect();
    let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
    info!(runs = ?names, interval_secs, "scheduler started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut completed = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return;
            }
        }

        for kind in &kinds {
            match pipeline.run(*kind).await {
                Ok(result) => info!(run = kind.name(), %result, "run finished"),
                Err(e) => error!(run = kind.name(), error = %e, "run failed"),
            }
        }

        completed += 1;
        if ticks.is_some_and(|limit| completed >= limit) {
            info!(ticks = completed, "scheduler stopped");
            return;
        }
    }
}
