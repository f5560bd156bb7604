mod config;
mod logging;
mod pipeline;
mod schedule;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use dkpublish_engine::signing::write_keypair;
use dkpublish_engine::verify::{verify_eks_archive, verify_federation_archive};
use dkpublish_engine::{Ed25519Verifier, PipelineConfig};
use serde::Serialize;

use pipeline::{Pipeline, RunKind};

/// Diagnosis key publication pipeline.
#[derive(Parser)]
#[command(name = "dkpublish", version, about = "Diagnosis key publication pipeline")]
struct Cli {
    /// Pipeline configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run engines and jobs once, in the order given
    Run {
        #[arg(required = true, value_enum)]
        kinds: Vec<RunKind>,
        /// JSON array of diagnosis keys to load into the source table first
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Encoded federation batch to queue for import (repeatable)
        #[arg(long = "batch")]
        batches: Vec<PathBuf>,
        /// Directory that receives every published artifact
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run every configured engine and job on the configured interval
    Schedule {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// JSON array of diagnosis keys to load before the first tick
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Generate an Ed25519 signing keypair
    Keygen {
        /// Output prefix: writes <prefix>.secret and <prefix>.pub
        #[arg(long)]
        out: String,
    },

    /// Verify the signatures of a published archive
    Verify {
        /// Path to the archive
        archive: PathBuf,
        /// National public key, for exposure key sets
        #[arg(long)]
        national_pub: Option<PathBuf>,
        /// Platform public key, for exposure key sets
        #[arg(long)]
        platform_pub: Option<PathBuf>,
        /// Federation public key; verifies a federation batch instead
        #[arg(long, conflicts_with_all = ["national_pub", "platform_pub"])]
        federation_pub: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Commands::Run {
            kinds,
            seed,
            batches,
            out,
        } => {
            let config = load_config(cli.config.as_deref());
            let runtime = runtime();
            let outcome = runtime.block_on(cmd_run(
                &config,
                &kinds,
                seed.as_deref(),
                &batches,
                out.as_deref(),
            ));
            if let Err(e) = outcome {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        Commands::Schedule { ticks, seed } => {
            let config = load_config(cli.config.as_deref());
            let runtime = runtime();
            if let Err(e) = runtime.block_on(cmd_schedule(&config, ticks, seed.as_deref())) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        Commands::Keygen { out } => cmd_keygen(&out),
        Commands::Verify {
            archive,
            national_pub,
            platform_pub,
            federation_pub,
        } => cmd_verify(
            &archive,
            national_pub.as_deref(),
            platform_pub.as_deref(),
            federation_pub.as_deref(),
        ),
    }
}

fn load_config(path: Option<&Path>) -> PipelineConfig {
    match config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("error: could not serialize output: {}", e);
            process::exit(1);
        }
    }
}

async fn cmd_run(
    config: &PipelineConfig,
    kinds: &[RunKind],
    seed: Option<&Path>,
    batches: &[PathBuf],
    out: Option<&Path>,
) -> Result<(), String> {
    let pipeline = Pipeline::new(config)?;
    if let Some(seed) = seed {
        pipeline.seed_keys(seed).await?;
    }
    for batch in batches {
        pipeline.queue_batch(batch).await?;
    }

    let mut results = serde_json::Map::new();
    for kind in kinds {
        let result = pipeline.run(*kind).await?;
        results.insert(kind.name().to_string(), result);
    }
    if let Some(dir) = out {
        let written = pipeline.write_content(dir).await?;
        results.insert("artifacts".to_string(), written.into());
    }
    print_json(&results);
    Ok(())
}

async fn cmd_schedule(
    config: &PipelineConfig,
    ticks: Option<u64>,
    seed: Option<&Path>,
) -> Result<(), String> {
    let pipeline = Pipeline::new(config)?;
    if let Some(seed) = seed {
        pipeline.seed_keys(seed).await?;
    }
    schedule::run(&pipeline, config.schedule.interval_secs, ticks).await;
    Ok(())
}

fn cmd_keygen(prefix: &str) {
    match write_keypair(prefix) {
        Ok((secret, public)) => println!(
            "Generated Ed25519 keypair: {}, {}",
            secret.display(),
            public.display()
        ),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn read_verifier(path: &Path) -> Ed25519Verifier {
    match Ed25519Verifier::from_file(path) {
        Ok(verifier) => verifier,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_verify(
    archive: &Path,
    national_pub: Option<&Path>,
    platform_pub: Option<&Path>,
    federation_pub: Option<&Path>,
) {
    let bytes = match std::fs::read(archive) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", archive.display(), e);
            process::exit(1);
        }
    };

    let valid = if let Some(federation_pub) = federation_pub {
        let verifier = read_verifier(federation_pub);
        match verify_federation_archive(&bytes, &verifier) {
            Ok(report) => {
                print_json(&report);
                report.signature_valid
            }
            Err(e) => {
                eprintln!("error: '{}': {}", archive.display(), e);
                process::exit(1);
            }
        }
    } else {
        let (Some(national_pub), Some(platform_pub)) = (national_pub, platform_pub) else {
            eprintln!("error: --national-pub and --platform-pub are required (or --federation-pub)");
            process::exit(1);
        };
        let national = read_verifier(national_pub);
        let platform = read_verifier(platform_pub);
        match verify_eks_archive(&bytes, &national, &platform) {
            Ok(report) => {
                print_json(&report);
                report.is_valid()
            }
            Err(e) => {
                eprintln!("error: '{}': {}", archive.display(), e);
                process::exit(1);
            }
        }
    };

    if !valid {
        eprintln!("error: signature verification failed");
        process::exit(1);
    }
}
