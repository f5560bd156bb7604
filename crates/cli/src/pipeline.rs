//! Wires the store, engines and jobs from configuration.

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use dkpublish_core::{Clock, DiagnosisKey, StandardClock};
use dkpublish_engine::federation::{HttpTransport, ImportJob, PeerTransport, PollingJob, SendJob};
use dkpublish_engine::{ContentSigner, EksEngine, EksSigners, Ed25519Signer, IksEngine, PipelineConfig};
use dkpublish_storage::{ContentType, InboundBatchRecord, MemoryStore, PublishingStore};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// One engine or job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunKind {
    Poll,
    Import,
    Eks,
    Iks,
    Send,
}

impl RunKind {
    /// Order of a scheduled tick: fetch, import, publish, then upload.
    pub const ALL: [RunKind; 5] = [
        RunKind::Poll,
        RunKind::Import,
        RunKind::Eks,
        RunKind::Iks,
        RunKind::Send,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RunKind::Poll => "poll",
            RunKind::Import => "import",
            RunKind::Eks => "eks",
            RunKind::Iks => "iks",
            RunKind::Send => "send",
        }
    }
}

/// Every engine and job the configuration allows, sharing one store.
///
/// Runs that need a signing key or the gateway are absent when that part of
/// the configuration is missing.
pub struct Pipeline {
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    import: ImportJob<MemoryStore>,
    eks: Option<EksEngine<MemoryStore>>,
    iks: Option<IksEngine<MemoryStore>>,
    poll: Option<PollingJob<MemoryStore>>,
    send: Option<SendJob<MemoryStore>>,
}

fn signer(path: Option<&Path>) -> Result<Option<Arc<Ed25519Signer>>, String> {
    path.map(|p| {
        Ed25519Signer::from_file(p)
            .map(Arc::new)
            .map_err(|e| e.to_string())
    })
    .transpose()
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("could not serialize result: {}", e))
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, String> {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(StandardClock);

        let national = signer(config.signing.national_key.as_deref())?;
        let platform = signer(config.signing.platform_key.as_deref())?;
        let federation = signer(config.signing.federation_key.as_deref())?;
        let transport = match config.federation.base_url {
            Some(_) => {
                let http = HttpTransport::new(&config.federation).map_err(|e| e.to_string())?;
                let transport: Arc<dyn PeerTransport> = Arc::new(http);
                Some(transport)
            }
            None => None,
        };

        let eks = match (national, platform) {
            (Some(national), Some(platform)) => Some(EksEngine::new(
                store.clone(),
                clock.clone(),
                config,
                EksSigners { national, platform },
            )),
            _ => None,
        };
        let iks = federation.as_ref().map(|signer| {
            let signer: Arc<dyn ContentSigner> = signer.clone();
            IksEngine::new(store.clone(), clock.clone(), config, signer)
        });
        let poll = transport
            .as_ref()
            .map(|t| PollingJob::new(store.clone(), clock.clone(), t.clone(), config));
        let send = match (&transport, &federation) {
            (Some(transport), Some(signer)) => Some(SendJob::new(
                store.clone(),
                transport.clone(),
                Arc::new(signer.verifier()),
            )),
            _ => None,
        };

        Ok(Pipeline {
            import: ImportJob::new(store.clone(), clock.clone(), config),
            store,
            clock,
            eks,
            iks,
            poll,
            send,
        })
    }

    pub fn is_available(&self, kind: RunKind) -> bool {
        match kind {
            RunKind::Import => true,
            RunKind::Eks => self.eks.is_some(),
            RunKind::Iks => self.iks.is_some(),
            RunKind::Poll => self.poll.is_some(),
            RunKind::Send => self.send.is_some(),
        }
    }

    /// Load source keys from a JSON array of diagnosis keys.
    pub async fn seed_keys(&self, path: &Path) -> Result<usize, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
        let keys: Vec<DiagnosisKey> = serde_json::from_str(&content)
            .map_err(|e| format!("could not parse '{}': {}", path.display(), e))?;
        let count = keys.len();

        let store = self.store.as_ref();
        let mut snapshot = store.begin_snapshot().await.map_err(|e| e.to_string())?;
        store
            .insert_diagnosis_keys(&mut snapshot, keys)
            .await
            .map_err(|e| e.to_string())?;
        store
            .commit_snapshot(snapshot)
            .await
            .map_err(|e| e.to_string())?;
        info!(count, path = %path.display(), "source keys loaded");
        Ok(count)
    }

    /// Queue an encoded federation batch for import, tagged with the file stem.
    pub async fn queue_batch(&self, path: &Path) -> Result<String, String> {
        let content = std::fs::read(path)
            .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
        let tag = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| format!("'{}' has no file name", path.display()))?;
        let now = self.clock.now();

        let store = self.store.as_ref();
        let record = InboundBatchRecord::new(&tag, now.date(), content, now);
        let mut snapshot = store.begin_snapshot().await.map_err(|e| e.to_string())?;
        store
            .insert_inbound_batch(&mut snapshot, record)
            .await
            .map_err(|e| e.to_string())?;
        store
            .commit_snapshot(snapshot)
            .await
            .map_err(|e| e.to_string())?;
        Ok(tag)
    }

    /// Run one engine or job and return its result as JSON.
    pub async fn run(&self, kind: RunKind) -> Result<Value, String> {
        let unavailable = |needs: &str| format!("'{}' needs {}", kind.name(), needs);
        let failed = |e: dkpublish_engine::EngineError| format!("{} failed: {}", kind.name(), e);
        match kind {
            RunKind::Import => to_json(&self.import.execute().await.map_err(failed)?),
            RunKind::Eks => {
                let engine = self.eks.as_ref().ok_or_else(|| {
                    unavailable("signing.national_key and signing.platform_key")
                })?;
                to_json(&engine.execute().await.map_err(failed)?)
            }
            RunKind::Iks => {
                let engine = self
                    .iks
                    .as_ref()
                    .ok_or_else(|| unavailable("signing.federation_key"))?;
                to_json(&engine.execute().await.map_err(failed)?)
            }
            RunKind::Poll => {
                let job = self
                    .poll
                    .as_ref()
                    .ok_or_else(|| unavailable("federation.base_url"))?;
                to_json(&job.execute().await.map_err(failed)?)
            }
            RunKind::Send => {
                let job = self.send.as_ref().ok_or_else(|| {
                    unavailable("federation.base_url and signing.federation_key")
                })?;
                to_json(&job.execute().await.map_err(failed)?)
            }
        }
    }

    /// Write every published artifact to `dir` as `<publishing id>.zip`.
    pub async fn write_content(&self, dir: &Path) -> Result<Vec<String>, String> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("could not create '{}': {}", dir.display(), e))?;
        let mut written = Vec::new();
        for content_type in [ContentType::ExposureKeySet, ContentType::FederationBatch] {
            let records = self
                .store
                .list_content(content_type)
                .await
                .map_err(|e| e.to_string())?;
            for record in records {
                let path = dir.join(format!("{}.zip", record.publishing_id));
                std::fs::write(&path, &record.content)
                    .map_err(|e| format!("could not write '{}': {}", path.display(), e))?;
                written.push(path.display().to_string());
            }
        }
        Ok(written)
    }
}
