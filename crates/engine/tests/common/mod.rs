//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dkpublish_core::clock::rolling_start_number_days_ago;
use dkpublish_core::{
    Clock, DailyKey, DiagnosisKey, FixedClock, InfectiousPeriodType, LocalTekInfo, ReportType,
    StandardTrlCalculation, TransmissionRiskCalculation,
};
use dkpublish_engine::federation::{OutboundBatch, PeerTransport, RemoteBatch, TransportError};
use dkpublish_engine::{EksSigners, Ed25519Signer, PipelineConfig};
use dkpublish_interchange::encode_federation_batch;
use dkpublish_interchange::proto::{DiagnosisKeyBatch, FederationKey};
use dkpublish_storage::{InboundBatchRecord, MemoryStore, PublishingStore};
use time::macros::datetime;
use time::{Date, OffsetDateTime};

pub const NOW: OffsetDateTime = datetime!(2020-10-23 12:00:00 UTC);

pub fn today() -> Date {
    NOW.date()
}

pub fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(NOW))
}

pub fn config(tek_count_min: usize, tek_count_max: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.eks.tek_count_min = tek_count_min;
    config.eks.tek_count_max = tek_count_max;
    config.eks.page_size = 3;
    config.iks.page_size = 3;
    config
}

// ──────────────────────────────────────────────
// Signing identities
// ──────────────────────────────────────────────

pub struct Identities {
    pub national: Arc<Ed25519Signer>,
    pub platform: Arc<Ed25519Signer>,
    pub federation: Arc<Ed25519Signer>,
}

impl Identities {
    pub fn new() -> Self {
        Identities {
            national: Arc::new(Ed25519Signer::generate()),
            platform: Arc::new(Ed25519Signer::generate()),
            federation: Arc::new(Ed25519Signer::generate()),
        }
    }

    pub fn eks(&self) -> EksSigners {
        EksSigners {
            national: self.national.clone(),
            platform: self.platform.clone(),
        }
    }
}

// ──────────────────────────────────────────────
// Source keys
// ──────────────────────────────────────────────

/// A symptomatic local key with onset `days` before submission.
pub fn local_key(byte: u8, days: Option<i32>) -> DiagnosisKey {
    DiagnosisKey::local(
        DailyKey::new(vec![byte; 16], rolling_start_number_days_ago(NOW, 1), 144),
        LocalTekInfo {
            transmission_risk_level: days.map(|d| StandardTrlCalculation.calculate(d)),
            days_since_symptoms_onset: days,
            symptomatic: InfectiousPeriodType::Symptomatic,
            report_type: ReportType::ConfirmedTest,
        },
    )
}

pub fn onset_yesterday(count: usize) -> Vec<DiagnosisKey> {
    (0..count).map(|i| local_key(i as u8, Some(1))).collect()
}

pub async fn seed(store: &MemoryStore, keys: Vec<DiagnosisKey>) {
    let mut snap = store.begin_snapshot().await.unwrap();
    store.insert_diagnosis_keys(&mut snap, keys).await.unwrap();
    store.commit_snapshot(snap).await.unwrap();
}

// ──────────────────────────────────────────────
// Peer batches
// ──────────────────────────────────────────────

pub fn peer_key(byte: u8, origin: &str) -> FederationKey {
    FederationKey {
        key_data: vec![byte; 16],
        rolling_start_interval_number: rolling_start_number_days_ago(NOW, 2) as u32,
        rolling_period: 144,
        transmission_risk_level: 0,
        visited_countries: vec!["NL".to_string()],
        origin: origin.to_string(),
        report_type: ReportType::ConfirmedTest as i32,
        days_since_onset_of_symptoms: 1,
    }
}

pub fn batch_bytes(keys: Vec<FederationKey>) -> Vec<u8> {
    encode_federation_batch(&DiagnosisKeyBatch { keys })
}

pub async fn store_inbound(store: &MemoryStore, tag: &str, content: Vec<u8>) {
    let mut snap = store.begin_snapshot().await.unwrap();
    store
        .insert_inbound_batch(&mut snap, InboundBatchRecord::new(tag, today(), content, NOW))
        .await
        .unwrap();
    store.commit_snapshot(snap).await.unwrap();
}

/// In-process stand-in for a federation gateway.
#[derive(Default)]
pub struct FakePeer {
    batches: Mutex<BTreeMap<(Date, String), (Vec<u8>, Option<String>)>>,
    first: Mutex<HashMap<Date, String>>,
    pub requests: Mutex<Vec<(Date, Option<String>)>>,
    pub uploads: Mutex<Vec<OutboundBatch>>,
    pub reject_uploads: AtomicBool,
}

impl FakePeer {
    /// Serve `tag` on `date`. The first tag published for a day is what a
    /// request without a tag returns.
    pub fn publish(&self, date: Date, tag: &str, next: Option<&str>) {
        let content = batch_bytes(vec![peer_key(tag.len() as u8, "DE")]);
        self.batches
            .lock()
            .unwrap()
            .insert((date, tag.to_string()), (content, next.map(str::to_string)));
        self.first
            .lock()
            .unwrap()
            .entry(date)
            .or_insert_with(|| tag.to_string());
    }

    /// Point an existing batch at a new successor.
    pub fn link(&self, date: Date, tag: &str, next: &str) {
        if let Some(entry) = self.batches.lock().unwrap().get_mut(&(date, tag.to_string())) {
            entry.1 = Some(next.to_string());
        }
    }

    pub fn uploaded_tags(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.batch_tag.clone())
            .collect()
    }
}

#[async_trait]
impl PeerTransport for FakePeer {
    async fn get_batch(
        &self,
        date: Date,
        batch_tag: Option<&str>,
    ) -> Result<Option<RemoteBatch>, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((date, batch_tag.map(str::to_string)));
        let tag = match batch_tag {
            Some(tag) => tag.to_string(),
            None => match self.first.lock().unwrap().get(&date) {
                Some(tag) => tag.clone(),
                None => return Ok(None),
            },
        };
        Ok(self
            .batches
            .lock()
            .unwrap()
            .get(&(date, tag.clone()))
            .map(|(content, next)| RemoteBatch {
                batch_tag: tag,
                content: content.clone(),
                next_batch_tag: next.clone(),
            }))
    }

    async fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(TransportError::RequestFailed {
                url: "fake://upload".to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(batch.clone());
        Ok(())
    }
}
