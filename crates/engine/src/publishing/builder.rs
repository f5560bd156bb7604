//! Partitions staged keys into fixed-capacity artifacts, signs and stores them.

use dkpublish_core::clock::unix_seconds;
use dkpublish_core::validate::{is_valid_key_data, is_valid_rolling_period};
use dkpublish_core::ReportType;
use dkpublish_interchange::archive::{
    write_archive, BATCH_BIN, BATCH_SIG, CONTENT_SIG, EXPORT_BIN, EXPORT_SIG,
};
use dkpublish_interchange::export::{encode_export, encode_federation_batch, encode_signature_list};
use dkpublish_interchange::proto::{
    DiagnosisKeyBatch, FederationKey, SignatureInfo, TekSignature, TekSignatureList,
    TemporaryExposureKey, TemporaryExposureKeyExport,
};
use dkpublish_storage::{ContentType, JobKind, JobOutput, PublishingStore, StagedKey};
use time::{Duration, OffsetDateTime};
use tracing::info;

use super::{abort, require_page_size};
use crate::config::HeaderConfig;
use crate::error::EngineError;
use crate::result::ArtifactSummary;
use crate::signing::ContentSigner;

/// Position of one artifact within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchNumbering {
    /// 1-based.
    pub batch_num: usize,
    pub batch_size: usize,
}

/// Turns a partition of staged keys into signed artifact bytes.
pub trait ArtifactBuilder: Send + Sync {
    fn content_type(&self) -> ContentType;

    /// Maximum keys per artifact.
    fn capacity(&self) -> usize;

    /// Whether a staged key goes into an artifact at all.
    fn includes(&self, key: &StagedKey) -> bool;

    fn build(&self, keys: &[StagedKey], numbering: BatchNumbering) -> Result<Vec<u8>, EngineError>;
}

/// Rejects empty or malformed input before any signing work.
pub fn check_keys(keys: &[StagedKey]) -> Result<(), EngineError> {
    if keys.is_empty() {
        return Err(EngineError::Precondition(
            "artifact needs at least one key".to_string(),
        ));
    }
    for key in keys {
        if !is_valid_key_data(&key.daily_key.key_data) {
            return Err(EngineError::Precondition(format!(
                "staged key {} has {} key bytes",
                key.id,
                key.daily_key.key_data.len()
            )));
        }
        if !is_valid_rolling_period(
            i64::from(key.daily_key.rolling_period),
            dkpublish_core::model::ROLLING_PERIOD_MAX,
        ) {
            return Err(EngineError::Precondition(format!(
                "staged key {} has rolling period {}",
                key.id, key.daily_key.rolling_period
            )));
        }
    }
    Ok(())
}

fn to_i32(value: usize, what: &str) -> Result<i32, EngineError> {
    i32::try_from(value).map_err(|_| EngineError::Precondition(format!("{what} out of range: {value}")))
}

// ── Exposure key sets ────────────────────────────────────────────────────────

/// Builds the three-entry export archive published to client apps.
pub struct EksArtifactBuilder<'a> {
    pub header: &'a HeaderConfig,
    pub national: &'a dyn ContentSigner,
    pub platform: &'a dyn ContentSigner,
    pub capacity: usize,
    /// Publication window end; the start is one day earlier.
    pub window_end: OffsetDateTime,
}

impl EksArtifactBuilder<'_> {
    fn signature_info(&self) -> SignatureInfo {
        SignatureInfo {
            app_bundle_id: Some(self.header.app_bundle_id.clone()),
            verification_key_version: Some(self.header.verification_key_version.clone()),
            verification_key_id: Some(self.header.verification_key_id.clone()),
            signature_algorithm: Some(self.platform.signature_algorithm().to_string()),
        }
    }

    /// Header plus serialized keys, before any signature. Identical input
    /// gives identical bytes.
    pub fn export_payload(
        &self,
        keys: &[StagedKey],
        numbering: BatchNumbering,
    ) -> Result<Vec<u8>, EngineError> {
        check_keys(keys)?;
        let export = TemporaryExposureKeyExport {
            start_timestamp: Some(unix_seconds(self.window_end - Duration::days(1))),
            end_timestamp: Some(unix_seconds(self.window_end)),
            region: Some(self.header.region.clone()),
            batch_num: Some(to_i32(numbering.batch_num, "batch number")?),
            batch_size: Some(to_i32(numbering.batch_size, "batch size")?),
            signature_infos: vec![self.signature_info()],
            keys: keys.iter().map(export_key).collect(),
        };
        Ok(encode_export(&export))
    }
}

fn export_key(key: &StagedKey) -> TemporaryExposureKey {
    TemporaryExposureKey {
        key_data: Some(key.daily_key.key_data.clone()),
        transmission_risk_level: key.local.transmission_risk_level.map(|l| l.as_i32()),
        rolling_start_interval_number: Some(key.daily_key.rolling_start_number),
        rolling_period: Some(key.daily_key.rolling_period),
        report_type: Some(ReportType::ConfirmedTest as i32),
        days_since_onset_of_symptoms: key.local.days_since_symptoms_onset,
    }
}

impl ArtifactBuilder for EksArtifactBuilder<'_> {
    fn content_type(&self) -> ContentType {
        ContentType::ExposureKeySet
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn includes(&self, key: &StagedKey) -> bool {
        super::has_transmission_risk(key)
    }

    fn build(&self, keys: &[StagedKey], numbering: BatchNumbering) -> Result<Vec<u8>, EngineError> {
        let payload = self.export_payload(keys, numbering)?;
        let national = self.national.sign(&payload)?;
        let platform = self.platform.sign(&payload)?;
        let signatures = encode_signature_list(&TekSignatureList {
            signatures: vec![TekSignature {
                signature_info: Some(self.signature_info()),
                batch_num: Some(to_i32(numbering.batch_num, "batch number")?),
                batch_size: Some(to_i32(numbering.batch_size, "batch size")?),
                signature: Some(platform),
            }],
        });
        Ok(write_archive(&[
            (EXPORT_BIN, payload.as_slice()),
            (EXPORT_SIG, signatures.as_slice()),
            (CONTENT_SIG, national.as_slice()),
        ])?)
    }
}

// ── Federation batches ───────────────────────────────────────────────────────

/// Builds `batch.bin` + `batch.sig` archives for upload to the federation.
pub struct IksArtifactBuilder<'a> {
    pub signer: &'a dyn ContentSigner,
    pub origin: &'a str,
    pub capacity: usize,
}

fn federation_key(key: &StagedKey, origin: &str) -> Result<FederationKey, EngineError> {
    let unsigned = |value: i32, what: &str| {
        u32::try_from(value)
            .map_err(|_| EngineError::Precondition(format!("negative {what}: {value}")))
    };
    Ok(FederationKey {
        key_data: key.daily_key.key_data.clone(),
        rolling_start_interval_number: unsigned(
            key.daily_key.rolling_start_number,
            "rolling start number",
        )?,
        rolling_period: unsigned(key.daily_key.rolling_period, "rolling period")?,
        transmission_risk_level: key
            .local
            .transmission_risk_level
            .map(|l| l.as_i32())
            .unwrap_or_default(),
        visited_countries: key.federation.countries_of_interest.clone(),
        origin: origin.to_string(),
        report_type: key.federation.report_type as i32,
        days_since_onset_of_symptoms: key.federation.days_since_symptoms_onset,
    })
}

impl ArtifactBuilder for IksArtifactBuilder<'_> {
    fn content_type(&self) -> ContentType {
        ContentType::FederationBatch
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn includes(&self, _key: &StagedKey) -> bool {
        true
    }

    fn build(&self, keys: &[StagedKey], _numbering: BatchNumbering) -> Result<Vec<u8>, EngineError> {
        check_keys(keys)?;
        let batch = DiagnosisKeyBatch {
            keys: keys
                .iter()
                .map(|k| federation_key(k, self.origin))
                .collect::<Result<_, _>>()?,
        };
        let content = encode_federation_batch(&batch);
        let signature = self.signer.sign(&content)?;
        Ok(write_archive(&[
            (BATCH_BIN, content.as_slice()),
            (BATCH_SIG, signature.as_slice()),
        ])?)
    }
}

// ── Run-level partitioning ───────────────────────────────────────────────────

/// Build every artifact for the staged keys of `job`.
///
/// Eligible keys are ordered by key bytes before partitioning, so filler keys
/// staged after the real ones are spread through the artifacts and the order
/// is the same on every re-run. Each artifact is committed together with the
/// `used` flags of its keys, so an artifact exists exactly when its keys are
/// marked.
pub async fn build_artifacts<S: PublishingStore>(
    store: &S,
    job: JobKind,
    builder: &dyn ArtifactBuilder,
    page_size: usize,
    now: OffsetDateTime,
) -> Result<Vec<ArtifactSummary>, EngineError> {
    require_page_size(page_size)?;
    let capacity = builder.capacity();
    if capacity == 0 {
        return Err(EngineError::Precondition(
            "artifact capacity must be positive".to_string(),
        ));
    }

    let mut eligible: Vec<StagedKey> = Vec::new();
    let mut skip = 0;
    loop {
        let page = store.read_staged_keys(job, skip, page_size).await?;
        if page.is_empty() {
            break;
        }
        skip += page.len();
        eligible.extend(page.into_iter().filter(|k| builder.includes(k)));
    }
    if eligible.is_empty() {
        return Ok(Vec::new());
    }
    eligible.sort_by(|a, b| {
        a.daily_key
            .key_data
            .cmp(&b.daily_key.key_data)
            .then(a.id.cmp(&b.id))
    });
    let batch_size = eligible.len().div_ceil(capacity);

    let mut artifacts = Vec::with_capacity(batch_size);
    for chunk in eligible.chunks(capacity) {
        let numbering = BatchNumbering {
            batch_num: artifacts.len() + 1,
            batch_size,
        };
        artifacts.push(emit(store, job, builder, chunk, numbering, now).await?);
    }
    Ok(artifacts)
}

async fn emit<S: PublishingStore>(
    store: &S,
    job: JobKind,
    builder: &dyn ArtifactBuilder,
    keys: &[StagedKey],
    numbering: BatchNumbering,
    now: OffsetDateTime,
) -> Result<ArtifactSummary, EngineError> {
    let content = builder.build(keys, numbering)?;
    let ids: Vec<i64> = keys.iter().map(|k| k.id).collect();
    let output = JobOutput {
        id: 0,
        content_type: builder.content_type(),
        created: now,
        release: now,
        key_count: keys.len(),
        content,
    };

    let mut snapshot = store.begin_snapshot().await?;
    let staged = async {
        store.insert_job_output(&mut snapshot, job, output).await?;
        store.mark_staged_used(&mut snapshot, job, &ids).await
    }
    .await;
    if let Err(e) = staged {
        abort(store, snapshot).await;
        return Err(e.into());
    }
    store.commit_snapshot(snapshot).await?;

    info!(
        job = ?job,
        batch_num = numbering.batch_num,
        batch_size = numbering.batch_size,
        key_count = keys.len(),
        "artifact built"
    );
    Ok(ArtifactSummary {
        batch_num: numbering.batch_num,
        key_count: keys.len(),
    })
}
