//! Imports downloaded peer batches into the source table.

use std::sync::Arc;

use dkpublish_core::processor::federation_inbound_chain;
use dkpublish_core::{
    clock, validate, Clock, DailyKey, DiagnosisKey, DkProcessingItem, FederationTekInfo,
    ProcessorChain, ReportType, StandardTrlCalculation, TransmissionRiskCalculation,
};
use dkpublish_interchange::proto::FederationKey;
use dkpublish_interchange::{decode_federation_batch, FormatError};
use dkpublish_storage::{InboundBatchRecord, InboundOutcome, PublishingStore};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, ValidationConfig};
use crate::error::EngineError;
use crate::publishing::abort;
use crate::state::RunGuard;

pub const JOB_NAME: &str = "import";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    /// Pending batches processed.
    pub batches: usize,
    pub accepted: usize,
    /// Batches flagged `error`: unparseable or holding no keys.
    pub errored: usize,
    pub keys_inserted: usize,
}

/// Row-level validation of one peer key. Rejected keys are dropped silently.
pub fn accept_key(
    key: &FederationKey,
    validation: &ValidationConfig,
    today: i32,
) -> Option<DiagnosisKey> {
    let valid = validate::is_valid_region_code(&key.origin)
        && validate::is_valid_rolling_start(
            i64::from(key.rolling_start_interval_number),
            validation.rolling_start_number_min,
            today,
        )
        && validate::is_valid_rolling_period(
            i64::from(key.rolling_period),
            validation.rolling_period_max,
        )
        && validate::is_valid_key_data(&key.key_data);
    if !valid {
        return None;
    }
    // Both fit in i32 once the range checks above have passed.
    let daily_key = DailyKey::new(
        key.key_data.clone(),
        i32::try_from(key.rolling_start_interval_number).ok()?,
        i32::try_from(key.rolling_period).ok()?,
    );
    Some(DiagnosisKey::federation(
        daily_key,
        FederationTekInfo {
            countries_of_interest: key.visited_countries.clone(),
            country_of_origin: key.origin.clone(),
            report_type: ReportType::from_i32(key.report_type),
            days_since_symptoms_onset: key.days_since_onset_of_symptoms,
        },
    ))
}

pub struct ImportJob<S: PublishingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    validation: ValidationConfig,
    chain: ProcessorChain,
    guard: RunGuard,
}

impl<S: PublishingStore> ImportJob<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: &PipelineConfig) -> Self {
        ImportJob {
            store,
            clock,
            validation: config.validation.clone(),
            chain: federation_inbound_chain(Arc::new(StandardTrlCalculation)),
            guard: RunGuard::new(JOB_NAME),
        }
    }

    pub fn with_calculation(mut self, calculation: Arc<dyn TransmissionRiskCalculation>) -> Self {
        self.chain = federation_inbound_chain(calculation);
        self
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Parse, validate and process one encoded batch.
    ///
    /// Returns the keys to insert, or `Err` if the batch does not parse or
    /// holds no keys at all.
    pub fn process(&self, raw: &[u8], now: OffsetDateTime) -> Result<Vec<DiagnosisKey>, FormatError> {
        let batch = decode_federation_batch(raw)?;
        if batch.keys.is_empty() {
            return Err(FormatError::EmptyBatch);
        }
        let today = clock::rolling_start_number(now);
        let received = batch.keys.len();
        let items: Vec<DkProcessingItem> = batch
            .keys
            .iter()
            .filter_map(|k| accept_key(k, &self.validation, today))
            .map(DkProcessingItem::new)
            .collect();
        let valid = items.len();
        let keys: Vec<DiagnosisKey> = self
            .chain
            .execute_all(items)
            .into_iter()
            .map(|item| item.diagnosis_key)
            .collect();
        debug!(
            received,
            valid,
            processed = keys.len(),
            "batch keys filtered"
        );
        Ok(keys)
    }

    /// Import every pending inbound batch.
    pub async fn execute(&self) -> Result<ImportResult, EngineError> {
        let ticket = self.guard.enter()?;
        let now = self.clock.now();
        let mut result = ImportResult::default();

        for batch in self.store.list_pending_inbound_batches().await? {
            result.batches += 1;
            match self.import_batch(&batch, now).await? {
                Some(inserted) => {
                    result.accepted += 1;
                    result.keys_inserted += inserted;
                }
                None => result.errored += 1,
            }
        }

        ticket.complete();
        info!(
            job = JOB_NAME,
            batches = result.batches,
            accepted = result.accepted,
            errored = result.errored,
            keys = result.keys_inserted,
            "import completed"
        );
        Ok(result)
    }

    /// Import one batch. Returns the number of keys inserted, or `None` when
    /// the batch was flagged `error`.
    async fn import_batch(
        &self,
        batch: &InboundBatchRecord,
        now: OffsetDateTime,
    ) -> Result<Option<usize>, EngineError> {
        let store = self.store.as_ref();
        let processed = self.process(&batch.content, now);

        let mut snapshot = store.begin_snapshot().await?;
        let (written, inserted) = match processed {
            Ok(keys) => {
                let count = keys.len();
                let written = async {
                    store.insert_diagnosis_keys(&mut snapshot, keys).await?;
                    store
                        .set_inbound_outcome(&mut snapshot, &batch.tag, InboundOutcome::Accepted(now))
                        .await
                }
                .await;
                (written, Some(count))
            }
            Err(e) => {
                warn!(job = JOB_NAME, tag = %batch.tag, error = %e, "batch rejected");
                let written = store
                    .set_inbound_outcome(&mut snapshot, &batch.tag, InboundOutcome::Error)
                    .await;
                (written, None)
            }
        };
        if let Err(e) = written {
            abort(store, snapshot).await;
            return Err(e.into());
        }
        store.commit_snapshot(snapshot).await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkpublish_core::FixedClock;
    use time::macros::datetime;

    fn key(origin: &str) -> FederationKey {
        FederationKey {
            key_data: vec![7; 16],
            rolling_start_interval_number: 2_670_624,
            rolling_period: 144,
            transmission_risk_level: 0,
            visited_countries: vec!["NL".to_string()],
            origin: origin.to_string(),
            report_type: ReportType::ConfirmedTest as i32,
            days_since_onset_of_symptoms: 1,
        }
    }

    #[test]
    fn rejects_each_invalid_field() {
        let validation = ValidationConfig::default();
        let today = 2_670_624;
        assert!(accept_key(&key("DE"), &validation, today).is_some());
        assert!(accept_key(&key("de"), &validation, today).is_none());
        assert!(accept_key(&key("XX"), &validation, today).is_none());

        let mut future = key("DE");
        future.rolling_start_interval_number = today as u32 + 144;
        assert!(accept_key(&future, &validation, today).is_none());

        let mut ancient = key("DE");
        ancient.rolling_start_interval_number = 1;
        assert!(accept_key(&ancient, &validation, today).is_none());

        let mut long = key("DE");
        long.rolling_period = 145;
        assert!(accept_key(&long, &validation, today).is_none());

        let mut zero = key("DE");
        zero.rolling_period = 0;
        assert!(accept_key(&zero, &validation, today).is_none());

        let mut short = key("DE");
        short.key_data = vec![7; 15];
        assert!(accept_key(&short, &validation, today).is_none());
    }

    #[test]
    fn accepted_keys_are_never_sent_back() {
        let accepted = accept_key(&key("BE"), &ValidationConfig::default(), 2_670_624).unwrap();
        assert!(accepted.published_to_federation);
        assert_eq!(accepted.federation.country_of_origin, "BE");
    }

    #[test]
    fn unparseable_batch_is_an_error() {
        let job = ImportJob::new(
            Arc::new(dkpublish_storage::MemoryStore::new()),
            Arc::new(FixedClock(datetime!(2020-10-23 12:00:00 UTC))),
            &PipelineConfig::default(),
        );
        assert!(job
            .process(&[0xff, 0xff, 0xff], datetime!(2020-10-23 12:00:00 UTC))
            .is_err());
    }
}
