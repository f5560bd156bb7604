//! Ordered, short-circuiting transformation steps over candidate keys.
//!
//! A step takes an item and returns either a (possibly modified) item or
//! `None`, which drops the key. Steps never see an item that an earlier step
//! dropped. Steps hold only injected configuration, so the order of the
//! chain is the only thing that affects the result.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::dsos::{self, DsosDecodeResult};
use crate::model::{DiagnosisKey, ReportType, TekOrigin, TransmissionRiskLevel};
use crate::risk::TransmissionRiskCalculation;

/// Metadata key under which a decoded DSOS value travels between steps.
pub const DECODED_DSOS: &str = "decoded_dsos";

/// A value carried alongside a key while it moves through a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Int(i32),
    Text(String),
    Countries(Vec<String>),
    Dsos(DsosDecodeResult),
}

/// A candidate key plus open per-item metadata. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DkProcessingItem {
    pub diagnosis_key: DiagnosisKey,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DkProcessingItem {
    pub fn new(diagnosis_key: DiagnosisKey) -> Self {
        DkProcessingItem {
            diagnosis_key,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: MetadataValue) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// One step of a chain.
pub type DkProcessor = Arc<dyn Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync>;

/// An ordered list of named steps.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    steps: Vec<(&'static str, DkProcessor)>,
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(name, _)| name))
            .finish()
    }
}

impl ProcessorChain {
    pub fn new() -> Self {
        ProcessorChain { steps: Vec::new() }
    }

    /// Append a step.
    pub fn then<F>(mut self, name: &'static str, step: F) -> Self
    where
        F: Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static,
    {
        self.steps.push((name, Arc::new(step)));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(name, _)| *name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run one item through every step, stopping at the first drop.
    pub fn execute(&self, item: DkProcessingItem) -> Option<DkProcessingItem> {
        self.steps
            .iter()
            .try_fold(item, |current, (_, step)| step(current))
    }

    /// Run every item; dropped items are omitted, order is preserved.
    pub fn execute_all(&self, items: Vec<DkProcessingItem>) -> Vec<DkProcessingItem> {
        items
            .into_iter()
            .filter_map(|item| self.execute(item))
            .collect()
    }
}

// ── Local-outbound steps ────────────────────────────────────────────────────

/// Tags local keys with a fixed countries-of-interest list. Non-local keys are dropped.
pub fn fixed_countries_of_interest(
    countries: Vec<String>,
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    move |mut item| {
        if item.diagnosis_key.origin != TekOrigin::Local {
            return None;
        }
        item.diagnosis_key.federation.countries_of_interest = countries.clone();
        Some(item)
    }
}

/// Encodes the local symptom status and onset into the federation DSOS field
/// and records the decoded form for later steps.
pub fn encode_local_dsos(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |mut item| {
        let local = &item.diagnosis_key.local;
        let days = local.days_since_symptoms_onset?;
        let encoded = dsos::encode_local(local.symptomatic, days);
        let decoded = dsos::decode(encoded)?;
        item.diagnosis_key.federation.days_since_symptoms_onset = encoded;
        Some(item.with(DECODED_DSOS, MetadataValue::Dsos(decoded)))
    }
}

/// Local keys always leave as confirmed-test reports.
pub fn report_type_confirmed_test(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |mut item| {
        item.diagnosis_key.federation.report_type = ReportType::ConfirmedTest;
        Some(item)
    }
}

/// Sets the local risk level from the decoded DSOS metadata.
///
/// An item without decoded metadata means an upstream step is missing; it is
/// dropped rather than published with a guessed level.
pub fn trl_from_decoded_dsos(
    calculation: Arc<dyn TransmissionRiskCalculation>,
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    move |mut item| {
        let decoded = match item.metadata.get(DECODED_DSOS) {
            Some(MetadataValue::Dsos(decoded)) => *decoded,
            _ => return None,
        };
        item.diagnosis_key.local.transmission_risk_level =
            Some(trl_for(calculation.as_ref(), &decoded));
        Some(item)
    }
}

/// Highest level that can be inferred from a decoded DSOS value.
pub fn trl_for(
    calculation: &dyn TransmissionRiskCalculation,
    decoded: &DsosDecodeResult,
) -> TransmissionRiskLevel {
    match *decoded {
        DsosDecodeResult::SymptomaticExact { days_since_onset } => {
            calculation.calculate(days_since_onset)
        }
        DsosDecodeResult::SymptomaticRange { lo, hi } => calculation.calculate_range(lo, hi),
        other => calculation.calculate(other.representative_day()),
    }
}

// ── Federation-inbound steps ────────────────────────────────────────────────

/// Drops keys whose derived risk level is `None`.
pub fn exclude_trl_none(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |item| match item.diagnosis_key.local.transmission_risk_level {
        Some(level) if level != TransmissionRiskLevel::None => Some(item),
        _ => None,
    }
}

/// Drops keys whose report has been revoked by the origin country.
pub fn remove_revoked(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |item| {
        if item.diagnosis_key.federation.report_type == ReportType::Revoked {
            None
        } else {
            Some(item)
        }
    }
}

/// Decodes the federation DSOS field into metadata. Undecodable values drop the key.
pub fn decode_federation_dsos(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |item| {
        let decoded = dsos::decode(item.diagnosis_key.federation.days_since_symptoms_onset)?;
        Some(item.with(DECODED_DSOS, MetadataValue::Dsos(decoded)))
    }
}

/// Fills the local symptom fields from decoded DSOS metadata.
pub fn local_dsos_from_decoded(
) -> impl Fn(DkProcessingItem) -> Option<DkProcessingItem> + Send + Sync + 'static {
    |mut item| {
        let decoded = match item.metadata.get(DECODED_DSOS) {
            Some(MetadataValue::Dsos(decoded)) => *decoded,
            _ => return None,
        };
        let local = &mut item.diagnosis_key.local;
        local.days_since_symptoms_onset = Some(decoded.representative_day());
        local.symptomatic = decoded.period_type();
        local.report_type = item.diagnosis_key.federation.report_type;
        Some(item)
    }
}

// ── Standard chains ─────────────────────────────────────────────────────────

/// Chain applied to local keys before they are sent to the federation.
pub fn local_outbound_chain(
    countries_of_interest: Vec<String>,
    calculation: Arc<dyn TransmissionRiskCalculation>,
) -> ProcessorChain {
    ProcessorChain::new()
        .then(
            "fixed_countries_of_interest",
            fixed_countries_of_interest(countries_of_interest),
        )
        .then("encode_local_dsos", encode_local_dsos())
        .then("trl_from_decoded_dsos", trl_from_decoded_dsos(calculation))
        .then("report_type_confirmed_test", report_type_confirmed_test())
}

/// Chain applied to keys imported from a peer backend.
pub fn federation_inbound_chain(
    calculation: Arc<dyn TransmissionRiskCalculation>,
) -> ProcessorChain {
    ProcessorChain::new()
        .then("remove_revoked", remove_revoked())
        .then("decode_federation_dsos", decode_federation_dsos())
        .then("trl_from_decoded_dsos", trl_from_decoded_dsos(calculation))
        .then("exclude_trl_none", exclude_trl_none())
        .then("local_dsos_from_decoded", local_dsos_from_decoded())
}
