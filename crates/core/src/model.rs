use serde::{Deserialize, Serialize};

/// Number of bytes in a daily temporary exposure key.
pub const DAILY_KEY_BYTE_COUNT: usize = 16;

/// Valid rolling period bounds, in 10-minute intervals.
pub const ROLLING_PERIOD_MIN: i32 = 1;
pub const ROLLING_PERIOD_MAX: i32 = 144;

/// A daily key as broadcast by a device, with the window it was active in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyKey {
    pub key_data: Vec<u8>,
    pub rolling_start_number: i32,
    pub rolling_period: i32,
}

impl DailyKey {
    pub fn new(key_data: Vec<u8>, rolling_start_number: i32, rolling_period: i32) -> Self {
        DailyKey {
            key_data,
            rolling_start_number,
            rolling_period,
        }
    }
}

/// Where a diagnosis key entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TekOrigin {
    Local,
    Federation,
}

/// Report type as exchanged with the federation gateway.
///
/// Local keys are always `ConfirmedTest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportType {
    #[default]
    Unknown = 0,
    ConfirmedTest = 1,
    ConfirmedClinicalDiagnosis = 2,
    SelfReport = 3,
    Recursive = 4,
    Revoked = 5,
}

impl ReportType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ReportType::ConfirmedTest,
            2 => ReportType::ConfirmedClinicalDiagnosis,
            3 => ReportType::SelfReport,
            4 => ReportType::Recursive,
            5 => ReportType::Revoked,
            _ => ReportType::Unknown,
        }
    }
}

/// Discrete transmission risk derived from days since symptom onset.
///
/// Ordered so that `max()` selects the most cautious level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TransmissionRiskLevel {
    #[default]
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl TransmissionRiskLevel {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => TransmissionRiskLevel::Low,
            2 => TransmissionRiskLevel::Medium,
            3 => TransmissionRiskLevel::High,
            _ => TransmissionRiskLevel::None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Symptom category used to pick the infectious-offset set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum InfectiousPeriodType {
    #[default]
    Symptomatic,
    Asymptomatic,
}

/// Risk metadata for keys registered through the local workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalTekInfo {
    pub transmission_risk_level: Option<TransmissionRiskLevel>,
    pub days_since_symptoms_onset: Option<i32>,
    pub symptomatic: InfectiousPeriodType,
    pub report_type: ReportType,
}

/// Metadata as exchanged with peer backends through the federation gateway.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FederationTekInfo {
    pub countries_of_interest: Vec<String>,
    pub country_of_origin: String,
    pub report_type: ReportType,
    /// Encoded days-since-onset, see [`crate::dsos`].
    pub days_since_symptoms_onset: i32,
}

/// A diagnosis key as held in the source table.
///
/// `id` is assigned by the store on insert; a key that has not been stored
/// yet carries `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisKey {
    pub id: Option<i64>,
    pub daily_key: DailyKey,
    pub origin: TekOrigin,
    pub published_locally: bool,
    pub published_to_federation: bool,
    pub ready_for_cleanup: Option<bool>,
    pub local: LocalTekInfo,
    pub federation: FederationTekInfo,
}

impl DiagnosisKey {
    /// A fresh, unpublished key registered through the local workflow.
    pub fn local(daily_key: DailyKey, local: LocalTekInfo) -> Self {
        DiagnosisKey {
            id: None,
            daily_key,
            origin: TekOrigin::Local,
            published_locally: false,
            published_to_federation: false,
            ready_for_cleanup: None,
            local,
            federation: FederationTekInfo::default(),
        }
    }

    /// A key imported from a peer backend. It is never sent back out.
    pub fn federation(daily_key: DailyKey, federation: FederationTekInfo) -> Self {
        DiagnosisKey {
            id: None,
            daily_key,
            origin: TekOrigin::Federation,
            published_locally: false,
            published_to_federation: true,
            ready_for_cleanup: None,
            local: LocalTekInfo::default(),
            federation,
        }
    }

    pub fn is_ready_for_cleanup(&self) -> bool {
        self.ready_for_cleanup.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trl_max_prefers_highest() {
        let levels = [
            TransmissionRiskLevel::Low,
            TransmissionRiskLevel::None,
            TransmissionRiskLevel::High,
            TransmissionRiskLevel::Medium,
        ];
        assert_eq!(levels.iter().max(), Some(&TransmissionRiskLevel::High));
    }

    #[test]
    fn federation_keys_are_marked_as_already_sent() {
        let key = DiagnosisKey::federation(
            DailyKey::new(vec![0; DAILY_KEY_BYTE_COUNT], 2_668_032, 144),
            FederationTekInfo::default(),
        );
        assert!(key.published_to_federation);
        assert!(!key.published_locally);
        assert_eq!(key.origin, TekOrigin::Federation);
    }

    #[test]
    fn report_type_unknown_values_fall_back() {
        assert_eq!(ReportType::from_i32(5), ReportType::Revoked);
        assert_eq!(ReportType::from_i32(42), ReportType::Unknown);
    }
}
