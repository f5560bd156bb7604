//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.
//!
//! # Example
//!
//! ```toml
//! countries_of_interest = ["BE", "DE"]
//!
//! [eks]
//! tek_count_min = 150
//! tek_count_max = 750000
//!
//! [federation]
//! base_url = "https://gateway.example.org"
//! days_to_look_back = 1
//!
//! [signing]
//! national_key = "keys/national.secret"
//! platform_key = "keys/platform.secret"
//! federation_key = "keys/federation.secret"
//! ```

use std::path::PathBuf;

use dkpublish_core::validate::MEMBER_REGION_CODES;
use dkpublish_core::InfectiousnessConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration shared by every engine and job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub eks: EksConfig,
    pub iks: IksConfig,
    pub header: HeaderConfig,
    pub validation: ValidationConfig,
    /// Attached to every locally registered key sent to the federation.
    pub countries_of_interest: Vec<String>,
    pub infectiousness: InfectiousnessConfig,
    pub federation: FederationConfig,
    pub schedule: ScheduleConfig,
    pub signing: SigningConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            eks: EksConfig::default(),
            iks: IksConfig::default(),
            header: HeaderConfig::default(),
            validation: ValidationConfig::default(),
            countries_of_interest: MEMBER_REGION_CODES.iter().map(|c| c.to_string()).collect(),
            infectiousness: InfectiousnessConfig::default(),
            federation: FederationConfig::default(),
            schedule: ScheduleConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// `[eks]`: locally published key sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EksConfig {
    /// Floor on the number of keys published by a non-empty run.
    pub tek_count_min: usize,
    /// Capacity of one artifact.
    pub tek_count_max: usize,
    pub page_size: usize,
    /// How long a published key set stays available.
    pub lifetime_days: i64,
}

impl Default for EksConfig {
    fn default() -> Self {
        EksConfig {
            tek_count_min: 150,
            tek_count_max: 750_000,
            page_size: 10_000,
            lifetime_days: 14,
        }
    }
}

/// `[iks]`: batches sent to the federation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IksConfig {
    pub item_count_max: usize,
    pub page_size: usize,
}

impl Default for IksConfig {
    fn default() -> Self {
        IksConfig {
            item_count_max: 750,
            page_size: 10_000,
        }
    }
}

/// `[header]`: values written into every export header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub region: String,
    pub app_bundle_id: String,
    pub verification_key_id: String,
    pub verification_key_version: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        HeaderConfig {
            region: "NL".to_string(),
            app_bundle_id: "org.example.exposurenotification".to_string(),
            verification_key_id: "204".to_string(),
            verification_key_version: "v1".to_string(),
        }
    }
}

/// `[validation]`: bounds applied to imported keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Oldest accepted rolling start number.
    pub rolling_start_number_min: i32,
    pub rolling_period_max: i32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            // 2020-07-01T00:00:00Z
            rolling_start_number_min: 2_655_936,
            rolling_period_max: dkpublish_core::model::ROLLING_PERIOD_MAX,
        }
    }
}

/// `[federation]`: the peer gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    /// Name under which polling cursors are stored.
    pub source: String,
    /// Days before today that polling revisits.
    pub days_to_look_back: i64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        FederationConfig {
            base_url: None,
            auth_token: None,
            source: "gateway".to_string(),
            days_to_look_back: 1,
        }
    }
}

/// `[schedule]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig { interval_secs: 300 }
    }
}

/// `[signing]`: paths to base64 Ed25519 secret key files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub national_key: Option<PathBuf>,
    pub platform_key: Option<PathBuf>,
    pub federation_key: Option<PathBuf>,
}
