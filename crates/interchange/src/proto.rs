//! Protobuf messages, declared directly with `prost` derives.
//!
//! Field numbers and scalar types match the published schemas so exports and
//! batches interoperate with client apps and peer backends. Enum fields are
//! carried as their `int32` wire value.

// ── Exposure key export (proto2) ─────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TemporaryExposureKeyExport {
    /// Window start, seconds since the Unix epoch.
    #[prost(fixed64, optional, tag = "1")]
    pub start_timestamp: Option<u64>,
    /// Window end, seconds since the Unix epoch.
    #[prost(fixed64, optional, tag = "2")]
    pub end_timestamp: Option<u64>,
    #[prost(string, optional, tag = "3")]
    pub region: Option<String>,
    /// 1-based position of this batch within the run.
    #[prost(int32, optional, tag = "4")]
    pub batch_num: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub batch_size: Option<i32>,
    #[prost(message, repeated, tag = "6")]
    pub signature_infos: Vec<SignatureInfo>,
    #[prost(message, repeated, tag = "7")]
    pub keys: Vec<TemporaryExposureKey>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignatureInfo {
    #[prost(string, optional, tag = "1")]
    pub app_bundle_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub verification_key_version: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub verification_key_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub signature_algorithm: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TemporaryExposureKey {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub key_data: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "2")]
    pub transmission_risk_level: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub rolling_start_interval_number: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub rolling_period: Option<i32>,
    /// `ReportType` enum value.
    #[prost(int32, optional, tag = "5")]
    pub report_type: Option<i32>,
    #[prost(sint32, optional, tag = "6")]
    pub days_since_onset_of_symptoms: Option<i32>,
}

// ── Signature container (proto2) ─────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TekSignatureList {
    #[prost(message, repeated, tag = "1")]
    pub signatures: Vec<TekSignature>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TekSignature {
    #[prost(message, optional, tag = "1")]
    pub signature_info: Option<SignatureInfo>,
    #[prost(int32, optional, tag = "2")]
    pub batch_num: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub batch_size: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub signature: Option<Vec<u8>>,
}

// ── Federation batch (proto3) ────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiagnosisKeyBatch {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<FederationKey>,
}

/// One key as exchanged between federation members.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FederationKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key_data: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub rolling_start_interval_number: u32,
    #[prost(uint32, tag = "3")]
    pub rolling_period: u32,
    #[prost(int32, tag = "4")]
    pub transmission_risk_level: i32,
    #[prost(string, repeated, tag = "5")]
    pub visited_countries: Vec<String>,
    #[prost(string, tag = "6")]
    pub origin: String,
    /// `ReportType` enum value.
    #[prost(int32, tag = "7")]
    pub report_type: i32,
    /// Encoded days since onset, see `dkpublish_core::dsos`.
    #[prost(sint32, tag = "8")]
    pub days_since_onset_of_symptoms: i32,
}
