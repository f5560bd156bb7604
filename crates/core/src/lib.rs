//! dkpublish-core: diagnosis-key domain model and pure decision logic.
//!
//! Everything here is side-effect free. Storage, signing and transport live
//! in the other workspace crates.
//!
//! # Public API
//!
//! - [`DiagnosisKey`] and its metadata bags -- the source-table row
//! - [`validate`] -- stateless row validators used on import
//! - [`TransmissionRiskCalculation`] and [`Infectiousness`] -- risk and release decisions
//! - [`ProcessorChain`] -- ordered, short-circuiting key transformations
//! - [`Clock`] -- the single source of "now" for a run

pub mod clock;
pub mod dsos;
pub mod model;
pub mod processor;
pub mod risk;
pub mod validate;

// ── Convenience re-exports ───────────────────────────────────────────

pub use clock::{Clock, FixedClock, StandardClock};
pub use dsos::DsosDecodeResult;
pub use model::{
    DailyKey, DiagnosisKey, FederationTekInfo, InfectiousPeriodType, LocalTekInfo, ReportType,
    TekOrigin, TransmissionRiskLevel, DAILY_KEY_BYTE_COUNT,
};
pub use processor::{DkProcessingItem, MetadataValue, ProcessorChain};
pub use risk::{
    Infectiousness, InfectiousnessConfig, StandardTrlCalculation, TransmissionRiskCalculation,
};
