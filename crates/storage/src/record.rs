use dkpublish_core::{DailyKey, FederationTekInfo, LocalTekInfo};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which engine owns a staging area. Each kind has its own staging rows and
/// job output, so engines of different kinds never see each other's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobKind {
    /// Locally published exposure key sets.
    Eks,
    /// Batches sent to the federation gateway.
    Iks,
}

/// One diagnosis key staged for a run.
///
/// `source_id` is `None` for stuffing, which never exists in the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedKey {
    /// Assigned by the store on commit; ignored on insert.
    pub id: i64,
    pub source_id: Option<i64>,
    pub daily_key: DailyKey,
    pub local: LocalTekInfo,
    pub federation: FederationTekInfo,
    /// Set once the key is embedded in a committed job output.
    pub used: bool,
}

/// Content type tag of a published artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    ExposureKeySet,
    FederationBatch,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::ExposureKeySet => "ExposureKeySet",
            ContentType::FederationBatch => "FederationBatch",
        }
    }
}

/// A signed artifact produced by a run but not yet written to content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Assigned by the store on commit; ignored on insert.
    pub id: i64,
    pub content_type: ContentType,
    pub created: OffsetDateTime,
    pub release: OffsetDateTime,
    pub key_count: usize,
    pub content: Vec<u8>,
}

/// An immutable published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Assigned by the store on commit; ignored on insert.
    pub id: i64,
    pub content_type: ContentType,
    pub created: OffsetDateTime,
    pub release: OffsetDateTime,
    /// Lower-case hex SHA-256 of `content`.
    pub publishing_id: String,
    pub content: Vec<u8>,
}

/// Upload state of an outbound federation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessState {
    #[default]
    New,
    Sent,
    Failed,
    Invalid,
}

/// A batch downloaded from a federation peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundBatchRecord {
    /// Peer batch tag; unique across all stored batches.
    pub tag: String,
    pub date: time::Date,
    pub content: Vec<u8>,
    pub created: OffsetDateTime,
    /// Set once the batch has been imported.
    pub accepted: Option<OffsetDateTime>,
    /// Set when the batch could not be parsed or held no keys.
    pub error: bool,
}

impl InboundBatchRecord {
    pub fn new(tag: &str, date: time::Date, content: Vec<u8>, created: OffsetDateTime) -> Self {
        InboundBatchRecord {
            tag: tag.to_string(),
            date,
            content,
            created,
            accepted: None,
            error: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.accepted.is_none() && !self.error
    }
}

/// Result recorded against an inbound batch after an import attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Accepted(OffsetDateTime),
    Error,
}
