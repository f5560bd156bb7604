pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStore};
pub use record::{
    ContentRecord, ContentType, InboundBatchRecord, InboundOutcome, JobKind, JobOutput,
    ProcessState, StagedKey,
};
pub use traits::PublishingStore;
