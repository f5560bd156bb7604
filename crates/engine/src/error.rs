use dkpublish_interchange::FormatError;
use dkpublish_storage::StorageError;

use crate::federation::TransportError;
use crate::signing::SignError;

/// Errors that end an engine or job run.
///
/// Everything except [`EngineError::AlreadyRunning`] leaves the run
/// `Faulted`; work committed before the failure stays committed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The same instance was invoked while a run is in flight.
    #[error("{engine} is already running")]
    AlreadyRunning { engine: &'static str },

    /// Invalid input handed to a stage, detected before any side effect.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
