/// All errors that can be returned by a PublishingStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An inbound batch with this tag is already stored.
    #[error("inbound batch already stored: {tag}")]
    DuplicateBatchTag { tag: String },

    /// No inbound batch with the given tag.
    #[error("inbound batch not found: {tag}")]
    BatchNotFound { tag: String },

    /// No published artifact with the given id.
    #[error("content not found: {id}")]
    ContentNotFound { id: i64 },

    /// A backend-specific storage error (connection, serialization, lock poisoning).
    #[error("storage backend error: {0}")]
    Backend(String),
}
