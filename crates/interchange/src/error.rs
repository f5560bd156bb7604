/// Errors raised while reading or writing interchange formats.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Payload does not start with the export header.
    #[error("export payload is missing the export header")]
    MissingHeader,

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),

    /// A required archive entry is absent.
    #[error("archive entry missing: {0}")]
    MissingEntry(String),

    /// An entry inflates past the read limit.
    #[error("archive entry '{name}' exceeds {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("federation batch holds no keys")]
    EmptyBatch,
}
