//! dkpublish-interchange: byte-level formats shared with client apps and
//! federation peers.
//!
//! - [`proto`] -- protobuf messages for key exports, signature lists and
//!   federation batches
//! - [`export`] -- the headered export payload and its codecs
//! - [`archive`] -- the zip container that carries payload and signatures
//! - [`publishing_id`] -- content address of a published artifact

pub mod archive;
pub mod error;
pub mod export;
pub mod proto;

pub use archive::{read_archive, write_archive, ArchiveEntries};
pub use error::FormatError;
pub use export::{
    decode_export, decode_federation_batch, decode_signature_list, encode_export,
    encode_federation_batch, encode_signature_list, EXPORT_HEADER,
};

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of an artifact payload.
pub fn publishing_id(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
