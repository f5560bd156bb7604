//! Zip container for signed artifacts.
//!
//! Entry timestamps are pinned to the zip epoch, so the archive bytes depend
//! only on entry names, order and contents.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::FormatError;

/// Export payload of a key set.
pub const EXPORT_BIN: &str = "export.bin";
/// Platform signature container of a key set.
pub const EXPORT_SIG: &str = "export.sig";
/// Raw national signature over the export payload.
pub const CONTENT_SIG: &str = "content.sig";
/// Serialized federation batch.
pub const BATCH_BIN: &str = "batch.bin";
/// Federation signature over the batch.
pub const BATCH_SIG: &str = "batch.sig";

/// Largest entry [`read_archive`] accepts, in uncompressed bytes.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Entries of a read archive, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveEntries {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ArchiveEntries {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get), but a missing entry is an error.
    pub fn require(&self, name: &str) -> Result<&[u8], FormatError> {
        self.get(name)
            .ok_or_else(|| FormatError::MissingEntry(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Write `entries` in the given order into a deflated zip archive.
pub fn write_archive(entries: &[(&str, &[u8])]) -> Result<Vec<u8>, FormatError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    Ok(zip.finish()?.into_inner())
}

pub fn read_archive(bytes: &[u8]) -> Result<ArchiveEntries, FormatError> {
    read_archive_limited(bytes, MAX_ENTRY_BYTES)
}

/// Read every entry, rejecting any that inflates past `limit` bytes.
///
/// Sizes declared in the archive headers are not trusted.
pub fn read_archive_limited(bytes: &[u8], limit: u64) -> Result<ArchiveEntries, FormatError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = BTreeMap::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        let mut content = Vec::new();
        (&mut file).take(limit + 1).read_to_end(&mut content)?;
        if content.len() as u64 > limit {
            return Err(FormatError::EntryTooLarge { name, limit });
        }
        entries.insert(name, content);
    }
    Ok(ArchiveEntries { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_bytes_are_reproducible() {
        let entries: [(&str, &[u8]); 3] = [
            (EXPORT_BIN, b"payload"),
            (EXPORT_SIG, b"platform"),
            (CONTENT_SIG, b"national"),
        ];
        assert_eq!(
            write_archive(&entries).unwrap(),
            write_archive(&entries).unwrap()
        );
    }

    #[test]
    fn read_returns_every_entry() {
        let entries: [(&str, &[u8]); 2] = [(BATCH_BIN, b"batch"), (BATCH_SIG, b"sig")];
        let bytes = write_archive(&entries).unwrap();
        let entries = read_archive(&bytes).unwrap();
        assert_eq!(entries.names().collect::<Vec<_>>(), vec![BATCH_BIN, BATCH_SIG]);
        assert_eq!(entries.require(BATCH_BIN).unwrap(), b"batch");
        assert!(matches!(
            entries.require(EXPORT_BIN),
            Err(FormatError::MissingEntry(name)) if name == EXPORT_BIN
        ));
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let entries: [(&str, &[u8]); 2] = [(BATCH_BIN, b"0123456789"), (BATCH_SIG, b"sig")];
        let bytes = write_archive(&entries).unwrap();

        assert!(matches!(
            read_archive_limited(&bytes, 4),
            Err(FormatError::EntryTooLarge { name, limit: 4 }) if name == BATCH_BIN
        ));
        let entries = read_archive_limited(&bytes, 10).unwrap();
        assert_eq!(entries.require(BATCH_BIN).unwrap(), b"0123456789");
    }

    #[test]
    fn garbage_is_not_an_archive() {
        assert!(matches!(
            read_archive(b"definitely not a zip"),
            Err(FormatError::Archive(_))
        ));
    }
}
