//! Re-reads published archives and checks their signatures.

use dkpublish_interchange::archive::{BATCH_BIN, BATCH_SIG, CONTENT_SIG, EXPORT_BIN, EXPORT_SIG};
use dkpublish_interchange::{decode_export, decode_federation_batch, decode_signature_list, read_archive};
use dkpublish_interchange::FormatError;
use serde::Serialize;

use crate::signing::ContentVerifier;

/// Outcome of checking one exposure key set archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveVerification {
    pub key_count: usize,
    pub batch_num: Option<i32>,
    pub batch_size: Option<i32>,
    pub national_signature_valid: bool,
    pub platform_signatures: usize,
    /// Every platform signature verifies over the payload.
    pub platform_signatures_valid: bool,
    /// Every platform signature carries the payload's batch numbering.
    pub numbering_matches: bool,
}

impl ArchiveVerification {
    pub fn is_valid(&self) -> bool {
        self.national_signature_valid
            && self.platform_signatures > 0
            && self.platform_signatures_valid
            && self.numbering_matches
    }
}

/// Verify the national signature and every platform signature of a key set.
///
/// Structural problems (not a zip, missing entry, undecodable payload) are
/// errors; signature mismatches are reported in the result.
pub fn verify_eks_archive(
    bytes: &[u8],
    national: &dyn ContentVerifier,
    platform: &dyn ContentVerifier,
) -> Result<ArchiveVerification, FormatError> {
    let entries = read_archive(bytes)?;
    let payload = entries.require(EXPORT_BIN)?;
    let export = decode_export(payload)?;
    let signatures = decode_signature_list(entries.require(EXPORT_SIG)?)?;

    let platform_signatures_valid = signatures.signatures.iter().all(|s| {
        s.signature
            .as_deref()
            .is_some_and(|sig| platform.verify(payload, sig))
    });
    let numbering_matches = signatures
        .signatures
        .iter()
        .all(|s| s.batch_num == export.batch_num && s.batch_size == export.batch_size);

    Ok(ArchiveVerification {
        key_count: export.keys.len(),
        batch_num: export.batch_num,
        batch_size: export.batch_size,
        national_signature_valid: national.verify(payload, entries.require(CONTENT_SIG)?),
        platform_signatures: signatures.signatures.len(),
        platform_signatures_valid,
        numbering_matches,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchVerification {
    pub key_count: usize,
    pub signature_valid: bool,
}

pub fn verify_federation_archive(
    bytes: &[u8],
    verifier: &dyn ContentVerifier,
) -> Result<BatchVerification, FormatError> {
    let entries = read_archive(bytes)?;
    let payload = entries.require(BATCH_BIN)?;
    let batch = decode_federation_batch(payload)?;
    Ok(BatchVerification {
        key_count: batch.keys.len(),
        signature_valid: verifier.verify(payload, entries.require(BATCH_SIG)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderConfig;
    use crate::publishing::builder::{ArtifactBuilder, BatchNumbering, EksArtifactBuilder};
    use crate::signing::Ed25519Signer;
    use dkpublish_core::{DailyKey, FederationTekInfo, LocalTekInfo, TransmissionRiskLevel};
    use dkpublish_interchange::write_archive;
    use dkpublish_storage::StagedKey;
    use time::macros::datetime;

    fn archive(national: &Ed25519Signer, platform: &Ed25519Signer) -> Vec<u8> {
        let header = HeaderConfig::default();
        let builder = EksArtifactBuilder {
            header: &header,
            national,
            platform,
            capacity: 10,
            window_end: datetime!(2020-10-23 12:00:00 UTC),
        };
        let key = StagedKey {
            id: 1,
            source_id: Some(1),
            daily_key: DailyKey::new(vec![9; 16], 2_668_032, 144),
            local: LocalTekInfo {
                transmission_risk_level: Some(TransmissionRiskLevel::Medium),
                ..LocalTekInfo::default()
            },
            federation: FederationTekInfo::default(),
            used: false,
        };
        builder
            .build(
                &[key],
                BatchNumbering {
                    batch_num: 2,
                    batch_size: 3,
                },
            )
            .unwrap()
    }

    #[test]
    fn accepts_archive_from_builder() {
        let national = Ed25519Signer::generate();
        let platform = Ed25519Signer::generate();
        let report = verify_eks_archive(
            &archive(&national, &platform),
            &national.verifier(),
            &platform.verifier(),
        )
        .unwrap();
        assert!(report.is_valid());
        assert_eq!(report.key_count, 1);
        assert_eq!((report.batch_num, report.batch_size), (Some(2), Some(3)));
    }

    #[test]
    fn swapped_identities_fail() {
        let national = Ed25519Signer::generate();
        let platform = Ed25519Signer::generate();
        let report = verify_eks_archive(
            &archive(&national, &platform),
            &platform.verifier(),
            &national.verifier(),
        )
        .unwrap();
        assert!(!report.national_signature_valid);
        assert!(!report.platform_signatures_valid);
        assert!(!report.is_valid());
    }

    #[test]
    fn missing_entry_is_an_error() {
        let signer = Ed25519Signer::generate();
        let bytes = write_archive(&[(EXPORT_BIN, b"EK Export v1    ".as_slice())]).unwrap();
        let result = verify_eks_archive(&bytes, &signer.verifier(), &signer.verifier());
        assert!(matches!(result, Err(FormatError::MissingEntry(_))));
    }
}
