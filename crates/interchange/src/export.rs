use prost::Message;

use crate::error::FormatError;
use crate::proto::{DiagnosisKeyBatch, TekSignatureList, TemporaryExposureKeyExport};

/// Fixed 16-byte token that precedes every export payload.
pub const EXPORT_HEADER: &[u8; 16] = b"EK Export v1    ";

/// Header followed by the serialized export.
pub fn encode_export(export: &TemporaryExposureKeyExport) -> Vec<u8> {
    let mut buf = Vec::with_capacity(EXPORT_HEADER.len() + export.encoded_len());
    buf.extend_from_slice(EXPORT_HEADER);
    buf.extend(export.encode_to_vec());
    buf
}

pub fn decode_export(payload: &[u8]) -> Result<TemporaryExposureKeyExport, FormatError> {
    let body = payload
        .strip_prefix(EXPORT_HEADER.as_slice())
        .ok_or(FormatError::MissingHeader)?;
    Ok(TemporaryExposureKeyExport::decode(body)?)
}

pub fn encode_signature_list(list: &TekSignatureList) -> Vec<u8> {
    list.encode_to_vec()
}

pub fn decode_signature_list(bytes: &[u8]) -> Result<TekSignatureList, FormatError> {
    Ok(TekSignatureList::decode(bytes)?)
}

pub fn encode_federation_batch(batch: &DiagnosisKeyBatch) -> Vec<u8> {
    batch.encode_to_vec()
}

pub fn decode_federation_batch(bytes: &[u8]) -> Result<DiagnosisKeyBatch, FormatError> {
    Ok(DiagnosisKeyBatch::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{FederationKey, SignatureInfo, TemporaryExposureKey};

    fn key() -> TemporaryExposureKey {
        TemporaryExposureKey {
            key_data: Some(vec![1; 16]),
            transmission_risk_level: Some(3),
            rolling_start_interval_number: Some(2_668_032),
            rolling_period: Some(144),
            report_type: Some(1),
            days_since_onset_of_symptoms: Some(-1),
        }
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn key_wire_layout_is_stable() {
        let expected = [
            "0a10",
            "01".repeat(16).as_str(),
            "1003",
            "1880eca201",
            "209001",
            "2801",
            "3001",
        ]
        .concat();
        assert_eq!(hex(&key().encode_to_vec()), expected);
    }

    #[test]
    fn export_starts_with_header() {
        let export = TemporaryExposureKeyExport {
            start_timestamp: Some(1_603_411_200),
            end_timestamp: Some(1_603_497_600),
            region: Some("NL".to_string()),
            batch_num: Some(1),
            batch_size: Some(1),
            signature_infos: vec![SignatureInfo::default()],
            keys: vec![key()],
        };
        let payload = encode_export(&export);
        assert_eq!(&payload[..16], b"EK Export v1    ");
        assert_eq!(decode_export(&payload).unwrap(), export);
    }

    #[test]
    fn export_without_header_is_rejected() {
        let body = TemporaryExposureKeyExport::default().encode_to_vec();
        assert!(matches!(
            decode_export(&body),
            Err(FormatError::MissingHeader)
        ));
    }

    #[test]
    fn truncated_federation_batch_fails_to_decode() {
        let batch = DiagnosisKeyBatch {
            keys: vec![FederationKey {
                key_data: vec![7; 16],
                rolling_start_interval_number: 2_668_032,
                rolling_period: 144,
                transmission_risk_level: 2,
                visited_countries: vec!["DE".to_string()],
                origin: "DE".to_string(),
                report_type: 1,
                days_since_onset_of_symptoms: 3004,
            }],
        };
        let bytes = encode_federation_batch(&batch);
        assert_eq!(decode_federation_batch(&bytes).unwrap(), batch);
        assert!(decode_federation_batch(&bytes[..bytes.len() - 3]).is_err());
    }
}
