//! The "sign these bytes" capability and its Ed25519 reference implementation.
//!
//! Key files hold the base64-encoded 32-byte key: `<prefix>.secret` for the
//! seed and `<prefix>.pub` for the verifying key.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Object identifier of Ed25519, carried in export signature metadata.
pub const ED25519_ALGORITHM: &str = "1.3.101.112";

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("key file '{path}': {message}")]
    KeyFile { path: String, message: String },

    #[error("signing failed: {0}")]
    Failed(String),
}

/// Produces a detached signature over an exact byte sequence.
pub trait ContentSigner: Send + Sync {
    fn signature_algorithm(&self) -> &str;

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, SignError>;
}

/// Checks a detached signature produced by the matching [`ContentSigner`].
pub trait ContentVerifier: Send + Sync {
    fn verify(&self, content: &[u8], signature: &[u8]) -> bool;
}

pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Ed25519Signer { key }
    }

    /// A fresh key from the OS random source.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Ed25519Signer {
            key: SigningKey::generate(&mut rng),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SignError> {
        read_secret_key(path).map(Ed25519Signer::new)
    }

    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier::new(self.key.verifying_key())
    }
}

impl ContentSigner for Ed25519Signer {
    fn signature_algorithm(&self) -> &str {
        ED25519_ALGORITHM
    }

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>, SignError> {
        let signature = self
            .key
            .try_sign(content)
            .map_err(|e| SignError::Failed(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Ed25519Verifier { key }
    }

    pub fn from_file(path: &Path) -> Result<Self, SignError> {
        read_public_key(path).map(Ed25519Verifier::new)
    }

    /// Short hex fingerprint: the first 8 bytes of the key.
    pub fn fingerprint(&self) -> String {
        self.key.to_bytes()[..8]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl ContentVerifier for Ed25519Verifier {
    fn verify(&self, content: &[u8], signature: &[u8]) -> bool {
        match Signature::from_slice(signature) {
            Ok(signature) => self.key.verify(content, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

// ── Key files ────────────────────────────────────────────────────────────────

fn key_file_error(path: &Path, message: impl Into<String>) -> SignError {
    SignError::KeyFile {
        path: path.display().to_string(),
        message: message.into(),
    }
}

fn read_key_bytes(path: &Path) -> Result<[u8; 32], SignError> {
    let contents = std::fs::read_to_string(path).map_err(|e| key_file_error(path, e.to_string()))?;
    let bytes = BASE64
        .decode(contents.trim())
        .map_err(|e| key_file_error(path, format!("invalid base64: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| key_file_error(path, "expected 32 bytes"))
}

pub fn read_secret_key(path: &Path) -> Result<SigningKey, SignError> {
    read_key_bytes(path).map(|bytes| SigningKey::from_bytes(&bytes))
}

pub fn read_public_key(path: &Path) -> Result<VerifyingKey, SignError> {
    let bytes = read_key_bytes(path)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| key_file_error(path, e.to_string()))
}

/// Generate a keypair and write `<prefix>.secret` (mode 0o600 on Unix) and
/// `<prefix>.pub`. Returns both paths.
pub fn write_keypair(prefix: &str) -> Result<(PathBuf, PathBuf), SignError> {
    let signer = Ed25519Signer::generate();
    let secret_path = PathBuf::from(format!("{}.secret", prefix));
    let pub_path = PathBuf::from(format!("{}.pub", prefix));

    std::fs::write(&secret_path, BASE64.encode(signer.key.to_bytes()))
        .map_err(|e| key_file_error(&secret_path, e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&secret_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| key_file_error(&secret_path, e.to_string()))?;
    }

    std::fs::write(
        &pub_path,
        BASE64.encode(signer.key.verifying_key().to_bytes()),
    )
    .map_err(|e| key_file_error(&pub_path, e.to_string()))?;

    Ok((secret_path, pub_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn signature_verifies_over_same_bytes_only() {
        let signer = Ed25519Signer::generate();
        let verifier = signer.verifier();
        let sig = signer.sign(b"payload").unwrap();
        assert!(verifier.verify(b"payload", &sig));
        assert!(!verifier.verify(b"payload!", &sig));
        assert!(!verifier.verify(b"payload", &sig[..10]));
    }

    #[test]
    fn other_key_does_not_verify() {
        let sig = Ed25519Signer::generate().sign(b"payload").unwrap();
        assert!(!Ed25519Signer::generate().verifier().verify(b"payload", &sig));
    }

    #[test]
    fn keypair_files_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let prefix = tmp.path().join("national");
        let (secret, public) = write_keypair(prefix.to_str().unwrap()).unwrap();

        let signer = Ed25519Signer::from_file(&secret).unwrap();
        let verifier = Ed25519Verifier::from_file(&public).unwrap();
        let sig = signer.sign(b"roundtrip").unwrap();
        assert!(verifier.verify(b"roundtrip", &sig));
        assert_eq!(verifier.fingerprint().len(), 16);
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let prefix = tmp.path().join("k");
        let (secret, _) = write_keypair(prefix.to_str().unwrap()).unwrap();
        let mode = std::fs::metadata(secret).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.secret");
        std::fs::write(&bad, "not-valid-base64!!!").unwrap();
        assert!(matches!(
            read_secret_key(&bad),
            Err(SignError::KeyFile { .. })
        ));

        let short = tmp.path().join("short.secret");
        std::fs::write(&short, BASE64.encode([1u8; 16])).unwrap();
        assert!(read_secret_key(&short).is_err());
    }
}
