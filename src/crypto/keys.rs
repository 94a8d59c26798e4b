//! Producer identity keys
//!
//! Keys are supplied per request by producers; the node never issues or
//! rotates them. This type exists so producers, the CLI and tests can sign
//! submissions in every key encoding the boundary accepts.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// Ed25519 key pair used to sign shard submissions.
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Sign a message, returning the raw 64-byte signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Sign a message, returning the signature as base64 (the header form)
    pub fn sign_base64(&self, message: &[u8]) -> String {
        STANDARD.encode(self.sign(message))
    }

    /// Get the verifying (public) key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key as a PEM-encoded SubjectPublicKeyInfo
    pub fn public_key_pem(&self) -> Result<String> {
        self.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode public key as PEM: {}", e)))
    }

    /// Public key as base64 of the SubjectPublicKeyInfo DER
    pub fn public_key_der_base64(&self) -> Result<String> {
        let der = self
            .verifying_key()
            .to_public_key_der()
            .map_err(|e| Error::Crypto(format!("Failed to encode public key as DER: {}", e)))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Public key as base64 of the raw 32 key bytes
    pub fn public_key_raw_base64(&self) -> String {
        STANDARD.encode(self.verifying_key().to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing() {
        let keypair = SigningKeyPair::generate();
        let signature = keypair.sign(b"Test message");
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = SigningKeyPair::from_seed(&[7u8; 32]);
        let b = SigningKeyPair::from_seed(&[7u8; 32]);
        assert_eq!(a.public_key_raw_base64(), b.public_key_raw_base64());
        assert_eq!(a.sign(b"x"), b.sign(b"x"));
    }

    #[test]
    fn test_pem_export() {
        let pem = SigningKeyPair::generate().public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    }

    #[test]
    fn test_der_export_is_spki_sized() {
        let der_b64 = SigningKeyPair::generate().public_key_der_base64().unwrap();
        let der = STANDARD.decode(der_b64).unwrap();
        // 12-byte SPKI prefix + 32-byte key
        assert_eq!(der.len(), 44);
    }
}
