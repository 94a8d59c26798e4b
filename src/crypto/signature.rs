//! Ed25519 signature verification over raw request bytes
//!
//! Producers send their public key in one of three encodings:
//! - PEM SubjectPublicKeyInfo (the structured form). Header values cannot
//!   carry newlines, so literal `\n` or `\r\n` escapes and single-line PEM
//!   are accepted.
//! - base64 of the SubjectPublicKeyInfo DER.
//! - base64 of the raw 32 key bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

const PEM_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Why a signature check failed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureFailure {
    /// The public key header could not be decoded
    #[error("malformed public key: {0}")]
    MalformedKey(String),
    /// The signature header could not be decoded
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    /// Well-formed inputs, but the signature does not match the body
    #[error("signature does not verify")]
    Mismatch,
}

/// Verify a base64 Ed25519 signature over `body` with the given public key.
pub fn verify_signature(
    public_key: &str,
    signature_b64: &str,
    body: &[u8],
) -> Result<(), SignatureFailure> {
    let key = parse_public_key(public_key)?;

    let sig_bytes = STANDARD
        .decode(signature_b64.trim())
        .map_err(|e| SignatureFailure::MalformedSignature(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| SignatureFailure::MalformedSignature(e.to_string()))?;

    key.verify(body, &signature)
        .map_err(|_| SignatureFailure::Mismatch)
}

fn parse_public_key(input: &str) -> Result<VerifyingKey, SignatureFailure> {
    let input = input.trim();
    if input.contains(PEM_BEGIN) {
        return parse_pem(input);
    }

    let bytes = STANDARD
        .decode(input)
        .map_err(|e| SignatureFailure::MalformedKey(e.to_string()))?;
    match <&[u8; 32]>::try_from(bytes.as_slice()) {
        Ok(raw) => VerifyingKey::from_bytes(raw)
            .map_err(|e| SignatureFailure::MalformedKey(e.to_string())),
        Err(_) => VerifyingKey::from_public_key_der(&bytes)
            .map_err(|e| SignatureFailure::MalformedKey(e.to_string())),
    }
}

fn parse_pem(input: &str) -> Result<VerifyingKey, SignatureFailure> {
    VerifyingKey::from_public_key_pem(&normalize_pem(input))
        .map_err(|e| SignatureFailure::MalformedKey(e.to_string()))
}

/// Rebuild a header-carried PEM into strict RFC 7468 layout: escaped or
/// CRLF line breaks become `\n` and the base64 body is re-wrapped at 64.
fn normalize_pem(input: &str) -> String {
    let unescaped = input
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\r\n", "\n");
    let Some(start) = unescaped.find(PEM_BEGIN).map(|i| i + PEM_BEGIN.len()) else {
        return unescaped;
    };
    let Some(end) = unescaped[start..].find(PEM_END).map(|i| start + i) else {
        return unescaped;
    };

    let body: Vec<char> = unescaped[start..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let mut pem = String::with_capacity(body.len() + PEM_BEGIN.len() + PEM_END.len() + 8);
    pem.push_str(PEM_BEGIN);
    pem.push('\n');
    for line in body.chunks(64) {
        pem.extend(line);
        pem.push('\n');
    }
    pem.push_str(PEM_END);
    pem.push('\n');
    pem
}
