//! Document envelope: assembly, hashing and signing.
//!
//! The envelope bundles the rendered content, the full epoch chain and a
//! metadata block. Its hash covers the canonical form of the whole record
//! with `documentHash`, `signature` and `publicKey` nulled, so the signed
//! artifact is reproducible byte-for-byte by any verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_json, sha256_hex};
use crate::chain::{Epoch, EpochChain};

/// Document format version carried in every envelope.
pub const DOCUMENT_VERSION: &str = "2.1-crypto";

/// P-384 coordinate width in bytes.
const COORDINATE_LEN: usize = 48;

/// Raw `r ‖ s` signature width for P-384.
pub const SIGNATURE_LEN: usize = 96;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope: canonical encoding failed: {0}")]
    Canonical(#[from] serde_json::Error),
    #[error("envelope: document hash is missing")]
    MissingDocumentHash,
    #[error("envelope: malformed public key")]
    MalformedPublicKey,
}

/// Exported public key in JWK form (`crv: "P-384"`, `kty: "EC"`,
/// base64url coordinates without padding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJwk {
    pub crv: String,
    pub kty: String,
    pub x: String,
    pub y: String,
}

/// Editor state snapshot carried alongside the proof chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    pub html: String,
    pub delta: serde_json::Value,
}

/// Envelope metadata. The three optional fields serialize as explicit
/// nulls when unset; their presence is part of the canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub epoch_count: usize,
    pub genesis_hash: String,
    pub latest_hash: String,
    pub total_duration: f64,
    pub document_hash: Option<String>,
    pub public_key: Option<PublicKeyJwk>,
    pub signature: Option<Vec<u8>>,
}

/// Signed bundle of content plus the full epoch chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub title: String,
    pub version: String,
    pub timestamp: String,
    pub content: DocumentContent,
    pub proof_chain: Vec<Epoch>,
    pub metadata: EnvelopeMetadata,
}

/// Materializes an envelope from the chain and current editor state, with
/// the document hash computed and set.
pub fn build(
    title: &str,
    html: &str,
    delta_snapshot: serde_json::Value,
    chain: &EpochChain,
) -> Result<Envelope, EnvelopeError> {
    let epochs = chain.epochs().to_vec();
    let metadata = EnvelopeMetadata {
        epoch_count: epochs.len(),
        genesis_hash: epochs.first().map(|e| e.hash.clone()).unwrap_or_default(),
        latest_hash: epochs.last().map(|e| e.hash.clone()).unwrap_or_default(),
        total_duration: chain.total_duration(),
        document_hash: None,
        public_key: None,
        signature: None,
    };

    let mut envelope = Envelope {
        title: title.to_string(),
        version: DOCUMENT_VERSION.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        content: DocumentContent {
            html: html.to_string(),
            delta: delta_snapshot,
        },
        proof_chain: epochs,
        metadata,
    };
    envelope.metadata.document_hash = Some(document_hash(&envelope)?);
    Ok(envelope)
}

/// Recomputes the document hash: SHA-256 of the canonical envelope with
/// `documentHash`, `signature` and `publicKey` nulled.
pub fn document_hash(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let mut scratch = envelope.clone();
    scratch.metadata.document_hash = None;
    scratch.metadata.signature = None;
    scratch.metadata.public_key = None;
    Ok(sha256_hex(&canonical_json(&scratch)?))
}

/// Signs the document hash (its hex string's UTF-8 bytes) with
/// ECDSA-P384/SHA-384 and writes signature and public key into metadata.
pub fn sign(mut envelope: Envelope, key: &SigningKey) -> Result<Envelope, EnvelopeError> {
    let digest_hex = envelope
        .metadata
        .document_hash
        .clone()
        .ok_or(EnvelopeError::MissingDocumentHash)?;

    let signature: Signature = key.sign(digest_hex.as_bytes());
    envelope.metadata.signature = Some(signature.to_bytes().to_vec());
    envelope.metadata.public_key = Some(export_jwk(&VerifyingKey::from(key)));
    Ok(envelope)
}

/// Verifies the stored signature over the stored document hash. Returns
/// `false` when any of the three metadata fields is missing or malformed.
pub fn verify_signature(envelope: &Envelope) -> bool {
    let (Some(digest_hex), Some(jwk), Some(signature_bytes)) = (
        envelope.metadata.document_hash.as_ref(),
        envelope.metadata.public_key.as_ref(),
        envelope.metadata.signature.as_ref(),
    ) else {
        return false;
    };

    let Ok(key) = import_jwk(jwk) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature_bytes) else {
        return false;
    };
    key.verify(digest_hex.as_bytes(), &signature).is_ok()
}

/// Exports a verifying key as a P-384 JWK.
pub fn export_jwk(key: &VerifyingKey) -> PublicKeyJwk {
    let point = key.to_encoded_point(false);
    let x = point.x().map(|c| c.to_vec()).unwrap_or_default();
    let y = point.y().map(|c| c.to_vec()).unwrap_or_default();
    PublicKeyJwk {
        crv: "P-384".to_string(),
        kty: "EC".to_string(),
        x: URL_SAFE_NO_PAD.encode(x),
        y: URL_SAFE_NO_PAD.encode(y),
    }
}

/// Imports a P-384 JWK back into a verifying key.
pub fn import_jwk(jwk: &PublicKeyJwk) -> Result<VerifyingKey, EnvelopeError> {
    if jwk.kty != "EC" || jwk.crv != "P-384" {
        return Err(EnvelopeError::MalformedPublicKey);
    }
    let x = URL_SAFE_NO_PAD
        .decode(&jwk.x)
        .map_err(|_| EnvelopeError::MalformedPublicKey)?;
    let y = URL_SAFE_NO_PAD
        .decode(&jwk.y)
        .map_err(|_| EnvelopeError::MalformedPublicKey)?;
    if x.len() != COORDINATE_LEN || y.len() != COORDINATE_LEN {
        return Err(EnvelopeError::MalformedPublicKey);
    }

    let point = EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(&x),
        FieldBytes::from_slice(&y),
        false,
    );
    VerifyingKey::from_encoded_point(&point).map_err(|_| EnvelopeError::MalformedPublicKey)
}
