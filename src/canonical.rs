//! Canonical serialization and hashing.
//!
//! Every hash and signature input in the crate goes through one encoder:
//! compact JSON with object keys in *declared record order* (struct field
//! order mirrors the wire layout; opaque delta values keep their parsed
//! key order via `serde_json`'s `preserve_order` feature). Strings use
//! standard JSON escaping; integers are plain decimal; floats are
//! serde_json's shortest round-trip decimal, which is stable under
//! parse/serialize. Changing any of this invalidates existing chain
//! hashes and document signatures.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of a SHA-256 digest rendered as hex.
pub const HASH_HEX_LEN: usize = 64;

/// Encodes a record in the crate's canonical form.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

/// SHA-256 over the UTF-8 bytes of a string, as lowercase hex.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Canonicalizes a record and hashes it in one step.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(&canonical_json(value)?))
}
