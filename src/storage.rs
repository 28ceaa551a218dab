//! At-rest sealing of saved documents.
//!
//! A saved document wraps the canonical JSON envelope in AES-256-GCM with
//! a random 12-byte nonce. Title and timestamp stay plaintext so a file
//! browser can list documents without the key. A failed decryption is a
//! storage error; chain state is never touched by storage failures.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::envelope::Envelope;

/// AES-GCM nonce width.
pub const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage: encryption failed")]
    Encrypt,
    #[error("storage: decryption failed")]
    Decrypt,
    #[error("storage: malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("storage: io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plaintext browsing metadata for a sealed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedMetadata {
    pub title: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedPayload {
    pub iv: Vec<u8>,
    pub content: Vec<u8>,
}

/// On-disk representation of an encrypted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedDocument {
    pub metadata: SealedMetadata,
    pub payload: SealedPayload,
}

/// Encrypts an envelope under the given document key.
pub fn seal(envelope: &Envelope, key: &[u8; 32]) -> Result<SealedDocument, StorageError> {
    let plaintext = serde_json::to_vec(envelope)?;

    let mut iv = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let content = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
        .map_err(|_| StorageError::Encrypt)?;

    Ok(SealedDocument {
        metadata: SealedMetadata {
            title: envelope.title.clone(),
            timestamp: envelope.timestamp.clone(),
        },
        payload: SealedPayload {
            iv: iv.to_vec(),
            content,
        },
    })
}

/// Decrypts a sealed document back into its envelope.
pub fn open(sealed: &SealedDocument, key: &[u8; 32]) -> Result<Envelope, StorageError> {
    if sealed.payload.iv.len() != NONCE_LEN {
        return Err(StorageError::Decrypt);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&sealed.payload.iv),
            sealed.payload.content.as_ref(),
        )
        .map_err(|_| StorageError::Decrypt)?;

    Ok(serde_json::from_slice(&plaintext)?)
}

/// Writes a sealed document to disk as JSON.
pub fn save(sealed: &SealedDocument, path: &Path) -> Result<(), StorageError> {
    let json = serde_json::to_vec(sealed)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a sealed document from disk.
pub fn load(path: &Path) -> Result<SealedDocument, StorageError> {
    let json = fs::read(path)?;
    Ok(serde_json::from_slice(&json)?)
}
