//! Key material supplied by the key-store collaborator.
//!
//! Bundles the ECDSA P-384 signing keypair with the 32-byte base secret
//! that symmetric document keys are derived from. Persistence of either
//! is outside this crate; the base secret is wiped on drop.

use hkdf::Hkdf;
use p384::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha384;
use zeroize::Zeroize;

const DOCUMENT_KEY_DOMAIN: &[u8] = b"quillseal-document-key-v1";

pub struct KeyMaterial {
    signing_key: SigningKey,
    base_secret: [u8; 32],
}

impl KeyMaterial {
    /// Generates a fresh keypair and base secret from the OS RNG.
    pub fn generate() -> Self {
        let mut base_secret = [0u8; 32];
        OsRng.fill_bytes(&mut base_secret);
        Self {
            signing_key: SigningKey::random(&mut OsRng),
            base_secret,
        }
    }

    /// Rebuilds key material from externally persisted parts.
    pub fn from_parts(signing_key: SigningKey, base_secret: [u8; 32]) -> Self {
        Self {
            signing_key,
            base_secret,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.signing_key)
    }

    /// Derives the AES-256 document key via HKDF-SHA-384 under a fixed
    /// domain label.
    pub fn document_key(&self) -> [u8; 32] {
        let hk = Hkdf::<Sha384>::new(None, &self.base_secret);
        let mut okm = [0u8; 32];
        hk.expand(DOCUMENT_KEY_DOMAIN, &mut okm)
            .expect("32 bytes is a valid HKDF-SHA-384 output length");
        okm
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.base_secret.zeroize();
    }
}
