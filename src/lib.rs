//! Cryptographic core of a digital authoring observer: edit history is
//! sealed into a VDF-anchored epoch chain, bundled into a signed document
//! envelope, and re-verifiable offline by any third party.

pub mod authorship;
pub mod canonical;
pub mod chain;
pub mod delta;
pub mod envelope;
pub mod keys;
pub mod session;
pub mod storage;
pub mod vdf;
pub mod verify;

// Re-export common types
pub use crate::authorship::{analyze, AuthorshipReport, ComponentScores};
pub use crate::chain::{Epoch, EpochChain, GENESIS_HASH, TARGET_EPOCH_SECONDS};
pub use crate::delta::{flatten_ops, DeltaGroup, DeltaOp};
pub use crate::envelope::{build, sign, verify_signature, Envelope, PublicKeyJwk};
pub use crate::keys::KeyMaterial;
pub use crate::session::{EditingSession, SessionStatus};
pub use crate::storage::{open, seal, SealedDocument};
pub use crate::vdf::{VdfComputer, VdfError, VdfProof};
pub use crate::verify::{VerificationReport, Verifier};

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
