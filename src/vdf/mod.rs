//! Wesolowski verifiable delay function over an RSA group of unknown order.
//!
//! The computation `y = x^(2^T) mod N` requires `T` sequential squarings;
//! the accompanying proof lets a verifier check the result with `O(log T)`
//! modular operations instead of repeating the delay. Security rests on
//! the factorization of `N` being unknown, which is why the default
//! modulus is the RSA-2048 challenge number.

pub mod computer;
pub mod modulus;
pub mod prime;
pub mod proof;

pub use computer::{VdfComputer, MAX_ITERATIONS, MIN_ITERATIONS};
pub use modulus::RSA_2048_MODULUS_HEX;
pub use prime::hash_to_prime;
pub use proof::VdfProof;

/// Errors produced while parsing VDF inputs or configuring the group.
#[derive(Debug, thiserror::Error)]
pub enum VdfError {
    #[error("vdf: invalid hex value for {0}")]
    InvalidHex(&'static str),
    #[error("vdf: modulus is zero")]
    ZeroModulus,
    #[error("vdf: modulus must be odd and at least {min} bits, got {got}")]
    InvalidModulus { min: u64, got: u64 },
    #[error("vdf: iteration count {0} exceeds the supported maximum")]
    IterationsTooLarge(u64),
}
