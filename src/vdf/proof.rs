use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::vdf::modulus::{parse_hex, to_hex};
use crate::vdf::VdfError;

/// Sealed Wesolowski proof for one delay computation.
///
/// All integers are carried as lowercase hex without prefix. A proof is
/// immutable once produced; any field mutation is caught by verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdfProof {
    /// Output `y = x^(2^T) mod N`.
    pub y: String,
    /// Proof value `pi = x^q mod N` where `2^T = q·l + r`.
    pub pi: String,
    /// Fiat-Shamir challenge prime, ~256 bits.
    pub l: String,
    /// Remainder `r = 2^T mod l`.
    pub r: String,
    /// Time parameter `T`.
    pub iterations: u64,
}

impl VdfProof {
    pub fn new(y: &BigUint, pi: &BigUint, l: &BigUint, r: &BigUint, iterations: u64) -> Self {
        Self {
            y: to_hex(y),
            pi: to_hex(pi),
            l: to_hex(l),
            r: to_hex(r),
            iterations,
        }
    }

    pub fn y_int(&self) -> Result<BigUint, VdfError> {
        parse_hex("y", &self.y)
    }

    pub fn pi_int(&self) -> Result<BigUint, VdfError> {
        parse_hex("pi", &self.pi)
    }

    pub fn l_int(&self) -> Result<BigUint, VdfError> {
        parse_hex("l", &self.l)
    }

    pub fn r_int(&self) -> Result<BigUint, VdfError> {
        parse_hex("r", &self.r)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
