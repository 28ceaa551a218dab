//! Epoch chain manager.
//!
//! The chain is a linear hash-chain: each epoch's hash covers the previous
//! epoch's hash, the buffered edit deltas, the VDF output and the time
//! parameter. Epochs are append-only; once hashed they are never mutated.
//! The auxiliary proof values (`pi`, `l`, `r`), the measured duration and
//! the timestamp stay outside the hash — they serve verification and
//! display, not integrity.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::canonical::hash_canonical;
use crate::delta::DeltaGroup;
use crate::vdf::{VdfComputer, VdfProof};

/// Hash anchoring the chain: epoch 0 carries sixty-four zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Wall-clock target for one sealed epoch.
pub const TARGET_EPOCH_SECONDS: f64 = 10.0;

/// Iterations used by the cold-start calibration probe.
pub const CALIBRATION_ITERATIONS: u64 = 10_000;

/// Iteration count assumed when calibration fails.
pub const FALLBACK_ITERATIONS: u64 = 100_000;

/// Dead band around the epoch target before iterations are adjusted.
pub const ADJUSTMENT_TOLERANCE: f64 = 0.2;

/// Upper bound on chain length, a resource-exhaustion guard.
pub const MAX_EPOCHS: usize = 50_000;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain: cannot seal an epoch with no deltas")]
    EmptyDeltas,
    #[error("chain: epoch limit of {0} reached")]
    EpochLimit(usize),
    #[error("chain: canonical encoding failed: {0}")]
    Canonical(#[from] serde_json::Error),
}

/// Proof values as they appear inside a sealed epoch. The time parameter
/// lives at the epoch level, so the embedded record carries only the four
/// group elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochProof {
    pub y: String,
    pub pi: String,
    pub l: String,
    pub r: String,
}

impl EpochProof {
    pub fn from_proof(proof: &VdfProof) -> Self {
        Self {
            y: proof.y.clone(),
            pi: proof.pi.clone(),
            l: proof.l.clone(),
            r: proof.r.clone(),
        }
    }

    /// Rebuilds the full proof by pairing the group elements with the
    /// epoch-level time parameter.
    pub fn to_proof(&self, iterations: u64) -> VdfProof {
        VdfProof {
            y: self.y.clone(),
            pi: self.pi.clone(),
            l: self.l.clone(),
            r: self.r.clone(),
            iterations,
        }
    }
}

/// One sealed interval of the writing timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epoch {
    pub epoch_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deltas: Vec<DeltaGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdf_proof: Option<EpochProof>,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub iterations: u64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub epoch_duration: f64,
    pub timestamp: String,
    pub hash: String,
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

/// Record layout hashed for each sealed epoch. Field order is the wire
/// key order; auxiliary proof values and timing are deliberately absent.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EpochHashInput<'a> {
    epoch_number: u64,
    previous_hash: &'a str,
    deltas: &'a [DeltaGroup],
    vdf_y: &'a str,
    iterations: u64,
}

/// Computes the hash of a sealed epoch from its covered fields.
pub fn epoch_hash(
    epoch_number: u64,
    previous_hash: &str,
    deltas: &[DeltaGroup],
    vdf_y: &str,
    iterations: u64,
) -> Result<String, ChainError> {
    Ok(hash_canonical(&EpochHashInput {
        epoch_number,
        previous_hash,
        deltas,
        vdf_y,
        iterations,
    })?)
}

impl Epoch {
    /// The all-zero anchor epoch. Its timestamp is cosmetic and not
    /// covered by any hash.
    pub fn genesis() -> Self {
        Self {
            epoch_number: 0,
            previous_hash: None,
            deltas: Vec::new(),
            vdf_proof: None,
            iterations: 0,
            epoch_duration: 0.0,
            timestamp: now_iso(),
            hash: GENESIS_HASH.to_string(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.epoch_number == 0 && self.previous_hash.is_none() && self.hash == GENESIS_HASH
    }

    /// Recomputes the hash this epoch should carry given its own fields.
    /// `None` when required fields are absent (a malformed epoch).
    pub fn expected_hash(&self) -> Option<String> {
        let previous_hash = self.previous_hash.as_deref()?;
        let proof = self.vdf_proof.as_ref()?;
        epoch_hash(
            self.epoch_number,
            previous_hash,
            &self.deltas,
            &proof.y,
            self.iterations,
        )
        .ok()
    }
}

/// Append-only chain of sealed epochs, always rooted at genesis.
#[derive(Debug, Clone)]
pub struct EpochChain {
    epochs: Vec<Epoch>,
}

impl EpochChain {
    pub fn new() -> Self {
        Self {
            epochs: vec![Epoch::genesis()],
        }
    }

    /// Rebuilds a chain from previously serialized epochs. An empty input
    /// falls back to a fresh genesis; validation is the verifier's job.
    pub fn from_epochs(epochs: Vec<Epoch>) -> Self {
        if epochs.is_empty() {
            return Self::new();
        }
        Self { epochs }
    }

    /// Resets the chain to a fresh genesis.
    pub fn genesis(&mut self) {
        self.epochs = vec![Epoch::genesis()];
    }

    pub fn tip(&self) -> &Epoch {
        self.epochs.last().expect("chain always holds genesis")
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Seconds of attested delay accumulated across all sealed epochs.
    pub fn total_duration(&self) -> f64 {
        self.epochs.iter().map(|e| e.epoch_duration).sum()
    }

    /// Seals the buffered deltas into the next epoch.
    ///
    /// The proof must have been computed over the current tip's hash;
    /// empty delta sets are rejected (idle intervals never enter the
    /// chain).
    pub fn append(
        &mut self,
        deltas: Vec<DeltaGroup>,
        proof: &VdfProof,
        iterations: u64,
        duration: f64,
    ) -> Result<&Epoch, ChainError> {
        if deltas.is_empty() {
            return Err(ChainError::EmptyDeltas);
        }
        if self.epochs.len() >= MAX_EPOCHS {
            return Err(ChainError::EpochLimit(MAX_EPOCHS));
        }

        let epoch_number = self.tip().epoch_number + 1;
        let previous_hash = self.tip().hash.clone();
        let hash = epoch_hash(epoch_number, &previous_hash, &deltas, &proof.y, iterations)?;

        self.epochs.push(Epoch {
            epoch_number,
            previous_hash: Some(previous_hash),
            deltas,
            vdf_proof: Some(EpochProof::from_proof(proof)),
            iterations,
            epoch_duration: duration,
            timestamp: now_iso(),
            hash,
        });
        Ok(self.tip())
    }

    /// Retargets the iteration count after an epoch that ran outside the
    /// tolerance band, smoothing with the previous value to avoid
    /// oscillation. Inside the band the count is returned unchanged.
    pub fn adjust_iterations(last_duration: f64, target: f64, current: u64) -> u64 {
        if last_duration <= 0.0 || target <= 0.0 {
            return current;
        }
        if (last_duration - target).abs() <= ADJUSTMENT_TOLERANCE * target {
            return current;
        }
        let scaled = (current as f64 * target / last_duration).floor() as u64;
        ((current + scaled) / 2).max(1)
    }

    /// Cold-start calibration: one timed probe run, scaled to the epoch
    /// target. Falls back to a fixed count when the probe fails.
    pub fn calibrate(computer: &VdfComputer) -> u64 {
        let started = Instant::now();
        match computer.compute_proof::<fn(u8)>(GENESIS_HASH, CALIBRATION_ITERATIONS, None) {
            Ok(_) => {
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed <= 0.0 {
                    return FALLBACK_ITERATIONS;
                }
                let per_second = CALIBRATION_ITERATIONS as f64 / elapsed;
                ((per_second * TARGET_EPOCH_SECONDS) as u64).max(1)
            }
            Err(err) => {
                log::warn!("chain: calibration probe failed, using fallback: {err}");
                FALLBACK_ITERATIONS
            }
        }
    }
}

impl Default for EpochChain {
    fn default() -> Self {
        Self::new()
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::insert_group;

    fn proof_for(computer: &VdfComputer, input: &str, iterations: u64) -> VdfProof {
        computer
            .compute_proof::<fn(u8)>(input, iterations, None)
            .expect("compute proof")
    }

    #[test]
    fn test_new_chain_is_genesis_only() {
        let chain = EpochChain::new();
        assert_eq!(chain.len(), 1);
        assert!(chain.tip().is_genesis());
        assert_eq!(chain.tip().hash, GENESIS_HASH);
    }

    #[test]
    fn test_append_links_and_numbers_epochs() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();

        for (i, text) in ["a", "b"].iter().enumerate() {
            let tip_hash = chain.tip().hash.clone();
            let proof = proof_for(&computer, &tip_hash, 16);
            let epoch = chain
                .append(vec![insert_group(text)], &proof, 16, 0.5)
                .expect("append");
            assert_eq!(epoch.epoch_number, i as u64 + 1);
            assert_eq!(epoch.previous_hash.as_deref(), Some(tip_hash.as_str()));
        }

        assert_eq!(chain.len(), 3);
        assert!((chain.total_duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_append_rejects_empty_deltas() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();
        let proof = proof_for(&computer, GENESIS_HASH, 8);
        assert!(matches!(
            chain.append(Vec::new(), &proof, 8, 0.1),
            Err(ChainError::EmptyDeltas)
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_epoch_hash_matches_recomputation() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();
        let proof = proof_for(&computer, GENESIS_HASH, 16);
        let epoch = chain
            .append(vec![insert_group("hello")], &proof, 16, 0.2)
            .expect("append")
            .clone();
        assert_eq!(epoch.expected_hash().expect("recompute"), epoch.hash);
    }

    #[test]
    fn test_delta_tamper_changes_hash() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();
        let proof = proof_for(&computer, GENESIS_HASH, 16);
        let mut epoch = chain
            .append(vec![insert_group("original")], &proof, 16, 0.2)
            .expect("append")
            .clone();

        epoch.deltas = vec![insert_group("tampered")];
        assert_ne!(epoch.expected_hash().expect("recompute"), epoch.hash);
    }

    #[test]
    fn test_adjust_iterations_outside_band() {
        // Twice the target: proportional correction averaged with the old
        // value.
        assert_eq!(
            EpochChain::adjust_iterations(20.0, 10.0, 100_000),
            75_000
        );
    }

    #[test]
    fn test_adjust_iterations_inside_band_unchanged() {
        assert_eq!(
            EpochChain::adjust_iterations(10.1, 10.0, 100_000),
            100_000
        );
        assert_eq!(EpochChain::adjust_iterations(8.5, 10.0, 40_000), 40_000);
    }

    #[test]
    fn test_adjust_iterations_speeds_up_after_fast_epoch() {
        // Half the target: the count should grow toward 1.5x.
        assert_eq!(EpochChain::adjust_iterations(5.0, 10.0, 100_000), 150_000);
    }

    #[test]
    fn test_genesis_resets_chain() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();
        let proof = proof_for(&computer, GENESIS_HASH, 8);
        chain
            .append(vec![insert_group("x")], &proof, 8, 0.1)
            .expect("append");
        chain.genesis();
        assert_eq!(chain.len(), 1);
        assert!(chain.tip().is_genesis());
    }

    #[test]
    fn test_serde_round_trip_preserves_epochs() {
        let computer = VdfComputer::new();
        let mut chain = EpochChain::new();
        let proof = proof_for(&computer, GENESIS_HASH, 16);
        chain
            .append(vec![insert_group("persisted")], &proof, 16, 0.3)
            .expect("append");

        let json = serde_json::to_string(chain.epochs()).expect("serialize");
        let parsed: Vec<Epoch> = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, chain.epochs());

        let reloaded = EpochChain::from_epochs(parsed);
        assert_eq!(reloaded.tip().hash, chain.tip().hash);
    }

    #[test]
    fn test_genesis_serializes_without_optional_fields() {
        let json = serde_json::to_string(&Epoch::genesis()).expect("serialize");
        assert!(!json.contains("previousHash"));
        assert!(!json.contains("vdfProof"));
        assert!(!json.contains("deltas"));
        assert!(json.contains("\"epochNumber\":0"));
    }
}
