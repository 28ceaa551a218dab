//! End-to-end verification of a document envelope.
//!
//! The verifier re-walks the epoch chain link by link, re-derives every
//! epoch hash, re-verifies every VDF proof and finally checks the
//! document hash and signature. Failures are collected, not thrown: a
//! report lists every problem found, in ascending epoch order. Only a
//! malformed genesis aborts early, since nothing after it can be
//! interpreted.

use crate::chain::{Epoch, GENESIS_HASH};
use crate::envelope::{self, Envelope};
use crate::vdf::VdfComputer;

/// Outcome of a full verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub verified_epochs: usize,
    pub total_epochs: usize,
    pub signature_valid: bool,
}

/// Re-verifies envelopes and bare chains against a VDF group.
pub struct Verifier {
    computer: VdfComputer,
}

impl Verifier {
    pub fn new(computer: VdfComputer) -> Self {
        Self { computer }
    }

    /// Verifies an envelope without progress reporting.
    pub fn verify(&self, envelope: &Envelope) -> VerificationReport {
        self.verify_with_progress::<fn(u8, &str)>(envelope, None)
    }

    /// Verifies an envelope, reporting progress as `(percent, message)`.
    /// Progress is advisory; correctness never depends on it.
    pub fn verify_with_progress<F>(
        &self,
        envelope: &Envelope,
        mut progress: Option<F>,
    ) -> VerificationReport
    where
        F: FnMut(u8, &str),
    {
        let mut report = self.walk_chain(&envelope.proof_chain, &mut progress);
        if report.errors.iter().any(|e| e == "Invalid genesis epoch.") {
            // Genesis failure is fatal: nothing further can be interpreted.
            return report;
        }

        if let Some(cb) = progress.as_mut() {
            cb(95, "Verifying signature…");
        }
        self.check_signature(envelope, &mut report);
        if let Some(cb) = progress.as_mut() {
            cb(100, "Verification complete");
        }

        report.valid = report.errors.is_empty();
        report
    }

    /// Verifies a bare chain with no signature requirement. A genesis-only
    /// chain is valid with zero verified epochs.
    pub fn verify_chain(&self, epochs: &[Epoch]) -> VerificationReport {
        let mut report = self.walk_chain(epochs, &mut None::<fn(u8, &str)>);
        report.valid = report.errors.is_empty();
        report
    }

    fn walk_chain<F>(&self, epochs: &[Epoch], progress: &mut Option<F>) -> VerificationReport
    where
        F: FnMut(u8, &str),
    {
        let mut report = VerificationReport {
            total_epochs: epochs.len().saturating_sub(1),
            ..VerificationReport::default()
        };

        let Some(genesis) = epochs.first() else {
            report.errors.push("Invalid genesis epoch.".to_string());
            return report;
        };
        if genesis.epoch_number != 0 || genesis.hash != GENESIS_HASH {
            report.errors.push("Invalid genesis epoch.".to_string());
            return report;
        }

        let last_index = epochs.len() - 1;
        for i in 1..=last_index {
            let epoch = &epochs[i];
            let previous = &epochs[i - 1];
            let number = epoch.epoch_number;
            let mut epoch_ok = true;

            // Every check runs even after an earlier one fails: the report
            // should surface all problems at once.
            if epoch.previous_hash.as_deref() != Some(previous.hash.as_str()) {
                report.errors.push(format!("Epoch {number}: Broken chain."));
                epoch_ok = false;
            }

            match epoch.expected_hash() {
                Some(expected) if expected == epoch.hash => {}
                _ => {
                    report
                        .errors
                        .push(format!("Epoch {number}: Hash mismatch."));
                    epoch_ok = false;
                }
            }

            if !self.epoch_proof_valid(epoch) {
                report
                    .errors
                    .push(format!("Epoch {number}: Invalid VDF proof."));
                epoch_ok = false;
            }

            if epoch_ok {
                report.verified_epochs += 1;
            }

            if let Some(cb) = progress.as_mut() {
                let percent = ((i as u64 * 90) / last_index as u64) as u8;
                cb(percent, &format!("Verifying epoch {number}…"));
            }
        }

        report.valid = report.errors.is_empty();
        report
    }

    fn epoch_proof_valid(&self, epoch: &Epoch) -> bool {
        let (Some(previous_hash), Some(proof)) =
            (epoch.previous_hash.as_deref(), epoch.vdf_proof.as_ref())
        else {
            return false;
        };
        self.computer
            .verify_proof(previous_hash, &proof.to_proof(epoch.iterations))
    }

    fn check_signature(&self, envelope: &Envelope, report: &mut VerificationReport) {
        let metadata = &envelope.metadata;
        if metadata.document_hash.is_none()
            || metadata.public_key.is_none()
            || metadata.signature.is_none()
        {
            report.errors.push("Missing signature.".to_string());
            return;
        }

        let hash_ok = match envelope::document_hash(envelope) {
            Ok(expected) => metadata.document_hash.as_deref() == Some(expected.as_str()),
            Err(_) => false,
        };
        if !hash_ok {
            report.errors.push("Document hash mismatch.".to_string());
        }

        let signature_ok = envelope::verify_signature(envelope);
        if !signature_ok {
            report.errors.push("Invalid signature.".to_string());
        }

        report.signature_valid = hash_ok && signature_ok;
    }
}
