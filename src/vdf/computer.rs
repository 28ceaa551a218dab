use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::vdf::modulus::{parse_modulus, RSA_2048_MODULUS_HEX};
use crate::vdf::prime::hash_to_prime;
use crate::vdf::proof::VdfProof;
use crate::vdf::VdfError;

/// Upper bound on the time parameter, a guard against unbounded compute.
pub const MAX_ITERATIONS: u64 = 100_000_000;

/// Lower bound applied when estimating iterations from a wall-clock target.
pub const MIN_ITERATIONS: u64 = 1_000;

/// Default benchmark window used to bootstrap iteration estimates.
const BOOTSTRAP_BENCHMARK_MS: u64 = 500;

/// Squarings performed between deadline checks in the benchmark loop.
const BENCHMARK_BATCH: u64 = 256;

/// Evaluates and verifies delay computations in a fixed RSA group.
///
/// The computer is cheap to clone the modulus out of and safe to share
/// across threads; the only interior state is the memoized benchmark rate.
pub struct VdfComputer {
    modulus: BigUint,
    bench_rate: Mutex<Option<f64>>,
}

impl VdfComputer {
    /// Builds a computer over the RSA-2048 challenge modulus.
    pub fn new() -> Self {
        let modulus = BigUint::parse_bytes(RSA_2048_MODULUS_HEX.as_bytes(), 16)
            .expect("RSA-2048 modulus constant is valid hex");
        Self {
            modulus,
            bench_rate: Mutex::new(None),
        }
    }

    /// Builds a computer over a caller-supplied modulus (hex).
    pub fn with_modulus(modulus_hex: &str) -> Result<Self, VdfError> {
        Ok(Self {
            modulus: parse_modulus(modulus_hex)?,
            bench_rate: Mutex::new(None),
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Maps an arbitrary input string to a group element.
    ///
    /// SHA-256 of the UTF-8 bytes, interpreted big-endian and reduced mod
    /// `N`; 0 and 1 are replaced by 2 to avoid trivial fixed points.
    pub fn hash_to_group(&self, input: &str) -> BigUint {
        let digest = Sha256::digest(input.as_bytes());
        let x = BigUint::from_bytes_be(&digest) % &self.modulus;
        if x <= BigUint::one() {
            BigUint::from(2u32)
        } else {
            x
        }
    }

    /// Computes `y = x^(2^T) mod N` by `T` sequential squarings and the
    /// Wesolowski proof for it.
    ///
    /// Progress is advisory: values in `0..=100` are emitted roughly every
    /// `T/100` squarings when a callback is supplied.
    pub fn compute_proof<F>(
        &self,
        input: &str,
        iterations: u64,
        mut on_progress: Option<F>,
    ) -> Result<VdfProof, VdfError>
    where
        F: FnMut(u8),
    {
        if iterations > MAX_ITERATIONS {
            return Err(VdfError::IterationsTooLarge(iterations));
        }

        let x = self.hash_to_group(input);

        if iterations == 0 {
            // Degenerate delay: y = x^(2^0) = x with a fixed trivial proof.
            if let Some(cb) = on_progress.as_mut() {
                cb(100);
            }
            return Ok(VdfProof::new(
                &x,
                &BigUint::one(),
                &BigUint::from(3u32),
                &BigUint::one(),
                0,
            ));
        }

        let step = (iterations / 100).max(1);
        let mut y = x.clone();
        for i in 0..iterations {
            y = &y * &y % &self.modulus;
            if let Some(cb) = on_progress.as_mut() {
                if (i + 1) % step == 0 {
                    cb(((i + 1) * 100 / iterations) as u8);
                }
            }
        }
        if let Some(cb) = on_progress.as_mut() {
            cb(100);
        }

        let l = hash_to_prime(&x, &y);
        let (q, r) = quotient_remainder(iterations, &l);
        let pi = x.modpow(&q, &self.modulus);

        Ok(VdfProof::new(&y, &pi, &l, &r, iterations))
    }

    /// Verifies a proof against the input it claims to delay.
    ///
    /// Re-derives `x` and the challenge prime, then checks
    /// `pi^l · x^r ≡ y (mod N)` with `r = 2^T mod l`. Returns `false` on
    /// any mismatch, including malformed hex fields.
    pub fn verify_proof(&self, input: &str, proof: &VdfProof) -> bool {
        let (Ok(y), Ok(pi), Ok(l), Ok(r)) =
            (proof.y_int(), proof.pi_int(), proof.l_int(), proof.r_int())
        else {
            return false;
        };

        let x = self.hash_to_group(input);

        if proof.iterations == 0 {
            return y == x
                && pi.is_one()
                && l == BigUint::from(3u32)
                && r.is_one();
        }
        if proof.iterations > MAX_ITERATIONS {
            return false;
        }

        if hash_to_prime(&x, &y) != l {
            return false;
        }
        if r >= l {
            return false;
        }
        let expected_r = BigUint::from(2u32).modpow(&BigUint::from(proof.iterations), &l);
        if r != expected_r {
            return false;
        }

        let lhs = pi.modpow(&l, &self.modulus) * x.modpow(&r, &self.modulus) % &self.modulus;
        lhs == y
    }

    /// Estimates the time parameter matching a wall-clock duration.
    ///
    /// Backed by a memoized [`benchmark`](Self::benchmark) run; the first
    /// call pays for a short calibration.
    pub fn estimate_iterations_for_seconds(&self, seconds: f64) -> u64 {
        let mut cached = self.bench_rate.lock().unwrap();
        let rate = match *cached {
            Some(rate) => rate,
            None => {
                let rate = self.benchmark(BOOTSTRAP_BENCHMARK_MS);
                log::info!("vdf: benchmarked {rate:.0} squarings/sec");
                *cached = Some(rate);
                rate
            }
        };
        ((rate * seconds.max(0.0)) as u64).clamp(MIN_ITERATIONS, MAX_ITERATIONS)
    }

    /// Measures squaring throughput over roughly `duration_ms` of wall time.
    pub fn benchmark(&self, duration_ms: u64) -> f64 {
        let mut value = self.hash_to_group("quillseal-benchmark-input-v1");
        let start = Instant::now();
        let deadline = start + Duration::from_millis(duration_ms.max(1));

        let mut iterations = 0u64;
        while Instant::now() < deadline {
            for _ in 0..BENCHMARK_BATCH {
                value = &value * &value % &self.modulus;
                iterations += 1;
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        iterations as f64 / elapsed
    }
}

impl Default for VdfComputer {
    fn default() -> Self {
        Self::new()
    }
}

/// Long division of `2^t` by `l` via `t` doubling steps.
///
/// Invariant after step `i`: `2^i = q·l + r` with `0 ≤ r < l`.
fn quotient_remainder(t: u64, l: &BigUint) -> (BigUint, BigUint) {
    let mut q = BigUint::zero();
    let mut r = BigUint::one();
    for _ in 0..t {
        r <<= 1u32;
        q <<= 1u32;
        if r >= *l {
            r -= l;
            q |= BigUint::one();
        }
    }
    (q, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computer() -> VdfComputer {
        VdfComputer::new()
    }

    #[test]
    fn test_hash_to_group_deterministic_and_reduced() {
        let c = computer();
        let a = c.hash_to_group("abc");
        let b = c.hash_to_group("abc");
        assert_eq!(a, b);
        assert!(a < *c.modulus());
        assert!(a > BigUint::one());
    }

    #[test]
    fn test_quotient_remainder_invariant() {
        let l = BigUint::from(101u32);
        for t in [1u64, 2, 5, 17, 64, 100] {
            let (q, r) = quotient_remainder(t, &l);
            let two_t = BigUint::one() << (t as usize);
            assert_eq!(q * &l + &r, two_t, "t={t}");
            assert!(r < l);
        }
    }

    #[test]
    fn test_round_trip_small_time_parameters() {
        let c = computer();
        for t in [1u64, 10, 1000] {
            let proof = c
                .compute_proof::<fn(u8)>("round-trip", t, None)
                .expect("compute");
            assert_eq!(proof.iterations, t);
            assert!(c.verify_proof("round-trip", &proof), "t={t}");
        }
    }

    #[test]
    fn test_zero_iterations_short_circuit() {
        let c = computer();
        let proof = c.compute_proof::<fn(u8)>("zero", 0, None).expect("compute");
        let x = c.hash_to_group("zero");
        assert_eq!(proof.y_int().expect("y"), x);
        assert_eq!(proof.pi, "1");
        assert_eq!(proof.l, "3");
        assert_eq!(proof.r, "1");
        assert!(c.verify_proof("zero", &proof));
    }

    #[test]
    fn test_verify_rejects_wrong_input() {
        let c = computer();
        let proof = c
            .compute_proof::<fn(u8)>("original", 64, None)
            .expect("compute");
        assert!(!c.verify_proof("different", &proof));
    }

    #[test]
    fn test_verify_rejects_tampered_fields() {
        let c = computer();
        let proof = c
            .compute_proof::<fn(u8)>("tamper", 64, None)
            .expect("compute");

        let mut bad_y = proof.clone();
        bad_y.y = flip_last_nibble(&bad_y.y);
        assert!(!c.verify_proof("tamper", &bad_y));

        let mut bad_pi = proof.clone();
        bad_pi.pi = flip_last_nibble(&bad_pi.pi);
        assert!(!c.verify_proof("tamper", &bad_pi));

        let mut bad_iters = proof.clone();
        bad_iters.iterations += 1;
        assert!(!c.verify_proof("tamper", &bad_iters));

        let mut bad_hex = proof;
        bad_hex.r = "not-hex".to_string();
        assert!(!c.verify_proof("tamper", &bad_hex));
    }

    #[test]
    fn test_progress_reaches_completion_in_order() {
        let c = computer();
        let mut seen = Vec::new();
        c.compute_proof("progress", 200, Some(|p: u8| seen.push(p)))
            .expect("compute");
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().expect("last"), 100);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_iteration_cap() {
        let c = computer();
        assert!(matches!(
            c.compute_proof::<fn(u8)>("cap", MAX_ITERATIONS + 1, None),
            Err(VdfError::IterationsTooLarge(_))
        ));
    }

    #[test]
    fn test_estimate_uses_memoized_rate() {
        let c = computer();
        let first = c.estimate_iterations_for_seconds(1.0);
        let second = c.estimate_iterations_for_seconds(1.0);
        assert_eq!(first, second);
        assert!(first >= MIN_ITERATIONS);
        // Twice the target should not shrink the estimate.
        assert!(c.estimate_iterations_for_seconds(2.0) >= first);
    }

    fn flip_last_nibble(hex: &str) -> String {
        let mut chars: Vec<char> = hex.chars().collect();
        let last = chars.last_mut().expect("non-empty hex");
        *last = if *last == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }
}
