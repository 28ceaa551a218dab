use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use sha2::{Digest, Sha256};

/// Rounds of Miller-Rabin applied during challenge-prime generation.
pub const MILLER_RABIN_ROUNDS: usize = 40;

/// Domain separator between the two operand buffers fed to SHA-256.
const DOMAIN_SEPARATOR: u8 = 0x01;

/// Operand width in bytes: both group elements are serialized as
/// fixed-width 2048-bit big-endian buffers regardless of magnitude.
const OPERAND_WIDTH: usize = 256;

/// Deterministic Miller-Rabin bases: the first forty primes.
const WITNESSES: [u32; 40] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173,
];

/// Derives the Fiat-Shamir challenge prime `l` from `x` and `y`.
///
/// The digest of `x ‖ 0x01 ‖ y` (fixed-width operands) seeds a 256-bit
/// candidate with the top bit set and made odd; the candidate is then
/// stepped by two until Miller-Rabin accepts it. Fully deterministic, so
/// prover and verifier always agree on `l`.
pub fn hash_to_prime(x: &BigUint, y: &BigUint) -> BigUint {
    let mut buf = Vec::with_capacity(2 * OPERAND_WIDTH + 1);
    buf.extend_from_slice(&fixed_width_be(x, OPERAND_WIDTH));
    buf.push(DOMAIN_SEPARATOR);
    buf.extend_from_slice(&fixed_width_be(y, OPERAND_WIDTH));

    let digest = Sha256::digest(&buf);
    let mut candidate = BigUint::from_bytes_be(&digest);
    candidate |= BigUint::one() << 255usize;
    candidate |= BigUint::one();

    while !is_probable_prime(&candidate, MILLER_RABIN_ROUNDS) {
        candidate += 2u32;
    }
    candidate
}

/// Serializes a big integer as a left-padded big-endian buffer.
pub fn fixed_width_be(value: &BigUint, width: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= width {
        return bytes[bytes.len() - width..].to_vec();
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

/// Miller-Rabin primality test over fixed deterministic witnesses.
///
/// `rounds` selects how many of the witness primes are consulted, capped
/// at the table size.
pub fn is_probable_prime(n: &BigUint, rounds: usize) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);

    if *n <= one {
        return false;
    }
    if *n == two || *n == BigUint::from(3u32) {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // Write n - 1 as 2^s * d with d odd.
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut s = 0u32;
    while d.is_even() {
        d >>= 1u32;
        s += 1;
    }

    'witness: for &w in WITNESSES.iter().take(rounds.min(WITNESSES.len())) {
        let a = BigUint::from(w) % n;
        if a <= one || a == n_minus_1 {
            continue;
        }

        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue;
        }

        for _ in 0..s.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}
