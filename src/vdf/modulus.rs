use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;

use crate::vdf::VdfError;

/// RSA-2048 modulus from the RSA Factoring Challenge. No factorization is
/// known, so the order of the multiplicative group is unknown.
pub const RSA_2048_MODULUS_HEX: &str = "c7970ceedcc3b0754490201a7aa613cd73911081c790f5f1a8726f463550bb5b7ff0db8e1ea1189ec72f93d1650011bd721aeeacc2acde32a04107f0648c2813a31f5b0b7765ff8b44b4b6ffc93384b646eb09c7cf5e8592d40ea33c80039f35b4f14a04b51f7bfd781be4d1673164ba8eb991c2c4d730bbbe35f592bdef524af7e8daefd26c66fc02c479af89d64d373f442709439de66ceb955f3ea37d5159f6135809f85334b5cb1813addc80cd05609f10ac6a95ad65872c909525bdad32bc729592642920f24c61dc5b3c3b7923e56b16a4d9d373d8721f24a3fc0f1b3131f55615172866bccc30f95054c824e733a5eb6817f7bc16399d48c6361cc7e5";

/// Minimum modulus width accepted by [`parse_modulus`].
pub const MIN_MODULUS_BITS: u64 = 1024;

/// Parses a hex string into an unsigned big integer.
///
/// Accepts the crate-wide hex convention: lowercase (upper tolerated on
/// input), no `0x` prefix.
pub fn parse_hex(field: &'static str, value: &str) -> Result<BigUint, VdfError> {
    if value.is_empty() {
        return Err(VdfError::InvalidHex(field));
    }
    BigUint::parse_bytes(value.as_bytes(), 16).ok_or(VdfError::InvalidHex(field))
}

/// Serializes a big integer as lowercase hex with no leading zeros.
/// Zero itself renders as `"0"`.
pub fn to_hex(value: &BigUint) -> String {
    value.to_str_radix(16)
}

/// Parses and validates a caller-supplied modulus.
pub fn parse_modulus(value: &str) -> Result<BigUint, VdfError> {
    let modulus = parse_hex("modulus", value)?;
    if modulus.is_zero() {
        return Err(VdfError::ZeroModulus);
    }
    if modulus.is_even() || modulus.bits() < MIN_MODULUS_BITS {
        return Err(VdfError::InvalidModulus {
            min: MIN_MODULUS_BITS,
            got: modulus.bits(),
        });
    }
    Ok(modulus)
}
