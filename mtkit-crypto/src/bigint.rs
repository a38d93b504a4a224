//! Big-integer helpers for the Diffie-Hellman step.
//!
//! The server picks `g` and `dh_prime`; before using them the client checks
//! that the prime is a 2048-bit safe prime, that `g` generates the
//! quadratic-residue subgroup, and that every exchanged power sits well
//! inside `(1, p-1)`.

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::sha256;

/// The 2048-bit safe prime servers hand out in practice (`g` = 3).
///
/// Parameters equal to it skip the primality test.
pub const KNOWN_DH_PRIME: &str = "\
    C71CAEB9C6B1C9048E6C522F70F13F73980D40238E3E21C14934D037563D930F\
    48198A0AA7C14058229493D22530F4DBFA336F6E0AC925139543AED44CCE7C37\
    20FD51F69458705AC68CD4FE6B6B13ABDC9746512969328454F18FAF8C595F64\
    2477FE96BB2A941D5BCD1D4AC8CC49880708FA9B378E3C4F3A9060BEE67CF9A4\
    A4A695811051907E162753B56B0F6B410DBA74D8A84B2A14B3144E0EF1284754\
    FD17ED950D5965B4B9DD46582DB1178D169C6BC465B0D6FF9CA3928FEF5B9AE4\
    E418FC15E83EBEA0F87FA9FF5EED70050DED2849F47BF959D956850CE929851F\
    0D8115F635B105EE2E4E15D04B2454BF6F4FADF034B10403119CD8E3B92FCC5B";

/// Required size of `dh_prime`.
pub const DH_PRIME_BITS: u64 = 2048;

/// Miller-Rabin rounds used on each half of the safe-prime test.
pub const PRIMALITY_ROUNDS: usize = 64;

const SMALL_PRIMES: [u32; 30] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113,
];

/// Which exchanged value failed a range check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DhValue {
    G,
    GA,
    GB,
}

/// Reasons to refuse server-supplied DH parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DhError {
    /// `dh_prime` is not exactly 2048 bits.
    PrimeSize { bits: u64 },
    /// `dh_prime` or `(dh_prime - 1) / 2` is composite.
    NotSafePrime,
    /// `g` is outside `2..=7`.
    InvalidGenerator { g: i64 },
    /// `g` does not generate the quadratic-residue subgroup of this prime.
    GeneratorNotResidue { g: u32 },
    /// A value is outside `(1, p-1)` or too close to either end.
    OutOfRange(DhValue),
}

impl fmt::Display for DhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimeSize { bits } => write!(f, "dh_prime has {bits} bits, expected {DH_PRIME_BITS}"),
            Self::NotSafePrime => write!(f, "dh_prime is not a safe prime"),
            Self::InvalidGenerator { g } => write!(f, "generator {g} not in 2..=7"),
            Self::GeneratorNotResidue { g } => write!(f, "generator {g} is not a quadratic residue"),
            Self::OutOfRange(v) => write!(f, "{v:?} outside the safe range"),
        }
    }
}

impl std::error::Error for DhError {}

/// Big-endian bytes of `value`, left-padded with zeros to `len`.
pub fn be_bytes_padded(value: &BigUint, len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= len {
        return bytes;
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

/// The well-known prime as a number.
pub fn known_dh_prime() -> BigUint {
    let digits: Vec<u8> = KNOWN_DH_PRIME.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    BigUint::parse_bytes(&digits, 16).unwrap_or_default()
}

/// Miller-Rabin with `rounds` witnesses derived from `n` by hashing, so the
/// result is reproducible and the witnesses are not chosen by whoever picked `n`.
pub fn is_probable_prime(n: &BigUint, rounds: usize) -> bool {
    for p in SMALL_PRIMES {
        if *n == BigUint::from(p) {
            return true;
        }
        if (n % p).is_zero() {
            return false;
        }
    }
    if *n < BigUint::from(113u32 * 113) {
        // No factor up to 113 and below its square: prime unless 0 or 1.
        return *n > BigUint::one();
    }

    let n_minus_1 = n - 1u32;
    let s = n_minus_1.trailing_zeros().unwrap_or(0);
    let d = &n_minus_1 >> s;
    let span = n - 3u32;
    let seed = n.to_bytes_be();

    'witness: for round in 0..rounds as u32 {
        let a = BigUint::from_bytes_be(&sha256!(&seed, round.to_le_bytes())) % &span + 2u32;
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_1 {
            continue;
        }
        for _ in 1..s {
            x = &x * &x % n;
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// `p` and `(p - 1) / 2` both probably prime.
pub fn is_safe_prime(p: &BigUint, rounds: usize) -> bool {
    if p.bits() < 3 {
        return false;
    }
    let half: BigUint = (p - 1u32) >> 1u32;
    is_probable_prime(p, rounds) && is_probable_prime(&half, rounds)
}

/// Whether `g` generates the subgroup of quadratic residues modulo the safe prime `p`.
pub fn generator_is_residue(g: u32, p: &BigUint) -> bool {
    let rem = |m: u32| (p % m).to_u32().unwrap_or(0);
    match g {
        2 => rem(8) == 7,
        3 => rem(3) == 2,
        4 => true,
        5 => matches!(rem(5), 1 | 4),
        6 => matches!(rem(24), 19 | 23),
        7 => matches!(rem(7), 3 | 5 | 6),
        _ => false,
    }
}

/// Validate `dh_prime` and `g` as received from the server.
pub fn check_dh_prime(p: &BigUint, g: i64) -> Result<(), DhError> {
    if p.bits() != DH_PRIME_BITS {
        return Err(DhError::PrimeSize { bits: p.bits() });
    }
    let g = match u32::try_from(g) {
        Ok(g @ 2..=7) => g,
        _ => return Err(DhError::InvalidGenerator { g }),
    };
    if !generator_is_residue(g, p) {
        return Err(DhError::GeneratorNotResidue { g });
    }
    if *p != known_dh_prime() && !is_safe_prime(p, PRIMALITY_ROUNDS) {
        return Err(DhError::NotSafePrime);
    }
    Ok(())
}

/// `1 < value < p - 1`.
pub fn in_open_range(value: &BigUint, p: &BigUint) -> bool {
    *value > BigUint::one() && *value < p - 1u32
}

/// `2^(2048-64) < value < p - 2^(2048-64)`.
pub fn in_safety_range(value: &BigUint, p: &BigUint) -> bool {
    let margin = BigUint::one() << (DH_PRIME_BITS - 64);
    if *p <= margin {
        return false;
    }
    *value > margin && *value < p - &margin
}

/// Range checks on the exchanged values: all three in `(1, p-1)`, the two
/// powers additionally at least 2^1984 away from either end.
pub fn check_dh_values(g: &BigUint, g_a: &BigUint, g_b: &BigUint, p: &BigUint) -> Result<(), DhError> {
    for (value, which) in [(g, DhValue::G), (g_a, DhValue::GA), (g_b, DhValue::GB)] {
        if !in_open_range(value, p) {
            return Err(DhError::OutOfRange(which));
        }
    }
    for (value, which) in [(g_a, DhValue::GA), (g_b, DhValue::GB)] {
        if !in_safety_range(value, p) {
            return Err(DhError::OutOfRange(which));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prime_parses_to_2048_bits() {
        let p = known_dh_prime();
        assert_eq!(p.bits(), 2048);
        assert!(generator_is_residue(3, &p));
        assert!(!generator_is_residue(2, &p));
        assert!(check_dh_prime(&p, 3).is_ok());
    }

    #[test]
    fn small_primes_and_composites() {
        let primes = [2u32, 5, 113, 127, 7919, 104729];
        for p in primes {
            assert!(is_probable_prime(&BigUint::from(p), 16), "{p}");
        }
        for c in [0u32, 1, 4, 121, 561, 7917, 1_000_001] {
            assert!(!is_probable_prime(&BigUint::from(c), 16), "{c}");
        }
    }

    #[test]
    fn safe_primes() {
        for p in [23u32, 47, 59, 83, 107, 167, 179, 227, 263, 1019] {
            assert!(is_safe_prime(&BigUint::from(p), 16), "{p}");
        }
        // 29 is prime but 14 is not.
        assert!(!is_safe_prime(&BigUint::from(29u32), 16));
    }

    #[test]
    fn wrong_size_rejected_before_anything_else() {
        let small = BigUint::from(1019u32);
        assert_eq!(check_dh_prime(&small, 3), Err(DhError::PrimeSize { bits: 10 }));
    }

    #[test]
    fn generator_outside_table() {
        let p = known_dh_prime();
        for g in [-1, 0, 1, 8, 1 << 40] {
            assert_eq!(check_dh_prime(&p, g), Err(DhError::InvalidGenerator { g }));
        }
        assert_eq!(check_dh_prime(&p, 5), Err(DhError::GeneratorNotResidue { g: 5 }));
    }

    #[test]
    fn composite_2048_bit_rejected() {
        // Same size, residue table still satisfied for g = 4, but even.
        let p = known_dh_prime() + 1u32;
        assert_eq!(check_dh_prime(&p, 4), Err(DhError::NotSafePrime));
    }

    #[test]
    fn range_edges() {
        let p = known_dh_prime();
        let one = BigUint::one();
        let mid = BigUint::one() << 2000u32;
        let low_edge = BigUint::one() << 1984u32;

        assert!(!in_open_range(&one, &p));
        assert!(!in_open_range(&(&p - 1u32), &p));
        assert!(in_open_range(&BigUint::from(2u32), &p));

        assert!(in_safety_range(&mid, &p));
        assert!(!in_safety_range(&low_edge, &p));
        assert!(in_safety_range(&(&low_edge + 1u32), &p));
        assert!(!in_safety_range(&(&p - &low_edge), &p));

        let g = BigUint::from(3u32);
        assert_eq!(check_dh_values(&g, &mid, &mid, &p), Ok(()));
        assert_eq!(check_dh_values(&g, &mid, &BigUint::from(5u32), &p), Err(DhError::OutOfRange(DhValue::GB)));
        assert_eq!(check_dh_values(&one, &mid, &mid, &p), Err(DhError::OutOfRange(DhValue::G)));
        assert_eq!(check_dh_values(&g, &p, &mid, &p), Err(DhError::OutOfRange(DhValue::GA)));
    }

    #[test]
    fn padded_bytes() {
        assert_eq!(be_bytes_padded(&BigUint::from(0x0102u32), 4), vec![0, 0, 1, 2]);
        assert_eq!(be_bytes_padded(&BigUint::from(0x0102u32), 1), vec![1, 2]);
    }
}
