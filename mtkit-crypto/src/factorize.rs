//! Pollard-rho (Brent variant) factorization for the `pq` step of key exchange.
//!
//! `pq` is a product of two primes below 2^32. Small factors are peeled off
//! by trial division; the rest goes through Brent's cycle search, restarted
//! with fresh pseudo-random parameters whenever a run degenerates.

use std::fmt;

/// Why [`factorize`] could not split its input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactorizeError {
    /// Input below 4 has no non-trivial factorization.
    TooSmall(u64),
    /// Input is itself prime.
    Prime(u64),
    /// Input splits, but not into exactly two primes.
    NotSemiprime(u64),
    /// Every restart hit its step budget.
    GaveUp(u64),
}

impl fmt::Display for FactorizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall(n) => write!(f, "{n} is too small to factor"),
            Self::Prime(n) => write!(f, "{n} is prime"),
            Self::NotSemiprime(n) => write!(f, "{n} is not a product of two primes"),
            Self::GaveUp(n) => write!(f, "failed to factor {n}"),
        }
    }
}

impl std::error::Error for FactorizeError {}

const SMALL_PRIMES: [u64; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

const MAX_RESTARTS: usize = 64;
/// Cap on the cycle length explored by one run.
const MAX_CYCLE: u64 = 1 << 24;
/// Number of steps multiplied together between gcd evaluations.
const BATCH: u64 = 128;

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 { (a, b) = (b, a % b); }
    a
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 { result = mul_mod(result, base, m); }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

/// Deterministic Miller-Rabin; these bases are exact for every `u64`.
pub fn is_prime_u64(n: u64) -> bool {
    if n < 2 { return false; }
    for p in SMALL_PRIMES {
        if n % p == 0 { return n == p; }
    }
    let (mut d, mut s) = (n - 1, 0);
    while d % 2 == 0 { d /= 2; s += 1; }

    'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 { continue; }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 { continue 'witness; }
        }
        return false;
    }
    true
}

/// splitmix64: cheap parameter generator for restarts.
struct SplitMix(u64);

impl SplitMix {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }
}

/// One Brent run from start `y` with increment `c`. `None` if it degenerates
/// (finds `n` itself) or exceeds the cycle budget.
fn brent(n: u64, mut y: u64, c: u64) -> Option<u64> {
    let step = |v: u64| ((mul_mod(v, v, n) as u128 + c as u128) % n as u128) as u64;

    let (mut r, mut q, mut g) = (1u64, 1u64, 1u64);
    let mut ys = y;
    let mut x;

    loop {
        x = y;
        for _ in 0..r { y = step(y); }
        let mut k = 0;
        while k < r && g == 1 {
            ys = y;
            for _ in 0..BATCH.min(r - k) {
                y = step(y);
                q = mul_mod(q, x.abs_diff(y), n);
            }
            g = gcd(q, n);
            k += BATCH;
        }
        r <<= 1;
        if g != 1 { break; }
        if r > MAX_CYCLE { return None; }
    }

    if g == n {
        // The batch overshot; replay it one step at a time.
        g = 1;
        for _ in 0..BATCH {
            ys = step(ys);
            g = gcd(x.abs_diff(ys), n);
            if g > 1 { break; }
        }
    }

    (g > 1 && g < n).then_some(g)
}

fn find_divisor(n: u64) -> Option<u64> {
    if let Some(&p) = SMALL_PRIMES.iter().find(|&&p| n % p == 0) {
        return Some(p);
    }
    let mut params = SplitMix(n);
    (0..MAX_RESTARTS).find_map(|_| {
        let y = params.next() % (n - 1) + 1;
        let c = params.next() % (n - 1) + 1;
        brent(n, y, c)
    })
}

/// Factorize `pq` into two prime factors `(p, q)` where `p ≤ q`.
pub fn factorize(pq: u64) -> Result<(u64, u64), FactorizeError> {
    if pq < 4 {
        return Err(FactorizeError::TooSmall(pq));
    }
    if is_prime_u64(pq) {
        return Err(FactorizeError::Prime(pq));
    }

    let d = find_divisor(pq).ok_or(FactorizeError::GaveUp(pq))?;
    let (p, q) = (d.min(pq / d), d.max(pq / d));
    if !is_prime_u64(p) || !is_prime_u64(q) {
        return Err(FactorizeError::NotSemiprime(pq));
    }
    Ok((p, q))
}
