//! Source of random bytes for nonces, padding and key material.
//!
//! Everything that consumes randomness takes a `&mut impl RandomSource`, so
//! tests can substitute a deterministic source and reproduce exact outputs.

/// Fills buffers with random bytes.
pub trait RandomSource {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), getrandom::Error>;
}

/// The operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), getrandom::Error> {
        getrandom::getrandom(buf)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn fill_bytes(&mut self, buf: &mut [u8]) -> Result<(), getrandom::Error> {
        (**self).fill_bytes(buf)
    }
}

/// Draw a fixed-size array.
pub fn random_array<const N: usize>(rng: &mut impl RandomSource) -> Result<[u8; N], getrandom::Error> {
    let mut out = [0u8; N];
    rng.fill_bytes(&mut out)?;
    Ok(out)
}

/// Draw `len` bytes.
pub fn random_vec(rng: &mut impl RandomSource, len: usize) -> Result<Vec<u8>, getrandom::Error> {
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out)?;
    Ok(out)
}
