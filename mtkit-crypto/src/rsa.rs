//! RSA with the key-exchange padding scheme (RSA_PAD).
//!
//! ```text
//! data_with_padding = data ‖ random            (192 bytes)
//! data_with_hash    = reverse(data_with_padding) ‖ SHA256(temp_key ‖ data_with_padding)
//! aes_encrypted     = AES256-IGE(data_with_hash, temp_key, iv = 0)
//! key_aes_encrypted = (temp_key ⊕ SHA256(aes_encrypted)) ‖ aes_encrypted
//! ```
//!
//! `key_aes_encrypted` must be smaller than the modulus; otherwise a fresh
//! `temp_key` is drawn and the block rebuilt.

use std::fmt;

use mtkit_tl::Serializable;
use num_bigint::BigUint;

use crate::bigint::be_bytes_padded;
use crate::random::{RandomSource, random_array, random_vec};
use crate::{aes, sha1, sha256};

/// Largest payload RSA_PAD accepts.
pub const MAX_PAYLOAD: usize = 144;
const PADDED_LEN: usize = 192;
const BLOCK_LEN: usize = 256;
const MAX_ATTEMPTS: usize = 64;

#[derive(Clone, Debug)]
pub enum RsaError {
    /// Payload longer than [`MAX_PAYLOAD`].
    PayloadTooLarge { len: usize },
    /// The random source failed.
    Random(getrandom::Error),
    /// No candidate below the modulus after repeated draws.
    NoCandidate,
    /// Ciphertext block is not a valid value for this key.
    InvalidBlock,
    /// The embedded SHA-256 does not match the recovered payload.
    HashMismatch,
}

impl fmt::Display for RsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len } => write!(f, "RSA_PAD payload of {len} bytes exceeds {MAX_PAYLOAD}"),
            Self::Random(e) => write!(f, "random source failed: {e}"),
            Self::NoCandidate => write!(f, "no padded block below the modulus"),
            Self::InvalidBlock => write!(f, "ciphertext block out of range"),
            Self::HashMismatch => write!(f, "RSA_PAD hash mismatch"),
        }
    }
}

impl std::error::Error for RsaError {}

impl From<getrandom::Error> for RsaError {
    fn from(e: getrandom::Error) -> Self { Self::Random(e) }
}

// ─── Public key ──────────────────────────────────────────────────────────────

/// An RSA public key `(n, e)` with its precomputed fingerprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    n: BigUint,
    e: BigUint,
    fingerprint: i64,
}

impl PublicKey {
    pub fn new(n: BigUint, e: BigUint) -> Self {
        let fingerprint = fingerprint_of(&n, &e);
        Self { n, e, fingerprint }
    }

    /// Parse decimal `n` and `e` strings.
    pub fn from_decimal(n: &str, e: &str) -> Option<Self> {
        Some(Self::new(
            BigUint::parse_bytes(n.as_bytes(), 10)?,
            BigUint::parse_bytes(e.as_bytes(), 10)?,
        ))
    }

    /// Build from big-endian modulus and exponent bytes.
    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> Self {
        Self::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
    }

    /// `SHA1(bytes(n) ‖ bytes(e))[12..20]` as a little-endian `i64`, both
    /// numbers TL-serialized as byte strings.
    pub fn fingerprint(&self) -> i64 { self.fingerprint }

    pub fn modulus(&self) -> &BigUint { &self.n }

    pub fn exponent(&self) -> &BigUint { &self.e }

    /// `value^e mod n`, left-padded to 256 bytes.
    fn raw_encrypt(&self, value: &BigUint) -> Vec<u8> {
        be_bytes_padded(&value.modpow(&self.e, &self.n), BLOCK_LEN)
    }
}

fn fingerprint_of(n: &BigUint, e: &BigUint) -> i64 {
    let mut buf = Vec::new();
    n.to_bytes_be().serialize(&mut buf);
    e.to_bytes_be().serialize(&mut buf);
    let sha = sha1!(&buf);
    let mut id = [0u8; 8];
    id.copy_from_slice(&sha[12..20]);
    i64::from_le_bytes(id)
}

const PRODUCTION_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";
const TEST_SERVER_N: &str = "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949";

impl PublicKey {
    /// Production server key, fingerprint -3414540481677951611.
    pub fn production() -> Option<Self> {
        Self::from_decimal(PRODUCTION_N, "65537")
    }

    /// Test server key, fingerprint -5595554452916591101.
    pub fn test_server() -> Option<Self> {
        Self::from_decimal(TEST_SERVER_N, "65537")
    }
}

/// [`PublicKey::production`] and [`PublicKey::test_server`].
pub fn well_known_keys() -> Vec<PublicKey> {
    [PublicKey::production(), PublicKey::test_server()].into_iter().flatten().collect()
}

/// First key in `keys` whose fingerprint appears in `fingerprints`.
pub fn find_key<'a>(keys: &'a [PublicKey], fingerprints: &[i64]) -> Option<&'a PublicKey> {
    keys.iter().find(|k| fingerprints.contains(&k.fingerprint))
}

/// RSA-encrypt `data` using RSA_PAD.
pub fn encrypt_hashed(
    data: &[u8],
    key: &PublicKey,
    rng: &mut impl RandomSource,
) -> Result<Vec<u8>, RsaError> {
    if data.len() > MAX_PAYLOAD {
        return Err(RsaError::PayloadTooLarge { len: data.len() });
    }

    let mut data_with_padding = Vec::with_capacity(PADDED_LEN);
    data_with_padding.extend_from_slice(data);
    data_with_padding.extend(random_vec(rng, PADDED_LEN - data.len())?);

    let data_pad_reversed: Vec<u8> = data_with_padding.iter().rev().copied().collect();

    for _ in 0..MAX_ATTEMPTS {
        let temp_key: [u8; 32] = random_array(rng)?;

        let mut aes_encrypted = Vec::with_capacity(PADDED_LEN + 32);
        aes_encrypted.extend_from_slice(&data_pad_reversed);
        aes_encrypted.extend_from_slice(&sha256!(&temp_key, &data_with_padding));
        aes::ige_encrypt(&mut aes_encrypted, &temp_key, &[0u8; 32]);

        let hash = sha256!(&aes_encrypted);
        let mut candidate = Vec::with_capacity(BLOCK_LEN);
        candidate.extend(temp_key.iter().zip(hash).map(|(k, h)| k ^ h));
        candidate.extend_from_slice(&aes_encrypted);

        let value = BigUint::from_bytes_be(&candidate);
        if value < key.n {
            return Ok(key.raw_encrypt(&value));
        }
    }
    Err(RsaError::NoCandidate)
}

// ─── Private key ─────────────────────────────────────────────────────────────

/// The server half of RSA_PAD. Clients never hold one; it exists so the
/// padding can be checked end to end and a handshake can be scripted.
#[derive(Clone, Debug)]
pub struct PrivateKey {
    public: PublicKey,
    d: BigUint,
}

impl PrivateKey {
    pub fn new(public: PublicKey, d: BigUint) -> Self {
        Self { public, d }
    }

    pub fn from_be_bytes(n: &[u8], e: &[u8], d: &[u8]) -> Self {
        Self::new(PublicKey::from_be_bytes(n, e), BigUint::from_bytes_be(d))
    }

    pub fn public_key(&self) -> &PublicKey { &self.public }

    /// Undo [`encrypt_hashed`]. Returns the 192-byte padded payload; the
    /// caller's decoder knows where the payload ends.
    pub fn decrypt_hashed(&self, block: &[u8]) -> Result<Vec<u8>, RsaError> {
        let value = BigUint::from_bytes_be(block);
        if block.len() != BLOCK_LEN || value >= self.public.n {
            return Err(RsaError::InvalidBlock);
        }
        let plain = be_bytes_padded(&value.modpow(&self.d, &self.public.n), BLOCK_LEN);
        if plain.len() != BLOCK_LEN {
            return Err(RsaError::InvalidBlock);
        }

        let (key_xor, encrypted) = plain.split_at(32);
        let hash = sha256!(encrypted);
        let mut temp_key = [0u8; 32];
        for (t, (k, h)) in temp_key.iter_mut().zip(key_xor.iter().zip(hash)) {
            *t = k ^ h;
        }

        let mut data_with_hash = encrypted.to_vec();
        aes::ige_decrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        let (reversed, digest) = data_with_hash.split_at(PADDED_LEN);
        let data_with_padding: Vec<u8> = reversed.iter().rev().copied().collect();
        if sha256!(&temp_key, &data_with_padding)[..] != *digest {
            return Err(RsaError::HashMismatch);
        }
        Ok(data_with_padding)
    }
}
