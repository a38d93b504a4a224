//! Cryptographic primitives for MTProto.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - Pollard-rho PQ factorization
//! - RSA_PAD, the key-exchange padding scheme
//! - DH parameter and range checks
//! - `AuthKey`: 256-byte session key
//! - MTProto 2.0 message encryption / decryption for either side
//! - DH nonce → temporary key derivation

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
pub mod bigint;
mod deque_buffer;
mod factorize;
mod random;
pub mod rsa;
mod sha;

pub use auth_key::AuthKey;
pub use bigint::DhError;
pub use deque_buffer::DequeBuffer;
pub use factorize::{FactorizeError, factorize, is_prime_u64};
pub use random::{RandomSource, SystemRandom, random_array, random_vec};

#[doc(hidden)]
pub mod __private {
    pub use sha1;
    pub use sha2;
}

// ─── MTProto 2.0 encrypt / decrypt ───────────────────────────────────────────

/// Which end of the connection a frame was produced by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    /// Offset into the auth key used by the key derivation.
    pub fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

/// Errors from [`encrypt_data_v2`] and [`decrypt_data_v2`].
#[derive(Clone, Debug, PartialEq)]
pub enum CipherError {
    /// Plaintext not block-aligned, or ciphertext too short / misaligned.
    InvalidBuffer,
    /// The `auth_key_id` in the ciphertext does not match our key.
    UnknownKey,
    /// The `msg_key` in the ciphertext does not match our computed value.
    MessageKeyMismatch,
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid buffer length"),
            Self::UnknownKey => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for CipherError {}

const HEADER_LEN: usize = 24;

/// `msg_key = SHA256(auth_key[88+x .. 120+x] ‖ plaintext)[8..24]`.
pub fn calc_msg_key(auth_key: &AuthKey, plaintext: &[u8], side: Side) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

/// Derive the AES `(key, iv)` pair for a message key.
pub fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

/// Encrypt an already padded plaintext in place.
///
/// `buffer` must hold a multiple of 16 bytes. After this call it contains
/// `key_id ‖ msg_key ‖ ciphertext`, keyed for frames sent by `local`.
pub fn encrypt_data_v2(buffer: &mut DequeBuffer, auth_key: &AuthKey, local: Side) -> Result<(), CipherError> {
    if buffer.is_empty() || buffer.len() % 16 != 0 {
        return Err(CipherError::InvalidBuffer);
    }
    let msg_key = calc_msg_key(auth_key, buffer.as_ref(), local);
    let (key, iv) = calc_key(auth_key, &msg_key, local);
    aes::ige_encrypt(buffer.as_mut(), &key, &iv);

    buffer.extend_front(&msg_key);
    buffer.extend_front(&auth_key.key_id);
    Ok(())
}

/// Decrypt a frame produced by the peer of `local`.
///
/// `buffer` must start with `key_id ‖ msg_key ‖ ciphertext`. On success
/// returns the slice of `buffer` holding the plaintext.
pub fn decrypt_data_v2<'a>(buffer: &'a mut [u8], auth_key: &AuthKey, local: Side) -> Result<&'a mut [u8], CipherError> {
    if buffer.len() < HEADER_LEN + 16 || (buffer.len() - HEADER_LEN) % 16 != 0 {
        return Err(CipherError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(CipherError::UnknownKey);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..HEADER_LEN]);

    let remote = local.opposite();
    let (key, iv) = calc_key(auth_key, &msg_key, remote);
    aes::ige_decrypt(&mut buffer[HEADER_LEN..], &key, &iv);

    let ours = calc_msg_key(auth_key, &buffer[HEADER_LEN..], remote);
    if !constant_time_eq(&msg_key, &ours) {
        return Err(CipherError::MessageKeyMismatch);
    }
    Ok(&mut buffer[HEADER_LEN..])
}

/// Compare without an early exit on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Derive `(key, iv)` from nonces for `ServerDhParams.encrypted_answer`
/// and `set_client_DH_params`.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}
