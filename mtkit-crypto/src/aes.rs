//! AES-256 in IGE (Infinite Garble Extension) mode.
//!
//! The 32-byte IV is two blocks: the first stands in for the previous
//! ciphertext block, the second for the previous plaintext block.
//!
//! ```text
//! c[i] = E(p[i] ^ c[i-1]) ^ p[i-1]
//! p[i] = D(c[i] ^ p[i-1]) ^ c[i-1]
//! ```

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

fn xor_block(dst: &mut [u8; 16], src: &[u8]) {
    for (a, b) in dst.iter_mut().zip(src) { *a ^= b; }
}

fn split_iv(iv: &[u8; 32]) -> ([u8; 16], [u8; 16]) {
    let mut prev_cipher = [0u8; 16];
    let mut prev_plain = [0u8; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);
    (prev_cipher, prev_plain)
}

/// Encrypt `buffer` in place.
///
/// # Panics
///
/// Panics if `buffer.len()` is not a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(16) {
        let mut plain = [0u8; 16];
        plain.copy_from_slice(chunk);

        let mut block = plain;
        xor_block(&mut block, &prev_cipher);
        let mut ga = GenericArray::from(block);
        cipher.encrypt_block(&mut ga);
        let mut out: [u8; 16] = ga.into();
        xor_block(&mut out, &prev_plain);

        chunk.copy_from_slice(&out);
        prev_cipher = out;
        prev_plain = plain;
    }
}

/// Decrypt `buffer` in place.
///
/// # Panics
///
/// Panics if `buffer.len()` is not a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    assert_eq!(buffer.len() % 16, 0, "IGE input must be block aligned");
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let (mut prev_cipher, mut prev_plain) = split_iv(iv);

    for chunk in buffer.chunks_exact_mut(16) {
        let mut ciphertext = [0u8; 16];
        ciphertext.copy_from_slice(chunk);

        let mut block = ciphertext;
        xor_block(&mut block, &prev_plain);
        let mut ga = GenericArray::from(block);
        cipher.decrypt_block(&mut ga);
        let mut out: [u8; 16] = ga.into();
        xor_block(&mut out, &prev_cipher);

        chunk.copy_from_slice(&out);
        prev_cipher = ciphertext;
        prev_plain = out;
    }
}
