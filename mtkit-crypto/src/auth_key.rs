//! `AuthKey`: the 256-byte shared secret produced by the DH handshake.

use crate::sha1;

/// An authorization key plus its derived identifiers.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Construct from raw 256-byte DH output.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Like [`from_bytes`](Self::from_bytes) for a slice that must be 256 bytes long.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        <[u8; 256]>::try_from(data).ok().map(Self::from_bytes)
    }

    /// Return the raw 256-byte representation.
    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    /// The 8-byte key identifier carried in front of every encrypted frame:
    /// the low 64 bits of SHA-1(key), i.e. `SHA-1(key)[12..20]`.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// `SHA-1(key)[0..8]`, mixed into the handshake confirmation hash.
    pub fn aux_hash(&self) -> [u8; 8] { self.aux_hash }

    /// Hash the server must echo in `dh_gen_ok` (`number = 1`),
    /// `dh_gen_retry` (2) or `dh_gen_fail` (3).
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={})", i64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_come_from_sha1() {
        let key = AuthKey::from_bytes(std::array::from_fn(|i| i as u8));
        assert_eq!(hex::encode(key.key_id()), "32d1586ea457dfc8");
        let sha = sha1!(&key.to_bytes());
        assert_eq!(key.aux_hash(), sha[..8]);
        assert_eq!(key.key_id(), sha[12..20]);
        assert_ne!(key.key_id(), key.aux_hash());

        let key = AuthKey::from_bytes([0x42; 256]);
        assert_eq!(hex::encode(key.key_id()), "aed0b389ef202cf7");
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(AuthKey::from_slice(&[0u8; 255]).is_none());
        assert!(AuthKey::from_slice(&[0u8; 256]).is_some());
    }

    #[test]
    fn debug_hides_key_material() {
        let key = AuthKey::from_bytes([7; 256]);
        let shown = format!("{key:?}");
        assert!(shown.starts_with("AuthKey(id="));
        assert!(!shown.contains("7, 7"));
    }
}
