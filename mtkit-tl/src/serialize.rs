//! The [`Serializable`] trait and its implementations for primitive TL types.
//!
//! Scalars are little-endian, booleans are reserved constructor words, byte
//! strings are length-prefixed and zero-padded to a 4-byte boundary.

use crate::{Bare, Blob, Object, RawVec, VECTOR_ID};

/// Serialize `self` into TL binary format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Convenience: allocate a fresh `Vec<u8>` and serialize into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

/// `boolTrue#997275b5`
pub const CRC_TRUE: u32 = 0x997275b5;
/// `boolFalse#bc799737`
pub const CRC_FALSE: u32 = 0xbc799737;

/// Longest byte string the 3-byte length header can describe.
pub const MAX_BYTES_LEN: usize = (1 << 24) - 1;

// ─── bool ────────────────────────────────────────────────────────────────────

impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id = if *self { CRC_TRUE } else { CRC_FALSE };
        id.serialize(buf);
    }
}

// ─── integers ────────────────────────────────────────────────────────────────

impl Serializable for i32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for u32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for i64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for f64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

// int128 / int256 travel as raw bytes, never length-prefixed.
impl Serializable for [u8; 16] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for [u8; 32] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

// ─── strings / bytes ─────────────────────────────────────────────────────────

/// Number of bytes a TL byte string of `len` payload bytes occupies on the wire.
pub fn bytes_encoded_len(len: usize) -> usize {
    let header = if len < 254 { 1 } else { 4 };
    (header + len).div_ceil(4) * 4
}

/// TL string encoding: a length-prefixed, 4-byte aligned byte string.
///
/// * If `len < 254`: `[len as u8][data][0-padding to align to 4 bytes]`
/// * If `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][0-padding]`
///
/// # Panics
///
/// Panics if `len` exceeds [`MAX_BYTES_LEN`]; such a value cannot be
/// represented on the wire and is a caller bug.
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        assert!(len <= MAX_BYTES_LEN, "byte string of {len} bytes exceeds TL limit");

        let header_len = if len < 254 {
            buf.extend([len as u8]);
            1
        } else {
            buf.extend([0xfe, len as u8, (len >> 8) as u8, (len >> 16) as u8]);
            4
        };

        let padding = (4 - (header_len + len) % 4) % 4;
        buf.extend(self.iter().copied());
        buf.extend(std::iter::repeat_n(0u8, padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

impl Serializable for &str {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

// ─── vectors ─────────────────────────────────────────────────────────────────

/// Boxed `Vector<T>`, prefixed with constructor ID `0x1cb5c415`.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        VECTOR_ID.serialize(buf);
        (self.len() as i32).serialize(buf);
        for item in self { item.serialize(buf); }
    }
}

/// Bare `vector<T>`: just a count followed by items, no constructor ID.
impl<T: Serializable> Serializable for RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as i32).serialize(buf);
        for item in &self.0 { item.serialize(buf); }
    }
}

// ─── wrappers ────────────────────────────────────────────────────────────────

/// Optional parameters are handled by flags; when `Some`, serialize the value.
/// When `None`, nothing is written (the flags word already encodes absence).
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(v) = self { v.serialize(buf); }
    }
}

impl<T: Object> Serializable for Bare<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.0.serialize_bare(buf);
    }
}

/// Blobs are emitted verbatim.
impl Serializable for Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}
