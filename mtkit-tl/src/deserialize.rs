//! The [`Deserializable`] trait, [`Cursor`] buffer, and primitive impls.

use std::fmt;

use crate::serialize::{CRC_FALSE, CRC_TRUE};
use crate::{Bare, Blob, Object, RawVec, VECTOR_ID};

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur during deserialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Ran out of bytes before the type was fully read.
    UnexpectedEof,
    /// A typed decode found a different constructor than the one it expects.
    TagMismatch { expected: u32, got: u32 },
    /// A byte string's alignment padding contained non-zero bytes.
    PaddingCorrupt,
    /// A polymorphic decode found a tag nobody registered.
    ///
    /// `remaining` holds the bytes that followed the tag; the cursor itself
    /// is left positioned at the tag.
    UnknownConstructor { tag: u32, remaining: Vec<u8> },
    /// A boolean slot held something other than `boolTrue`/`boolFalse`.
    MalformedBool { got: u32 },
    /// A `string` field was not valid UTF-8.
    InvalidUtf8,
    /// A length or element count that cannot be valid (negative, reserved header byte).
    LengthOverflow,
    /// The flags word sets bits no field of the object owns.
    UnclaimedFlags { flags: u32, unclaimed: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::TagMismatch { expected, got } => {
                write!(f, "expected constructor {expected:#010x}, got {got:#010x}")
            }
            Self::PaddingCorrupt => write!(f, "non-zero padding after byte string"),
            Self::UnknownConstructor { tag, remaining } => {
                write!(f, "unknown constructor {tag:#010x} ({} bytes follow)", remaining.len())
            }
            Self::MalformedBool { got } => write!(f, "malformed bool: {got:#010x}"),
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::LengthOverflow => write!(f, "invalid length prefix"),
            Self::UnclaimedFlags { flags, unclaimed } => {
                write!(f, "flags {flags:#010x} set unknown bits {unclaimed:#010x}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for deserialization.
pub type Result<T> = std::result::Result<T, Error>;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// A zero-copy cursor over an in-memory byte slice.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize { self.pos }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] { &self.buf[self.pos..] }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        match self.buf.get(self.pos).copied() {
            Some(b) => { self.pos += 1; Ok(b) }
            None    => Err(Error::UnexpectedEof),
        }
    }

    /// Read exactly `out.len()` bytes.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let src = self.take(out.len())?;
        out.copy_from_slice(src);
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::UnexpectedEof)?;
        let slice = self.buf.get(self.pos..end).ok_or(Error::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    /// Consume all remaining bytes into `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> usize {
        let slice = self.rest();
        out.extend_from_slice(slice);
        self.pos = self.buf.len();
        slice.len()
    }

    /// Look at the next 4-byte word without consuming it.
    pub fn peek_u32(&self) -> Result<u32> {
        let word = self.buf.get(self.pos..self.pos + 4).ok_or(Error::UnexpectedEof)?;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// Build an [`Error::UnknownConstructor`] for a tag peeked at the current position.
    ///
    /// The cursor is not moved.
    pub fn unknown_constructor(&self, tag: u32) -> Error {
        let after_tag = self.buf.get(self.pos + 4..).unwrap_or_default();
        Error::UnknownConstructor { tag, remaining: after_tag.to_vec() }
    }

    /// Consume a constructor word, failing with [`Error::TagMismatch`] if it
    /// isn't `expected`.
    pub fn expect_tag(&mut self, expected: u32) -> Result<()> {
        let got = u32::deserialize(self)?;
        if got == expected { Ok(()) } else { Err(Error::TagMismatch { expected, got }) }
    }
}

/// Alias used by hand-written and macro-generated decoders.
pub type Buffer<'a, 'b> = &'a mut Cursor<'b>;

// ─── Deserializable ──────────────────────────────────────────────────────────

/// Deserialize a value from TL binary format.
pub trait Deserializable: Sized {
    /// Read `Self` from `buf`, advancing its position.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Convenience: deserialize from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::from_slice(bytes);
        Self::deserialize(&mut cursor)
    }
}

// ─── Primitives ───────────────────────────────────────────────────────────────

impl Deserializable for bool {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            CRC_TRUE => Ok(true),
            CRC_FALSE => Ok(false),
            got => Err(Error::MalformedBool { got }),
        }
    }
}

macro_rules! impl_le_scalar {
    ($($ty:ty),*) => {$(
        impl Deserializable for $ty {
            fn deserialize(buf: Buffer) -> Result<Self> {
                let mut b = [0u8; std::mem::size_of::<$ty>()];
                buf.read_exact(&mut b)?;
                Ok(<$ty>::from_le_bytes(b))
            }
        }
    )*};
}

impl_le_scalar!(i32, u32, i64, f64);

impl Deserializable for [u8; 16] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; 16];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

impl Deserializable for [u8; 32] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; 32];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

// ─── Bytes / String ───────────────────────────────────────────────────────────

impl Deserializable for Vec<u8> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let first = buf.read_byte()?;
        let (len, header_len) = match first {
            0xfe => {
                let h = buf.take(3)?;
                (h[0] as usize | (h[1] as usize) << 8 | (h[2] as usize) << 16, 4)
            }
            0xff => return Err(Error::LengthOverflow),
            n => (n as usize, 1),
        };

        let data = buf.take(len)?.to_vec();

        let padding = (4 - (header_len + len) % 4) % 4;
        if buf.take(padding)?.iter().any(|&b| b != 0) {
            return Err(Error::PaddingCorrupt);
        }

        Ok(data)
    }
}

impl Deserializable for String {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let bytes = Vec::<u8>::deserialize(buf)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

fn read_count(buf: Buffer) -> Result<usize> {
    let count = i32::deserialize(buf)?;
    let count = usize::try_from(count).map_err(|_| Error::LengthOverflow)?;
    // Every element takes at least one byte; refuse counts the input can't hold.
    if count > buf.remaining() {
        return Err(Error::UnexpectedEof);
    }
    Ok(count)
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        buf.expect_tag(VECTOR_ID)?;
        let len = read_count(buf)?;
        (0..len).map(|_| T::deserialize(buf)).collect()
    }
}

impl<T: Deserializable> Deserializable for RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = read_count(buf)?;
        let inner = (0..len).map(|_| T::deserialize(buf)).collect::<Result<_>>()?;
        Ok(RawVec(inner))
    }
}

// ─── wrappers ────────────────────────────────────────────────────────────────

impl<T: Object> Deserializable for Bare<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        T::deserialize_bare(buf).map(Bare)
    }
}

/// A blob swallows everything up to the end of the buffer.
impl Deserializable for Blob {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = Vec::with_capacity(buf.remaining());
        buf.read_to_end(&mut out);
        Ok(Blob(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_take_past_end() {
        let data = [1u8, 2, 3];
        let mut cur = Cursor::from_slice(&data);
        assert_eq!(cur.take(2).unwrap(), &[1, 2]);
        assert_eq!(cur.take(2), Err(Error::UnexpectedEof));
        assert_eq!(cur.pos(), 2);
    }

    #[test]
    fn peek_does_not_advance() {
        let data = 0xdeadbeefu32.to_le_bytes();
        let cur = Cursor::from_slice(&data);
        assert_eq!(cur.peek_u32().unwrap(), 0xdeadbeef);
        assert_eq!(cur.pos(), 0);
    }

    #[test]
    fn reserved_length_byte_rejected() {
        assert_eq!(Vec::<u8>::from_bytes(&[0xff, 0, 0, 0]), Err(Error::LengthOverflow));
    }

    #[test]
    fn negative_vector_count_rejected() {
        let mut data = VECTOR_ID.to_le_bytes().to_vec();
        data.extend((-1i32).to_le_bytes());
        assert_eq!(Vec::<i32>::from_bytes(&data), Err(Error::LengthOverflow));
    }
}
