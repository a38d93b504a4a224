//! The plaintext inside every encrypted frame.
//!
//! ```text
//! salt:       i64
//! session_id: i64
//! msg_id:     i64
//! seq_no:     i32
//! msg_len:    i32
//! msg:        [u8; msg_len]
//! padding:    12..=1024 random bytes, total length a multiple of 16
//! ```

use std::fmt;

use mtkit_crypto::{DequeBuffer, RandomSource, random_vec};

use crate::message::MsgId;

pub const HEADER_LEN: usize = 32;
pub const MIN_PADDING: usize = 12;
pub const MAX_PADDING: usize = 1024;

/// Space left in front of an encoded envelope for `key_id ‖ msg_key`.
const FRAME_HEADER_LEN: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Shorter than the fixed header plus minimum padding.
    TooShort { len: usize },
    /// Total length is not a multiple of 16.
    Misaligned { len: usize },
    /// `msg_len` does not fit the frame or is not a multiple of 4.
    BadLength { declared: i64, len: usize },
    /// Padding outside `12..=1024` bytes.
    BadPadding { padding: usize },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "envelope of {len} bytes is too short"),
            Self::Misaligned { len } => write!(f, "envelope length {len} is not a multiple of 16"),
            Self::BadLength { declared, len } => write!(f, "msg_len {declared} invalid for a {len}-byte envelope"),
            Self::BadPadding { padding } => write!(f, "{padding} bytes of padding outside 12..=1024"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// One message as carried inside an encrypted frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: MsgId,
    pub seq_no: i32,
    pub body: Vec<u8>,
}

/// Smallest padding that brings `HEADER_LEN + body_len` to a multiple of 16
/// while staying at or above [`MIN_PADDING`].
pub fn padding_len(body_len: usize) -> usize {
    let unpadded = HEADER_LEN + body_len + MIN_PADDING;
    MIN_PADDING + (16 - unpadded % 16) % 16
}

impl Envelope {
    /// Serialize with fresh random padding, leaving room in front for the
    /// encrypted-frame header.
    pub fn encode(&self, rng: &mut impl RandomSource) -> Result<DequeBuffer, getrandom::Error> {
        let padding = random_vec(rng, padding_len(self.body.len()))?;
        Ok(self.encode_with_padding(&padding))
    }

    /// Serialize with caller-chosen padding. The caller is responsible for
    /// the length rules; [`Envelope::decode`] will reject what breaks them.
    pub fn encode_with_padding(&self, padding: &[u8]) -> DequeBuffer {
        let mut buf = DequeBuffer::with_capacity(HEADER_LEN + self.body.len() + padding.len(), FRAME_HEADER_LEN);
        buf.extend(self.salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(self.msg_id.0.to_le_bytes());
        buf.extend(self.seq_no.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(self.body.iter().copied());
        buf.extend(padding.iter().copied());
        buf
    }

    /// Parse and validate a decrypted envelope.
    pub fn decode(plain: &[u8]) -> Result<Self, EnvelopeError> {
        let len = plain.len();
        if len < HEADER_LEN + MIN_PADDING {
            return Err(EnvelopeError::TooShort { len });
        }
        if len % 16 != 0 {
            return Err(EnvelopeError::Misaligned { len });
        }

        let read_i64 = |at: usize| i64::from_le_bytes(plain[at..at + 8].try_into().unwrap());
        let declared = i32::from_le_bytes(plain[28..32].try_into().unwrap());
        let body_len = usize::try_from(declared)
            .ok()
            .filter(|&n| n % 4 == 0 && HEADER_LEN + n <= len)
            .ok_or(EnvelopeError::BadLength { declared: declared as i64, len })?;

        let padding = len - HEADER_LEN - body_len;
        if !(MIN_PADDING..=MAX_PADDING).contains(&padding) {
            return Err(EnvelopeError::BadPadding { padding });
        }

        Ok(Self {
            salt: read_i64(0),
            session_id: read_i64(8),
            msg_id: MsgId(read_i64(16)),
            seq_no: i32::from_le_bytes(plain[24..28].try_into().unwrap()),
            body: plain[HEADER_LEN..HEADER_LEN + body_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtkit_crypto::SystemRandom;

    fn envelope(body_len: usize) -> Envelope {
        Envelope { salt: -3, session_id: 77, msg_id: MsgId(1 << 34), seq_no: 5, body: vec![0x5a; body_len] }
    }

    #[test]
    fn padding_is_minimal_and_aligned() {
        for body_len in (0..200).step_by(4) {
            let pad = padding_len(body_len);
            assert!((12..28).contains(&pad), "{body_len}: {pad}");
            assert_eq!((HEADER_LEN + body_len + pad) % 16, 0);
        }
    }

    #[test]
    fn encode_then_decode() {
        let env = envelope(36);
        let buf = env.encode(&mut SystemRandom).unwrap();
        assert_eq!(buf.len() % 16, 0);
        assert_eq!(Envelope::decode(buf.as_ref()).unwrap(), env);
    }

    #[test]
    fn rejects_short_and_misaligned() {
        assert_eq!(Envelope::decode(&[0; 40]), Err(EnvelopeError::TooShort { len: 40 }));
        let buf = envelope(4).encode_with_padding(&[0; 13]);
        assert_eq!(Envelope::decode(buf.as_ref()), Err(EnvelopeError::Misaligned { len: 49 }));
    }

    #[test]
    fn rejects_padding_outside_bounds() {
        // 32 + 8 + 8 = 48: aligned, but only 8 bytes of padding.
        let buf = envelope(8).encode_with_padding(&[0; 8]);
        assert_eq!(Envelope::decode(buf.as_ref()), Err(EnvelopeError::BadPadding { padding: 8 }));

        let buf = envelope(0).encode_with_padding(&[0; 1040]);
        assert_eq!(Envelope::decode(buf.as_ref()), Err(EnvelopeError::BadPadding { padding: 1040 }));
    }

    #[test]
    fn rejects_lying_length() {
        let mut plain = envelope(16).encode_with_padding(&[0; 16]).into_vec();
        plain[28..32].copy_from_slice(&100i32.to_le_bytes());
        assert_eq!(Envelope::decode(&plain), Err(EnvelopeError::BadLength { declared: 100, len: 64 }));
        plain[28..32].copy_from_slice(&(-4i32).to_le_bytes());
        assert_eq!(Envelope::decode(&plain), Err(EnvelopeError::BadLength { declared: -4, len: 64 }));
        plain[28..32].copy_from_slice(&6i32.to_le_bytes());
        assert_eq!(Envelope::decode(&plain), Err(EnvelopeError::BadLength { declared: 6, len: 64 }));
    }
}
