//! Stream framing.
//!
//! A [`Framing`] turns whole MTProto packets into bytes for a stream
//! connection and cuts an inbound byte stream back into packets. It does no
//! I/O itself: callers append whatever they read to a buffer and call
//! [`Framing::decode`] until it returns `None`.

use std::fmt;

/// Upper bound on one packet in either direction.
pub const MAX_FRAME_LEN: usize = 1 << 24;

/// One unit read off the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Packet(Vec<u8>),
    /// A 4-byte negative value the server sends instead of a packet
    /// (e.g. -404 unknown key, -429 flood).
    TransportError(i32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Outbound payload not a multiple of 4 bytes.
    Unaligned { len: usize },
    /// Payload or length prefix beyond [`MAX_FRAME_LEN`].
    TooLarge { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unaligned { len } => write!(f, "payload of {len} bytes is not 4-byte aligned"),
            Self::TooLarge { len } => write!(f, "frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A packet framing over a reliable byte stream.
pub trait Framing: Send {
    /// Bytes sent once when the connection opens.
    fn init(&self) -> &'static [u8];

    /// Append `payload` with its length header to `out`.
    fn encode(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError>;

    /// Cut one frame off the front of `buf`. `Ok(None)` means more bytes
    /// are needed; `buf` is left untouched in that case.
    fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<Frame>, FrameError>;
}

fn check_outbound(payload: &[u8]) -> Result<(), FrameError> {
    if payload.len() % 4 != 0 {
        return Err(FrameError::Unaligned { len: payload.len() });
    }
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len: payload.len() });
    }
    Ok(())
}

fn take_frame(buf: &mut Vec<u8>, header: usize, len: usize) -> Result<Option<Frame>, FrameError> {
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len });
    }
    if buf.len() < header + len {
        return Ok(None);
    }
    let payload: Vec<u8> = buf.drain(..header + len).skip(header).collect();
    if payload.len() == 4 {
        let code = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if code < 0 {
            return Ok(Some(Frame::TransportError(code)));
        }
    }
    Ok(Some(Frame::Packet(payload)))
}

// ─── Intermediate ─────────────────────────────────────────────────────────────

/// `0xeeeeeeee` once, then `[len: u32 LE][payload]` per packet.
#[derive(Clone, Copy, Debug, Default)]
pub struct Intermediate;

impl Framing for Intermediate {
    fn init(&self) -> &'static [u8] {
        &[0xee, 0xee, 0xee, 0xee]
    }

    fn encode(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
        check_outbound(payload)?;
        out.extend((payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        Ok(())
    }

    fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<Frame>, FrameError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        take_frame(buf, 4, len)
    }
}

// ─── Abridged ────────────────────────────────────────────────────────────────

/// [MTProto Abridged] framing: `0xef` once, then per packet the length in
/// 4-byte words, one byte when below 127, otherwise `0x7f` followed by
/// three little-endian bytes.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
#[derive(Clone, Copy, Debug, Default)]
pub struct Abridged;

impl Framing for Abridged {
    fn init(&self) -> &'static [u8] {
        &[0xef]
    }

    fn encode(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
        check_outbound(payload)?;
        let words = payload.len() / 4;
        if words < 0x7f {
            out.push(words as u8);
        } else {
            out.push(0x7f);
            out.extend_from_slice(&(words as u32).to_le_bytes()[..3]);
        }
        out.extend_from_slice(payload);
        Ok(())
    }

    fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<Frame>, FrameError> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first < 0x7f {
            return take_frame(buf, 1, first as usize * 4);
        }
        if buf.len() < 4 {
            return Ok(None);
        }
        let words = u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize;
        take_frame(buf, 4, words * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(framing: &dyn Framing, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        framing.encode(payload, &mut out).unwrap();
        out
    }

    #[test]
    fn intermediate_prefix() {
        let wire = round(&Intermediate, &[1, 2, 3, 4]);
        assert_eq!(wire, [4, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(Intermediate.init(), &[0xeeu8; 4]);
    }

    #[test]
    fn abridged_short_and_long_headers() {
        let short = round(&Abridged, &[0; 8]);
        assert_eq!(short[0], 2);
        assert_eq!(short.len(), 9);

        let long = round(&Abridged, &[0; 127 * 4]);
        assert_eq!(&long[..4], &[0x7f, 127, 0, 0]);
        assert_eq!(long.len(), 4 + 127 * 4);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let payload = vec![0u8; MAX_FRAME_LEN + 4];
        for framing in [&Intermediate as &dyn Framing, &Abridged] {
            let mut out = Vec::new();
            assert_eq!(framing.encode(&payload, &mut out), Err(FrameError::TooLarge { len: MAX_FRAME_LEN + 4 }));
            assert!(out.is_empty());
        }
        assert!(Abridged.encode(&payload[..MAX_FRAME_LEN], &mut Vec::new()).is_ok());
    }

    #[test]
    fn decode_waits_for_whole_frame() {
        for framing in [&Intermediate as &dyn Framing, &Abridged] {
            let payload: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
            let wire = round(framing, &payload);
            let mut buf = Vec::new();
            for chunk in wire.chunks(7) {
                assert_eq!(framing.decode(&mut buf).unwrap(), None);
                buf.extend_from_slice(chunk);
            }
            assert_eq!(framing.decode(&mut buf).unwrap(), Some(Frame::Packet(payload)));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = round(&Intermediate, &[1; 4]);
        buf.extend(round(&Intermediate, &[2; 8]));
        assert_eq!(Intermediate.decode(&mut buf).unwrap(), Some(Frame::Packet(vec![1; 4])));
        assert_eq!(Intermediate.decode(&mut buf).unwrap(), Some(Frame::Packet(vec![2; 8])));
        assert_eq!(Intermediate.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn negative_word_is_a_transport_error() {
        let mut buf = round(&Abridged, &(-404i32).to_le_bytes());
        assert_eq!(Abridged.decode(&mut buf).unwrap(), Some(Frame::TransportError(-404)));
    }

    #[test]
    fn oversized_and_unaligned() {
        let mut buf = u32::MAX.to_le_bytes().to_vec();
        assert!(matches!(Intermediate.decode(&mut buf), Err(FrameError::TooLarge { .. })));
        let mut out = Vec::new();
        assert_eq!(Abridged.encode(&[1, 2, 3], &mut out), Err(FrameError::Unaligned { len: 3 }));
    }
}
