//! Message identifiers and plaintext (pre-handshake) framing.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use mtkit_crypto::Side;

/// A 64-bit MTProto message identifier.
///
/// The upper 32 bits approximate the Unix time the message was created at,
/// the lower 32 bits hold a sub-second fraction. The two lowest bits tell who
/// produced it: `0b00` for the client, `0b01` for a server response and
/// `0b11` for a message the server sent on its own.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MsgId(pub i64);

/// What kind of message a [`MsgIdGenerator`] is allocating an id for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgKind {
    /// Sent by the client.
    Client,
    /// Server answer to a client message.
    Response,
    /// Server-initiated.
    Unsolicited,
}

impl MsgKind {
    fn low_bits(self) -> i64 {
        match self {
            MsgKind::Client => 0,
            MsgKind::Response => 1,
            MsgKind::Unsolicited => 3,
        }
    }
}

impl MsgId {
    /// Seconds part of the id.
    pub fn unix_time(self) -> i64 {
        self.0 >> 32
    }

    pub fn kind(self) -> Option<MsgKind> {
        match self.0 & 3 {
            0 => Some(MsgKind::Client),
            1 => Some(MsgKind::Response),
            3 => Some(MsgKind::Unsolicited),
            _ => None,
        }
    }

    /// Server ids are odd.
    pub fn is_from_server(self) -> bool {
        self.0 & 1 == 1
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current Unix time as `(seconds, nanoseconds)`.
pub fn unix_now() -> (i64, u32) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as i64, now.subsec_nanos())
}

/// Hands out strictly increasing message ids for one session.
#[derive(Clone, Debug)]
pub struct MsgIdGenerator {
    side: Side,
    last: i64,
    time_offset: i32,
}

impl MsgIdGenerator {
    pub fn new(side: Side) -> Self {
        Self { side, last: 0, time_offset: 0 }
    }

    /// Seconds added to the local clock to approximate server time.
    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    pub fn set_time_offset(&mut self, offset: i32) {
        self.time_offset = offset;
    }

    /// Adopt the server's clock as carried in one of its message ids.
    /// Returns the new offset. Ids stay increasing even if this moves the
    /// clock backwards.
    pub fn correct_from(&mut self, server_msg_id: MsgId, now_secs: i64) -> i32 {
        let offset = (server_msg_id.unix_time() - now_secs).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        self.time_offset = offset;
        offset
    }

    /// Next id using the system clock.
    pub fn next(&mut self) -> MsgId {
        let (secs, nanos) = unix_now();
        self.next_at(secs, nanos)
    }

    /// Next id as if the local clock read `secs.nanos`. Clients get
    /// [`MsgKind::Client`] ids, servers [`MsgKind::Response`] ids.
    pub fn next_at(&mut self, secs: i64, nanos: u32) -> MsgId {
        let kind = match self.side {
            Side::Client => MsgKind::Client,
            Side::Server => MsgKind::Response,
        };
        self.next_kind_at(kind, secs, nanos)
    }

    /// Next id of an explicit kind. Only a server produces odd kinds; a
    /// client asking for one still gets a client id.
    pub fn next_kind_at(&mut self, kind: MsgKind, secs: i64, nanos: u32) -> MsgId {
        let kind = match self.side {
            Side::Client => MsgKind::Client,
            Side::Server if kind == MsgKind::Client => MsgKind::Response,
            Side::Server => kind,
        };
        let secs = secs + self.time_offset as i64;
        let mut base = (secs << 32) | ((nanos as i64) << 2 & 0xffff_fffc);
        if base | kind.low_bits() <= self.last {
            base = (self.last & !3) + 4;
        }
        self.last = base | kind.low_bits();
        MsgId(self.last)
    }
}

// ─── Plaintext framing ───────────────────────────────────────────────────────

/// Errors reading a plaintext message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlainError {
    /// Fewer than the 20 header bytes.
    TooShort { len: usize },
    /// `auth_key_id` is not zero: the frame is encrypted.
    NotPlaintext { auth_key_id: i64 },
    /// Declared length disagrees with the bytes that follow.
    LengthMismatch { declared: usize, available: usize },
}

impl fmt::Display for PlainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext frame of {len} bytes is too short"),
            Self::NotPlaintext { auth_key_id } => write!(f, "frame carries auth_key_id {auth_key_id}"),
            Self::LengthMismatch { declared, available } => {
                write!(f, "declared length {declared}, {available} bytes available")
            }
        }
    }
}

impl std::error::Error for PlainError {}

const PLAIN_HEADER_LEN: usize = 8 + 8 + 4;

/// A message sent before an auth key exists (key exchange only).
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage {
    pub msg_id: MsgId,
    pub body: Vec<u8>,
}

impl PlainMessage {
    pub fn new(msg_id: MsgId, body: Vec<u8>) -> Self {
        Self { msg_id, body }
    }

    /// Serialize into the plaintext wire format:
    ///
    /// ```text
    /// auth_key_id:long  (0 for plaintext)
    /// message_id:long
    /// message_data_length:int
    /// message_data:bytes
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PLAIN_HEADER_LEN + self.body.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.msg_id.0.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    pub fn from_bytes(frame: &[u8]) -> Result<Self, PlainError> {
        if frame.len() < PLAIN_HEADER_LEN {
            return Err(PlainError::TooShort { len: frame.len() });
        }
        let auth_key_id = i64::from_le_bytes(frame[..8].try_into().unwrap());
        if auth_key_id != 0 {
            return Err(PlainError::NotPlaintext { auth_key_id });
        }
        let msg_id = MsgId(i64::from_le_bytes(frame[8..16].try_into().unwrap()));
        let declared = u32::from_le_bytes(frame[16..20].try_into().unwrap()) as usize;
        let available = frame.len() - PLAIN_HEADER_LEN;
        if declared != available {
            return Err(PlainError::LengthMismatch { declared, available });
        }
        Ok(Self { msg_id, body: frame[PLAIN_HEADER_LEN..].to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_multiples_of_four() {
        let mut ids = MsgIdGenerator::new(Side::Client);
        let a = ids.next_at(1_700_000_000, 5);
        let b = ids.next_at(1_700_000_000, 5);
        assert_eq!(a.0 % 4, 0);
        assert_eq!(b.0, a.0 + 4);
        assert_eq!(a.unix_time(), 1_700_000_000);
        assert_eq!(a.kind(), Some(MsgKind::Client));
    }

    #[test]
    fn server_kinds_keep_their_low_bits() {
        let mut ids = MsgIdGenerator::new(Side::Server);
        let r = ids.next_kind_at(MsgKind::Response, 10, 0);
        let u = ids.next_kind_at(MsgKind::Unsolicited, 10, 0);
        let r2 = ids.next_kind_at(MsgKind::Response, 9, 0);
        assert_eq!(r.0 & 3, 1);
        assert_eq!(u.0 & 3, 3);
        assert!(r < u && u < r2);
        assert!(r2.is_from_server());
    }

    #[test]
    fn clock_correction_shifts_ids() {
        let mut ids = MsgIdGenerator::new(Side::Client);
        let server = MsgId((1_000_100i64 << 32) | 1);
        assert_eq!(ids.correct_from(server, 1_000_000), 100);
        assert_eq!(ids.next_at(1_000_000, 0).unix_time(), 1_000_100);
    }

    #[test]
    fn plaintext_layout() {
        let msg = PlainMessage::new(MsgId(0x1234 << 2), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        let wire = msg.to_bytes();
        assert_eq!(wire.len(), 8 + 8 + 4 + 4);
        assert_eq!(&wire[..8], &[0u8; 8]);
        assert_eq!(u32::from_le_bytes(wire[16..20].try_into().unwrap()), 4);
        assert_eq!(PlainMessage::from_bytes(&wire).unwrap(), msg);
    }

    #[test]
    fn plaintext_rejects_bad_frames() {
        let mut wire = PlainMessage::new(MsgId(4), vec![1, 2, 3, 4]).to_bytes();
        assert_eq!(PlainMessage::from_bytes(&wire[..10]), Err(PlainError::TooShort { len: 10 }));
        wire.push(0);
        assert_eq!(
            PlainMessage::from_bytes(&wire),
            Err(PlainError::LengthMismatch { declared: 4, available: 5 })
        );
        wire[0] = 1;
        assert_eq!(PlainMessage::from_bytes(&wire), Err(PlainError::NotPlaintext { auth_key_id: 1 }));
    }
}
