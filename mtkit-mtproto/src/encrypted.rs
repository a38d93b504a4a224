//! Encrypted MTProto 2.0 session (post auth-key).
//!
//! Once you have a [`Finished`](crate::authentication::Finished) from the
//! handshake, construct an [`EncryptedSession`] and use it to serialize and
//! deserialize all subsequent messages.

use std::fmt;

use log::{debug, warn};
use mtkit_crypto::{AuthKey, CipherError, RandomSource, Side, decrypt_data_v2, encrypt_data_v2, random_array};
use mtkit_tl::Serializable;

use crate::envelope::{Envelope, EnvelopeError};
use crate::message::{MsgId, MsgIdGenerator, unix_now};

/// Errors that can occur when decrypting an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// The cipher layer rejected the frame.
    Crypto(CipherError),
    /// The decrypted plaintext is not a valid envelope.
    Envelope(EnvelopeError),
    /// Frame belongs to another session.
    SessionMismatch { got: i64 },
    /// The peer used an id of the wrong parity.
    InvalidMsgId { msg_id: i64 },
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::Envelope(e) => write!(f, "envelope: {e}"),
            Self::SessionMismatch { got } => write!(f, "session_id mismatch (got {got})"),
            Self::InvalidMsgId { msg_id } => write!(f, "msg_id {msg_id} has the wrong parity"),
        }
    }
}

impl std::error::Error for DecryptError {}

impl From<CipherError> for DecryptError {
    fn from(e: CipherError) -> Self { Self::Crypto(e) }
}

impl From<EnvelopeError> for DecryptError {
    fn from(e: EnvelopeError) -> Self { Self::Envelope(e) }
}

/// Errors encrypting an outbound message.
#[derive(Debug)]
pub enum EncryptError {
    Random(getrandom::Error),
    Crypto(CipherError),
}

impl fmt::Display for EncryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random(e) => write!(f, "random source failed: {e}"),
            Self::Crypto(e) => write!(f, "crypto: {e}"),
        }
    }
}

impl std::error::Error for EncryptError {}

impl From<getrandom::Error> for EncryptError {
    fn from(e: getrandom::Error) -> Self { Self::Random(e) }
}

impl From<CipherError> for EncryptError {
    fn from(e: CipherError) -> Self { Self::Crypto(e) }
}

/// An encrypted frame ready for the transport, with the ids it was sent under.
#[derive(Clone, Debug)]
pub struct Packed {
    pub msg_id: MsgId,
    pub seq_no: i32,
    pub frame: Vec<u8>,
}

/// MTProto 2.0 encrypted session state.
///
/// Wraps an `AuthKey` and tracks per-session counters (session_id, seq_no,
/// message ids, server salt). Use [`EncryptedSession::pack`] to encrypt
/// outgoing messages and [`EncryptedSession::unpack`] to decrypt incoming
/// frames.
pub struct EncryptedSession {
    auth_key: AuthKey,
    side: Side,
    session_id: i64,
    sequence: i32,
    msg_ids: MsgIdGenerator,
    salt: i64,
}

impl EncryptedSession {
    /// Start a client session with a random session id.
    pub fn new(auth_key: AuthKey, first_salt: i64, time_offset: i32, rng: &mut impl RandomSource) -> Result<Self, getrandom::Error> {
        let session_id = i64::from_le_bytes(random_array(rng)?);
        Ok(Self::with_session_id(auth_key, Side::Client, session_id, first_salt, time_offset))
    }

    /// Build a session with every parameter explicit (either side).
    pub fn with_session_id(auth_key: AuthKey, side: Side, session_id: i64, salt: i64, time_offset: i32) -> Self {
        let mut msg_ids = MsgIdGenerator::new(side);
        msg_ids.set_time_offset(time_offset);
        Self { auth_key, side, session_id, sequence: 0, msg_ids, salt }
    }

    pub fn auth_key(&self) -> &AuthKey { &self.auth_key }

    pub fn session_id(&self) -> i64 { self.session_id }

    pub fn salt(&self) -> i64 { self.salt }

    pub fn set_salt(&mut self, salt: i64) {
        if salt != self.salt {
            debug!("[mtkit] server salt {} -> {}", self.salt, salt);
        }
        self.salt = salt;
    }

    pub fn time_offset(&self) -> i32 { self.msg_ids.time_offset() }

    /// Re-sync the local clock from a server `msg_id` (bad_msg codes 16/17).
    pub fn correct_time(&mut self, server_msg_id: MsgId) {
        let (now, _) = unix_now();
        let offset = self.msg_ids.correct_from(server_msg_id, now);
        warn!("[mtkit] local clock corrected, offset now {offset}s");
    }

    /// Code 32: our seq_no was too low.
    pub fn bump_sequence(&mut self) {
        self.sequence += 64;
    }

    /// Code 33: our seq_no was too high.
    pub fn lower_sequence(&mut self) {
        self.sequence = (self.sequence - 16).max(0);
    }

    /// Start over under a fresh session id (same key and salt).
    pub fn reset(&mut self, rng: &mut impl RandomSource) -> Result<(), getrandom::Error> {
        self.session_id = i64::from_le_bytes(random_array(rng)?);
        self.sequence = 0;
        Ok(())
    }

    /// Allocate the next `msg_id`.
    pub fn next_msg_id(&mut self) -> MsgId {
        self.msg_ids.next()
    }

    /// Next seq_no: odd and advancing for content-related messages, even and
    /// unchanged otherwise.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// Wrap `body` in an envelope under a fresh `msg_id` and encrypt it.
    pub fn pack(&mut self, body: &[u8], content_related: bool, rng: &mut impl RandomSource) -> Result<Packed, EncryptError> {
        let msg_id = self.next_msg_id();
        let seq_no = self.next_seq_no(content_related);
        let frame = self.encrypt(msg_id, seq_no, body, rng)?;
        Ok(Packed { msg_id, seq_no, frame })
    }

    /// Like [`pack`](Self::pack) for any serializable value.
    pub fn pack_object<S: Serializable>(&mut self, obj: &S, content_related: bool, rng: &mut impl RandomSource) -> Result<Packed, EncryptError> {
        self.pack(&obj.to_bytes(), content_related, rng)
    }

    /// Encrypt under caller-chosen ids, e.g. to resend a message.
    pub fn encrypt(&self, msg_id: MsgId, seq_no: i32, body: &[u8], rng: &mut impl RandomSource) -> Result<Vec<u8>, EncryptError> {
        let envelope = Envelope {
            salt: self.salt,
            session_id: self.session_id,
            msg_id,
            seq_no,
            body: body.to_vec(),
        };
        let mut buf = envelope.encode(rng)?;
        encrypt_data_v2(&mut buf, &self.auth_key, self.side)?;
        Ok(buf.into_vec())
    }

    /// Decrypt an inbound frame sent by the peer.
    pub fn unpack(&self, frame: &mut [u8]) -> Result<Envelope, DecryptError> {
        let plain = decrypt_data_v2(frame, &self.auth_key, self.side)?;
        let envelope = Envelope::decode(plain)?;

        if envelope.session_id != self.session_id {
            return Err(DecryptError::SessionMismatch { got: envelope.session_id });
        }
        let from_server = envelope.msg_id.is_from_server();
        if from_server != (self.side == Side::Client) {
            return Err(DecryptError::InvalidMsgId { msg_id: envelope.msg_id.0 });
        }
        Ok(envelope)
    }
}

impl fmt::Debug for EncryptedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSession")
            .field("auth_key", &self.auth_key)
            .field("side", &self.side)
            .field("session_id", &self.session_id)
            .field("salt", &self.salt)
            .finish_non_exhaustive()
    }
}
