//! MTProto session core, free of I/O.
//!
//! This crate handles:
//! * The DH key exchange that produces an auth key ([`authentication`])
//! * Message ids and plaintext framing ([`message`])
//! * The encrypted envelope and per-session counters ([`envelope`], [`encrypted`])
//! * Length framing for stream transports ([`transport`])
//!
//! It is intentionally transport-agnostic: bring your own TCP/WebSocket.

#![deny(unsafe_code)]

pub mod authentication;
pub mod encrypted;
pub mod envelope;
pub mod message;
pub mod transport;

pub use authentication::{Finished, HandshakeOptions};
pub use encrypted::{DecryptError, EncryptError, EncryptedSession, Packed};
pub use envelope::{Envelope, EnvelopeError};
pub use message::{MsgId, MsgIdGenerator, MsgKind, PlainError, PlainMessage};
pub use transport::{Abridged, Frame, FrameError, Framing, Intermediate};
