//! # mtkit: MTProto 2.0 toolkit
//!
//! `mtkit` is a modular Rust implementation of the client side of MTProto 2.0.
//! It consists of focused sub-crates wired together here for convenience:
//!
//! | Sub-crate       | Role                                                    |
//! |-----------------|---------------------------------------------------------|
//! | `mtkit-tl`      | TL binary codec, constructor registry, service messages |
//! | `mtkit-crypto`  | AES-IGE, SHA helpers, RSA-Pad, DH checks, auth keys     |
//! | `mtkit-mtproto` | Key exchange, msg ids, envelopes, framing (sans-IO)     |
//! | `mtkit-client`  | tokio client: handshake driver, session task, retries   |
//!
//! ## Quick start: sans-IO
//!
//! ```rust
//! use mtkit::crypto::{AuthKey, SystemRandom};
//! use mtkit::mtproto::EncryptedSession;
//! use mtkit::tl::functions;
//!
//! let key = AuthKey::from_bytes([7; 256]);
//! let mut session = EncryptedSession::new(key, 0, 0, &mut SystemRandom).unwrap();
//! let packed = session.pack_object(&functions::Ping { ping_id: 1 }, true, &mut SystemRandom).unwrap();
//! assert_eq!(packed.seq_no, 1);
//! // hand `packed.frame` to a transport framing and write it to the socket
//! ```
//!
//! ## Quick start: async client
//!
//! ```rust,no_run
//! # async fn f() -> Result<(), mtkit::client::InvocationError> {
//! let client = mtkit::client::Client::connect(Default::default()).await?;
//! client.ping().await?;
//! client.save_session().await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`mtkit_tl`]: TL codec, service types and the registry.
pub use mtkit_tl as tl;

/// Re-export of [`mtkit_crypto`]: AES-IGE, RSA, DH helpers, AuthKey.
pub use mtkit_crypto as crypto;

/// Re-export of [`mtkit_mtproto`]: key exchange, envelopes, encrypted session, framing.
pub use mtkit_mtproto as mtproto;

/// Re-export of [`mtkit_client`] (requires `feature = "client"`).
#[cfg(feature = "client")]
pub use mtkit_client as client;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use mtkit_tl::{Deserializable, Identifiable, RemoteCall, Serializable};

pub use mtkit_crypto::AuthKey;
pub use mtkit_mtproto::EncryptedSession;
pub use mtkit_mtproto::authentication::{self, Finished, HandshakeOptions};
