//! TL binary codec for MTProto.
//!
//! # Overview
//!
//! | Module          | Contents                                                    |
//! |-----------------|-------------------------------------------------------------|
//! | [`serialize`]   | [`Serializable`] and primitive impls                        |
//! | [`deserialize`] | [`Deserializable`], [`Cursor`], the codec [`Error`]         |
//! | [`flags`]       | [`FieldMeta`]: which bit gates which optional field         |
//! | [`registry`]    | [`Registry`]: tag → decoder table for polymorphic reads     |
//! | [`types`]       | Protocol-internal constructors (handshake, service messages) |
//! | [`enums`]       | Boxed types grouping those constructors                     |
//! | [`functions`]   | Protocol-internal RPC functions implementing [`RemoteCall`] |
//! | [`system`]      | [`SystemMessage`]: decoded service messages                 |
//!
//! Application schemas live outside this crate: declare them with
//! [`tl_object!`] / [`tl_enum!`] and register them in a [`Registry`].
//!
//! ```rust
//! use mtkit_tl::{functions, Serializable};
//!
//! let req = functions::ReqPqMulti { nonce: [7; 16] };
//! let bytes = req.to_bytes();
//! assert_eq!(&bytes[..4], &0xbe7e8ef1u32.to_le_bytes());
//! ```

#![deny(unsafe_code)]

pub mod deserialize;
pub mod enums;
pub mod flags;
pub mod functions;
pub mod macros;
pub mod registry;
pub mod serialize;
pub mod system;
pub mod types;

pub use deserialize::{Cursor, Deserializable, Error};
pub use flags::{FieldInfo, FieldMeta, FlagKind};
pub use registry::Registry;
pub use serialize::Serializable;
pub use system::SystemMessage;

/// 128-bit nonce, raw bytes on the wire.
pub type Int128 = [u8; 16];
/// 256-bit nonce, raw bytes on the wire.
pub type Int256 = [u8; 32];

/// Constructor tag of the boxed `Vector` type.
pub const VECTOR_ID: u32 = 0x1cb5c415;

/// Bare vector: `vector` (lowercase) as opposed to the boxed `Vector`.
///
/// Used where the schema carries a count without the `0x1cb5c415` header,
/// e.g. the message list inside a container.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// A constructor serialized without its leading tag (`%Type` in schema terms).
#[derive(Clone, Debug, PartialEq)]
pub struct Bare<T>(pub T);

/// Opaque blob of bytes that should be passed through without interpretation.
///
/// Decoding a `Blob` consumes the rest of the buffer; encoding writes the
/// bytes verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every constructor has a unique 32-bit tag.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// A constructor whose body can be read and written without its tag.
///
/// Implemented by [`tl_object!`]; the boxed [`Serializable`] /
/// [`Deserializable`] impls add or check the tag around these.
pub trait Object: Identifiable + Sized {
    /// Field table in wire order.
    const FIELDS: &'static [FieldInfo];
    /// Whether a flags word follows the tag.
    const HAS_FLAGS: bool;

    /// The flags word this value would be encoded with (0 without flagged fields).
    fn flags(&self) -> u32;

    /// Write the body: flags word (if any), then the present fields.
    fn serialize_bare(&self, buf: &mut impl Extend<u8>);

    /// Read the body; the tag has already been consumed.
    fn deserialize_bare(buf: deserialize::Buffer) -> deserialize::Result<Self>;
}

/// Marks a function type that can be sent as an RPC call.
///
/// `Return` is the type the server responds with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}
