//! Error types for mtkit-client.

use std::{fmt, io};

use mtkit_mtproto::authentication;
use mtkit_mtproto::message::PlainError;
use mtkit_mtproto::transport::FrameError;
use mtkit_mtproto::{DecryptError, EncryptError};

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error the server returned in place of an RPC result.
///
/// A trailing numeric suffix is stripped from the name and placed in
/// [`RpcError::value`]; the untouched server string stays in
/// [`RpcError::message`].
///
/// # Example
/// `FLOOD_WAIT_30` → `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30), .. }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with the numeric suffix removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
    /// The error string exactly as the server sent it.
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {} {}: {}", self.code, self.message, self.description())
    }
}

impl std::error::Error for RpcError {}

/// Session-level error names. `{value}` is replaced by the numeric suffix.
static DESCRIPTIONS: &[(&str, &str)] = &[
    ("FLOOD_WAIT", "a wait of {value} seconds is required"),
    ("AUTH_KEY_UNREGISTERED", "the auth key is not registered with the server"),
    ("AUTH_KEY_INVALID", "the auth key is invalid"),
    ("AUTH_KEY_DUPLICATED", "the auth key is in use by another connection"),
    ("AUTH_KEY_PERM_EMPTY", "a temporary key must be bound to a permanent key first"),
    ("SESSION_REVOKED", "the session was terminated"),
    ("SESSION_EXPIRED", "the session expired"),
    ("INPUT_METHOD_INVALID", "the invoked method does not exist"),
    ("INPUT_REQUEST_TOO_LONG", "the request payload is too large"),
    ("MSG_WAIT_FAILED", "a request this one depended on failed"),
    ("MSG_WAIT_TIMEOUT", "a request this one depended on timed out"),
    ("TIMEOUT", "the server timed out answering the request"),
];

impl RpcError {
    /// Parse a raw server error such as `(420, "FLOOD_WAIT_30")`.
    pub fn from_server(code: i32, message: &str) -> Self {
        if let Some((name, suffix)) = message.rsplit_once('_') {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    return Self { code, name: name.to_string(), value: Some(v), message: message.to_string() };
                }
            }
        }
        Self { code, name: message.to_string(), value: None, message: message.to_string() }
    }

    /// Human-readable text for this error, falling back to the raw message.
    pub fn description(&self) -> String {
        DESCRIPTIONS
            .iter()
            .find(|(name, _)| *name == self.name)
            .map(|(_, text)| match self.value {
                Some(v) => text.replace("{value}", &v.to_string()),
                None => text.to_string(),
            })
            .unwrap_or_else(|| self.message.clone())
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")`: exact match
    /// - `err.is("AUTH_KEY_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// The flood-wait duration in seconds, if this is a FLOOD_WAIT error.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(u64::from)
        } else {
            None
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned by every [`crate::Client`] operation.
#[derive(Debug)]
pub enum InvocationError {
    /// The server answered with `rpc_error`.
    Rpc(RpcError),
    /// Network / I/O failure.
    Io(io::Error),
    /// A message body could not be decoded.
    Codec(mtkit_tl::Error),
    /// An inbound frame failed decryption or integrity checks. The
    /// connection is torn down.
    Crypto(DecryptError),
    /// Key exchange failed.
    Handshake(authentication::Error),
    /// The server sent a transport error code (e.g. -404) instead of a frame.
    Transport { code: i32 },
    /// `bad_msg_notification` with a code the session cannot recover from.
    BadMessage { code: i32 },
    /// No answer within the configured request timeout.
    Timeout,
    /// The request was dropped (the session task shut down).
    Dropped,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e)              => write!(f, "{e}"),
            Self::Io(e)               => write!(f, "I/O error: {e}"),
            Self::Codec(e)            => write!(f, "decode error: {e}"),
            Self::Crypto(e)           => write!(f, "rejected frame: {e}"),
            Self::Handshake(e)        => write!(f, "handshake failed: {e}"),
            Self::Transport { code }  => write!(f, "transport error {code}"),
            Self::BadMessage { code } => write!(f, "bad_msg_notification {code}: {}", bad_msg_description(*code)),
            Self::Timeout             => write!(f, "request timed out"),
            Self::Dropped             => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<mtkit_tl::Error> for InvocationError {
    fn from(e: mtkit_tl::Error) -> Self { Self::Codec(e) }
}

impl From<DecryptError> for InvocationError {
    fn from(e: DecryptError) -> Self { Self::Crypto(e) }
}

impl From<authentication::Error> for InvocationError {
    fn from(e: authentication::Error) -> Self { Self::Handshake(e) }
}

impl From<EncryptError> for InvocationError {
    fn from(e: EncryptError) -> Self { Self::Io(io::Error::other(e)) }
}

impl From<FrameError> for InvocationError {
    fn from(e: FrameError) -> Self { Self::Io(io::Error::new(io::ErrorKind::InvalidData, e)) }
}

impl From<PlainError> for InvocationError {
    fn from(e: PlainError) -> Self { Self::Io(io::Error::new(io::ErrorKind::InvalidData, e)) }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _            => false,
        }
    }

    /// If this is a FLOOD_WAIT error, returns how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _            => None,
        }
    }

    /// Transient failures worth another attempt; everything else needs a
    /// different request or a rebuilt connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout => true,
            Self::Transport { code } => *code == -429,
            Self::Rpc(e) => e.code == 420 || e.code >= 500,
            Self::Codec(_) | Self::Crypto(_) | Self::Handshake(_)
            | Self::BadMessage { .. } | Self::Dropped => false,
        }
    }

    /// A copy of this error for fanning one connection failure out to
    /// every waiting request.
    pub(crate) fn replicate(&self) -> Self {
        match self {
            Self::Rpc(e)              => Self::Rpc(e.clone()),
            Self::Io(e)               => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Codec(e)            => Self::Codec(e.clone()),
            Self::Crypto(e)           => Self::Crypto(e.clone()),
            Self::Handshake(e)        => Self::Handshake(e.clone()),
            Self::Transport { code }  => Self::Transport { code: *code },
            Self::BadMessage { code } => Self::BadMessage { code: *code },
            Self::Timeout             => Self::Timeout,
            Self::Dropped             => Self::Dropped,
        }
    }
}

/// Text for a `bad_msg_notification` error code.
pub fn bad_msg_description(code: i32) -> &'static str {
    match code {
        16 => "msg_id too low",
        17 => "msg_id too high",
        18 => "msg_id not divisible by 4",
        19 => "container msg_id duplicates an earlier message",
        20 => "message too old",
        32 => "msg_seqno too low",
        33 => "msg_seqno too high",
        34 => "even msg_seqno for a content message",
        35 => "odd msg_seqno for a service message",
        48 => "incorrect server salt",
        64 => "invalid container",
        _  => "unknown error code",
    }
}
