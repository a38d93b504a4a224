//! Session persistence: the auth key, salt and clock offset needed to resume
//! without a new key exchange.

use std::io;
use std::path::Path;

use mtkit_crypto::AuthKey;
use serde::{Deserialize, Serialize};

/// Everything needed to reconnect to the same server under an existing key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Raw 256-byte auth key, base64 in JSON.
    #[serde(with = "base64_key")]
    pub auth_key:    [u8; 256],
    /// Little-endian reading of the key's 8-byte id, for display and sanity checks.
    pub key_id:      i64,
    pub salt:        i64,
    pub time_offset: i32,
    /// `host:port` the key was negotiated with.
    pub server_addr: String,
}

impl PersistedSession {
    pub fn new(auth_key: &AuthKey, salt: i64, time_offset: i32, server_addr: impl Into<String>) -> Self {
        Self {
            auth_key: auth_key.to_bytes(),
            key_id: i64::from_le_bytes(auth_key.key_id()),
            salt,
            time_offset,
            server_addr: server_addr.into(),
        }
    }

    /// The stored key, after checking it still matches the stored id.
    pub fn auth_key(&self) -> io::Result<AuthKey> {
        let key = AuthKey::from_bytes(self.auth_key);
        if i64::from_le_bytes(key.key_id()) != self.key_id {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "stored key_id does not match auth_key"));
        }
        Ok(key)
    }

    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string_pretty(self).map_err(io::Error::from)
    }

    pub fn from_json(text: &str) -> io::Result<Self> {
        serde_json::from_str(text).map_err(io::Error::from)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, path)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Serialize/deserialize the 256-byte key as a base64 string.
mod base64_key {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 256], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 256], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        <[u8; 256]>::try_from(bytes.as_slice())
            .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"256 bytes"))
    }
}
