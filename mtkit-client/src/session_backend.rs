//! Pluggable session storage backend.
//!
//! The [`SessionBackend`] trait abstracts over session persistence so that
//! callers can keep the auth key in a file, in memory, or anywhere else.
//!
//! Two built-in backends are provided:
//! * [`JsonFileBackend`]: a JSON file (default).
//! * [`InMemoryBackend`]: nothing touches the disk.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::session::PersistedSession;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// An abstraction over where and how session data is persisted.
pub trait SessionBackend: Send + Sync {
    /// Persist the given session.
    fn save(&self, session: &PersistedSession) -> io::Result<()>;

    /// Load a previously persisted session, or return `None` if none exists.
    fn load(&self) -> io::Result<Option<PersistedSession>>;

    /// Remove the stored session (e.g. after the server rejected the key).
    fn delete(&self) -> io::Result<()>;

    /// Human-readable name of this backend (for log messages).
    fn name(&self) -> &str;
}

// ─── JsonFileBackend ──────────────────────────────────────────────────────────

/// Stores the session as pretty-printed JSON at a fixed path.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionBackend for JsonFileBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        session.save(&self.path)
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        PersistedSession::load(&self.path).map(Some)
    }

    fn delete(&self) -> io::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn name(&self) -> &str { "json-file" }
}

// ─── InMemoryBackend ─────────────────────────────────────────────────────────

/// An ephemeral session backend that stores nothing on disk.
///
/// Useful for tests or for tools that should always start fresh.
#[derive(Default)]
pub struct InMemoryBackend {
    data: Mutex<Option<PersistedSession>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("session store lock poisoned")
}

impl SessionBackend for InMemoryBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        *self.data.lock().map_err(poisoned)? = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(self.data.lock().map_err(poisoned)?.clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().map_err(poisoned)? = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}
