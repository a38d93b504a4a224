//! Constructor registry for polymorphic decoding.
//!
//! A [`Registry<T>`] maps a 32-bit constructor tag to a function that reads
//! the bare body of that constructor and produces a `T`, usually an enum
//! with one variant per known shape. Registries are plain values: build one at
//! startup, hand it to whoever decodes, build another in a test.

use std::collections::HashMap;
use std::fmt;

use crate::deserialize::{Cursor, Result};
use crate::{Object, VECTOR_ID};

type DecodeFn<T> = Box<dyn Fn(&mut Cursor<'_>) -> Result<T> + Send + Sync>;

/// Tag → decoder table.
pub struct Registry<T> {
    decoders: HashMap<u32, DecodeFn<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { decoders: HashMap::new() }
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("Registry").field("tags", &tags).finish()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decode` for `tag`. The decoder sees the cursor positioned
    /// just after the tag.
    ///
    /// Returns `false` (and leaves the table untouched) if the tag is already
    /// taken or is the reserved vector tag.
    pub fn insert<F>(&mut self, tag: u32, decode: F) -> bool
    where
        F: Fn(&mut Cursor<'_>) -> Result<T> + Send + Sync + 'static,
    {
        if tag == VECTOR_ID || self.decoders.contains_key(&tag) {
            return false;
        }
        self.decoders.insert(tag, Box::new(decode));
        true
    }

    /// Register a [`tl_object!`](crate::tl_object) type, wrapping decoded
    /// values with `wrap`.
    pub fn register<O>(&mut self, wrap: fn(O) -> T) -> bool
    where
        O: Object + 'static,
        T: 'static,
    {
        self.insert(O::CONSTRUCTOR_ID, move |buf: &mut Cursor<'_>| {
            O::deserialize_bare(buf).map(wrap)
        })
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.decoders.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Read a tag and dispatch to its decoder.
    ///
    /// An unregistered tag yields [`Error::UnknownConstructor`](crate::deserialize::Error::UnknownConstructor)
    /// with the cursor left on the tag.
    pub fn decode(&self, buf: &mut Cursor<'_>) -> Result<T> {
        let tag = buf.peek_u32()?;
        match self.decoders.get(&tag) {
            Some(decode) => {
                buf.expect_tag(tag)?;
                decode(buf)
            }
            None => Err(buf.unknown_constructor(tag)),
        }
    }

    /// [`decode`](Self::decode) over a whole byte slice.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<T> {
        self.decode(&mut Cursor::from_slice(bytes))
    }
}
