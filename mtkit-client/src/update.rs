//! Unsolicited messages delivered by [`crate::Client::stream_updates`].
//!
//! The session consumes service messages itself. Any other content message
//! that is not the answer to a request (application updates pushed by the
//! server) is forwarded here undecoded; decoding it is up to whoever owns
//! the application schema.

use mtkit_tl::{Deserializable, Registry};
use tokio::sync::mpsc;

use crate::InvocationError;

/// One pushed message.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    /// Server msg_id the message arrived under.
    pub msg_id: i64,
    /// Full body, constructor tag included.
    pub body: Vec<u8>,
}

impl Update {
    /// Constructor tag of the body.
    pub fn constructor_id(&self) -> Option<u32> {
        let head = self.body.get(..4)?;
        Some(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
    }

    /// Decode the body as one concrete type.
    pub fn decode<T: Deserializable>(&self) -> Result<T, InvocationError> {
        Ok(T::from_bytes(&self.body)?)
    }

    /// Decode the body through an application registry.
    pub fn decode_with<T>(&self, registry: &Registry<T>) -> Result<T, InvocationError> {
        Ok(registry.decode_bytes(&self.body)?)
    }
}

/// Asynchronous stream of [`Update`]s.
pub struct UpdateStream {
    pub(crate) rx: mpsc::UnboundedReceiver<Update>,
}

impl UpdateStream {
    /// Wait for the next update. Returns `None` once the session has shut down.
    pub async fn next(&mut self) -> Option<Update> {
        self.rx.recv().await
    }
}
