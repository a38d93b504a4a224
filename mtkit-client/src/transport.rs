//! Async stream transport.
//!
//! Drives a [`Framing`] over any tokio byte stream. The read and write halves
//! are separate types so the session can hand the reader to its own task.

use std::io;

use mtkit_mtproto::transport::{Abridged, Frame, Framing, Intermediate};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::InvocationError;

/// Which MTProto transport framing to use.
///
/// | Variant | Init bytes | Notes |
/// |---------|-----------|-------|
/// | `Intermediate` | `0xeeeeeeee` | Default, fixed 4-byte length |
/// | `Abridged` | `0xef` | Smallest overhead |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// MTProto [Intermediate] transport: 4-byte LE length prefix.
    ///
    /// [Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
    #[default]
    Intermediate,
    /// MTProto [Abridged] transport: length prefix is 1 or 4 bytes.
    ///
    /// [Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
    Abridged,
}

impl TransportKind {
    pub fn framing(self) -> Box<dyn Framing> {
        match self {
            Self::Intermediate => Box::new(Intermediate),
            Self::Abridged => Box::new(Abridged),
        }
    }
}

const READ_CHUNK: usize = 16 * 1024;

/// Reading half: accumulates bytes until a whole frame is available.
pub struct FrameReader<R> {
    stream:  R,
    framing: Box<dyn Framing>,
    buf:     Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, kind: TransportKind) -> Self {
        Self { stream, framing: kind.framing(), buf: Vec::new() }
    }

    /// Receive the next frame. A clean EOF is reported as `UnexpectedEof`.
    pub async fn recv(&mut self) -> Result<Frame, InvocationError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.framing.decode(&mut self.buf)? {
                return Ok(frame);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer").into());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Receive a frame that must be a packet; transport codes become errors.
    pub async fn recv_packet(&mut self) -> Result<Vec<u8>, InvocationError> {
        match self.recv().await? {
            Frame::Packet(data) => Ok(data),
            Frame::TransportError(code) => Err(InvocationError::Transport { code }),
        }
    }
}

/// Writing half: sends the framing's init bytes ahead of the first packet.
pub struct FrameWriter<W> {
    stream:    W,
    framing:   Box<dyn Framing>,
    init_sent: bool,
    out:       Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W, kind: TransportKind) -> Self {
        Self { stream, framing: kind.framing(), init_sent: false, out: Vec::new() }
    }

    pub async fn send(&mut self, packet: &[u8]) -> Result<(), InvocationError> {
        self.out.clear();
        if !self.init_sent {
            self.out.extend_from_slice(self.framing.init());
        }
        self.framing.encode(packet, &mut self.out)?;
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        self.init_sent = true;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
