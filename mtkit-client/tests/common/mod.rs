#![allow(dead_code)]

//! A scripted server speaking the Intermediate transport over an in-memory
//! duplex pipe.

use std::sync::Arc;
use std::time::Duration;

use flate2::{Compression, write::GzEncoder};
use mtkit_client::{Config, InMemoryBackend, NoRetries, PersistedSession};
use mtkit_crypto::{AuthKey, Side, SystemRandom, decrypt_data_v2};
use mtkit_mtproto::envelope::Envelope;
use mtkit_mtproto::message::{MsgIdGenerator, PlainMessage};
use mtkit_mtproto::transport::{Frame, Framing, Intermediate};
use mtkit_mtproto::EncryptedSession;
use mtkit_tl::types::{self, ContainerMessage};
use mtkit_tl::{Blob, RawVec, Serializable};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const SALT: i64 = 0x0102_0304_0506_0708;
pub const AUTH_KEY: [u8; 256] = [0x42; 256];

/// Client configuration for tests: no retries, no background pings, state
/// kept in memory.
pub fn test_config() -> Config {
    Config {
        server_addr: "test-server:443".into(),
        request_timeout: Some(Duration::from_secs(5)),
        ping_interval: Duration::from_secs(3600),
        retry_policy: Arc::new(NoRetries),
        session_backend: Arc::new(InMemoryBackend::new()),
        ..Config::default()
    }
}

pub fn stored_session() -> PersistedSession {
    PersistedSession::new(&AuthKey::from_bytes(AUTH_KEY), SALT, 0, "test-server:443")
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn rpc_result(req_msg_id: i64, answer: &[u8]) -> Vec<u8> {
    types::RpcResult { req_msg_id, result: Blob(answer.to_vec()) }.to_bytes()
}

pub struct Server {
    stream:      DuplexStream,
    buf:         Vec<u8>,
    key:         AuthKey,
    plain_ids:   MsgIdGenerator,
    init_seen:   bool,
    pub session: Option<EncryptedSession>,
}

impl Server {
    pub fn new(stream: DuplexStream, key: AuthKey) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            key,
            plain_ids: MsgIdGenerator::new(Side::Server),
            init_seen: false,
            session: None,
        }
    }

    pub fn set_key(&mut self, key: AuthKey) {
        self.key = key;
    }

    /// Next packet; the transport init bytes ahead of the first are checked
    /// and skipped.
    pub async fn recv_frame(&mut self) -> Vec<u8> {
        if !self.init_seen {
            let mut init = [0u8; 4];
            self.stream.read_exact(&mut init).await.unwrap();
            assert_eq!(init, [0xee; 4]);
            self.init_seen = true;
        }
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = Intermediate.decode(&mut self.buf).unwrap() {
                match frame {
                    Frame::Packet(data) => return data,
                    other => panic!("client sent {other:?}"),
                }
            }
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) {
        let mut out = Vec::new();
        Intermediate.encode(payload, &mut out).unwrap();
        self.stream.write_all(&out).await.unwrap();
    }

    /// Send a transport error code in place of a packet.
    pub async fn send_transport_error(&mut self, code: i32) {
        let mut out = 4u32.to_le_bytes().to_vec();
        out.extend_from_slice(&code.to_le_bytes());
        self.stream.write_all(&out).await.unwrap();
    }

    pub async fn recv_plain(&mut self) -> PlainMessage {
        PlainMessage::from_bytes(&self.recv_frame().await).unwrap()
    }

    pub async fn send_plain(&mut self, body: &impl Serializable) {
        let msg = PlainMessage::new(self.plain_ids.next(), body.to_bytes());
        self.send_frame(&msg.to_bytes()).await;
    }

    /// Next encrypted message. The first one fixes the session id.
    pub async fn recv(&mut self) -> Envelope {
        let mut frame = self.recv_frame().await;
        if self.session.is_none() {
            let plain = decrypt_data_v2(&mut frame, &self.key, Side::Server).unwrap();
            let envelope = Envelope::decode(plain).unwrap();
            self.session = Some(EncryptedSession::with_session_id(
                self.key.clone(),
                Side::Server,
                envelope.session_id,
                SALT,
                0,
            ));
            return envelope;
        }
        self.session().unpack(&mut frame).unwrap()
    }

    /// Next message that is not a `msgs_ack`.
    pub async fn recv_content(&mut self) -> Envelope {
        loop {
            let envelope = self.recv().await;
            if envelope.body[..4] != 0x62d6b459u32.to_le_bytes() {
                return envelope;
            }
        }
    }

    pub fn session(&mut self) -> &mut EncryptedSession {
        self.session.as_mut().expect("no encrypted message received yet")
    }

    /// Encrypt and send `body`, returning its msg_id.
    pub async fn send(&mut self, body: &[u8], content_related: bool) -> i64 {
        let packed = self.session().pack(body, content_related, &mut SystemRandom).unwrap();
        self.send_frame(&packed.frame).await;
        packed.msg_id.0
    }

    /// Wrap `body` for inclusion in a container.
    pub fn inner(&mut self, body: Vec<u8>) -> ContainerMessage {
        let session = self.session();
        let msg_id = session.next_msg_id().0;
        let seqno = session.next_seq_no(true);
        ContainerMessage { msg_id, seqno, body }
    }

    pub async fn send_container(&mut self, messages: Vec<ContainerMessage>) -> i64 {
        let body = types::MsgContainer { messages: RawVec(messages) }.to_bytes();
        self.send(&body, false).await
    }
}
