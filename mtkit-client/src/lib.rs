//! # mtkit-client
//!
//! Async MTProto session client on tokio.
//!
//! ## Features
//! - Key exchange over TCP (or any byte stream) with retries and a timeout
//! - One background session task per connection: concurrent requests,
//!   answers matched by `msg_id`, acknowledgements, keep-alive pings
//! - Automatic recovery from `bad_server_salt` and recoverable
//!   `bad_msg_notification` codes
//! - `rpc_error` translated into [`RpcError`], `FLOOD_WAIT` auto-retry with a
//!   configurable [`RetryPolicy`]
//! - Unsolicited messages delivered on an [`UpdateStream`]
//! - Session persistence through a pluggable [`SessionBackend`]
//!
//! ```no_run
//! # async fn f() -> Result<(), mtkit_client::InvocationError> {
//! use mtkit_client::{Client, Config};
//!
//! let client = Client::connect(Config::default()).await?;
//! let pong = client.ping().await?;
//! println!("pong for {}", pong.msg_id);
//! client.disconnect().await;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod errors;
mod retry;
mod sender;
pub mod handshake;
pub mod session;
pub mod session_backend;
pub mod transport;
pub mod update;

pub use errors::{InvocationError, RpcError, bad_msg_description};
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use session::PersistedSession;
pub use session_backend::{InMemoryBackend, JsonFileBackend, SessionBackend};
pub use transport::TransportKind;
pub use update::{Update, UpdateStream};

use std::io;
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mtkit_crypto::SystemRandom;
use mtkit_crypto::rsa::{self, PublicKey};
use mtkit_mtproto::{EncryptedSession, HandshakeOptions};
use mtkit_tl::{Deserializable, RemoteCall, Serializable, functions, types};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use sender::{Command, Sender, SenderOptions};
use transport::{FrameReader, FrameWriter};

const COMMAND_QUEUE: usize = 64;
const FRAME_QUEUE: usize = 64;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    /// `host:port` of the server.
    pub server_addr:        String,
    /// Which MTProto transport framing to use (default: Intermediate).
    pub transport:          TransportKind,
    /// Server RSA keys accepted during key exchange.
    pub public_keys:        Vec<PublicKey>,
    pub handshake:          HandshakeOptions,
    /// Limit on one whole key exchange, TCP connect included.
    pub handshake_timeout:  Duration,
    /// Key exchange attempts before giving up (each on a new connection).
    pub handshake_attempts: u32,
    /// How long one request may wait for its answer. `None` waits forever.
    pub request_timeout:    Option<Duration>,
    /// Interval between keep-alive pings.
    pub ping_interval:      Duration,
    /// `disconnect_delay` sent with each keep-alive.
    pub disconnect_delay:   Duration,
    /// Number of owed acknowledgements that triggers an immediate `msgs_ack`.
    pub ack_threshold:      usize,
    pub retry_policy:       Arc<dyn RetryPolicy>,
    /// Session persistence backend (default: JSON file `"mtkit.session"`).
    pub session_backend:    Arc<dyn SessionBackend>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr:        "149.154.167.51:443".into(),
            transport:          TransportKind::Intermediate,
            public_keys:        rsa::well_known_keys(),
            handshake:          HandshakeOptions::default(),
            handshake_timeout:  Duration::from_secs(15),
            handshake_attempts: 3,
            request_timeout:    Some(Duration::from_secs(30)),
            ping_interval:      Duration::from_secs(60),
            disconnect_delay:   Duration::from_secs(75),
            ack_threshold:      8,
            retry_policy:       Arc::new(AutoSleep::default()),
            session_backend:    Arc::new(JsonFileBackend::new("mtkit.session")),
        }
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

struct ClientInner {
    commands:        mpsc::Sender<Command>,
    updates:         Mutex<Option<mpsc::UnboundedReceiver<Update>>>,
    retry_policy:    Arc<dyn RetryPolicy>,
    request_timeout: Option<Duration>,
    session_backend: Arc<dyn SessionBackend>,
    cancel:          CancellationToken,
    tasks:           TaskTracker,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle to one encrypted session. Cheap to clone; the session ends when
/// the last clone is dropped or [`Client::disconnect`] is called.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────────

    /// Connect to `config.server_addr`, resuming the stored session when it
    /// belongs to the same server and running a key exchange otherwise.
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let backend = config.session_backend.clone();
        match backend.load()? {
            Some(saved) if saved.server_addr == config.server_addr => {
                info!(backend = backend.name(), key_id = saved.key_id, "[mtkit] resuming stored session");
                match TcpStream::connect(&config.server_addr).await {
                    Ok(stream) => return Self::resume_stream(stream, saved, config),
                    Err(e) => warn!(error = %e, "[mtkit] reconnect failed, trying a fresh key exchange"),
                }
            }
            Some(saved) => {
                info!(stored = %saved.server_addr, "[mtkit] stored session is for another server, ignoring it");
            }
            None => {}
        }

        let client = Self::fresh_connect(config).await?;
        if let Err(e) = client.save_session().await {
            warn!(error = %e, "[mtkit] could not persist the new session");
        }
        Ok(client)
    }

    async fn fresh_connect(config: Config) -> Result<Self, InvocationError> {
        let attempts = config.handshake_attempts.max(1);
        let mut last_error = InvocationError::Dropped;
        for attempt in 1..=attempts {
            info!(addr = %config.server_addr, attempt, "[mtkit] fresh connect");
            let result = tokio::time::timeout(config.handshake_timeout, async {
                let stream = TcpStream::connect(&config.server_addr).await?;
                Self::handshake_stream(stream, &config).await
            })
            .await
            .unwrap_or(Err(InvocationError::Timeout));

            match result {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!(attempt, error = %e, "[mtkit] key exchange failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Run a key exchange on an already open stream, then start the session
    /// on it. The handshake is bounded by `config.handshake_timeout`.
    pub async fn connect_stream<S>(stream: S, config: Config) -> Result<Self, InvocationError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tokio::time::timeout(config.handshake_timeout, Self::handshake_stream(stream, &config))
            .await
            .unwrap_or(Err(InvocationError::Timeout))
    }

    async fn handshake_stream<S>(stream: S, config: &Config) -> Result<Self, InvocationError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read, config.transport);
        let mut writer = FrameWriter::new(write, config.transport);
        let done = handshake::authorize(&mut reader, &mut writer, &config.public_keys, &config.handshake).await?;
        let session = EncryptedSession::new(done.auth_key, done.first_salt, done.time_offset, &mut SystemRandom)
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Self::start(reader, writer, session, config))
    }

    /// Start a session on an open stream under a stored key, skipping the
    /// key exchange.
    pub fn resume_stream<S>(stream: S, saved: PersistedSession, config: Config) -> Result<Self, InvocationError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let auth_key = saved.auth_key()?;
        let session = EncryptedSession::new(auth_key, saved.salt, saved.time_offset, &mut SystemRandom)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let (read, write) = tokio::io::split(stream);
        let reader = FrameReader::new(read, config.transport);
        let writer = FrameWriter::new(write, config.transport);
        Ok(Self::start(reader, writer, session, &config))
    }

    fn start<R, W>(reader: FrameReader<R>, writer: FrameWriter<W>, session: EncryptedSession, config: &Config) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        let options = SenderOptions {
            server_addr:      config.server_addr.clone(),
            ack_threshold:    config.ack_threshold.max(1),
            disconnect_delay: config.disconnect_delay,
        };
        let sender = Sender::new(writer, session, update_tx, options);

        tasks.spawn(sender::read_frames(reader, frame_tx, cancel.clone()));
        tasks.spawn(sender::keep_alive(command_tx.clone(), config.ping_interval, cancel.clone()));
        tasks.spawn(sender.run(command_rx, frame_rx, cancel.clone()));
        tasks.close();

        Self {
            inner: Arc::new(ClientInner {
                commands:        command_tx,
                updates:         Mutex::new(Some(update_rx)),
                retry_policy:    config.retry_policy.clone(),
                request_timeout: config.request_timeout,
                session_backend: config.session_backend.clone(),
                cancel,
                tasks,
            }),
        }
    }

    // ── Raw invoke ─────────────────────────────────────────────────────────

    /// Invoke any TL function, handling retries per the configured policy.
    pub async fn invoke<R: RemoteCall>(&self, req: &R) -> Result<R::Return, InvocationError> {
        let body = self.invoke_raw(req.to_bytes()).await?;
        Ok(R::Return::from_bytes(&body)?)
    }

    /// Invoke a pre-serialized function and return the raw answer.
    pub async fn invoke_raw(&self, body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
        let mut fail_count   = NonZeroU32::MIN;
        let mut slept_so_far = Duration::default();
        loop {
            match self.send_once(body.clone()).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    let ctx = RetryContext { fail_count, slept_so_far, error: e };
                    match self.inner.retry_policy.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            sleep(delay).await;
                            slept_so_far += delay;
                            fail_count = fail_count.saturating_add(1);
                        }
                        ControlFlow::Break(()) => return Err(ctx.error),
                    }
                }
            }
        }
    }

    async fn send_once(&self, body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
        let (reply, answer) = oneshot::channel();
        self.inner.commands.send(Command::Invoke { body, reply }).await
            .map_err(|_| InvocationError::Dropped)?;
        let answer = async { answer.await.unwrap_or(Err(InvocationError::Dropped)) };
        match self.inner.request_timeout {
            Some(limit) => tokio::time::timeout(limit, answer).await.unwrap_or(Err(InvocationError::Timeout)),
            None => answer.await,
        }
    }

    /// Send `ping` and wait for the matching `pong`.
    pub async fn ping(&self) -> Result<types::Pong, InvocationError> {
        self.invoke(&functions::Ping { ping_id: sender::random_i64()? }).await
    }

    /// Ask for `num` upcoming server salts; the one valid now is adopted.
    pub async fn future_salts(&self, num: i32) -> Result<types::FutureSalts, InvocationError> {
        self.invoke(&functions::GetFutureSalts { num }).await
    }

    // ── Updates ────────────────────────────────────────────────────────────

    /// Take the [`UpdateStream`]. There is one per session; later calls
    /// return `None`.
    pub fn stream_updates(&self) -> Option<UpdateStream> {
        let rx = self.inner.updates.lock().ok()?.take()?;
        Some(UpdateStream { rx })
    }

    // ── Session ────────────────────────────────────────────────────────────

    /// Current key, salt and clock offset.
    pub async fn session(&self) -> Result<PersistedSession, InvocationError> {
        let (reply, snapshot) = oneshot::channel();
        self.inner.commands.send(Command::Snapshot { reply }).await
            .map_err(|_| InvocationError::Dropped)?;
        snapshot.await.map_err(|_| InvocationError::Dropped)
    }

    /// Write the current session to the configured backend.
    pub async fn save_session(&self) -> Result<(), InvocationError> {
        let snapshot = self.session().await?;
        self.inner.session_backend.save(&snapshot)?;
        info!(backend = self.inner.session_backend.name(), "[mtkit] session saved");
        Ok(())
    }

    /// Stop the session and wait for its tasks to exit. Outstanding requests
    /// fail with [`InvocationError::Dropped`].
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.wait().await;
    }

    /// Whether the session task is still running.
    pub fn is_connected(&self) -> bool {
        !self.inner.commands.is_closed()
    }
}
