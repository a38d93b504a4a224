//! The session task.
//!
//! One task owns the [`EncryptedSession`] and every piece of mutable
//! connection state: the pending-request table, the acknowledgement queue and
//! the salt. [`crate::Client`] handles talk to it through [`Command`]s; a
//! separate reader task feeds it inbound frames, and a pinger task asks it to
//! send keep-alives. Nothing here is shared, so nothing here is locked.

use std::collections::HashMap;
use std::io::{self, Read};
use std::time::Duration;

use flate2::read::GzDecoder;
use mtkit_crypto::{SystemRandom, random_array};
use mtkit_mtproto::EncryptedSession;
use mtkit_mtproto::message::MsgId;
use mtkit_mtproto::transport::Frame;
use mtkit_tl::system::SystemMessage;
use mtkit_tl::{Deserializable, Identifiable, Registry, Serializable, functions, types};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{InvocationError, RpcError, bad_msg_description};
use crate::session::PersistedSession;
use crate::transport::{FrameReader, FrameWriter};
use crate::update::Update;

pub(crate) type Reply = oneshot::Sender<Result<Vec<u8>, InvocationError>>;

/// Requests from client handles to the session task.
pub(crate) enum Command {
    /// Send a serialized function and deliver its answer to `reply`.
    Invoke { body: Vec<u8>, reply: Reply },
    /// Send `ping_delay_disconnect`; the pong is consumed silently.
    KeepAlive,
    /// Report the state needed to resume later.
    Snapshot { reply: oneshot::Sender<PersistedSession> },
}

/// A sent request awaiting its answer.
struct Request {
    body:  Vec<u8>,
    /// Salt the request went out under.
    salt:  i64,
    /// `None` for keep-alive pings nobody waits on.
    reply: Option<Reply>,
}

/// Work the dispatcher cannot do synchronously.
#[derive(Debug, PartialEq)]
enum Followup {
    /// Send this request again under a fresh msg_id.
    Resend(i64),
    /// Resend every request that went out under an outdated salt.
    ResendStale,
}

/// Tunables the session task reads from [`crate::Config`].
#[derive(Clone, Debug)]
pub(crate) struct SenderOptions {
    pub server_addr:      String,
    pub ack_threshold:    usize,
    pub disconnect_delay: Duration,
}

pub(crate) struct Sender<W> {
    writer:    FrameWriter<W>,
    session:   EncryptedSession,
    registry:  Registry<SystemMessage>,
    pending:   HashMap<i64, Request>,
    /// Server msg_ids we owe an acknowledgement for.
    acks_owed: Vec<i64>,
    updates:   mpsc::UnboundedSender<Update>,
    options:   SenderOptions,
    rng:       SystemRandom,
}

impl<W: AsyncWrite + Unpin> Sender<W> {
    pub(crate) fn new(
        writer:  FrameWriter<W>,
        session: EncryptedSession,
        updates: mpsc::UnboundedSender<Update>,
        options: SenderOptions,
    ) -> Self {
        Self {
            writer,
            session,
            registry: Registry::with_system_types(),
            pending: HashMap::new(),
            acks_owed: Vec::new(),
            updates,
            options,
            rng: SystemRandom,
        }
    }

    /// Serve commands and inbound frames until the connection fails, every
    /// client handle is gone, or `cancel` fires. Requests still pending when
    /// the loop ends are failed with the reason it ended.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut frames:   mpsc::Receiver<Result<Frame, InvocationError>>,
        cancel:       CancellationToken,
    ) {
        info!(session_id = self.session.session_id(), "[mtkit] session started");
        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break InvocationError::Dropped,
                command = commands.recv() => {
                    let Some(command) = command else { break InvocationError::Dropped };
                    if let Err(e) = self.handle_command(command).await {
                        break e;
                    }
                }
                frame = frames.recv() => {
                    let result = match frame {
                        Some(Ok(frame)) => self.handle_frame(frame).await,
                        Some(Err(e)) => Err(e),
                        None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "reader stopped").into()),
                    };
                    if let Err(e) = result {
                        break e;
                    }
                }
            }
        };

        match &reason {
            InvocationError::Dropped => info!("[mtkit] session closed"),
            e => error!(error = %e, pending = self.pending.len(), "[mtkit] session terminated"),
        }
        self.fail_all(&reason);
        cancel.cancel();
        let _ = self.writer.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), InvocationError> {
        match command {
            Command::Invoke { body, reply } => {
                self.flush_acks().await?;
                self.send_request(body, Some(reply)).await
            }
            Command::KeepAlive => {
                self.sweep();
                self.flush_acks().await?;
                let ping = functions::PingDelayDisconnect {
                    ping_id: random_i64()?,
                    disconnect_delay: self.options.disconnect_delay.as_secs() as i32,
                };
                trace!(ping_id = ping.ping_id, "[mtkit] keep-alive");
                self.send_request(ping.to_bytes(), None).await
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
        }
    }

    /// Forget requests nobody waits on any more: callers that gave up (timed
    /// out or dropped the future) and keep-alives the next one supersedes.
    fn sweep(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, r| r.reply.as_ref().is_some_and(|reply| !reply.is_closed()));
        let swept = before - self.pending.len();
        if swept > 0 {
            debug!(swept, "[mtkit] forgot abandoned requests");
        }
    }

    fn snapshot(&self) -> PersistedSession {
        PersistedSession::new(
            self.session.auth_key(),
            self.session.salt(),
            self.session.time_offset(),
            self.options.server_addr.clone(),
        )
    }

    async fn send_request(&mut self, body: Vec<u8>, reply: Option<Reply>) -> Result<(), InvocationError> {
        let packed = self.session.pack(&body, true, &mut self.rng)?;
        debug!(msg_id = packed.msg_id.0, seq_no = packed.seq_no, len = body.len(), "[mtkit] sending request");
        self.pending.insert(packed.msg_id.0, Request { body, salt: self.session.salt(), reply });
        self.writer.send(&packed.frame).await
    }

    async fn flush_acks(&mut self) -> Result<(), InvocationError> {
        if self.acks_owed.is_empty() {
            return Ok(());
        }
        let ack = types::MsgsAck { msg_ids: std::mem::take(&mut self.acks_owed) };
        let packed = self.session.pack_object(&ack, false, &mut self.rng)?;
        trace!(count = ack.msg_ids.len(), "[mtkit] sending msgs_ack");
        self.writer.send(&packed.frame).await
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), InvocationError> {
        let mut data = match frame {
            Frame::Packet(data) => data,
            Frame::TransportError(code) => return Err(InvocationError::Transport { code }),
        };
        let envelope = self.session.unpack(&mut data)?;
        trace!(msg_id = envelope.msg_id.0, seq_no = envelope.seq_no, len = envelope.body.len(), "[mtkit] inbound message");

        let mut followups = Vec::new();
        self.handle_message(envelope.msg_id.0, envelope.seq_no, &envelope.body, &mut followups)?;

        for followup in followups {
            match followup {
                Followup::Resend(msg_id) => self.resend(msg_id).await?,
                Followup::ResendStale => self.resend_stale().await?,
            }
        }
        if self.acks_owed.len() >= self.options.ack_threshold {
            self.flush_acks().await?;
        }
        Ok(())
    }

    /// Acknowledge if content-related, then dispatch.
    fn handle_message(
        &mut self,
        msg_id: i64,
        seq_no: i32,
        body:   &[u8],
        out:    &mut Vec<Followup>,
    ) -> Result<(), InvocationError> {
        if seq_no & 1 == 1 {
            self.acks_owed.push(msg_id);
        }
        self.dispatch(msg_id, body, out)
    }

    /// Undecodable bodies and corrupt `gzip_packed` end the session.
    fn dispatch(&mut self, msg_id: i64, body: &[u8], out: &mut Vec<Followup>) -> Result<(), InvocationError> {
        let message = self.registry.decode_message(body).inspect_err(|e| {
            error!(msg_id, error = %e, "[mtkit] undecodable message");
        })?;

        match message {
            SystemMessage::Container(container) => {
                for inner in container.messages.0 {
                    self.handle_message(inner.msg_id, inner.seqno, &inner.body, out)?;
                }
            }
            SystemMessage::GzipPacked(packed) => {
                let plain = gunzip(&packed.packed_data).inspect_err(|e| {
                    error!(msg_id, error = %e, "[mtkit] corrupt gzip_packed");
                })?;
                return self.dispatch(msg_id, &plain, out);
            }
            SystemMessage::RpcResult(result) => {
                let req_msg_id = result.req_msg_id;
                self.complete(req_msg_id, unwrap_result(result.result.0));
            }
            SystemMessage::Ack(ack) => trace!(count = ack.msg_ids.len(), "[mtkit] acknowledged"),
            SystemMessage::BadServerSalt(bad) => {
                warn!(bad_msg_id = bad.bad_msg_id, new_salt = bad.new_server_salt, "[mtkit] bad_server_salt");
                self.session.set_salt(bad.new_server_salt);
                if !out.contains(&Followup::ResendStale) {
                    out.push(Followup::ResendStale);
                }
            }
            SystemMessage::BadMsgNotification(bad) => self.bad_msg(msg_id, bad, out),
            SystemMessage::NewSessionCreated(created) => {
                info!(first_msg_id = created.first_msg_id, "[mtkit] new session created by server");
                self.session.set_salt(created.server_salt);
            }
            SystemMessage::Pong(pong) => {
                let ping_msg_id = pong.msg_id;
                self.complete(ping_msg_id, Ok(pong.to_bytes()));
            }
            SystemMessage::FutureSalts(salts) => {
                if let Some(salt) = current_salt(&salts) {
                    self.session.set_salt(salt);
                }
                let req_msg_id = salts.req_msg_id;
                self.complete(req_msg_id, Ok(salts.to_bytes()));
            }
            SystemMessage::DetailedInfo(info) => self.acks_owed.push(info.answer_msg_id),
            SystemMessage::NewDetailedInfo(info) => self.acks_owed.push(info.answer_msg_id),
            SystemMessage::Unknown { tag, body } => {
                trace!(msg_id, tag, "[mtkit] update");
                if self.updates.send(Update { msg_id, body }).is_err() {
                    debug!(msg_id, "[mtkit] update dropped, nobody is listening");
                }
            }
        }
        Ok(())
    }

    fn bad_msg(&mut self, server_msg_id: i64, bad: types::BadMsgNotification, out: &mut Vec<Followup>) {
        let code = bad.error_code;
        match code {
            16 | 17 => {
                self.session.correct_time(MsgId(server_msg_id));
                out.push(Followup::Resend(bad.bad_msg_id));
            }
            32 => {
                self.session.bump_sequence();
                out.push(Followup::Resend(bad.bad_msg_id));
            }
            33 => {
                self.session.lower_sequence();
                out.push(Followup::Resend(bad.bad_msg_id));
            }
            48 => out.push(Followup::Resend(bad.bad_msg_id)),
            _ => {
                if matches!(code, 18 | 19 | 34 | 35) {
                    error!(code, bad_msg_id = bad.bad_msg_id, "[mtkit] {}", bad_msg_description(code));
                } else {
                    warn!(code, bad_msg_id = bad.bad_msg_id, "[mtkit] {}", bad_msg_description(code));
                }
                self.complete(bad.bad_msg_id, Err(InvocationError::BadMessage { code }));
            }
        }
    }

    /// Deliver an answer to whoever is waiting on `msg_id`.
    fn complete(&mut self, msg_id: i64, result: Result<Vec<u8>, InvocationError>) {
        match self.pending.remove(&msg_id) {
            Some(Request { reply: Some(reply), .. }) => {
                let _ = reply.send(result);
            }
            Some(_) => trace!(msg_id, "[mtkit] keep-alive answered"),
            None => debug!(msg_id, "[mtkit] answer for unknown request"),
        }
    }

    async fn resend(&mut self, msg_id: i64) -> Result<(), InvocationError> {
        match self.pending.remove(&msg_id) {
            Some(request) => {
                debug!(old_msg_id = msg_id, "[mtkit] resending");
                self.send_request(request.body, request.reply).await
            }
            None => {
                debug!(msg_id, "[mtkit] nothing pending to resend");
                Ok(())
            }
        }
    }

    async fn resend_stale(&mut self) -> Result<(), InvocationError> {
        let salt = self.session.salt();
        let mut stale: Vec<i64> = self.pending.iter()
            .filter(|(_, r)| r.salt != salt)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();
        for msg_id in stale {
            self.resend(msg_id).await?;
        }
        Ok(())
    }

    fn fail_all(&mut self, reason: &InvocationError) {
        for (_, request) in self.pending.drain() {
            if let Some(reply) = request.reply {
                let _ = reply.send(Err(reason.replicate()));
            }
        }
    }
}

/// Peel `gzip_packed` layers off an `rpc_result` payload and turn
/// `rpc_error` into an error.
fn unwrap_result(mut body: Vec<u8>) -> Result<Vec<u8>, InvocationError> {
    loop {
        let tag = constructor_of(&body);
        if tag == Some(types::GzipPacked::CONSTRUCTOR_ID) {
            let packed = types::GzipPacked::from_bytes(&body)?;
            body = gunzip(&packed.packed_data)?;
        } else if tag == Some(types::RpcError::CONSTRUCTOR_ID) {
            let e = types::RpcError::from_bytes(&body)?;
            return Err(InvocationError::Rpc(RpcError::from_server(e.error_code, &e.error_message)));
        } else {
            return Ok(body);
        }
    }
}

fn constructor_of(body: &[u8]) -> Option<u32> {
    let head = body.get(..4)?;
    Some(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
}

fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

/// The advertised salt valid at the server's `now`, latest-starting first.
fn current_salt(salts: &types::FutureSalts) -> Option<i64> {
    salts.salts.0.iter()
        .map(|bare| &bare.0)
        .filter(|s| s.valid_since <= salts.now && salts.now < s.valid_until)
        .max_by_key(|s| s.valid_since)
        .map(|s| s.salt)
}

pub(crate) fn random_i64() -> Result<i64, InvocationError> {
    random_array(&mut SystemRandom)
        .map(i64::from_le_bytes)
        .map_err(|e| io::Error::other(e.to_string()).into())
}

// ─── Helper tasks ────────────────────────────────────────────────────────────

/// Read frames and forward them to the session task. Stops after the first
/// error, which is forwarded too.
pub(crate) async fn read_frames<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    frames:     mpsc::Sender<Result<Frame, InvocationError>>,
    cancel:     CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = reader.recv() => frame,
        };
        let failed = frame.is_err();
        if frames.send(frame).await.is_err() || failed {
            return;
        }
    }
}

/// Ask the session task for a keep-alive every `interval`.
pub(crate) async fn keep_alive(
    commands: mpsc::Sender<Command>,
    interval: Duration,
    cancel:   CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if commands.send(Command::KeepAlive).await.is_err() {
                    return;
                }
            }
        }
    }
}
