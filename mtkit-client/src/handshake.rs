//! Drives the sans-IO key exchange over an async transport.

use mtkit_crypto::rsa::PublicKey;
use mtkit_crypto::{RandomSource, Side, SystemRandom};
use mtkit_mtproto::authentication::{self as auth, Finished, HandshakeOptions};
use mtkit_mtproto::message::{MsgIdGenerator, PlainMessage};
use mtkit_tl::{Deserializable, Serializable};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::errors::InvocationError;
use crate::transport::{FrameReader, FrameWriter};

/// Send one plaintext request and decode the plaintext answer.
async fn round_trip<R, W, T>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    ids:    &mut MsgIdGenerator,
    req:    &impl Serializable,
) -> Result<T, InvocationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    T: Deserializable,
{
    let msg = PlainMessage::new(ids.next(), req.to_bytes());
    writer.send(&msg.to_bytes()).await?;
    let answer = PlainMessage::from_bytes(&reader.recv_packet().await?)?;
    Ok(T::from_bytes(&answer.body)?)
}

/// Run one complete key exchange on an open connection.
///
/// Every call starts from fresh nonces; nothing from a failed run is reused.
pub async fn authorize<R, W>(
    reader:  &mut FrameReader<R>,
    writer:  &mut FrameWriter<W>,
    keys:    &[PublicKey],
    options: &HandshakeOptions,
) -> Result<Finished, InvocationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    authorize_with(reader, writer, keys, options, &mut SystemRandom).await
}

/// [`authorize`] with an explicit random source.
pub async fn authorize_with<R, W>(
    reader:  &mut FrameReader<R>,
    writer:  &mut FrameWriter<W>,
    keys:    &[PublicKey],
    options: &HandshakeOptions,
    rng:     &mut (impl RandomSource + Send),
) -> Result<Finished, InvocationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ids = MsgIdGenerator::new(Side::Client);

    let (req, s1) = auth::do_step1(rng)?;
    let res_pq = round_trip(reader, writer, &mut ids, &req).await?;

    let (req, s2) = auth::do_step2(s1, res_pq, keys, options, rng)?;
    tracing::debug!(fingerprint = req.public_key_fingerprint, "[mtkit] sending req_DH_params");
    let dh_params = round_trip(reader, writer, &mut ids, &req).await?;

    let (now, _) = mtkit_mtproto::message::unix_now();
    let (req, s3) = auth::do_step3(s2, dh_params, rng, now)?;
    let answer = round_trip(reader, writer, &mut ids, &req).await?;

    let done = auth::finish(s3, answer)?;
    tracing::info!(
        key_id = i64::from_le_bytes(done.auth_key.key_id()),
        time_offset = done.time_offset,
        "[mtkit] key exchange complete"
    );
    Ok(done)
}
