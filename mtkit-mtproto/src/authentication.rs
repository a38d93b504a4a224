//! Sans-IO MTProto authorization key generation.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = authentication::step1()?;
//! // send req, receive resp
//! let (req, s2) = authentication::step2(s1, resp, &keys, &options)?;
//! // send req, receive resp
//! let (req, s3) = authentication::step3(s2, resp)?;
//! // send req, receive resp
//! let done = authentication::finish(s3, resp)?;
//! // done.auth_key is ready
//! ```
//!
//! Each step consumes the previous state, so a failed or abandoned run
//! cannot be resumed: the next attempt starts again at [`step1`] with fresh
//! nonces. The `do_step*` variants take the random source (and clock)
//! explicitly and are fully deterministic given them.

use std::fmt;

use log::{debug, warn};
use mtkit_crypto::bigint::{be_bytes_padded, check_dh_prime, check_dh_values};
use mtkit_crypto::rsa::{self, PublicKey, RsaError};
use mtkit_crypto::{
    AuthKey, DhError, FactorizeError, RandomSource, SystemRandom, aes, constant_time_eq, factorize,
    generate_key_data_from_nonce, random_array, random_vec, sha1,
};
use mtkit_tl::{Cursor, Deserializable, Int128, Int256, Serializable, enums, functions, types};
use num_bigint::BigUint;

use crate::message::unix_now;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Why the server (or our check of its answer) rejected the exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// `server_DH_params_fail`.
    DhParamsFail,
    /// `dh_gen_retry`.
    Retry,
    /// `dh_gen_fail`.
    Fail,
    /// The `new_nonce_hash` the server sent is not the one we expect.
    NewNonceHashMismatch { got: [u8; 16], expected: [u8; 16] },
}

/// Errors that can occur during auth key generation.
#[derive(Clone, Debug)]
pub enum Error {
    NonceMismatch { got: Int128, expected: Int128 },
    ServerNonceMismatch { got: Int128, expected: Int128 },
    /// None of the server's fingerprints belongs to a key we hold.
    NoMatchingKey { fingerprints: Vec<i64> },
    /// `pq` is empty or wider than 64 bits.
    InvalidPq { size: usize },
    Factorize(FactorizeError),
    InvalidDhParams(DhError),
    HandshakeRejected(RejectReason),
    /// SHA-1 prefix of the decrypted DH answer does not match its contents.
    InvalidAnswerHash,
    EncryptedAnswerNotPadded { len: usize },
    Codec(mtkit_tl::Error),
    Rsa(RsaError),
    Random(getrandom::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonceMismatch { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::ServerNonceMismatch { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::NoMatchingKey { fingerprints }
                => write!(f, "no known key among fingerprints {fingerprints:?}"),
            Self::InvalidPq { size }
                => write!(f, "pq of {size} bytes"),
            Self::Factorize(e) => write!(f, "pq: {e}"),
            Self::InvalidDhParams(e) => write!(f, "invalid DH parameters: {e}"),
            Self::HandshakeRejected(reason) => write!(f, "handshake rejected: {reason:?}"),
            Self::InvalidAnswerHash => write!(f, "DH answer hash mismatch"),
            Self::EncryptedAnswerNotPadded { len }
                => write!(f, "encrypted answer len {len} is not 16-byte aligned"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::Random(e) => write!(f, "random source failed: {e}"),
        }
    }
}

impl From<DhError> for Error {
    fn from(e: DhError) -> Self { Self::InvalidDhParams(e) }
}

impl From<FactorizeError> for Error {
    fn from(e: FactorizeError) -> Self { Self::Factorize(e) }
}

impl From<mtkit_tl::Error> for Error {
    fn from(e: mtkit_tl::Error) -> Self { Self::Codec(e) }
}

impl From<RsaError> for Error {
    fn from(e: RsaError) -> Self { Self::Rsa(e) }
}

impl From<getrandom::Error> for Error {
    fn from(e: getrandom::Error) -> Self { Self::Random(e) }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Which inner-data constructor step 2 sends.
///
/// | `dc_id` | `expires_in` | constructor              |
/// |---------|--------------|--------------------------|
/// | `None`  | `None`       | `p_q_inner_data`         |
/// | `Some`  | `None`       | `p_q_inner_data_dc`      |
/// | `None`  | `Some`       | `p_q_inner_data_temp`    |
/// | `Some`  | `Some`       | `p_q_inner_data_temp_dc` |
///
/// With `expires_in` set the resulting key is temporary and expires on
/// the server after that many seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandshakeOptions {
    pub dc_id: Option<i32>,
    pub expires_in: Option<i32>,
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// Waiting for `resPQ`.
#[derive(Debug)]
pub struct Step1 { nonce: Int128 }

/// Waiting for `server_DH_params`.
#[derive(Debug)]
pub struct Step2 {
    nonce:        Int128,
    server_nonce: Int128,
    new_nonce:    Int256,
}

/// Waiting for `dh_gen_*`.
pub struct Step3 {
    nonce:        Int128,
    server_nonce: Int128,
    new_nonce:    Int256,
    gab:          BigUint,
    time_offset:  i32,
}

impl fmt::Debug for Step3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step3").field("time_offset", &self.time_offset).finish_non_exhaustive()
    }
}

/// The final output of a successful auth key handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key:    AuthKey,
    /// Server clock minus local clock, in seconds.
    pub time_offset: i32,
    /// Initial server salt.
    pub first_salt:  i64,
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

/// Generate a `req_pq_multi` request. Returns the request + opaque state.
pub fn step1() -> Result<(functions::ReqPqMulti, Step1), Error> {
    do_step1(&mut SystemRandom)
}

pub fn do_step1(rng: &mut impl RandomSource) -> Result<(functions::ReqPqMulti, Step1), Error> {
    let nonce: Int128 = random_array(rng)?;
    Ok((functions::ReqPqMulti { nonce }, Step1 { nonce }))
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `resPQ` and generate `req_DH_params`.
pub fn step2(
    data:     Step1,
    response: types::ResPq,
    keys:     &[PublicKey],
    options:  &HandshakeOptions,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    do_step2(data, response, keys, options, &mut SystemRandom)
}

pub fn do_step2(
    data:     Step1,
    response: types::ResPq,
    keys:     &[PublicKey],
    options:  &HandshakeOptions,
    rng:      &mut impl RandomSource,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let Step1 { nonce } = data;
    let res_pq = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    if res_pq.pq.is_empty() || res_pq.pq.len() > 8 {
        return Err(Error::InvalidPq { size: res_pq.pq.len() });
    }
    let pq = res_pq.pq.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let (p, q) = factorize(pq)?;
    debug!("[mtkit] factorized pq={pq} into {p} * {q}");

    let key = rsa::find_key(keys, &res_pq.server_public_key_fingerprints)
        .ok_or_else(|| Error::NoMatchingKey { fingerprints: res_pq.server_public_key_fingerprints.clone() })?;

    let new_nonce: Int256 = random_array(rng)?;

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);
    let server_nonce = res_pq.server_nonce;

    let pq_inner = build_inner_data(options, res_pq.pq, &p_bytes, &q_bytes, nonce, server_nonce, new_nonce);
    let ciphertext = rsa::encrypt_hashed(&pq_inner, key, rng)?;

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: key.fingerprint(),
            encrypted_data: ciphertext,
        },
        Step2 { nonce, server_nonce, new_nonce },
    ))
}

fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

fn build_inner_data(
    options: &HandshakeOptions,
    pq: Vec<u8>,
    p: &[u8],
    q: &[u8],
    nonce: Int128,
    server_nonce: Int128,
    new_nonce: Int256,
) -> Vec<u8> {
    let (p, q) = (p.to_vec(), q.to_vec());
    let inner = match (options.dc_id, options.expires_in) {
        (None, None) => enums::PQInnerData::PQInnerData(types::PQInnerData {
            pq, p, q, nonce, server_nonce, new_nonce,
        }),
        (Some(dc), None) => enums::PQInnerData::Dc(types::PQInnerDataDc {
            pq, p, q, nonce, server_nonce, new_nonce, dc,
        }),
        (None, Some(expires_in)) => enums::PQInnerData::Temp(types::PQInnerDataTemp {
            pq, p, q, nonce, server_nonce, new_nonce, expires_in,
        }),
        (Some(dc), Some(expires_in)) => enums::PQInnerData::TempDc(types::PQInnerDataTempDc {
            pq, p, q, nonce, server_nonce, new_nonce, dc, expires_in,
        }),
    };
    inner.to_bytes()
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `server_DH_params` and generate `set_client_DH_params`.
pub fn step3(
    data:     Step2,
    response: enums::ServerDhParams,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let (now, _) = unix_now();
    do_step3(data, response, &mut SystemRandom, now)
}

pub fn do_step3(
    data:     Step2,
    response: enums::ServerDhParams,
    rng:      &mut impl RandomSource,
    now:      i64,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(fail) => {
            check_nonce(&fail.nonce, &nonce)?;
            check_server_nonce(&fail.server_nonce, &server_nonce)?;
            let digest = sha1!(new_nonce);
            let mut expected = [0u8; 16];
            expected.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&fail.new_nonce_hash, &expected)?;
            warn!("[mtkit] server refused DH parameters");
            return Err(Error::HandshakeRejected(RejectReason::DhParamsFail));
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len % 16 != 0 || len < 32 {
        return Err(Error::EncryptedAnswerNotPadded { len });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let (got_hash, rest) = plain.split_at(20);
    let mut cursor = Cursor::from_slice(rest);
    let inner = types::ServerDhInnerData::deserialize(&mut cursor)?;

    // At most 15 bytes of padding may follow the inner data.
    let expected_hash = sha1!(&rest[..cursor.pos()]);
    if cursor.remaining() >= 16 || !constant_time_eq(got_hash, &expected_hash) {
        return Err(Error::InvalidAnswerHash);
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    check_dh_prime(&dh_prime, i64::from(inner.g))?;

    let g = BigUint::from(inner.g as u32);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    let time_offset = (i64::from(inner.server_time) - now).clamp(i32::MIN.into(), i32::MAX.into()) as i32;

    let b = BigUint::from_bytes_be(&random_array::<256>(rng)?);
    let g_b = g.modpow(&b, &dh_prime);
    check_dh_values(&g, &g_a, &g_b, &dh_prime)?;
    let gab = g_a.modpow(&b, &dh_prime);

    let client_dh_inner = types::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    }
    .to_bytes();

    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;
    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&sha1!(&client_dh_inner));
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend(random_vec(rng, pad_len)?);

    aes::ige_encrypt(&mut hashed, &key, &iv);
    debug!("[mtkit] DH parameters accepted, time offset {time_offset}s");

    Ok((
        functions::SetClientDhParams {
            nonce,
            server_nonce,
            encrypted_data: hashed,
        },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Finalise the handshake. Returns the ready [`Finished`] on success.
pub fn finish(
    data:     Step3,
    response: enums::SetClientDhParamsAnswer,
) -> Result<Finished, Error> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData { nonce: Int128, server_nonce: Int128, hash: [u8; 16], num: u8 }

    let dh = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 },
        enums::SetClientDhParamsAnswer::DhGenRetry(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 },
        enums::SetClientDhParamsAnswer::DhGenFail(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 },
    };

    check_nonce(&dh.nonce, &nonce)?;
    check_server_nonce(&dh.server_nonce, &server_nonce)?;

    let auth_key = AuthKey::from_slice(&be_bytes_padded(&gab, 256))
        .ok_or(Error::InvalidDhParams(DhError::OutOfRange(mtkit_crypto::bigint::DhValue::GA)))?;
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    check_new_nonce_hash(&dh.hash, &expected_hash)?;

    let first_salt = {
        let mut buf = [0u8; 8];
        for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
            *dst = a ^ b;
        }
        i64::from_le_bytes(buf)
    };

    match dh.num {
        1 => {
            debug!("[mtkit] new auth key {auth_key:?}");
            Ok(Finished { auth_key, time_offset, first_salt })
        }
        2 => Err(Error::HandshakeRejected(RejectReason::Retry)),
        _ => Err(Error::HandshakeRejected(RejectReason::Fail)),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_nonce(got: &Int128, expected: &Int128) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::NonceMismatch { got: *got, expected: *expected })
    }
}

fn check_server_nonce(got: &Int128, expected: &Int128) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::ServerNonceMismatch { got: *got, expected: *expected })
    }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if constant_time_eq(got, expected) { Ok(()) } else {
        Err(Error::HandshakeRejected(RejectReason::NewNonceHashMismatch { got: *got, expected: *expected }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res_pq(nonce: Int128, pq: Vec<u8>, fingerprints: Vec<i64>) -> types::ResPq {
        types::ResPq { nonce, server_nonce: [0xA0; 16], pq, server_public_key_fingerprints: fingerprints }
    }

    #[test]
    fn step1_sends_the_nonce_it_keeps() {
        let (req, state) = step1().unwrap();
        assert_eq!(req.nonce, state.nonce);
    }

    #[test]
    fn step2_checks_nonce_first() {
        let (_, s1) = step1().unwrap();
        let err = step2(s1, res_pq([0; 16], vec![0x17], vec![]), &[], &HandshakeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NonceMismatch { .. }));
    }

    #[test]
    fn step2_rejects_bad_pq() {
        let (_, s1) = step1().unwrap();
        let nonce = s1.nonce;
        let err = step2(s1, res_pq(nonce, vec![1; 9], vec![]), &[], &HandshakeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidPq { size: 9 }));

        let (_, s1) = step1().unwrap();
        let nonce = s1.nonce;
        let prime = 1229739323u64.to_be_bytes().to_vec();
        let err = step2(s1, res_pq(nonce, prime, vec![]), &[], &HandshakeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Factorize(FactorizeError::Prime(1229739323))));
    }

    #[test]
    fn step2_needs_a_known_fingerprint() {
        let (_, s1) = step1().unwrap();
        let nonce = s1.nonce;
        let keys = rsa::well_known_keys();
        let pq = 1724114033281923457u64.to_be_bytes().to_vec();
        let err = step2(s1, res_pq(nonce, pq, vec![1, 2]), &keys, &HandshakeOptions::default()).unwrap_err();
        match err {
            Error::NoMatchingKey { fingerprints } => assert_eq!(fingerprints, vec![1, 2]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn step2_echoes_pq_factors_and_fingerprint() {
        let (_, s1) = step1().unwrap();
        let nonce = s1.nonce;
        let keys = rsa::well_known_keys();
        let fp = keys[0].fingerprint();
        // pq given with a leading zero byte is still accepted.
        let pq = vec![0, 0, 0x05, 0xc5, 0x6d];
        let (req, _) = step2(s1, res_pq(nonce, pq, vec![fp]), &keys, &HandshakeOptions::default()).unwrap();
        assert_eq!(req.p, 613u64.to_be_bytes()[6..].to_vec());
        assert_eq!(req.q, 617u64.to_be_bytes()[6..].to_vec());
        assert_eq!(req.public_key_fingerprint, fp);
        assert_eq!(req.encrypted_data.len(), 256);
    }

    #[test]
    fn inner_data_variant_follows_options() {
        let tag = |dc_id, expires_in| {
            let bytes = build_inner_data(&HandshakeOptions { dc_id, expires_in }, vec![1], &[1], &[1], [0; 16], [0; 16], [0; 32]);
            u32::from_le_bytes(bytes[..4].try_into().unwrap())
        };
        assert_eq!(tag(None, None), 0x83c95aec);
        assert_eq!(tag(Some(2), None), 0xa9f55f95);
        assert_eq!(tag(None, Some(3600)), 0x3c6a84d4);
        assert_eq!(tag(Some(-2), Some(3600)), 0x56fddf88);
    }

    #[test]
    fn server_dh_params_fail_is_a_rejection() {
        let s2 = Step2 { nonce: [1; 16], server_nonce: [2; 16], new_nonce: [3; 32] };
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&sha1!([3u8; 32])[4..]);
        let fail = types::ServerDhParamsFail { nonce: [1; 16], server_nonce: [2; 16], new_nonce_hash: hash };
        let err = step3(s2, enums::ServerDhParams::Fail(fail)).unwrap_err();
        assert!(matches!(err, Error::HandshakeRejected(RejectReason::DhParamsFail)));
    }

    #[test]
    fn unaligned_answer() {
        let s2 = Step2 { nonce: [1; 16], server_nonce: [2; 16], new_nonce: [3; 32] };
        let ok = types::ServerDhParamsOk { nonce: [1; 16], server_nonce: [2; 16], encrypted_answer: vec![0; 40] };
        let err = step3(s2, enums::ServerDhParams::Ok(ok)).unwrap_err();
        assert!(matches!(err, Error::EncryptedAnswerNotPadded { len: 40 }));
    }
}
