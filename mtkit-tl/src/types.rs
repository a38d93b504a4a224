//! Protocol-internal constructors: key exchange and service messages.

use crate::deserialize::{Buffer, Error, Result};
use crate::{Bare, Blob, Deserializable, Int128, Int256, RawVec, Serializable};

// ─── Key exchange ─────────────────────────────────────────────────────────────

crate::tl_object! {
    /// `resPQ`: the server's answer to `req_pq_multi`.
    pub struct ResPq = 0x05162463 {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub pq: Vec<u8>,
        pub server_public_key_fingerprints: Vec<i64>,
    }
}

crate::tl_object! {
    pub struct PQInnerData = 0x83c95aec {
        pub pq: Vec<u8>,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce: Int256,
    }
}

crate::tl_object! {
    pub struct PQInnerDataDc = 0xa9f55f95 {
        pub pq: Vec<u8>,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce: Int256,
        pub dc: i32,
    }
}

crate::tl_object! {
    pub struct PQInnerDataTemp = 0x3c6a84d4 {
        pub pq: Vec<u8>,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce: Int256,
        pub expires_in: i32,
    }
}

crate::tl_object! {
    pub struct PQInnerDataTempDc = 0x56fddf88 {
        pub pq: Vec<u8>,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce: Int256,
        pub dc: i32,
        pub expires_in: i32,
    }
}

crate::tl_object! {
    pub struct ServerDhParamsFail = 0x79cb045d {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce_hash: Int128,
    }
}

crate::tl_object! {
    pub struct ServerDhParamsOk = 0xd0e8075c {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub encrypted_answer: Vec<u8>,
    }
}

crate::tl_object! {
    pub struct ServerDhInnerData = 0xb5890dba {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub g: i32,
        pub dh_prime: Vec<u8>,
        pub g_a: Vec<u8>,
        pub server_time: i32,
    }
}

crate::tl_object! {
    pub struct ClientDhInnerData = 0x6643b654 {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub retry_id: i64,
        pub g_b: Vec<u8>,
    }
}

crate::tl_object! {
    pub struct DhGenOk = 0x3bcbf734 {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce_hash1: Int128,
    }
}

crate::tl_object! {
    pub struct DhGenRetry = 0x46dc1fb9 {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce_hash2: Int128,
    }
}

crate::tl_object! {
    pub struct DhGenFail = 0xa69dae02 {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub new_nonce_hash3: Int128,
    }
}

// ─── Service messages ────────────────────────────────────────────────────────

crate::tl_object! {
    /// `rpc_result`: `result` is the raw (possibly gzip-wrapped) answer body.
    pub struct RpcResult = 0xf35c6d01 {
        pub req_msg_id: i64,
        pub result: Blob,
    }
}

crate::tl_object! {
    pub struct RpcError = 0x2144ca19 {
        pub error_code: i32,
        pub error_message: String,
    }
}

crate::tl_object! {
    pub struct Pong = 0x347773c5 {
        pub msg_id: i64,
        pub ping_id: i64,
    }
}

crate::tl_object! {
    pub struct MsgsAck = 0x62d6b459 {
        pub msg_ids: Vec<i64>,
    }
}

crate::tl_object! {
    pub struct BadMsgNotification = 0xa7eff811 {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
    }
}

crate::tl_object! {
    pub struct BadServerSalt = 0xedab447b {
        pub bad_msg_id: i64,
        pub bad_msg_seqno: i32,
        pub error_code: i32,
        pub new_server_salt: i64,
    }
}

crate::tl_object! {
    pub struct NewSessionCreated = 0x9ec20908 {
        pub first_msg_id: i64,
        pub unique_id: i64,
        pub server_salt: i64,
    }
}

crate::tl_object! {
    pub struct FutureSalt = 0x0949d9dc {
        pub valid_since: i32,
        pub valid_until: i32,
        pub salt: i64,
    }
}

crate::tl_object! {
    pub struct FutureSalts = 0xae500895 {
        pub req_msg_id: i64,
        pub now: i32,
        pub salts: RawVec<Bare<FutureSalt>>,
    }
}

crate::tl_object! {
    pub struct MsgDetailedInfo = 0x276d3ec6 {
        pub msg_id: i64,
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }
}

crate::tl_object! {
    pub struct MsgNewDetailedInfo = 0x809db6df {
        pub answer_msg_id: i64,
        pub bytes: i32,
        pub status: i32,
    }
}

crate::tl_object! {
    pub struct GzipPacked = 0x3072cfa1 {
        pub packed_data: Vec<u8>,
    }
}

crate::tl_object! {
    /// `msg_container`: a bare list of independently addressed messages.
    pub struct MsgContainer = 0x73f1f8dc {
        pub messages: RawVec<ContainerMessage>,
    }
}

/// One entry of a [`MsgContainer`]: `msg_id:long seqno:int bytes:int body:Object`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerMessage {
    pub msg_id: i64,
    pub seqno: i32,
    pub body: Vec<u8>,
}

impl Serializable for ContainerMessage {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.msg_id.serialize(buf);
        self.seqno.serialize(buf);
        (self.body.len() as i32).serialize(buf);
        buf.extend(self.body.iter().copied());
    }
}

impl Deserializable for ContainerMessage {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let msg_id = i64::deserialize(buf)?;
        let seqno = i32::deserialize(buf)?;
        let len = usize::try_from(i32::deserialize(buf)?).map_err(|_| Error::LengthOverflow)?;
        let body = buf.take(len)?.to_vec();
        Ok(Self { msg_id, seqno, body })
    }
}
