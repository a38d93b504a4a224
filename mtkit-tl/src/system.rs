//! Service messages a session has to understand on its own.
//!
//! Everything else the server sends is application data and is handed on
//! undecoded, as [`SystemMessage::Unknown`].

use crate::deserialize::{Error, Result};
use crate::registry::Registry;
use crate::types;

/// One decoded inbound message body.
#[derive(Clone, Debug, PartialEq)]
pub enum SystemMessage {
    RpcResult(types::RpcResult),
    Container(types::MsgContainer),
    GzipPacked(types::GzipPacked),
    Ack(types::MsgsAck),
    BadMsgNotification(types::BadMsgNotification),
    BadServerSalt(types::BadServerSalt),
    NewSessionCreated(types::NewSessionCreated),
    Pong(types::Pong),
    FutureSalts(types::FutureSalts),
    DetailedInfo(types::MsgDetailedInfo),
    NewDetailedInfo(types::MsgNewDetailedInfo),
    /// Unregistered tag; `body` is the full message including the tag.
    Unknown { tag: u32, body: Vec<u8> },
}

impl Registry<SystemMessage> {
    /// A registry holding every service constructor above.
    pub fn with_system_types() -> Self {
        let mut reg = Self::new();
        reg.register(SystemMessage::RpcResult);
        reg.register(SystemMessage::Container);
        reg.register(SystemMessage::GzipPacked);
        reg.register(SystemMessage::Ack);
        reg.register(SystemMessage::BadMsgNotification);
        reg.register(SystemMessage::BadServerSalt);
        reg.register(SystemMessage::NewSessionCreated);
        reg.register(SystemMessage::Pong);
        reg.register(SystemMessage::FutureSalts);
        reg.register(SystemMessage::DetailedInfo);
        reg.register(SystemMessage::NewDetailedInfo);
        reg
    }

    /// Decode a whole message body, mapping unregistered tags to
    /// [`SystemMessage::Unknown`]. Malformed known bodies are still errors.
    pub fn decode_message(&self, body: &[u8]) -> Result<SystemMessage> {
        match self.decode_bytes(body) {
            Err(Error::UnknownConstructor { tag, .. }) => {
                Ok(SystemMessage::Unknown { tag, body: body.to_vec() })
            }
            other => other,
        }
    }
}

impl SystemMessage {
    /// Whether this message asks nothing of the receiver beyond an ack
    /// (everything except the bodies the session consumes itself).
    pub fn is_service(&self) -> bool {
        !matches!(self, Self::RpcResult(_) | Self::Unknown { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Blob, RawVec, Serializable};

    #[test]
    fn decodes_known_and_passes_unknown() {
        let reg = Registry::with_system_types();
        assert_eq!(reg.len(), 11);

        let salt = types::BadServerSalt { bad_msg_id: 4, bad_msg_seqno: 1, error_code: 48, new_server_salt: -7 };
        assert_eq!(reg.decode_message(&salt.to_bytes()).unwrap(), SystemMessage::BadServerSalt(salt));

        let app = [0x44u8, 0x33, 0x22, 0x11, 9, 9, 9, 9];
        assert_eq!(
            reg.decode_message(&app).unwrap(),
            SystemMessage::Unknown { tag: 0x11223344, body: app.to_vec() }
        );
    }

    #[test]
    fn rpc_result_keeps_raw_answer() {
        let reg = Registry::with_system_types();
        let inner = types::Pong { msg_id: 1, ping_id: 2 }.to_bytes();
        let res = types::RpcResult { req_msg_id: 40, result: Blob(inner.clone()) };
        match reg.decode_message(&res.to_bytes()).unwrap() {
            SystemMessage::RpcResult(r) => {
                assert_eq!(r.req_msg_id, 40);
                assert_eq!(r.result.0, inner);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncated_known_body_is_an_error() {
        let reg = Registry::with_system_types();
        let mut bytes = types::MsgsAck { msg_ids: vec![1, 2, 3] }.to_bytes();
        bytes.truncate(bytes.len() - 4);
        assert_eq!(reg.decode_message(&bytes), Err(Error::UnexpectedEof));

        let empty = types::MsgContainer { messages: RawVec(vec![]) };
        assert!(SystemMessage::Container(empty).is_service());
    }
}
