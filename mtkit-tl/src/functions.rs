//! Protocol-internal RPC functions.

use crate::{RemoteCall, enums, types, Int128};

crate::tl_object! {
    pub struct ReqPqMulti = 0xbe7e8ef1 {
        pub nonce: Int128,
    }
}

impl RemoteCall for ReqPqMulti {
    type Return = types::ResPq;
}

crate::tl_object! {
    pub struct ReqDhParams = 0xd712e4be {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub p: Vec<u8>,
        pub q: Vec<u8>,
        pub public_key_fingerprint: i64,
        pub encrypted_data: Vec<u8>,
    }
}

impl RemoteCall for ReqDhParams {
    type Return = enums::ServerDhParams;
}

crate::tl_object! {
    pub struct SetClientDhParams = 0xf5045f1f {
        pub nonce: Int128,
        pub server_nonce: Int128,
        pub encrypted_data: Vec<u8>,
    }
}

impl RemoteCall for SetClientDhParams {
    type Return = enums::SetClientDhParamsAnswer;
}

crate::tl_object! {
    pub struct Ping = 0x7abe77ec {
        pub ping_id: i64,
    }
}

impl RemoteCall for Ping {
    type Return = types::Pong;
}

crate::tl_object! {
    /// Ping that also asks the server to drop the connection if no further
    /// ping arrives within `disconnect_delay` seconds.
    pub struct PingDelayDisconnect = 0xf3427b8c {
        pub ping_id: i64,
        pub disconnect_delay: i32,
    }
}

impl RemoteCall for PingDelayDisconnect {
    type Return = types::Pong;
}

crate::tl_object! {
    pub struct GetFutureSalts = 0xb921bd04 {
        pub num: i32,
    }
}

impl RemoteCall for GetFutureSalts {
    type Return = types::FutureSalts;
}
