//! Boxed types over the constructors in [`types`](crate::types).

use crate::types;

crate::tl_enum! {
    /// Payload encrypted under the server's RSA key during key exchange.
    pub enum PQInnerData {
        PQInnerData(types::PQInnerData),
        Dc(types::PQInnerDataDc),
        Temp(types::PQInnerDataTemp),
        TempDc(types::PQInnerDataTempDc),
    }
}

crate::tl_enum! {
    pub enum ServerDhParams {
        Fail(types::ServerDhParamsFail),
        Ok(types::ServerDhParamsOk),
    }
}

crate::tl_enum! {
    pub enum SetClientDhParamsAnswer {
        DhGenOk(types::DhGenOk),
        DhGenRetry(types::DhGenRetry),
        DhGenFail(types::DhGenFail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Deserializable, Error, Serializable};

    #[test]
    fn boxed_dispatch_picks_variant() {
        let ok = types::DhGenRetry { nonce: [1; 16], server_nonce: [2; 16], new_nonce_hash2: [3; 16] };
        let bytes = ok.to_bytes();
        let answer = SetClientDhParamsAnswer::from_bytes(&bytes).unwrap();
        assert_eq!(answer, SetClientDhParamsAnswer::DhGenRetry(ok));
        assert_eq!(answer.constructor_id(), 0x46dc1fb9);
    }

    #[test]
    fn boxed_unknown_tag() {
        let bytes = 0xdeadbeefu32.to_le_bytes();
        match ServerDhParams::from_bytes(&bytes) {
            Err(Error::UnknownConstructor { tag, remaining }) => {
                assert_eq!(tag, 0xdeadbeef);
                assert!(remaining.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
