mod common;

use std::time::Duration;

use common::{Server, rpc_result, test_config};
use mtkit_client::{Client, Config, InvocationError};
use mtkit_crypto::bigint::{be_bytes_padded, known_dh_prime};
use mtkit_crypto::rsa::PrivateKey;
use mtkit_crypto::{AuthKey, aes, generate_key_data_from_nonce, sha1};
use mtkit_mtproto::authentication;
use mtkit_tl::{Cursor, Deserializable, Int128, Serializable, enums, functions, types};
use num_bigint::BigUint;

const TEST_N: &str = "9f5afc0921f62df8a98ad458c45238ad3d94bc1a06affe01ef3213621a3e0079a2b85bda6e14932af21cc1257e0e75122bcbb7f45a40721284c205b08d47ecbb1be28e457bef6096726bf07d3d97192bae3e0845cd2506328b107ea46c6ddde797053bdda786bdc44a91bf1bc60e6817059dc769826008ffa533eb314ac8229087f1d000998aa85a47915161c596854384c4dc89061f3f36b0436fad065c3ef4b9d6911bf789db77cb830d33c225ac2c4b0eb1f0e9725caf1f719a73affe0a540beaaa8ee8e798b5d0cad240e9c9bdbcbeb1d1509842c7706a07e2fb6f4b7989bd752037fc42ce0f1a9d53b0f910b7b0427e6e618a4cd2758174ce7cf17b2e7d";
const TEST_D: &str = "02da78b7db2552d66886c55d9f8a4f5c7ec54a86f6c6b0f82ce5cb260f0d3c29f16976af9718043899243dab23b2339373384f1f6f7c46eea0f4ee70265f7ad430e02227095c9470ad34d4961183c29e1f1d1a3dd1ba0f7dd9329ee9e7cd21d393473336b958b6ce2c7da69be3347fd5a5b2990f011822211dbeabbff2b459b610911ff69ceeaa6dc0688833eff9018bc5e33e6688972bccf04adb7b5e028c85e6bf2aa5ba04ca04d345498ca53f6c743ba5d06854aea988c3b4795c6cda6c1b2da426721d8d6fa5e5f8f66b3cc9248318a977c8c9bc219e677b0c9f5b32f83b9cc305e528cc7d34a21c0d1a7bfd523f98c6f94eb400e5849d9516b0b3139d0b";

const SERVER_NONCE: Int128 = [0xa5; 16];
const PQ: u64 = 1724114033281923457;

fn private_key() -> PrivateKey {
    PrivateKey::from_be_bytes(&hex::decode(TEST_N).unwrap(), &[1, 0, 1], &hex::decode(TEST_D).unwrap())
}

fn prefix<T: Deserializable>(buf: &[u8]) -> T {
    T::deserialize(&mut Cursor::from_slice(buf)).unwrap()
}

fn unix_now() -> i32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i32
}

/// Play the server side of the key exchange; returns the negotiated key.
async fn serve_key_exchange(server: &mut Server, private: &PrivateKey) -> AuthKey {
    let req = functions::ReqPqMulti::from_bytes(&server.recv_plain().await.body).unwrap();
    server
        .send_plain(&types::ResPq {
            nonce: req.nonce,
            server_nonce: SERVER_NONCE,
            pq: PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![private.public_key().fingerprint()],
        })
        .await;

    let req = functions::ReqDhParams::from_bytes(&server.recv_plain().await.body).unwrap();
    assert_eq!(req.p, 1229739323u32.to_be_bytes());
    assert_eq!(req.q, 1402015859u32.to_be_bytes());
    let padded = private.decrypt_hashed(&req.encrypted_data).unwrap();
    let new_nonce = match prefix::<enums::PQInnerData>(&padded) {
        enums::PQInnerData::PQInnerData(inner) => inner.new_nonce,
        other => panic!("unexpected inner data {other:?}"),
    };

    let a = BigUint::from_bytes_be(&[0x5a; 256]);
    let p = known_dh_prime();
    let answer = types::ServerDhInnerData {
        nonce: req.nonce,
        server_nonce: SERVER_NONCE,
        g: 3,
        dh_prime: p.to_bytes_be(),
        g_a: be_bytes_padded(&BigUint::from(3u32).modpow(&a, &p), 256),
        server_time: unix_now(),
    }
    .to_bytes();
    let mut plain = sha1!(&answer).to_vec();
    plain.extend_from_slice(&answer);
    plain.resize(plain.len().next_multiple_of(16), 0);
    let (key, iv) = generate_key_data_from_nonce(&SERVER_NONCE, &new_nonce);
    aes::ige_encrypt(&mut plain, &key, &iv);
    server
        .send_plain(&enums::ServerDhParams::Ok(types::ServerDhParamsOk {
            nonce: req.nonce,
            server_nonce: SERVER_NONCE,
            encrypted_answer: plain,
        }))
        .await;

    let req = functions::SetClientDhParams::from_bytes(&server.recv_plain().await.body).unwrap();
    let mut plain = req.encrypted_data.clone();
    aes::ige_decrypt(&mut plain, &key, &iv);
    let inner: types::ClientDhInnerData = prefix(&plain[20..]);
    let g_b = BigUint::from_bytes_be(&inner.g_b);
    let auth_key = AuthKey::from_slice(&be_bytes_padded(&g_b.modpow(&a, &p), 256)).unwrap();

    server
        .send_plain(&enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk {
            nonce: req.nonce,
            server_nonce: SERVER_NONCE,
            new_nonce_hash1: auth_key.calc_new_nonce_hash(&new_nonce, 1),
        }))
        .await;
    auth_key
}

#[tokio::test]
async fn key_exchange_then_encrypted_request() {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let private = private_key();
    let config = Config {
        public_keys: vec![private.public_key().clone()],
        handshake_timeout: Duration::from_secs(60),
        ..test_config()
    };

    let server = tokio::spawn(async move {
        let mut server = Server::new(server_end, AuthKey::from_bytes([0; 256]));
        let key = serve_key_exchange(&mut server, &private).await;
        server.set_key(key.clone());
        let req = server.recv_content().await;
        assert_eq!(req.body, [1, 2, 3, 4]);
        server.send(&rpc_result(req.msg_id.0, &[9, 9, 9, 9]), true).await;
        (server, key)
    });

    let client = Client::connect_stream(client_end, config).await.unwrap();
    assert_eq!(client.invoke_raw(vec![1, 2, 3, 4]).await.unwrap(), [9, 9, 9, 9]);

    let (_server, key) = server.await.unwrap();
    let session = client.session().await.unwrap();
    assert_eq!(session.auth_key().unwrap(), key);
    assert_eq!(session.server_addr, "test-server:443");
}

#[tokio::test]
async fn unknown_server_key_aborts_the_exchange() {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);

    let server = tokio::spawn(async move {
        let mut server = Server::new(server_end, AuthKey::from_bytes([0; 256]));
        let req = functions::ReqPqMulti::from_bytes(&server.recv_plain().await.body).unwrap();
        server
            .send_plain(&types::ResPq {
                nonce: req.nonce,
                server_nonce: SERVER_NONCE,
                pq: PQ.to_be_bytes().to_vec(),
                server_public_key_fingerprints: vec![0x1234],
            })
            .await;
        server
    });

    let result = Client::connect_stream(client_end, test_config()).await;
    let _server = server.await.unwrap();
    match result {
        Err(InvocationError::Handshake(authentication::Error::NoMatchingKey { fingerprints })) => {
            assert_eq!(fingerprints, vec![0x1234]);
        }
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("handshake should have failed"),
    }
}

#[tokio::test]
async fn silent_server_times_out() {
    let (client_end, _server_end) = tokio::io::duplex(64 * 1024);
    let config = Config { handshake_timeout: Duration::from_millis(50), ..test_config() };
    assert!(matches!(Client::connect_stream(client_end, config).await, Err(InvocationError::Timeout)));
}
