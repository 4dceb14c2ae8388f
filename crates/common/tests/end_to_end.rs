//! Full exchange as seen from both sides of the wire
mod common;

use ::common::crypto::{
    decrypt_request, encrypt_reply, EncryptedRequest, EnvelopeCodec, SessionKey, GCM_IV_SIZE,
};
use ::common::protocol::{DecryptedRequest, ProtocolReply};
use ::common::router::{handler_fn, ActionRouter, HandlerError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;

const REQUEST_JSON: &str = r#"{"version":"3.0","action":"data_exchange","screen":"FORM","data":{"name":"Ana"},"flow_token":"tok-1"}"#;
const REPLY_JSON: &str = r#"{"version":"3.0","screen":"SUCCESS","data":{}}"#;

#[test]
fn test_known_key_exchange() {
    let key_pair = common::key_pair();
    let raw_key = [0x42u8; 32];
    let session_key = SessionKey::from(raw_key);

    // Provider side: wrap the key, encrypt the request with a 96-bit IV
    let wrapped = key_pair
        .public()
        .wrap_session_key(&session_key, &mut OsRng)
        .unwrap();
    let mut iv = [0u8; GCM_IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = Aes256Gcm::new_from_slice(&raw_key)
        .unwrap()
        .encrypt(Nonce::from_slice(&iv), REQUEST_JSON.as_bytes())
        .unwrap();
    let envelope = EncryptedRequest {
        encrypted_flow_data: BASE64.encode(&ciphertext),
        encrypted_aes_key: BASE64.encode(&wrapped),
        initial_vector: BASE64.encode(iv),
    };

    // Our side
    let (request, recovered) = decrypt_request(&envelope, key_pair).unwrap();
    assert_eq!(request, common::form_request());
    assert_eq!(recovered.bytes(), &raw_key);

    let reply: ProtocolReply = serde_json::from_str(REPLY_JSON).unwrap();
    let response = encrypt_reply(&reply, &recovered).unwrap();

    // Provider side again: split the carried IV and decrypt with the same key
    let raw = BASE64.decode(&response.encrypted_flow_data).unwrap();
    let (reply_iv, reply_ciphertext) = raw.split_at(GCM_IV_SIZE);
    let plaintext = Aes256Gcm::new_from_slice(&raw_key)
        .unwrap()
        .decrypt(Nonce::from_slice(reply_iv), reply_ciphertext)
        .unwrap();
    assert_eq!(String::from_utf8(plaintext).unwrap(), REPLY_JSON);
}

#[tokio::test]
async fn test_routed_exchange() {
    let key_pair = common::key_pair();
    let router = ActionRouter::new();
    router
        .register(
            "FORM",
            handler_fn(|request: DecryptedRequest| async move {
                let name = request
                    .field("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| HandlerError::new("name is required"))?;
                Ok::<_, HandlerError>(ProtocolReply::navigate(
                    request.version.clone(),
                    "CONFIRM",
                    json!({ "greeting": format!("Hello, {}", name) }),
                ))
            }),
        )
        .unwrap();

    let codec = EnvelopeCodec::default();
    let (envelope, session_key) = common::seal(&common::form_request(), key_pair);
    let (request, recovered) = codec.decrypt_request(&envelope, key_pair).unwrap();
    let reply = router.dispatch(request).await.unwrap();
    let response = codec.encrypt_reply(&reply, &recovered).unwrap();

    let opened = codec.open_reply(&response, &session_key).unwrap();
    assert_eq!(opened.screen.as_deref(), Some("CONFIRM"));
    assert_eq!(opened.data["greeting"], json!("Hello, Ana"));
}

#[tokio::test]
async fn test_ping_through_full_path() {
    let key_pair = common::key_pair();
    let codec = EnvelopeCodec::default();
    let ping = DecryptedRequest::new("3.0", "ping");
    let (envelope, session_key) = common::seal(&ping, key_pair);

    let (request, recovered) = codec.decrypt_request(&envelope, key_pair).unwrap();
    let reply = ActionRouter::new().dispatch(request).await.unwrap();
    let response = codec.encrypt_reply(&reply, &recovered).unwrap();

    let opened = codec.open_reply(&response, &session_key).unwrap();
    assert_eq!(
        serde_json::to_value(&opened).unwrap(),
        json!({"version": "3.0", "data": {"status": "active"}})
    );
}
