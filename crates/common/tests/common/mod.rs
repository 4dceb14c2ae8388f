//! Shared test utilities for envelope and routing integration tests
#![allow(dead_code)]

use std::sync::OnceLock;

use common::crypto::{EncryptedRequest, EnvelopeCodec, KeyPair, SessionKey};
use common::protocol::DecryptedRequest;
use rand::rngs::OsRng;
use serde_json::json;

/// One 2048-bit pair per test binary; generating it is slow
pub fn key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate().unwrap())
}

/// A second, unrelated pair
pub fn other_key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate().unwrap())
}

/// The form submission used across scenarios
pub fn form_request() -> DecryptedRequest {
    DecryptedRequest::new("3.0", "data_exchange")
        .with_screen("FORM")
        .with_data(json!({"name": "Ana"}).as_object().cloned().unwrap())
        .with_flow_token("tok-1")
}

/// Encrypt `request` to `key_pair` the way the provider does
pub fn seal(request: &DecryptedRequest, key_pair: &KeyPair) -> (EncryptedRequest, SessionKey) {
    let session_key = SessionKey::generate();
    let envelope = EnvelopeCodec::default()
        .seal_request(request, &session_key, key_pair.public(), &mut OsRng)
        .unwrap();
    (envelope, session_key)
}
