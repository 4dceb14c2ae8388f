//! Shared setup for HTTP-level tests
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use rand::rngs::OsRng;
use serde_json::{json, Value};

use ::common::crypto::{EncryptedRequest, EnvelopeCodec, KeyPair, KeyStore, SessionKey};
use ::common::protocol::{DecryptedRequest, ProtocolReply};
use ::common::router::{handler_fn, HandlerError};
use service::{Config, EndpointRegistry, FlowEndpoint, FlowEndpointConfig, ServiceState};

pub const FLOW: &str = "signup";
pub const SECRET: &str = "shh";

pub fn key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate().unwrap())
}

/// A router serving one flow, `signup`, which echoes the submitted fields back on
/// the `DONE` screen
pub fn app(with_secret: bool) -> (Router, ServiceState) {
    app_with_config(&Config::default(), with_secret)
}

pub fn app_with_config(config: &Config, with_secret: bool) -> (Router, ServiceState) {
    let keys = Arc::new(KeyStore::new());
    keys.put(FLOW, key_pair().clone()).unwrap();

    let mut flow_config = FlowEndpointConfig::new(FLOW);
    if with_secret {
        flow_config = flow_config.with_app_secret(SECRET);
    }
    let endpoint = FlowEndpoint::new(FLOW, flow_config, keys.clone());
    endpoint
        .register_handler(
            "FORM",
            handler_fn(|request: DecryptedRequest| async move {
                let data = Value::Object(request.data.clone());
                Ok::<_, HandlerError>(ProtocolReply::new(request.version, "DONE", data))
            }),
        )
        .unwrap();

    let endpoints = Arc::new(EndpointRegistry::new());
    endpoints.register(endpoint);

    let state = ServiceState::new(keys, endpoints);
    (service::http::router(config, state.clone()), state)
}

pub fn form_request() -> DecryptedRequest {
    DecryptedRequest::new("3.0", "data_exchange")
        .with_screen("FORM")
        .with_data(json!({"name": "Ana"}).as_object().cloned().unwrap())
        .with_flow_token("tok-1")
}

pub fn seal(request: &DecryptedRequest) -> (EncryptedRequest, SessionKey) {
    let session_key = SessionKey::generate();
    let envelope = EnvelopeCodec::default()
        .seal_request(request, &session_key, key_pair().public(), &mut OsRng)
        .unwrap();
    (envelope, session_key)
}

pub fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
