//! One flow's data-exchange endpoint.
//!
//! Per request: `Received -> Authenticated -> Decrypted -> Dispatched -> Encrypted`.
//! Every stage can short-circuit to an error reply; no request goes unanswered.
//!
//! Status codes follow what the provider expects: transport-level rejections get
//! 405/401/400, while everything after the envelope parses is answered with 200 and
//! an unencrypted `{"error": ...}` body.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use http::{Method, StatusCode};
use serde::Serialize;
use tokio::time::timeout;

use common::auth::RequestAuthenticator;
use common::crypto::{
    CipherMode, EncryptedRequest, EncryptedResponse, EnvelopeCodec, EnvelopeError, KeyStore,
    KeyStoreError,
};
use common::router::{ActionRouter, DispatchError, Handler, RegistryError};

use crate::config::DEFAULT_HANDLER_TIMEOUT;

const DECRYPTION_FAILED: &str = "failed to decrypt request";

#[derive(Clone)]
pub struct FlowEndpointConfig {
    /// id of the key pair in the shared [`KeyStore`]
    pub key_id: String,
    /// shared secret for `X-Hub-Signature-256`; unsigned requests are
    ///  accepted when unset
    pub app_secret: Option<String>,
    pub cipher: CipherMode,
    pub handler_timeout: Duration,
}

impl std::fmt::Debug for FlowEndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEndpointConfig")
            .field("key_id", &self.key_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("cipher", &self.cipher)
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

impl FlowEndpointConfig {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            app_secret: None,
            cipher: CipherMode::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    pub fn with_cipher(mut self, cipher: CipherMode) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = handler_timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid request body")]
    InvalidBody(#[source] serde_json::Error),
    #[error("flow not configured")]
    FlowNotConfigured(#[source] KeyStoreError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("handler did not respond within {0:?}")]
    Timeout(Duration),
    #[error("handler panicked")]
    HandlerPanicked,
}

impl ExchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ExchangeError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ExchangeError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            // the provider expects 200 for everything past the envelope shape
            _ => StatusCode::OK,
        }
    }

    /// Message safe to send back to the requester.
    ///
    /// Cryptographic failures collapse into one text; handler errors keep theirs.
    pub fn public_message(&self) -> String {
        match self {
            ExchangeError::Envelope(EnvelopeError::MalformedEnvelope(reason)) => {
                format!("malformed envelope: {}", reason)
            }
            ExchangeError::Envelope(EnvelopeError::PayloadMalformed(_)) => {
                "malformed request payload".to_string()
            }
            ExchangeError::Envelope(_) => DECRYPTION_FAILED.to_string(),
            ExchangeError::Timeout(_) => "request timed out".to_string(),
            ExchangeError::HandlerPanicked => "handler failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// What to write back, independent of the HTTP framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EndpointBody {
    Encrypted(EncryptedResponse),
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub body: EndpointBody,
}

impl EndpointResponse {
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: EndpointBody::Error {
                error: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, EndpointBody::Encrypted(_))
    }
}

impl From<Result<EncryptedResponse, ExchangeError>> for EndpointResponse {
    fn from(result: Result<EncryptedResponse, ExchangeError>) -> Self {
        match result {
            Ok(response) => Self {
                status: StatusCode::OK,
                body: EndpointBody::Encrypted(response),
            },
            Err(err) => Self::error(err.status(), err.public_message()),
        }
    }
}

/// Data-exchange endpoint for a single flow
#[derive(Debug, Clone)]
pub struct FlowEndpoint {
    flow_id: String,
    config: FlowEndpointConfig,
    codec: EnvelopeCodec,
    authenticator: Option<RequestAuthenticator>,
    keys: Arc<KeyStore>,
    router: ActionRouter,
}

impl FlowEndpoint {
    pub fn new(
        flow_id: impl Into<String>,
        config: FlowEndpointConfig,
        keys: Arc<KeyStore>,
    ) -> Self {
        Self::with_router(flow_id, config, keys, ActionRouter::new())
    }

    pub fn with_router(
        flow_id: impl Into<String>,
        config: FlowEndpointConfig,
        keys: Arc<KeyStore>,
        router: ActionRouter,
    ) -> Self {
        let authenticator = config
            .app_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(RequestAuthenticator::new);
        Self {
            flow_id: flow_id.into(),
            codec: EnvelopeCodec::new(config.cipher),
            authenticator,
            config,
            keys,
            router,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn config(&self) -> &FlowEndpointConfig {
        &self.config
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    /// Register a handler for an action or screen name
    pub fn register_handler<H: Handler>(
        &self,
        action_or_screen: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.router.register(action_or_screen, handler)
    }

    /// Whether the key pair for this flow is currently loaded
    pub fn has_key(&self) -> bool {
        self.keys.contains(&self.config.key_id)
    }

    /// Base64 DER public key to register with the provider
    pub fn public_key_base64(&self) -> Result<String, ExchangeError> {
        let pair = self
            .keys
            .require(&self.config.key_id)
            .map_err(ExchangeError::FlowNotConfigured)?;
        pair.public_key_base64()
            .map_err(|e| ExchangeError::FlowNotConfigured(e.into()))
    }

    /// SPKI PEM public key
    pub fn public_key_pem(&self) -> Result<String, ExchangeError> {
        let pair = self
            .keys
            .require(&self.config.key_id)
            .map_err(ExchangeError::FlowNotConfigured)?;
        pair.public_key_pem()
            .map_err(|e| ExchangeError::FlowNotConfigured(e.into()))
    }

    /// Answer one HTTP request
    ///
    /// # Arguments
    /// * `method` - The request method; anything but POST is rejected
    /// * `signature` - The raw `X-Hub-Signature-256` header value, if present
    /// * `body` - The exact request body bytes
    pub async fn process(
        &self,
        method: &Method,
        signature: Option<&str>,
        body: &[u8],
    ) -> EndpointResponse {
        let result = self.exchange(method, signature, body).await;
        match &result {
            Ok(_) => tracing::debug!(flow_id = self.flow_id.as_str(), "exchange completed"),
            Err(err @ ExchangeError::Dispatch(DispatchError::Handler(_))) => {
                tracing::info!(flow_id = self.flow_id.as_str(), error = %err, "handler failed")
            }
            Err(ExchangeError::HandlerPanicked) => {
                tracing::error!(flow_id = self.flow_id.as_str(), "handler panicked")
            }
            Err(err) => {
                tracing::warn!(flow_id = self.flow_id.as_str(), error = ?err, "exchange failed")
            }
        }
        result.into()
    }

    async fn exchange(
        &self,
        method: &Method,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<EncryptedResponse, ExchangeError> {
        if method != Method::POST {
            return Err(ExchangeError::MethodNotAllowed);
        }

        // Authenticated: on the raw bytes, before anything is parsed
        if let Some(authenticator) = &self.authenticator {
            if !authenticator.verify(body, signature) {
                return Err(ExchangeError::InvalidSignature);
            }
        }

        let envelope: EncryptedRequest =
            serde_json::from_slice(body).map_err(ExchangeError::InvalidBody)?;

        // resolved per request so rotation applies to the next one
        let key_pair = self
            .keys
            .require(&self.config.key_id)
            .map_err(ExchangeError::FlowNotConfigured)?;

        // Decrypted
        let (request, session_key) = self.codec.decrypt_request(&envelope, &key_pair)?;
        tracing::debug!(
            flow_id = self.flow_id.as_str(),
            action = request.action.as_str(),
            screen = request.screen.as_str(),
            "decrypted request"
        );

        // Dispatched
        let handler_timeout = self.config.handler_timeout;
        // a panicking handler still gets the requester an error reply
        let dispatch = AssertUnwindSafe(self.router.dispatch(request)).catch_unwind();
        let reply = timeout(handler_timeout, dispatch)
            .await
            .map_err(|_| ExchangeError::Timeout(handler_timeout))?
            .map_err(|_| ExchangeError::HandlerPanicked)??;

        // Encrypted
        Ok(self.codec.encrypt_reply(&reply, &session_key)?)
    }
}
