use clap::Args;
use rand::rngs::OsRng;
use url::Url;

use common::auth::{sign, SIGNATURE_HEADER};
use common::crypto::{
    EncryptedResponse, EnvelopeCodec, EnvelopeError, KeyStore, KeyStoreError, SessionKey,
};
use common::protocol::{DecryptedRequest, ACTION_PING};

use crate::state::{AppState, StateError};

const PING_VERSION: &str = "3.0";

/// Send an encrypted `ping` to a running server and check the decrypted answer.
///
/// Exercises the whole path: key wrap, signature, routing, and reply encryption.
#[derive(Args, Debug, Clone)]
pub struct Ping {
    /// Flow id to ping
    #[arg(long)]
    pub flow: String,

    /// Base URL of the server (default: http://localhost:<listen_port>)
    #[arg(long)]
    pub remote: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Key(#[from] KeyStoreError),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("flow '{0}' is not configured")]
    UnknownFlow(String),

    #[error("server answered {status}: {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

#[async_trait::async_trait]
impl crate::op::Op for Ping {
    type Error = PingError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let flow = state
            .config
            .flow(&self.flow)
            .ok_or_else(|| PingError::UnknownFlow(self.flow.clone()))?;

        let keys = KeyStore::new();
        keys.load_dir(&state.keys_dir)?;
        let pair = keys.require(&flow.id)?;

        let codec = EnvelopeCodec::new(flow.cipher);
        let session_key = SessionKey::generate();
        let request = DecryptedRequest::new(PING_VERSION, ACTION_PING);
        let envelope = codec.seal_request(&request, &session_key, pair.public(), &mut OsRng)?;
        let body = serde_json::to_vec(&envelope).map_err(EnvelopeError::Serialize)?;

        let url = flow_url(self.remote.as_ref(), state.config.listen_port, &flow.id)?;
        let mut http_request = reqwest::Client::new()
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = state.app_secret() {
            http_request = http_request.header(SIGNATURE_HEADER, sign(&body, secret.as_bytes()));
        }

        let response = http_request.body(body).send().await?;
        let status = response.status();
        let payload: serde_json::Value = response.json().await?;

        let encrypted: EncryptedResponse = match serde_json::from_value(payload.clone()) {
            Ok(encrypted) if status.is_success() => encrypted,
            _ => {
                let message = payload
                    .get("error")
                    .and_then(|error| error.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string());
                return Err(PingError::Rejected { status, message });
            }
        };

        let reply = codec.open_reply(&encrypted, &session_key)?;
        Ok(format!("{} -> {}", url, reply.data))
    }
}

fn flow_url(
    remote: Option<&Url>,
    listen_port: u16,
    flow_id: &str,
) -> Result<Url, url::ParseError> {
    let base = match remote {
        Some(remote) => remote.clone(),
        None => Url::parse(&format!("http://localhost:{}", listen_port))?,
    };
    base.join(&format!("flows/{}", flow_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_url_default() {
        let url = flow_url(None, 8080, "signup").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/flows/signup");
    }

    #[test]
    fn test_flow_url_remote() {
        let remote = Url::parse("https://flows.example.com/").unwrap();
        let url = flow_url(Some(&remote), 8080, "signup").unwrap();
        assert_eq!(url.as_str(), "https://flows.example.com/flows/signup");
    }
}
