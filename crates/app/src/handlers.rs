//! Handlers declared in `config.toml`, and the endpoints built from them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use common::crypto::KeyStore;
use common::protocol::{DecryptedRequest, ProtocolReply};
use common::router::{Handler, HandlerError, RegistryError};
use service::{FlowEndpoint, FlowEndpointConfig};

use crate::state::{FlowConfig, HandlerConfig};

const FLOW_TOKEN_FIELD: &str = "flow_token";

#[derive(Debug, Clone, PartialEq)]
enum Reply {
    Navigate {
        screen: String,
        data: Map<String, Value>,
        echo_flow_token: bool,
    },
    Close,
}

/// A reply computed from configuration and the request alone
#[derive(Debug, Clone)]
pub struct StaticHandler {
    reply: Reply,
}

impl StaticHandler {
    pub fn navigate(screen: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            reply: Reply::Navigate {
                screen: screen.into(),
                data,
                echo_flow_token: false,
            },
        }
    }

    /// Close the flow, returning the submitted fields as the close params
    pub fn close() -> Self {
        Self { reply: Reply::Close }
    }

    pub fn echo_flow_token(mut self, echo: bool) -> Self {
        if let Reply::Navigate {
            echo_flow_token, ..
        } = &mut self.reply
        {
            *echo_flow_token = echo;
        }
        self
    }
}

impl TryFrom<&HandlerConfig> for StaticHandler {
    type Error = HandlerError;

    fn try_from(config: &HandlerConfig) -> Result<Self, Self::Error> {
        if config.close {
            return Ok(Self::close());
        }
        let Some(screen) = &config.screen else {
            return Err(HandlerError::new(format!(
                "handler '{}' names neither a screen nor close",
                config.key
            )));
        };
        let data = match &config.data {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(HandlerError::new(format!(
                    "handler '{}' data must be a table",
                    config.key
                )))
            }
        };
        Ok(Self::navigate(screen, data).echo_flow_token(config.echo_flow_token))
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn handle(&self, request: DecryptedRequest) -> Result<ProtocolReply, HandlerError> {
        match &self.reply {
            Reply::Navigate {
                screen,
                data,
                echo_flow_token,
            } => {
                let mut data = data.clone();
                if *echo_flow_token {
                    data.insert(
                        FLOW_TOKEN_FIELD.to_string(),
                        Value::String(request.flow_token),
                    );
                }
                Ok(ProtocolReply::navigate(
                    request.version,
                    screen,
                    Value::Object(data),
                ))
            }
            Reply::Close => Ok(ProtocolReply::close(
                request.version,
                Value::Object(request.data),
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointBuildError {
    #[error("flow '{flow}': {source}")]
    Handler {
        flow: String,
        #[source]
        source: HandlerError,
    },
    #[error("flow '{flow}': {source}")]
    Registry {
        flow: String,
        #[source]
        source: RegistryError,
    },
}

/// Build the endpoint for one configured flow, registering its static handlers
pub fn build_endpoint(
    flow: &FlowConfig,
    app_secret: Option<&str>,
    handler_timeout: Duration,
    keys: Arc<KeyStore>,
) -> Result<FlowEndpoint, EndpointBuildError> {
    let mut config = FlowEndpointConfig::new(&flow.id)
        .with_cipher(flow.cipher)
        .with_handler_timeout(handler_timeout);
    if let Some(secret) = app_secret {
        config = config.with_app_secret(secret);
    }

    let endpoint = FlowEndpoint::new(&flow.id, config, keys);
    for handler_config in &flow.handlers {
        let handler =
            StaticHandler::try_from(handler_config).map_err(|source| EndpointBuildError::Handler {
                flow: flow.id.clone(),
                source,
            })?;
        endpoint
            .register_handler(&handler_config.key, handler)
            .map_err(|source| EndpointBuildError::Registry {
                flow: flow.id.clone(),
                source,
            })?;
    }

    tracing::debug!(
        flow_id = flow.id.as_str(),
        handlers = flow.handlers.len(),
        cipher = %flow.cipher,
        "built flow endpoint"
    );
    Ok(endpoint)
}

#[cfg(test)]
mod test {
    use common::crypto::CipherMode;
    use serde_json::json;

    use super::*;

    fn request(screen: &str) -> DecryptedRequest {
        DecryptedRequest::new("3.0", "data_exchange")
            .with_screen(screen)
            .with_data(json!({"email": "a@b.c"}).as_object().cloned().unwrap())
            .with_flow_token("tok-9")
    }

    fn handler_config(key: &str) -> HandlerConfig {
        HandlerConfig {
            key: key.to_string(),
            screen: None,
            data: None,
            echo_flow_token: false,
            close: false,
        }
    }

    #[tokio::test]
    async fn test_navigate_with_flow_token() {
        let handler = StaticHandler::try_from(&HandlerConfig {
            screen: Some("DETAILS".to_string()),
            data: Some(json!({"title": "Details"})),
            echo_flow_token: true,
            ..handler_config("FORM")
        })
        .unwrap();

        let reply = handler.handle(request("FORM")).await.unwrap();
        assert_eq!(reply.screen.as_deref(), Some("DETAILS"));
        assert_eq!(reply.version, "3.0");
        assert_eq!(reply.data, json!({"title": "Details", "flow_token": "tok-9"}));
    }

    #[tokio::test]
    async fn test_close_returns_submitted_data() {
        let handler = StaticHandler::try_from(&HandlerConfig {
            close: true,
            ..handler_config("CONFIRM")
        })
        .unwrap();

        let reply = handler.handle(request("CONFIRM")).await.unwrap();
        assert!(reply.is_terminal());
        assert_eq!(reply.close_params(), Some(&json!({"email": "a@b.c"})));
    }

    #[test]
    fn test_rejects_non_table_data() {
        let result = StaticHandler::try_from(&HandlerConfig {
            screen: Some("X".to_string()),
            data: Some(json!([1, 2])),
            ..handler_config("FORM")
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_build_endpoint_registers_handlers() {
        let flow = FlowConfig {
            id: "signup".to_string(),
            cipher: CipherMode::AesGcm,
            handlers: vec![
                HandlerConfig {
                    screen: Some("WELCOME".to_string()),
                    ..handler_config("INIT")
                },
                HandlerConfig {
                    close: true,
                    ..handler_config("CONFIRM")
                },
            ],
        };
        let endpoint = build_endpoint(
            &flow,
            Some("secret"),
            Duration::from_secs(5),
            Arc::new(KeyStore::new()),
        )
        .unwrap();

        assert_eq!(endpoint.flow_id(), "signup");
        assert_eq!(endpoint.config().key_id, "signup");
        assert_eq!(endpoint.config().handler_timeout, Duration::from_secs(5));
        assert_eq!(
            endpoint.router().registry().keys(),
            vec!["CONFIRM".to_string(), "INIT".to_string()]
        );
    }

    #[test]
    fn test_build_endpoint_duplicate_key() {
        let flow = FlowConfig {
            id: "signup".to_string(),
            cipher: CipherMode::AesGcm,
            handlers: vec![
                HandlerConfig {
                    close: true,
                    ..handler_config("CONFIRM")
                },
                HandlerConfig {
                    close: true,
                    ..handler_config("CONFIRM")
                },
            ],
        };
        let result = build_endpoint(&flow, None, Duration::from_secs(5), Arc::new(KeyStore::new()));
        assert!(matches!(result, Err(EndpointBuildError::Registry { .. })));
    }
}
