use std::sync::Arc;

use clap::Args;

use common::crypto::{KeyStore, KeyStoreError};
use service::process::{init_logging, spawn_service, ProcessError};
use service::{EndpointRegistry, ServiceState};

use crate::handlers::{build_endpoint, EndpointBuildError};
use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Override the configured listen port
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to load keys: {0}")]
    Keys(#[from] KeyStoreError),

    #[error(transparent)]
    Endpoint(#[from] EndpointBuildError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let mut config = state.service_config()?;
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
        let _guards = init_logging(&config)?;

        let keys = Arc::new(KeyStore::new());
        let loaded = keys.load_dir(&state.keys_dir)?;
        tracing::info!(loaded, dir = %state.keys_dir.display(), "loaded key pairs");

        let app_secret = state.app_secret();
        if app_secret.is_none() {
            tracing::warn!("no app secret configured, request signatures will not be checked");
        }

        let endpoints = Arc::new(EndpointRegistry::new());
        for flow in &state.config.flows {
            let endpoint = build_endpoint(
                flow,
                app_secret.as_deref(),
                config.handler_timeout,
                keys.clone(),
            )?;
            if !endpoint.has_key() {
                tracing::warn!(
                    flow_id = flow.id.as_str(),
                    "no key pair loaded, requests will fail until one is generated"
                );
            }
            endpoints.register(endpoint);
        }
        if endpoints.is_empty() {
            tracing::warn!("no flows configured");
        }

        spawn_service(config, ServiceState::new(keys, endpoints)).await?;

        Ok("flowgate stopped".to_string())
    }
}
