use clap::Args;

use common::crypto::{KeyStore, KeyStoreError};

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Generate {
    /// Flow id the key pair belongs to
    #[arg(long)]
    pub flow: String,

    /// Replace an existing key pair
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("a key pair for flow '{0}' already exists, pass --force to replace it")]
    Exists(String),

    #[error("key generation failed: {0}")]
    Key(#[from] KeyStoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Generate {
    type Error = GenerateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let keys = KeyStore::new();
        keys.load_dir(&state.keys_dir)?;
        if keys.contains(&self.flow) && !self.force {
            return Err(GenerateError::Exists(self.flow.clone()));
        }
        if state.config.flow(&self.flow).is_none() {
            tracing::warn!(flow_id = self.flow.as_str(), "no [[flows]] entry for this id yet");
        }

        let pair = if keys.contains(&self.flow) {
            let retired = keys.rotate(&self.flow)?;
            tracing::info!(
                flow_id = self.flow.as_str(),
                bits = retired.bits(),
                "replacing key pair"
            );
            keys.require(&self.flow)?
        } else {
            keys.generate(&self.flow)?
        };
        let path = keys.save_pem(&self.flow, &state.keys_dir)?;
        let public_key = pair.public_key_base64().map_err(KeyStoreError::from)?;

        Ok(format!(
            "Wrote private key to {}\n\
             Register this public key with the provider:\n{}",
            path.display(),
            public_key
        ))
    }
}
