use clap::Args;

use common::crypto::{KeyStore, KeyStoreError};

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Flow id the key pair belongs to
    #[arg(long)]
    pub flow: String,

    /// Print the SPKI PEM instead of base64 DER
    #[arg(long)]
    pub pem: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Key(#[from] KeyStoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let keys = KeyStore::new();
        keys.load_dir(&state.keys_dir)?;
        let pair = keys.require(&self.flow)?;

        let public_key = if self.pem {
            pair.public_key_pem()
        } else {
            pair.public_key_base64()
        }
        .map_err(KeyStoreError::from)?;

        Ok(public_key.trim_end().to_string())
    }
}
