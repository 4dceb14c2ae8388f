use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port for the flow endpoint server (default: 8080)
    #[arg(long, default_value_t = 8080)]
    pub listen_port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            listen_port: self.listen_port,
            ..Default::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized flowgate directory at: {}\n\
             - Keys: {}\n\
             - Config: {}\n\
             - Listen port: {}\n\
             Next: add a [[flows]] entry to the config and run `flowgate key generate --flow <id>`",
            state.app_dir.display(),
            state.keys_dir.display(),
            state.config_path.display(),
            state.config.listen_port,
        );

        Ok(output)
    }
}
