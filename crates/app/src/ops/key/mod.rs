use clap::{Args, Subcommand};

pub mod generate;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Generate, generate::Generate),
    (Show, show::Show),
}

pub type KeyCommand = Command;

/// Manage flow key pairs
#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use common::crypto::PublicKey;

    use super::*;
    use crate::op::OpContext;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_generate_then_show() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("fg");
        AppState::init(Some(dir.clone()), None).unwrap();
        let ctx = OpContext::new(Some(dir.clone()));

        let generate = generate::Generate {
            flow: "signup".to_string(),
            force: false,
        };
        generate.execute(&ctx).await.unwrap();
        assert!(dir.join("keys").join("signup.pem").is_file());

        // a second generate without --force must not clobber the key
        assert!(matches!(
            generate.execute(&ctx).await,
            Err(generate::GenerateError::Exists(_))
        ));

        let show = show::Show {
            flow: "signup".to_string(),
            pem: false,
        };
        let before = show.execute(&ctx).await.unwrap();
        PublicKey::from_base64_der(&before).unwrap();

        let force = generate::Generate {
            flow: "signup".to_string(),
            force: true,
        };
        force.execute(&ctx).await.unwrap();
        let after = show.execute(&ctx).await.unwrap();
        assert_ne!(before, after);

        let pem = show::Show {
            flow: "signup".to_string(),
            pem: true,
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[tokio::test]
    async fn test_show_missing_key() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("fg");
        AppState::init(Some(dir.clone()), None).unwrap();

        let result = show::Show {
            flow: "nope".to_string(),
            pem: false,
        }
        .execute(&OpContext::new(Some(dir)))
        .await;
        assert!(result.is_err());
    }
}
