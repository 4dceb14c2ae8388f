pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flowgate")]
#[command(about = "Serve encrypted data-exchange endpoints for messaging flows")]
pub struct Args {
    /// Path to the flowgate app directory (defaults to ~/.flowgate)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
