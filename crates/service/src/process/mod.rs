//! Process lifecycle: logging setup, signal handling, and running the HTTP server
//! until shutdown.

mod utils;

use std::time::Duration;

use tokio::time::timeout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http::{self, HttpServerError};
use crate::{Config, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_PREFIX: &str = "flowgate.log";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    Http(#[from] HttpServerError),
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("failed to shut down within {} seconds", .0.as_secs())]
    ShutdownTimeout(Duration),
}

/// Install the global subscriber: compact stdout, plus a daily-rolling file when
/// `log_dir` is set. `RUST_LOG` overrides the configured level.
///
/// The returned guards flush buffered log lines when dropped; hold them for the life
/// of the process.
pub fn init_logging(config: &Config) -> Result<Vec<WorkerGuard>, ProcessError> {
    let mut guards = Vec::new();

    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(config.log_level.into())
            .from_env_lossy()
    };

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(env_filter());

    let file_layer = config.log_dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        guards.push(file_guard);
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guards)
}

/// Run the flow server until SIGINT/SIGTERM, then drain.
///
/// Readiness flips to failing as soon as a signal arrives; the listener stops after
/// the grace period and in-flight exchanges get [`FINAL_SHUTDOWN_TIMEOUT`] to finish.
pub async fn spawn_service(config: Config, state: ServiceState) -> Result<(), ProcessError> {
    utils::register_panic_logger();
    utils::report_build_info();

    let draining_state = state.clone();
    let (graceful_waiter, shutdown_rx) =
        utils::graceful_shutdown_blocker(move || draining_state.begin_shutdown())
            .map_err(ProcessError::Signals)?;

    tracing::info!(flows = ?state.endpoints().ids(), "serving flow endpoints");
    let mut server = tokio::spawn(http::run(config, state, shutdown_rx));

    tokio::select! {
        result = &mut server => {
            // the server only returns early if it failed to start or crashed
            result??;
            return Ok(());
        }
        _ = graceful_waiter => {}
    }

    match timeout(FINAL_SHUTDOWN_TIMEOUT, server).await {
        Ok(result) => {
            result??;
            tracing::info!("flow server shut down");
            Ok(())
        }
        Err(_) => {
            tracing::error!(
                "failed to shut down within {} seconds",
                FINAL_SHUTDOWN_TIMEOUT.as_secs()
            );
            Err(ProcessError::ShutdownTimeout(FINAL_SHUTDOWN_TIMEOUT))
        }
    }
}
