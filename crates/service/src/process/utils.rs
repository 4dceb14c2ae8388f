use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const REQUEST_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Spawns a task that waits for SIGINT or SIGTERM, runs `on_signal`, then notifies the
/// returned watch receiver.
///
/// SIGTERM waits out [`REQUEST_GRACE_PERIOD`] before notifying so in-flight exchanges and
/// load balancer deregistration can finish; SIGINT notifies immediately.
pub fn graceful_shutdown_blocker<F>(
    on_signal: F,
) -> std::io::Result<(JoinHandle<()>, watch::Receiver<()>)>
where
    F: FnOnce() + Send + 'static,
{
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let (tx, rx) = watch::channel(());

    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::debug!("gracefully exiting immediately on SIGINT");
                on_signal();
            }
            _ = sigterm.recv() => {
                tracing::debug!("initiating graceful shutdown with delay on SIGTERM");
                on_signal();
                tokio::time::sleep(REQUEST_GRACE_PERIOD).await;
            }
        }

        let _ = tx.send(());
    });

    Ok((handle, rx))
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

pub fn report_build_info() {
    let build = common::prelude::build_info();

    tracing::info!(
        build_profile = ?build.build_profile,
        features = ?build.build_features,
        version = ?build.version,
        "flowgate starting up"
    );
}
