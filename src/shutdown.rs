use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Grace period between the shutdown signal and forced process exit.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when the first signal is
/// received. The supervisor monitors this token and stops the worker; after
/// `grace` has elapsed the whole process is terminated whether or not the
/// worker has exited. The token never un-cancels.
pub fn install_shutdown_handler(grace: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
            }
        }

        token_clone.cancel();
        grace_deadline(grace).await;
        tracing::info!("Grace period elapsed, exiting");
        std::process::exit(0);
    });

    token
}

/// The hard-deadline timer, separated out so tests can observe its timing
/// without terminating the test process.
pub async fn grace_deadline(grace: Duration) {
    tokio::time::sleep(grace).await;
}
