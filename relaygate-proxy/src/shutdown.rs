//! Process signal handling.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for SIGINT or SIGTERM, then cancel `shutdown`.
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    wait_for_signal().await;
    info!("Shutdown signal received, draining");
    shutdown.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Cannot install SIGTERM handler, listening for Ctrl-C only");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
