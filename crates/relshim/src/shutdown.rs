//! Signal handling for the relshim binary

use relshim_core::CancellationToken;
use tracing::{info, warn};

/// Cancel `cancel` when SIGINT or SIGTERM arrives (Ctrl+C or Ctrl+Break on
/// Windows).
///
/// Must be called from within a tokio runtime. If the handlers cannot be
/// installed a warning is logged and the default signal behavior stays.
pub fn install_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                info!(signal, "Received signal, cancelling");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install signal handlers"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(windows)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::windows;

    let mut ctrl_c = windows::ctrl_c()?;
    let mut ctrl_break = windows::ctrl_break()?;

    tokio::select! {
        _ = ctrl_c.recv() => Ok("Ctrl+C"),
        _ = ctrl_break.recv() => Ok("Ctrl+Break"),
    }
}
