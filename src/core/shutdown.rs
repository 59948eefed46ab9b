//! # Cross-platform OS signal handling.
//!
//! [`spawn_listener`] turns the first termination signal into a cancelled
//! [`CancellationToken`] and a `ShutdownRequested` event.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/containers)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancels `token` on the first termination signal.
///
/// The listener also ends quietly if `token` is cancelled elsewhere.
pub fn spawn_listener(token: CancellationToken, bus: Bus) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = wait_for_shutdown_signal() => match res {
                Ok(()) => {
                    bus.publish(Event::new(EventKind::ShutdownRequested));
                    token.cancel();
                }
                Err(e) => {
                    tracing::error!(error = %e, "termination signals unavailable");
                }
            },
        }
    })
}
