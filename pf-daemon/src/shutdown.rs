//! Stop signal funnel
//!
//! SIGINT and SIGTERM both end up as `true` on one `watch` channel, which is
//! the only way the control loop learns it should stop.

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Install the SIGINT/SIGTERM handlers and return the stop receiver
///
/// The OS handlers are registered before this returns, not when the
/// forwarding task first runs, so a signal that arrives while the first
/// sample is still being actuated is kept and seen at the next loop check.
/// Must be called from inside the runtime.
pub fn install() -> io::Result<watch::Receiver<bool>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGNAL: Received SIGTERM"),
            _ = sigint.recv() => info!("SIGNAL: Received SIGINT"),
        }
        let _ = tx.send(true);
    });

    Ok(rx)
}
