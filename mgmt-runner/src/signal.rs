//! Signal-driven shutdown (§6: "signal handlers interpret successive ^C as {graceful-exit,
//! fast-exit, interrupt}"), grounded in the usual `tokio::signal` + `CancellationToken`
//! pattern the pack's service binaries use for graceful shutdown.

use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// First ^C / SIGTERM: let in-flight CheckApply calls finish, then pause and exit.
    Graceful,
    /// Second ^C: ask the engine to Interrupt whatever's running (`Pause(fast=true)`).
    Fast,
    /// Third ^C: stop waiting on anything and tear down immediately.
    Interrupt,
}

/// Spawns a task that listens for SIGINT/SIGTERM and escalates `Graceful -> Fast ->
/// Interrupt` on successive signals. `cancel` fires on the very first signal, so the
/// outer loop always stops asking for more work; `tx` reports which tier was reached so
/// the caller can log it. A third signal (`Interrupt`) doesn't wait for any graceful
/// unwind at all — it kills the process outright, matching "stop waiting on anything and
/// tear down immediately".
pub fn install(cancel: CancellationToken) -> (tokio::sync::mpsc::Receiver<ShutdownRequest>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = tokio::sync::mpsc::channel(3);
    let handle = tokio::spawn(async move {
        let mut stage = 0u8;
        loop {
            if wait_for_signal().await.is_err() {
                return;
            }
            let request = match stage {
                0 => ShutdownRequest::Graceful,
                1 => ShutdownRequest::Fast,
                _ => ShutdownRequest::Interrupt,
            };
            log::warn!("received shutdown signal, escalating to {request:?}");
            cancel.cancel();
            if tx.send(request).await.is_err() {
                return;
            }
            if request == ShutdownRequest::Interrupt {
                std::process::exit(130);
            }
            stage += 1;
        }
    });
    (rx, handle)
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), std::io::Error> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => Ok(()),
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), std::io::Error> {
    tokio::signal::ctrl_c().await
}
