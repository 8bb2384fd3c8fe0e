//! OS signal forwarding.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::coordinator::ShutdownSignal;

/// Single-slot channel: at most one signal is ever pending.
#[must_use]
pub fn signal_channel() -> (mpsc::Sender<ShutdownSignal>, mpsc::Receiver<ShutdownSignal>) {
    mpsc::channel(1)
}

/// Spawn a task forwarding `SIGINT` and (on unix) `SIGTERM` into `tx`.
///
/// Signals arriving while one is already queued are dropped. The task ends
/// when `cancel` fires.
#[must_use]
pub fn forward_os_signals(
    tx: mpsc::Sender<ShutdownSignal>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut terminate = register_terminate();

        loop {
            let fired = tokio::select! {
                () = cancel.cancelled() => break,

                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => ShutdownSignal::Interrupt,
                    Err(err) => {
                        error!(%err, "ctrl-c signal handler failed");
                        break;
                    }
                },

                Some(()) = recv_terminate(&mut terminate) => ShutdownSignal::Terminate,
            };

            if tx.try_send(fired).is_err() {
                debug!(signal = %fired, "shutdown signal already pending, dropping");
            }
        }
    })
}

#[cfg(unix)]
type TerminateStream = tokio::signal::unix::Signal;

#[cfg(not(unix))]
type TerminateStream = ();

#[cfg(unix)]
fn register_terminate() -> Option<TerminateStream> {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            None
        }
    }
}

#[cfg(not(unix))]
fn register_terminate() -> Option<TerminateStream> {
    None
}

async fn recv_terminate(stream: &mut Option<TerminateStream>) -> Option<()> {
    #[cfg(unix)]
    if let Some(stream) = stream.as_mut() {
        return stream.recv().await;
    }

    #[cfg(not(unix))]
    let _ = stream;

    std::future::pending().await
}
