//! Shutdown coordinator.
//!
//! The session loop registers every connection here immediately before using
//! it (last writer wins). A background listener waits for either a signal
//! or normal completion. On a signal it force-closes the registered
//! connection, records which signal fired and cancels the process token;
//! on normal completion it simply exits.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::io::ConnectionHandle;

/// Process interruption that triggered a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// `SIGINT` / ctrl-c.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
}

impl ShutdownSignal {
    /// Conventional signal name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

impl Display for ShutdownSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared shutdown state between the session loop and the signal listener.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    active: Mutex<Option<ConnectionHandle>>,
    fired: Mutex<Option<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator around the process-wide token.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            cancel,
            active: Mutex::new(None),
            fired: Mutex::new(None),
        })
    }

    /// The process-wide cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Register the connection the loop is about to use, replacing any
    /// previous registration.
    pub fn set_active_connection(&self, handle: ConnectionHandle) {
        *lock(&self.active) = Some(handle);
    }

    /// Forget the registered connection.
    pub fn clear_active_connection(&self) {
        lock(&self.active).take();
    }

    /// Flip the cancellation token. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the token has been flipped, by a signal or by normal completion.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The signal that caused the shutdown, if one did.
    #[must_use]
    pub fn fired_signal(&self) -> Option<ShutdownSignal> {
        *lock(&self.fired)
    }

    /// Spawn the listener task.
    ///
    /// The task handles at most one signal from `signals`, then exits. It
    /// exits without acting if the token is cancelled first.
    #[must_use]
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut signals: mpsc::Receiver<ShutdownSignal>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = coordinator.cancel.cancelled() => {
                    debug!("shutdown listener: cancelled before any signal");
                }

                received = signals.recv() => match received {
                    Some(signal) => coordinator.handle_signal(signal),
                    None => debug!("shutdown listener: signal channel closed"),
                },
            }
            debug!(action = "stopping_monitor_task", result = "success");
        })
    }

    fn handle_signal(&self, signal: ShutdownSignal) {
        if let Some(handle) = lock(&self.active).take() {
            if !handle.is_closed() {
                handle.close();
                info!(action = "close_connection", result = "success");
            }
        }

        *lock(&self.fired) = Some(signal);
        info!(action = signal.as_str(), result = "success");
        self.cancel.cancel();
    }
}

/// Poisoning only means another holder panicked; the slot is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
