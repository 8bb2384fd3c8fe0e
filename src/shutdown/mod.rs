//! Signal-driven cooperative cancellation.
//!
//! - `coordinator`: owns the process cancellation token and the handle of
//!   the connection currently in use; force-closes it on a signal.
//! - `signals`: forwards OS interruption signals into a single-slot channel.

pub mod coordinator;
pub mod signals;

pub use coordinator::{ShutdownCoordinator, ShutdownSignal};
pub use signals::{forward_os_signals, signal_channel};
