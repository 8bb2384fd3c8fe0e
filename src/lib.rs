#![forbid(unsafe_code)]

//! Batch submission client for the agency aggregator.
//!
//! Streams fixed-schema records to a remote aggregator over a framed TCP
//! protocol, one fresh connection per round, then fetches the winner set
//! and acknowledges it. A shutdown coordinator can force-close the
//! connection in flight when the process is interrupted.

pub mod config;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod source;

pub use config::ClientConfig;
pub use errors::{AppError, Result};
