//! Aggregator wire protocol.
//!
//! - `codec`: byte-exact record and batch framing, plus a [`tokio_util`]
//!   decoder used on the receiving side.
//! - `io`: loop-until-complete reads and writes over a connection that can
//!   be force-closed from another task.
//! - `client`: the request/response operations a session performs.

pub mod client;
pub mod codec;
pub mod io;
