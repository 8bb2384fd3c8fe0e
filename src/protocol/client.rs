//! Protocol operations performed over a [`Connection`].
//!
//! | Operation          | Direction | Bytes                                  |
//! |--------------------|-----------|----------------------------------------|
//! | [`send_batch`]     | out       | count (2) + agency (1) + records       |
//! | [`send_end_marker`]| out       | `[0x00, 0x00, agency]`                 |
//! | [`recv_answer`]    | in        | 1 (`0` success, otherwise fail)        |
//! | [`recv_results`]   | in        | count (1) + count × document (4)       |
//! | [`send_finish`]    | out       | `[0x02]`                               |

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use super::codec::{encode_batch, FINISH_BYTE};
use super::io::Connection;
use crate::models::{Answer, Batch, WinnerSet};
use crate::Result;

/// Encode `batch` and write its frames in order.
///
/// The whole batch is encoded before the first write, so an encoding
/// failure leaves the connection untouched.
///
/// # Errors
///
/// Returns `AppError::FieldTooLong` if the batch cannot be encoded, or the
/// transport errors of [`Connection::write_exact`].
pub async fn send_batch<S>(conn: &mut Connection<S>, batch: &Batch) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frames = encode_batch(batch)?;
    for (index, frame) in frames.iter().enumerate() {
        trace!(frame = index, bytes = frame.len(), "writing frame");
        conn.write_exact(frame).await?;
    }
    Ok(())
}

/// Announce that `agency` has no more records: a zero-record batch.
///
/// # Errors
///
/// Returns the transport errors of [`Connection::write_exact`].
pub async fn send_end_marker<S>(conn: &mut Connection<S>, agency: u8) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_batch(conn, &Batch::end_marker(agency)).await
}

/// Read the aggregator's one-byte verdict on the last batch.
///
/// # Errors
///
/// Returns the transport errors of [`Connection::read_exact`].
pub async fn recv_answer<S>(conn: &mut Connection<S>) -> Result<Answer>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let byte = conn.read_exact(1).await?;
    Ok(Answer::from_byte(byte[0]))
}

/// Read the winner set: a one-byte count followed by that many document ids.
///
/// A zero count consumes exactly one byte.
///
/// # Errors
///
/// Returns the transport errors of [`Connection::read_exact`].
pub async fn recv_results<S>(conn: &mut Connection<S>) -> Result<WinnerSet>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let count = conn.read_exact(1).await?[0];
    let mut winners = WinnerSet::new();

    for _ in 0..count {
        let raw = conn.read_exact(4).await?;
        winners.insert(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]));
    }

    Ok(winners)
}

/// Tell the aggregator the winner set was consumed and the client is leaving.
///
/// # Errors
///
/// Returns the transport errors of [`Connection::write_exact`].
pub async fn send_finish<S>(conn: &mut Connection<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_exact(&[FINISH_BYTE]).await
}
