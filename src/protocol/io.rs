//! Full-read / full-write primitives over a force-closable connection.
//!
//! A [`Connection`] owns its byte stream exclusively. A cloneable
//! [`ConnectionHandle`] is handed to the shutdown coordinator so it can close
//! the connection out-of-band: every blocking read or write races the
//! handle's close switch and returns [`AppError::Shutdown`] as soon as it
//! fires.
//!
//! The close switch is a child of the process cancellation token, so
//! cancelling the process also trips every live connection.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AppError, Result};

/// Out-of-band close switch for a [`Connection`].
///
/// Closing is idempotent and safe after the connection is gone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    close: CancellationToken,
}

impl ConnectionHandle {
    /// Force-close the connection, unblocking any pending read or write.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether the switch has fired.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }
}

/// A single-round connection to the aggregator.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    stream: Option<S>,
    close: CancellationToken,
    peer: String,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to `addr`.
    ///
    /// The attempt is abandoned if `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Shutdown` if `cancel` fires while connecting,
    /// `AppError::Transport` if the connect itself fails.
    pub async fn connect(addr: &str, cancel: &CancellationToken) -> Result<Self> {
        let stream = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                return Err(AppError::Shutdown(format!("connect to {addr} cancelled")));
            }

            res = TcpStream::connect(addr) => res.map_err(|err| {
                AppError::Transport(format!("connect to {addr} failed: {err}"))
            })?,
        };

        if let Err(err) = stream.set_nodelay(true) {
            debug!(addr, %err, "failed to set TCP_NODELAY");
        }

        Ok(Self::new(stream, addr, cancel))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open stream. The close switch is derived from `cancel`.
    pub fn new(stream: S, peer: impl Into<String>, cancel: &CancellationToken) -> Self {
        Self {
            stream: Some(stream),
            close: cancel.child_token(),
            peer: peer.into(),
        }
    }

    /// Handle through which another task may force-close this connection.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            close: self.close.clone(),
        }
    }

    /// Remote address this connection was opened against.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the connection was closed, normally or by force.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none() || self.close.is_cancelled()
    }

    /// Read exactly `n` bytes, looping over short reads.
    ///
    /// Never returns a short buffer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` on a read error or a zero-byte read
    /// (peer closed), or `AppError::Shutdown` if the connection was
    /// force-closed or the process is cancelling.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let Some(stream) = self.stream.as_mut() else {
                return Err(classify(&self.close, "read on closed connection"));
            };

            let read = tokio::select! {
                biased;

                () = self.close.cancelled() => {
                    return Err(AppError::Shutdown("connection closed during read".into()));
                }

                res = stream.read(&mut buf[filled..]) => res,
            };

            match read {
                Ok(0) => {
                    return Err(classify(
                        &self.close,
                        &format!("peer closed after {filled} of {n} bytes"),
                    ));
                }
                Ok(count) => filled += count,
                Err(err) => return Err(classify(&self.close, &format!("read failed: {err}"))),
            }
        }

        Ok(buf)
    }

    /// Write all of `bytes`, looping over short writes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` on a write error or a zero-byte write,
    /// or `AppError::Shutdown` if the connection was force-closed or the
    /// process is cancelling.
    pub async fn write_exact(&mut self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < bytes.len() {
            let Some(stream) = self.stream.as_mut() else {
                return Err(classify(&self.close, "write on closed connection"));
            };

            let wrote = tokio::select! {
                biased;

                () = self.close.cancelled() => {
                    return Err(AppError::Shutdown("connection closed during write".into()));
                }

                res = stream.write(&bytes[written..]) => res,
            };

            match wrote {
                Ok(0) => {
                    return Err(classify(
                        &self.close,
                        &format!("zero-byte write after {written} of {} bytes", bytes.len()),
                    ));
                }
                Ok(count) => written += count,
                Err(err) => return Err(classify(&self.close, &format!("write failed: {err}"))),
            }
        }

        if let Some(stream) = self.stream.as_mut() {
            stream
                .flush()
                .await
                .map_err(|err| classify(&self.close, &format!("flush failed: {err}")))?;
        }

        Ok(())
    }

    /// Shut down and release the stream. Closing twice is a no-op.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        if let Err(err) = stream.shutdown().await {
            debug!(peer = %self.peer, %err, "shutdown on close failed");
        }
        debug!(peer = %self.peer, action = "close_connection", result = "success");
    }
}

/// An I/O failure is shutdown-induced once the close switch has fired.
fn classify(close: &CancellationToken, msg: &str) -> AppError {
    if close.is_cancelled() {
        AppError::Shutdown(msg.to_owned())
    } else {
        AppError::Transport(msg.to_owned())
    }
}
