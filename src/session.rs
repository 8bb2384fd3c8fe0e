//! Session loop: submits every batch, then fetches the winner set.
//!
//! Each protocol round uses a fresh connection:
//!
//! 1. `Sending`: connect, register the connection with the shutdown
//!    coordinator, pull the next batch, send it, read the answer, close,
//!    then wait out the loop period unless cancelled.
//! 2. `Finalizing`: connect, register, send the end marker, read the winner
//!    set, send the finish byte, close.
//!
//! A shutdown-induced failure ends the loop in `Done`; any other transport
//! failure ends it in `Aborted` with no retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::models::{Answer, Batch, WinnerSet};
use crate::protocol::client::{recv_answer, recv_results, send_batch, send_end_marker, send_finish};
use crate::protocol::io::Connection;
use crate::shutdown::ShutdownCoordinator;
use crate::source::RecordSource;
use crate::{AppError, Result};

/// Position of the session in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// More records may remain in the source.
    Sending,
    /// Source exhausted; end marker and winner set pending.
    Finalizing,
    /// Finished, normally or by a graceful shutdown.
    Done,
    /// Stopped by a fatal transport or source failure.
    Aborted,
}

/// Outcome of a session that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Terminal state; always [`SessionState::Done`] for a returned report.
    pub final_state: SessionState,
    /// Batches attempted.
    pub rounds: usize,
    /// Records in batches the aggregator answered.
    pub records_sent: usize,
    /// Batches answered with success.
    pub accepted: usize,
    /// Batches answered with failure or abandoned at encoding time.
    pub rejected: usize,
    /// Winner set, if finalization completed.
    pub winners: Option<WinnerSet>,
    /// Whether the loop stopped because of a shutdown.
    pub cancelled: bool,
}

impl Default for SessionReport {
    fn default() -> Self {
        Self {
            final_state: SessionState::Sending,
            rounds: 0,
            records_sent: 0,
            accepted: 0,
            rejected: 0,
            winners: None,
            cancelled: false,
        }
    }
}

/// Drives the batch-submit / end-marker / result-fetch / finish sequence.
pub struct SessionLoop<R> {
    server_address: String,
    agency: u8,
    batch_size: usize,
    loop_period: Duration,
    source: R,
    coordinator: Arc<ShutdownCoordinator>,
    report: SessionReport,
}

impl<R: RecordSource> SessionLoop<R> {
    /// Create a loop for `config`, pulling records from `source`.
    #[must_use]
    pub fn new(config: &ClientConfig, source: R, coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            server_address: config.server_address.clone(),
            agency: config.agency_id,
            batch_size: config.batch_max_amount,
            loop_period: config.loop_period(),
            source,
            coordinator,
            report: SessionReport::default(),
        }
    }

    /// Run the session to completion.
    ///
    /// A shutdown, whether observed between rounds or as a force-closed
    /// connection, still returns `Ok` with `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns the first fatal `AppError::Transport`, `AppError::Source` or
    /// `AppError::InvalidRecord`; the session is then `Aborted`.
    pub async fn run(mut self) -> Result<SessionReport> {
        let span = info_span!("session", agency = self.agency);
        async move {
            let mut state = SessionState::Sending;

            while !matches!(state, SessionState::Done | SessionState::Aborted) {
                let step = match state {
                    SessionState::Sending => self.send_round().await,
                    SessionState::Finalizing => self.finalize().await,
                    SessionState::Done | SessionState::Aborted => break,
                };

                state = match step {
                    Ok(next) => next,
                    Err(err) if err.is_shutdown() => {
                        info!(%err, action = "shutdown", result = "success", "connection closed by shutdown");
                        self.report.cancelled = true;
                        SessionState::Done
                    }
                    Err(err) => {
                        error!(%err, "session aborted");
                        return Err(err);
                    }
                };
            }

            self.report.final_state = state;
            info!(
                action = "loop_finished",
                result = "success",
                client_id = self.agency,
                rounds = self.report.rounds
            );
            Ok(self.report)
        }
        .instrument(span)
        .await
    }

    async fn send_round(&mut self) -> Result<SessionState> {
        if self.source.is_exhausted() {
            return Ok(SessionState::Finalizing);
        }

        let round = self.report.rounds + 1;
        let mut conn = self.open().await?;
        let outcome = self
            .exchange_batch(&mut conn)
            .instrument(info_span!("round", round))
            .await;
        self.release(&mut conn).await;

        match outcome? {
            SessionState::Sending => Ok(self.pause().await),
            next => Ok(next),
        }
    }

    async fn exchange_batch(&mut self, conn: &mut Connection) -> Result<SessionState> {
        let records = self.source.read_batch(self.batch_size).await?;
        if records.is_empty() {
            debug!("source exhausted, nothing sent on this connection");
            return Ok(SessionState::Finalizing);
        }

        let batch = Batch::new(self.agency, records);
        self.report.rounds += 1;

        match send_batch(conn, &batch).await {
            Ok(()) => {}
            Err(AppError::FieldTooLong(msg)) => {
                warn!(
                    action = "apuesta_enviada",
                    result = "fail",
                    cantidad = batch.len(),
                    error = %msg,
                    "batch not sent"
                );
                self.report.rejected += 1;
                return Ok(SessionState::Sending);
            }
            Err(err) => return Err(err),
        }

        let answer = recv_answer(conn).await?;
        info!(
            action = "apuesta_enviada",
            result = answer.as_str(),
            cantidad = batch.len()
        );

        self.report.records_sent += batch.len();
        match answer {
            Answer::Success => self.report.accepted += 1,
            Answer::Fail => self.report.rejected += 1,
        }

        Ok(SessionState::Sending)
    }

    async fn finalize(&mut self) -> Result<SessionState> {
        let agency = self.agency;
        let mut conn = self.open().await?;

        let outcome = async {
            send_end_marker(&mut conn, agency).await?;
            let winners = recv_results(&mut conn).await?;
            send_finish(&mut conn).await?;
            Ok::<_, AppError>(winners)
        }
        .instrument(info_span!("finalize"))
        .await;
        self.release(&mut conn).await;

        let winners = outcome?;
        info!(
            action = "consulta_ganadores",
            result = "success",
            cant_ganadores = winners.len()
        );
        self.report.winners = Some(winners);
        Ok(SessionState::Done)
    }

    /// Connect and register the connection before any blocking use.
    async fn open(&self) -> Result<Connection> {
        let conn = Connection::connect(&self.server_address, self.coordinator.token())
            .await
            .inspect_err(|err| {
                if !err.is_shutdown() {
                    error!(
                        action = "connect",
                        result = "fail",
                        client_id = self.agency,
                        error = %err
                    );
                }
            })?;
        self.coordinator.set_active_connection(conn.handle());
        debug!(action = "connect", result = "success", peer = conn.peer());
        Ok(conn)
    }

    async fn release(&self, conn: &mut Connection) {
        conn.close().await;
        self.coordinator.clear_active_connection();
    }

    /// Wait out the loop period, or stop early on cancellation.
    async fn pause(&mut self) -> SessionState {
        let cancelled = tokio::select! {
            biased;

            () = self.coordinator.token().cancelled() => true,
            () = tokio::time::sleep(self.loop_period) => false,
        };

        if cancelled {
            info!("cancellation observed between rounds");
            self.report.cancelled = true;
            SessionState::Done
        } else {
            SessionState::Sending
        }
    }
}
