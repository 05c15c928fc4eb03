//! The queue consumer loop.
//!
//! One worker drains a [`MessageSource`] and turns every envelope into a row in
//! the day's log file: timestamp, decode, obtain the file handle, format, append,
//! advance the sequence counter. A message that does not decode never opens a file. The loop waits at most one poll interval at a
//! time and checks its running flag in between, so a stop request is observed
//! without delivering anything through the queue.
//!
//! Malformed messages and failed writes are logged, counted and skipped. Every
//! other error ends the loop and is returned to the caller.

use crate::clock::Clock;
use crate::error::{BridgeError, BridgeResult};
use crate::format::RowFormatter;
use crate::queue::MessageSource;
use crate::record::{decode, Envelope, MessageKind};
use crate::storage::DailyLogWriter;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default longest wait for a message before the running flag is checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where the consumer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created, queue not yet being drained.
    Attaching,
    /// Steady state: receiving and writing rows.
    Receiving,
    /// Stopped on request.
    Stopped,
    /// Ended by a fatal error.
    Failed,
}

/// Counters shared between the worker and whoever supervises it.
#[derive(Debug, Default)]
pub struct BridgeStats {
    received: AtomicU64,
    rows_written: AtomicU64,
    malformed: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Envelopes taken from the source.
    pub received: u64,
    /// Data rows appended (headers not included).
    pub rows_written: u64,
    /// Envelopes skipped because they could not be decoded.
    pub malformed: u64,
    /// Rows dropped because the append failed.
    pub write_failures: u64,
}

impl BridgeStats {
    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            malformed: self.malformed.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
        }
    }
}

/// Drains a message source into the daily log files.
pub struct QueueConsumer<S, C> {
    source: S,
    writer: Arc<Mutex<DailyLogWriter>>,
    formatter: RowFormatter,
    clock: C,
    sequence: u64,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<ConsumerState>>,
    stats: Arc<BridgeStats>,
}

impl<S: MessageSource, C: Clock> QueueConsumer<S, C> {
    /// Create a consumer writing through `writer`.
    ///
    /// The consumer starts out running; clear [`running_flag`](Self::running_flag)
    /// to make [`run`](Self::run) return.
    pub fn new(
        source: S,
        writer: Arc<Mutex<DailyLogWriter>>,
        formatter: RowFormatter,
        clock: C,
    ) -> Self {
        Self {
            source,
            writer,
            formatter,
            clock,
            sequence: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(Mutex::new(ConsumerState::Attaching)),
            stats: Arc::new(BridgeStats::default()),
        }
    }

    /// Set the longest single wait on the source.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Flag observed between polls; storing `false` stops the loop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Shared lifecycle state.
    pub fn state_handle(&self) -> Arc<Mutex<ConsumerState>> {
        Arc::clone(&self.state)
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    /// Sequence number the next written row will carry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn set_state(&self, state: ConsumerState) {
        *self.state.lock() = state;
    }

    /// Receive and write until stopped or a fatal error occurs.
    pub fn run(&mut self) -> BridgeResult<()> {
        self.set_state(ConsumerState::Receiving);
        info!(source = %self.source.describe(), "Consumer receiving");

        while self.running.load(Ordering::SeqCst) {
            let outcome = match self.source.poll(self.poll_interval) {
                Ok(Some(envelope)) => self.process(&envelope),
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                error!(error = %e, seq = self.sequence, "Consumer stopped by fatal error");
                self.set_state(ConsumerState::Failed);
                return Err(e);
            }
        }

        self.set_state(ConsumerState::Stopped);
        debug!(seq = self.sequence, "Consumer loop exiting");
        Ok(())
    }

    /// Handle one envelope.
    ///
    /// Returns `Err` only for errors that must end the loop.
    pub fn process(&mut self, envelope: &Envelope) -> BridgeResult<()> {
        self.stats.received.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();

        let mut writer = self.writer.lock();
        match write_row(&mut writer, &self.formatter, envelope, self.sequence, now) {
            Ok(kind) => {
                debug!(seq = self.sequence, kind = %kind, "Row written");
                self.sequence += 1;
                self.stats.rows_written.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(BridgeError::MalformedPayload(reason)) => {
                warn!(
                    discriminant = envelope.discriminant(),
                    len = envelope.payload().len(),
                    %reason,
                    "Skipping malformed message"
                );
                self.stats.malformed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(e @ BridgeError::WriteFailure { .. }) => {
                warn!(error = %e, seq = self.sequence, "Dropping row after write failure");
                self.stats.write_failures.fetch_add(1, Ordering::SeqCst);
                writer.discard();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn write_row(
    writer: &mut DailyLogWriter,
    formatter: &RowFormatter,
    envelope: &Envelope,
    sequence: u64,
    now: NaiveDateTime,
) -> BridgeResult<MessageKind> {
    let record = decode(envelope)?;
    let log = writer.handle_for(now.date())?;
    log.append_line(&formatter.format(&record, sequence, now))?;
    Ok(record.kind())
}
