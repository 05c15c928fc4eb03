//! Lifecycle controller.
//!
//! [`Bridge`] owns the consumer worker thread and the shared log writer. It starts
//! the worker, reports its state and statistics, and shuts it down in a fixed
//! order: clear the running flag, join the worker, then close the log file under
//! the writer lock. Because the worker holds the same lock for the whole
//! obtain-handle-and-append step, a close can never interleave with a write.

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::consumer::{BridgeStats, ConsumerState, QueueConsumer, StatsSnapshot};
use crate::error::{BridgeError, BridgeResult};
use crate::format::RowFormatter;
use crate::queue::MessageSource;
use crate::storage::DailyLogWriter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Name of the worker thread, visible in logs and debuggers.
pub const WORKER_THREAD_NAME: &str = "queue-consumer";

/// A running bridge: one consumer worker plus the log file it writes.
pub struct Bridge {
    running: Arc<AtomicBool>,
    state: Arc<Mutex<ConsumerState>>,
    stats: Arc<BridgeStats>,
    writer: Arc<Mutex<DailyLogWriter>>,
    worker: Option<JoinHandle<()>>,
    exit: Option<oneshot::Receiver<BridgeResult<()>>>,
}

impl Bridge {
    /// Attach to the configured System V queue and start consuming it.
    ///
    /// Fails with `QueueUnavailable` before any thread is started when the queue
    /// cannot be attached.
    #[cfg(target_os = "linux")]
    pub fn start(config: &BridgeConfig) -> BridgeResult<Self> {
        let queue = crate::queue::SysvQueue::attach(config.queue.key)?;
        Self::spawn(queue, config, crate::clock::SystemClock)
    }

    /// Start consuming `source` on a dedicated worker thread.
    pub fn spawn<S, C>(source: S, config: &BridgeConfig, clock: C) -> BridgeResult<Self>
    where
        S: MessageSource + 'static,
        C: Clock + 'static,
    {
        let writer = Arc::new(Mutex::new(DailyLogWriter::new(&config.storage.data_dir)));
        let formatter = RowFormatter::new(&config.site.home_owner, &config.site.location);

        info!(
            source = %source.describe(),
            data_dir = %config.storage.data_dir.display(),
            home_owner = formatter.home_owner(),
            location = formatter.location(),
            "Starting bridge"
        );

        let mut consumer = QueueConsumer::new(source, Arc::clone(&writer), formatter, clock)
            .with_poll_interval(config.queue.poll_interval());
        let running = consumer.running_flag();
        let state = consumer.state_handle();
        let stats = consumer.stats();

        let (exit_tx, exit_rx) = oneshot::channel();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = consumer.run();
                // The receiver is gone once the bridge has been shut down.
                let _ = exit_tx.send(result);
            })
            .map_err(BridgeError::WorkerSpawn)?;

        Ok(Self {
            running,
            state,
            stats,
            writer,
            worker: Some(worker),
            exit: Some(exit_rx),
        })
    }

    /// Current consumer state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Take the receiver that resolves with the worker's final result.
    ///
    /// Returns `None` after the first call.
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<BridgeResult<()>>> {
        self.exit.take()
    }

    /// Stop the worker, close the log file and return the final counters.
    pub fn shutdown(mut self) -> StatsSnapshot {
        self.stop();
        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            rows = stats.rows_written,
            malformed = stats.malformed,
            write_failures = stats.write_failures,
            "Bridge stopped"
        );
        stats
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Consumer thread panicked");
                *self.state.lock() = ConsumerState::Failed;
            }
        }

        let mut writer = self.writer.lock();
        if let Some(path) = writer.current_path() {
            info!(path = %path.display(), "Closing log file");
        }
        if let Err(e) = writer.close() {
            warn!(error = %e, "Failed to flush log file on close");
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
