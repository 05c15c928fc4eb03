//! # ADL Bridge Library
//!
//! Receives typed sensor and event records from a System V message queue and
//! appends them as comma-delimited rows to a date-named log file
//! (`<data_dir>/YYYY.MM.DD.dat`), starting a new file with a header row at
//! every day change.
//!
//! ## Crate Structure
//!
//! - **`record`**: The inbound `Envelope`, the typed `Record` it decodes into, and the
//!   `FixedPoint` sensor reading.
//! - **`format`**: `RowFormatter`, rendering records as log rows, and the file header.
//! - **`storage`**: `DailyLogWriter`, which owns the open file, writes the header and
//!   rolls over at day change.
//! - **`queue`**: The `MessageSource` trait with the System V queue and an in-process
//!   channel behind it.
//! - **`consumer`**: The receive → decode → format → append loop and its counters.
//! - **`bridge`**: Starts the consumer on its own thread and shuts it down cleanly.
//! - **`clock`**: Wall-clock abstraction so dates and timestamps can be pinned in tests.
//! - **`config`**: Layered configuration (defaults, TOML file, environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The `BridgeError` type shared by all modules.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod error;
pub mod format;
pub mod logging;
pub mod queue;
pub mod record;
pub mod storage;

pub use bridge::Bridge;
pub use consumer::{BridgeStats, ConsumerState, QueueConsumer, StatsSnapshot};
pub use error::{BridgeError, BridgeResult};
