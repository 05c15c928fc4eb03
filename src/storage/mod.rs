//! Persistence of formatted rows.

pub mod daily_log;

pub use daily_log::{DailyLogWriter, LogFile};
