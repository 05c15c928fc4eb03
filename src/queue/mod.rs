//! Inbound message sources.
//!
//! The consumer loop never blocks indefinitely: it asks its source for the next
//! envelope with a bounded wait and checks for shutdown in between. Two sources
//! are provided:
//!
//! - [`SysvQueue`]: the System V message queue shared with the external producer
//!   (Linux only).
//! - [`ChannelSource`]: an in-process channel, used when the producer lives in the
//!   same process and throughout the tests.

use crate::error::BridgeResult;
use crate::record::Envelope;
use std::time::Duration;

pub mod channel;
#[cfg(target_os = "linux")]
pub mod sysv;

pub use channel::{ChannelSender, ChannelSource};
#[cfg(target_os = "linux")]
pub use sysv::SysvQueue;

/// Well-known key of the queue shared with the producer.
pub const DEFAULT_QUEUE_KEY: i32 = 6604;

/// A source of inbound envelopes.
pub trait MessageSource: Send {
    /// Wait up to `wait` for the next envelope.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Any error is a
    /// [`ReceiveFailure`](crate::error::BridgeError::ReceiveFailure) and ends the consumer.
    fn poll(&mut self, wait: Duration) -> BridgeResult<Option<Envelope>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}
