//! In-process message source backed by a tokio channel.

use super::MessageSource;
use crate::error::{BridgeError, BridgeResult};
use crate::record::Envelope;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Granularity of the wait loop while the channel is empty.
const IDLE_STEP: Duration = Duration::from_millis(5);

/// Producer half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSender {
    /// Queue an envelope for the consumer.
    pub fn send(&self, envelope: Envelope) -> BridgeResult<()> {
        self.tx
            .send(envelope)
            .map_err(|_| BridgeError::SendFailure("consumer side of channel closed".into()))
    }
}

/// Consumer half of an in-process channel.
///
/// Once every [`ChannelSender`] is dropped and the buffered envelopes are drained,
/// polling fails with `ReceiveFailure`, the same way a removed System V queue does.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl ChannelSource {
    /// Create a connected sender/source pair.
    pub fn pair() -> (ChannelSender, ChannelSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSender { tx }, ChannelSource { rx })
    }
}

impl MessageSource for ChannelSource {
    fn poll(&mut self, wait: Duration) -> BridgeResult<Option<Envelope>> {
        let deadline = Instant::now() + wait;
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(TryRecvError::Disconnected) => {
                    return Err(BridgeError::ReceiveFailure(
                        "all channel senders dropped".into(),
                    ))
                }
                Err(TryRecvError::Empty) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(IDLE_STEP.min(deadline - now));
                }
            }
        }
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order() {
        let (tx, mut source) = ChannelSource::pair();
        tx.send(Envelope::device("a").unwrap()).unwrap();
        tx.send(Envelope::sound("b").unwrap()).unwrap();

        let first = source.poll(Duration::ZERO).unwrap().unwrap();
        let second = source.poll(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.payload(), b"a");
        assert_eq!(second.payload(), b"b");
    }

    #[test]
    fn empty_poll_times_out() {
        let (_tx, mut source) = ChannelSource::pair();
        let start = Instant::now();
        assert!(source.poll(Duration::from_millis(20)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn drains_buffer_before_reporting_disconnect() {
        let (tx, mut source) = ChannelSource::pair();
        tx.send(Envelope::device("last").unwrap()).unwrap();
        drop(tx);

        assert!(source.poll(Duration::ZERO).unwrap().is_some());
        assert!(matches!(
            source.poll(Duration::ZERO),
            Err(BridgeError::ReceiveFailure(_))
        ));
    }
}
