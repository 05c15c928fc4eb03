//! System V message queue source.
//!
//! Thin wrapper over `msgget`/`msgrcv`/`msgsnd`. A message on the wire is a
//! native `long` type field followed by the payload bytes; the type field carries
//! the record discriminant. The producer sends only the bytes it has, so received
//! payloads are zero-padded up to the block capacity. A message larger than the
//! block fails the receive with `E2BIG` and is reported as a hard error.
#![allow(unsafe_code)]

use super::MessageSource;
use crate::error::{BridgeError, BridgeResult};
use crate::record::{Envelope, PAYLOAD_CAPACITY};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Granularity of the wait loop while the queue is empty.
const IDLE_STEP: Duration = Duration::from_millis(20);

/// Permission bits used when the queue has to be created.
const QUEUE_MODE: libc::c_int = 0o666;

#[repr(C)]
struct RawMessage {
    mtype: libc::c_long,
    mtext: [u8; PAYLOAD_CAPACITY],
}

impl RawMessage {
    fn empty() -> Self {
        Self {
            mtype: 0,
            mtext: [0; PAYLOAD_CAPACITY],
        }
    }
}

/// A System V message queue attached by key.
#[derive(Debug)]
pub struct SysvQueue {
    key: i32,
    id: libc::c_int,
}

impl SysvQueue {
    /// Attach to the queue identified by `key`, creating it if it does not exist.
    pub fn attach(key: i32) -> BridgeResult<Self> {
        // SAFETY: msgget takes plain integers and has no memory side effects.
        let id = unsafe { libc::msgget(key as libc::key_t, libc::IPC_CREAT | QUEUE_MODE) };
        if id == -1 {
            return Err(BridgeError::QueueUnavailable {
                key,
                source: io::Error::last_os_error(),
            });
        }
        info!(key, id, "Attached to message queue");
        Ok(Self { key, id })
    }

    /// Key the queue was attached with.
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Try to take one message without blocking.
    fn try_receive(&mut self) -> BridgeResult<Option<Envelope>> {
        let mut raw = RawMessage::empty();
        // SAFETY: `raw` is a repr(C) message buffer whose text area is exactly
        // PAYLOAD_CAPACITY bytes, the size passed to msgrcv.
        let received = unsafe {
            libc::msgrcv(
                self.id,
                &mut raw as *mut RawMessage as *mut libc::c_void,
                PAYLOAD_CAPACITY,
                0,
                libc::IPC_NOWAIT,
            )
        };

        if received < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENOMSG) => Ok(None),
                Some(libc::EINTR) => {
                    trace!("msgrcv interrupted");
                    Ok(None)
                }
                _ => Err(BridgeError::ReceiveFailure(format!(
                    "msgrcv on queue {} failed: {}",
                    self.key, err
                ))),
            };
        }

        let len = received as usize;
        trace!(mtype = raw.mtype, len, "Received message");
        Envelope::new(i64::from(raw.mtype), &raw.mtext[..len]).map(Some)
    }

    /// Send an envelope, blocking while the queue is full.
    pub fn send(&self, envelope: &Envelope) -> BridgeResult<()> {
        let mtype = libc::c_long::try_from(envelope.discriminant())
            .ok()
            .filter(|t| *t > 0)
            .ok_or_else(|| {
                BridgeError::MalformedPayload(format!(
                    "discriminant {} cannot be sent as a message type",
                    envelope.discriminant()
                ))
            })?;

        let mut raw = RawMessage::empty();
        raw.mtype = mtype;
        raw.mtext.copy_from_slice(envelope.block());
        let len = envelope.payload().len();

        // SAFETY: `raw` holds `len <= PAYLOAD_CAPACITY` valid text bytes after the type field.
        let rc = unsafe {
            libc::msgsnd(
                self.id,
                &raw as *const RawMessage as *const libc::c_void,
                len,
                0,
            )
        };
        if rc == -1 {
            return Err(BridgeError::SendFailure(format!(
                "msgsnd on queue {} failed: {}",
                self.key,
                io::Error::last_os_error()
            )));
        }
        debug!(key = self.key, mtype, len, "Sent message");
        Ok(())
    }
}

impl MessageSource for SysvQueue {
    fn poll(&mut self, wait: Duration) -> BridgeResult<Option<Envelope>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(envelope) = self.try_receive()? {
                return Ok(Some(envelope));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(IDLE_STEP.min(deadline - now));
        }
    }

    fn describe(&self) -> String {
        format!("System V queue {}", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{decode, EnvironmentalSample, FixedPoint, Record};

    /// A private queue that is removed again when the test ends.
    struct PrivateQueue(SysvQueue);

    impl PrivateQueue {
        fn create() -> Self {
            let id = unsafe { libc::msgget(libc::IPC_PRIVATE, libc::IPC_CREAT | 0o600) };
            assert!(id >= 0, "msgget failed: {}", io::Error::last_os_error());
            Self(SysvQueue { key: 0, id })
        }
    }

    impl Drop for PrivateQueue {
        fn drop(&mut self) {
            unsafe {
                libc::msgctl(self.0.id, libc::IPC_RMID, std::ptr::null_mut());
            }
        }
    }

    #[test]
    fn round_trips_text_and_environmental_messages() {
        let mut queue = PrivateQueue::create();
        queue.0.send(&Envelope::device("door_open").unwrap()).unwrap();

        let sample = EnvironmentalSample {
            temperature: FixedPoint::new(21, 5),
            ..Default::default()
        };
        queue.0.send(&Envelope::environmental(&sample)).unwrap();

        let first = queue.0.poll(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(decode(&first).unwrap(), Record::Device("door_open".into()));

        let second = queue.0.poll(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(decode(&second).unwrap(), Record::Environmental(sample));
    }

    #[test]
    fn empty_queue_polls_none() {
        let mut queue = PrivateQueue::create();
        assert!(queue.0.poll(Duration::from_millis(30)).unwrap().is_none());
    }

    #[test]
    fn refuses_non_positive_message_type() {
        let queue = PrivateQueue::create();
        let envelope = Envelope::new(0, b"x").unwrap();
        assert!(queue.0.send(&envelope).is_err());
    }
}
