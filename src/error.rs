//! Custom error types for the bridge.
//!
//! This module defines the primary error type, `BridgeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur between the message queue and the log file.
//!
//! ## Error Hierarchy
//!
//! - **`QueueUnavailable`**: The message queue could not be attached or created at startup.
//! - **`ReceiveFailure`**: A receive call failed for a reason other than "no message yet".
//! - **`SendFailure`**: Injecting a message into the queue failed (producer tooling).
//! - **`MalformedPayload`**: An envelope could not be decoded into a record of its kind.
//! - **`WriteFailure`**: A row could not be appended to the open log file.
//! - **`FileOpenFailure`**: The dated log file could not be created or opened.
//! - **`WorkerSpawn`**: The consumer thread could not be started.
//! - **`Config`** / **`Configuration`**: Configuration could not be loaded, or loaded values
//!   failed validation.
//!
//! Only `MalformedPayload` and `WriteFailure` are recoverable: the consumer loop logs them,
//! drops the offending message and keeps receiving. Everything else ends the loop.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Primary error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The message queue identified by `key` could not be attached or created.
    #[error("Message queue {key} unavailable: {source}")]
    QueueUnavailable {
        key: i32,
        #[source]
        source: std::io::Error,
    },

    /// Receiving from the queue failed.
    #[error("Queue receive failed: {0}")]
    ReceiveFailure(String),

    /// Sending to the queue failed (producer side only).
    #[error("Queue send failed: {0}")]
    SendFailure(String),

    /// An envelope was inconsistent with its declared kind.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Appending to the log file did not complete.
    #[error("Failed to write to '{}': {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dated log file could not be created or opened.
    #[error("Failed to open '{}': {source}", path.display())]
    FileOpenFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The consumer worker thread could not be started.
    #[error("Failed to spawn consumer thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Configuration sources could not be merged or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl BridgeError {
    /// Whether this error must terminate the consumer loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BridgeError::MalformedPayload(_) | BridgeError::WriteFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_not_fatal() {
        assert!(!BridgeError::MalformedPayload("kind 9".into()).is_fatal());
        let write = BridgeError::WriteFailure {
            path: PathBuf::from("data/2023.05.12.dat"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!write.is_fatal());
    }

    #[test]
    fn io_and_ipc_errors_are_fatal() {
        let open = BridgeError::FileOpenFailure {
            path: PathBuf::from("data/2023.05.12.dat"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(open.is_fatal());
        assert!(BridgeError::ReceiveFailure("EIDRM".into()).is_fatal());
        let queue = BridgeError::QueueUnavailable {
            key: 6604,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(queue.is_fatal());
        assert!(queue.to_string().contains("6604"));
    }

    #[test]
    fn write_failure_message_names_the_file() {
        let err = BridgeError::WriteFailure {
            path: PathBuf::from("data/2023.05.12.dat"),
            source: std::io::Error::other("disk full"),
        };
        let message = err.to_string();
        assert!(message.contains("2023.05.12.dat"));
        assert!(message.contains("disk full"));
    }
}
