//! Error types for uart-core.
//!
//! This module defines all error types that can occur while locating a
//! UART peripheral, running a streaming session against it, and supervising
//! that work from a background task.
//!
//! # Propagation
//!
//! Only a few conditions ever reach the caller of a supervised run:
//!
//! | Error | Meaning | Retried by default |
//! |-------|---------|--------------------|
//! | [`Error::DeviceNotFound`] | No advertised name matched within the scan window | No |
//! | [`Error::ConnectionFailed`] / [`Error::SubscribeFailed`] | Transport could not connect or subscribe | No |
//! | [`Error::Bluetooth`] | Uncaught BLE stack failure | No |
//! | [`Error::LinkFailed`] | Protocol error reported by the link while streaming | No |
//!
//! Link loss and cancellation are *not* errors: they end a run with
//! [`crate::StreamEnd::LinkLost`] and [`crate::StreamEnd::Cancelled`].
//! Malformed records are dropped inside the reassembler and only logged.
//! Failures while unsubscribing or disconnecting during cleanup are logged
//! and never replace the reason the session was closing.

use thiserror::Error;

use crate::scan::DiscoveredPeer;

/// Errors that can occur when streaming from a UART peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter available.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// No advertised name contained the target within the scan window.
    #[error("Device not found: no advertised name contains '{target}' ({} peers discovered)", .discovered.len())]
    DeviceNotFound {
        /// The name token that was searched for.
        target: String,
        /// Every peer seen during the scan, for diagnostics.
        discovered: Vec<DiscoveredPeer>,
    },

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Connection failed with specific reason.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// The address that failed to connect.
        address: String,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Subscribing to the notification characteristic failed.
    #[error("Subscribe to {uuid} failed: {reason}")]
    SubscribeFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The link reported an unrecoverable protocol error while streaming.
    #[error("Link failed: {0}")]
    LinkFailed(String),

    /// The background streaming task panicked or was aborted.
    #[error("Streaming task failed: {0}")]
    TaskFailed(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The address is no longer known to the adapter.
    UnknownPeer,
    /// Device is out of range.
    OutOfRange,
    /// Device rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl ConnectionFailureReason {
    /// Classify an error returned by the BLE stack while connecting.
    pub fn from_ble(error: &btleplug::Error) -> Self {
        match error {
            btleplug::Error::DeviceNotFound => Self::OutOfRange,
            btleplug::Error::PermissionDenied => Self::Rejected,
            btleplug::Error::TimedOut(_) => Self::Timeout,
            other => Self::BleError(other.to_string()),
        }
    }
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPeer => write!(f, "peer not known to the adapter"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a not-found error carrying the scan's peer list.
    pub fn device_not_found(target: impl Into<String>, discovered: Vec<DiscoveredPeer>) -> Self {
        Self::DeviceNotFound {
            target: target.into(),
            discovered,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason,
        }
    }

    /// Create a subscribe failure.
    pub fn subscribe_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// The peers seen by the scan, if this is a not-found error.
    pub fn discovered_peers(&self) -> Option<&[DiscoveredPeer]> {
        match self {
            Self::DeviceNotFound { discovered, .. } => Some(discovered),
            _ => None,
        }
    }
}

/// Result type alias using uart-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
