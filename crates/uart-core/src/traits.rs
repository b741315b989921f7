//! Transport capability traits.
//!
//! The streaming core never talks to a radio directly. It drives a
//! [`Transport`] (discovery and connection) and the [`Link`] a connection
//! yields (subscription and teardown). [`crate::ble::BtleTransport`] backs
//! these with btleplug; [`crate::mock::MockTransport`] backs them with
//! in-memory state for tests.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::scan::{DeviceHandle, DiscoveredPeer};

/// Callback invoked by the transport with each raw notification payload.
///
/// This is the only path by which data crosses from the transport into the
/// core; the callback owns whatever state it writes to.
pub type NotificationCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Discovery and connection capability.
///
/// # Example
///
/// ```ignore
/// use uart_core::{Transport, Link, Result};
///
/// async fn count_peers<T: Transport>(transport: &T) -> Result<usize> {
///     Ok(transport.discover(std::time::Duration::from_secs(5)).await?.len())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// The connection type produced by [`connect`](Self::connect).
    type Link: Link + 'static;

    /// Scan for `window` and return every advertising peer, in discovery order.
    async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredPeer>>;

    /// Establish a connection to a previously discovered peer.
    async fn connect(&self, device: &DeviceHandle) -> Result<Self::Link>;
}

/// One established transport-level connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Register `callback` for notifications on `characteristic`.
    async fn subscribe(&self, characteristic: Uuid, callback: NotificationCallback) -> Result<()>;

    /// Stop notifications on `characteristic`.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Tear down the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Resolve once the link is gone.
    ///
    /// `Ok(())` means the peer disconnected or went out of range;
    /// `Err` means the link hit an unrecoverable protocol error.
    async fn closed(&self) -> Result<()>;

    /// List the peer's services and characteristics, for diagnostics.
    async fn services(&self) -> Result<Vec<ServiceInfo>>;
}

/// A GATT service as reported by the connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics exposed by the service.
    pub characteristics: Vec<CharacteristicInfo>,
}

/// A GATT characteristic and its properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Property flags, e.g. `["READ", "NOTIFY"]`.
    pub properties: Vec<String>,
}
