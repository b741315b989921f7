//! Mock transport implementation for testing.
//!
//! This module provides a transport and link that behave like a BLE stack
//! without requiring actual hardware.
//!
//! [`MockTransport`] implements [`Transport`] and its links implement
//! [`Link`], so the locator, session and supervisor can be exercised end to
//! end in ordinary `#[tokio::test]`s.
//!
//! # Features
//!
//! - **Simulated peers**: a fixed advertising list, returned in order
//! - **Failure injection**: make discovery, connection or subscription fail
//! - **Latency simulation**: delay discovery and connection
//! - **Link control**: push notification chunks, drop the link, or report a
//!   protocol error through a [`MockLinkHandle`]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use uart_types::uuid::{UART_RX, UART_SERVICE, UART_TX};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{DeviceHandle, DiscoveredPeer};
use crate::traits::{CharacteristicInfo, Link, NotificationCallback, ServiceInfo, Transport};

/// How the mock link ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CloseReason {
    Lost,
    Failed(String),
}

/// State shared between the transport, its links and test handles.
struct LinkState {
    callback: Mutex<Option<NotificationCallback>>,
    subscribed: watch::Sender<bool>,
    closed: watch::Sender<Option<CloseReason>>,
    connected: AtomicBool,
    dropped: AtomicBool,
    subscribed_uuid: Mutex<Option<Uuid>>,
    subscribe_calls: AtomicU32,
    unsubscribe_calls: AtomicU32,
    disconnect_calls: AtomicU32,
}

impl LinkState {
    fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            subscribed: watch::channel(false).0,
            closed: watch::channel(None).0,
            connected: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
            subscribed_uuid: Mutex::new(None),
            subscribe_calls: AtomicU32::new(0),
            unsubscribe_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
        }
    }

    fn take_callback(&self) -> Option<NotificationCallback> {
        self.callback.lock().ok().and_then(|mut cb| cb.take())
    }

    fn close(&self, reason: CloseReason) {
        self.closed.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// A mock BLE transport for testing.
///
/// # Example
///
/// ```
/// use uart_core::{MockTransport, Transport};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder()
///         .peer(Some("CIRCUITPY1234"), "AA:BB:CC:DD:EE:FF", -48)
///         .build();
///
///     let peers = transport.discover(Duration::from_secs(1)).await.unwrap();
///     assert_eq!(peers.len(), 1);
/// }
/// ```
pub struct MockTransport {
    peers: Vec<DiscoveredPeer>,
    services: Vec<ServiceInfo>,
    scan_latency: Duration,
    connect_latency: Duration,
    discover_failure: Option<String>,
    connect_failure: Option<String>,
    subscribe_failure: Option<String>,
    discover_calls: AtomicU32,
    connect_calls: AtomicU32,
    link: Arc<LinkState>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("peers", &self.peers)
            .field("connect_calls", &self.connect_calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Start building a mock transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// The simulated advertising peers, in discovery order.
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.peers.clone()
    }

    /// Handle for driving and inspecting the link this transport hands out.
    pub fn link_handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            state: Arc::clone(&self.link),
        }
    }

    /// Number of discover calls made.
    pub fn discover_calls(&self) -> u32 {
        self.discover_calls.load(Ordering::Relaxed)
    }

    /// Number of connect calls made.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Link = MockLink;

    async fn discover(&self, _window: Duration) -> Result<Vec<DiscoveredPeer>> {
        self.discover_calls.fetch_add(1, Ordering::Relaxed);
        if !self.scan_latency.is_zero() {
            tokio::time::sleep(self.scan_latency).await;
        }
        if let Some(msg) = &self.discover_failure {
            return Err(Error::Bluetooth(btleplug::Error::Other(msg.clone().into())));
        }
        Ok(self.peers.clone())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<MockLink> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }
        if let Some(msg) = &self.connect_failure {
            return Err(Error::connection_failed(
                &device.address,
                ConnectionFailureReason::Other(msg.clone()),
            ));
        }
        if !self.peers.iter().any(|p| p.address == device.address) {
            return Err(Error::connection_failed(
                &device.address,
                ConnectionFailureReason::UnknownPeer,
            ));
        }

        let state = &self.link;
        state.take_callback();
        state.dropped.store(false, Ordering::SeqCst);
        state.connected.store(true, Ordering::SeqCst);
        state.subscribed.send_replace(false);
        state.closed.send_replace(None);

        Ok(MockLink {
            state: Arc::clone(state),
            services: self.services.clone(),
            subscribe_failure: self.subscribe_failure.clone(),
        })
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    peers: Vec<DiscoveredPeer>,
    services: Option<Vec<ServiceInfo>>,
    scan_latency: Duration,
    connect_latency: Duration,
    discover_failure: Option<String>,
    connect_failure: Option<String>,
    subscribe_failure: Option<String>,
}

impl MockTransportBuilder {
    /// Add an advertising peer.
    #[must_use]
    pub fn peer(mut self, name: Option<&str>, address: &str, rssi: i16) -> Self {
        self.peers.push(DiscoveredPeer {
            name: name.map(str::to_string),
            address: address.to_string(),
            rssi: Some(rssi),
        });
        self
    }

    /// Add a named peer with a random address.
    #[must_use]
    pub fn named_peer(self, name: &str) -> Self {
        let address = format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF);
        self.peer(Some(name), &address, -50)
    }

    /// Services reported by connected links.
    #[must_use]
    pub fn services(mut self, services: Vec<ServiceInfo>) -> Self {
        self.services = Some(services);
        self
    }

    /// Delay every discover call.
    #[must_use]
    pub fn scan_latency(mut self, latency: Duration) -> Self {
        self.scan_latency = latency;
        self
    }

    /// Delay every connect call.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Make discovery fail with a BLE error.
    #[must_use]
    pub fn fail_discover(mut self, message: &str) -> Self {
        self.discover_failure = Some(message.to_string());
        self
    }

    /// Make connection attempts fail.
    #[must_use]
    pub fn fail_connect(mut self, message: &str) -> Self {
        self.connect_failure = Some(message.to_string());
        self
    }

    /// Make subscription attempts fail.
    #[must_use]
    pub fn fail_subscribe(mut self, message: &str) -> Self {
        self.subscribe_failure = Some(message.to_string());
        self
    }

    /// Build the transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            peers: self.peers,
            services: self.services.unwrap_or_else(default_services),
            scan_latency: self.scan_latency,
            connect_latency: self.connect_latency,
            discover_failure: self.discover_failure,
            connect_failure: self.connect_failure,
            subscribe_failure: self.subscribe_failure,
            discover_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            link: Arc::new(LinkState::new()),
        }
    }
}

fn default_services() -> Vec<ServiceInfo> {
    vec![ServiceInfo {
        uuid: UART_SERVICE,
        characteristics: vec![
            CharacteristicInfo {
                uuid: UART_RX,
                properties: vec!["WRITE".to_string(), "WRITE_WITHOUT_RESPONSE".to_string()],
            },
            CharacteristicInfo {
                uuid: UART_TX,
                properties: vec!["NOTIFY".to_string()],
            },
        ],
    }]
}

/// A connection handed out by [`MockTransport`].
pub struct MockLink {
    state: Arc<LinkState>,
    services: Vec<ServiceInfo>,
    subscribe_failure: Option<String>,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("connected", &self.state.connected.load(Ordering::Relaxed))
            .field("dropped", &self.state.dropped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockLink {
    fn check_link(&self) -> Result<()> {
        if self.state.dropped.load(Ordering::SeqCst) || !self.state.connected.load(Ordering::SeqCst)
        {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl Link for MockLink {
    async fn subscribe(&self, characteristic: Uuid, callback: NotificationCallback) -> Result<()> {
        self.state.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.check_link()?;
        if let Some(msg) = &self.subscribe_failure {
            return Err(Error::subscribe_failed(characteristic.to_string(), msg.clone()));
        }

        if let Ok(mut slot) = self.state.callback.lock() {
            *slot = Some(callback);
        }
        if let Ok(mut uuid) = self.state.subscribed_uuid.lock() {
            *uuid = Some(characteristic);
        }
        self.state.subscribed.send_replace(true);
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        self.state.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.state.take_callback();
        self.state.subscribed.send_replace(false);
        self.check_link()
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.state.take_callback();
        let result = self.check_link();
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.close(CloseReason::Lost);
        result
    }

    async fn closed(&self) -> Result<()> {
        let mut rx = self.state.closed.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        match reason {
            Some(CloseReason::Failed(msg)) => Err(Error::LinkFailed(msg)),
            Some(CloseReason::Lost) | None => Ok(()),
        }
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>> {
        self.check_link()?;
        Ok(self.services.clone())
    }
}

/// Test-side handle onto the mock link.
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<LinkState>,
}

impl std::fmt::Debug for MockLinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLinkHandle")
            .field("subscribe_calls", &self.subscribe_calls())
            .field("unsubscribe_calls", &self.unsubscribe_calls())
            .field("disconnect_calls", &self.disconnect_calls())
            .finish()
    }
}

impl MockLinkHandle {
    /// Deliver a notification chunk to the subscribed callback.
    ///
    /// Returns `false` when nothing is subscribed.
    pub fn push(&self, chunk: &[u8]) -> bool {
        let Ok(mut slot) = self.state.callback.lock() else {
            return false;
        };
        match slot.as_mut() {
            Some(callback) => {
                callback(chunk);
                true
            }
            None => false,
        }
    }

    /// Simulate the peer going away. Later unsubscribe/disconnect calls fail.
    pub fn drop_link(&self) {
        self.state.dropped.store(true, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.take_callback();
        self.state.subscribed.send_replace(false);
        self.state.close(CloseReason::Lost);
    }

    /// Simulate an unrecoverable protocol error on a still-connected link.
    pub fn fail_link(&self, message: &str) {
        self.state.close(CloseReason::Failed(message.to_string()));
    }

    /// Wait until a callback is subscribed.
    pub async fn wait_subscribed(&self) {
        let mut rx = self.state.subscribed.subscribe();
        let _ = rx.wait_for(|subscribed| *subscribed).await;
    }

    /// Whether a callback is currently subscribed.
    pub fn is_subscribed(&self) -> bool {
        *self.state.subscribed.borrow()
    }

    /// Whether the link is currently connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// The characteristic of the last successful subscription.
    pub fn subscribed_uuid(&self) -> Option<Uuid> {
        self.state.subscribed_uuid.lock().ok().and_then(|uuid| *uuid)
    }

    /// Number of subscribe attempts.
    pub fn subscribe_calls(&self) -> u32 {
        self.state.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of unsubscribe attempts.
    pub fn unsubscribe_calls(&self) -> u32 {
        self.state.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of disconnect attempts.
    pub fn disconnect_calls(&self) -> u32 {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }
}
