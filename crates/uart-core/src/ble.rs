//! btleplug-backed transport.
//!
//! [`BtleTransport`] wraps the first Bluetooth adapter on the host.
//! Discovery follows the adapter's event stream so peers are reported in
//! the order they were first heard. Each connection yields a [`BtleLink`],
//! which forwards notifications from a background task and watches adapter
//! events for the peer disconnecting.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{DeviceHandle, DiscoveredPeer};
use crate::traits::{CharacteristicInfo, Link, NotificationCallback, ServiceInfo, Transport};
use crate::util::{create_identifier, property_names};

/// Transport over the host's first Bluetooth adapter.
pub struct BtleTransport {
    adapter: Adapter,
    /// Identifier → peripheral ID, filled by discovery.
    known: RwLock<HashMap<String, PeripheralId>>,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport").finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Use the first available Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;
        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            known: RwLock::new(HashMap::new()),
        }
    }

    async fn find_peripheral(&self, address: &str) -> Result<Option<Peripheral>> {
        if let Some(id) = self.known.read().await.get(address)
            && let Ok(peripheral) = self.adapter.peripheral(id).await
        {
            return Ok(Some(peripheral));
        }

        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(props)) = peripheral.properties().await
                && create_identifier(&props.address.to_string(), &peripheral.id()) == address
            {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }
}

async fn describe(peripheral: &Peripheral) -> Result<Option<DiscoveredPeer>> {
    let Some(props) = peripheral.properties().await? else {
        return Ok(None);
    };
    Ok(Some(DiscoveredPeer {
        name: props.local_name,
        address: create_identifier(&props.address.to_string(), &peripheral.id()),
        rssi: props.rssi,
    }))
}

#[async_trait]
impl Transport for BtleTransport {
    type Link = BtleLink;

    async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredPeer>> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        debug!("Scanning for {:?}", window);

        // The caller may drop this future mid-window; the adapter must not keep scanning.
        let mut guard = ScanGuard::new({
            let adapter = self.adapter.clone();
            move || {
                debug!("Scan abandoned, stopping in background");
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(e) = adapter.stop_scan().await {
                            debug!(error = %e, "Background stop_scan failed");
                        }
                    });
                }
            }
        });

        let deadline = Instant::now() + window;
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(Some(CentralEvent::DeviceDiscovered(id))) => {
                    if seen.insert(id.clone()) {
                        order.push(id);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tokio::time::sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }
        drop(events);
        let stopped = self.adapter.stop_scan().await;
        guard.disarm();
        stopped?;

        // Peripherals cached by the OS before this scan never emit a discovery event.
        for peripheral in self.adapter.peripherals().await? {
            let id = peripheral.id();
            if seen.insert(id.clone()) {
                order.push(id);
            }
        }

        let mut peers = Vec::with_capacity(order.len());
        let mut known = self.known.write().await;
        for id in order {
            let peripheral = match self.adapter.peripheral(&id).await {
                Ok(peripheral) => peripheral,
                Err(e) => {
                    debug!("Peripheral vanished before inspection: {}", e);
                    continue;
                }
            };
            match describe(&peripheral).await {
                Ok(Some(peer)) => {
                    known.insert(peer.address.clone(), id);
                    peers.push(peer);
                }
                Ok(None) => {}
                Err(e) => debug!("Error processing peripheral: {}", e),
            }
        }

        Ok(peers)
    }

    #[tracing::instrument(level = "info", skip_all, fields(address = %device.address))]
    async fn connect(&self, device: &DeviceHandle) -> Result<BtleLink> {
        let peripheral = self.find_peripheral(&device.address).await?.ok_or_else(|| {
            Error::connection_failed(&device.address, ConnectionFailureReason::UnknownPeer)
        })?;

        peripheral.connect().await.map_err(|e| {
            Error::connection_failed(&device.address, ConnectionFailureReason::from_ble(&e))
        })?;
        info!("Connected, discovering services...");
        peripheral.discover_services().await?;
        debug!("Found {} services", peripheral.services().len());

        let lost = CancellationToken::new();
        let watcher = spawn_disconnect_watcher(&self.adapter, peripheral.id(), lost.clone()).await?;

        Ok(BtleLink {
            peripheral,
            address: device.address.clone(),
            lost,
            watcher,
            notifications: Mutex::new(Vec::new()),
        })
    }
}

/// Runs `on_drop` when dropped unless disarmed first.
struct ScanGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> ScanGuard<F> {
    fn new(on_drop: F) -> Self {
        Self {
            on_drop: Some(on_drop),
        }
    }

    fn disarm(&mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for ScanGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

async fn spawn_disconnect_watcher(
    adapter: &Adapter,
    id: PeripheralId,
    lost: CancellationToken,
) -> Result<JoinHandle<()>> {
    let mut events = adapter.events().await?;
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event
                && gone == id
            {
                debug!("Adapter reported disconnect");
                break;
            }
        }
        lost.cancel();
    }))
}

/// One btleplug connection.
pub struct BtleLink {
    peripheral: Peripheral,
    address: String,
    lost: CancellationToken,
    watcher: JoinHandle<()>,
    notifications: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for BtleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleLink")
            .field("address", &self.address)
            .field("lost", &self.lost.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BtleLink {
    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        let services = self.peripheral.services();
        services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), services.len()))
    }

    fn abort_notifications(&self) {
        if let Ok(mut handles) = self.notifications.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Link for BtleLink {
    async fn subscribe(&self, characteristic: Uuid, mut callback: NotificationCallback) -> Result<()> {
        let target = self.find_characteristic(characteristic)?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| Error::subscribe_failed(characteristic.to_string(), e.to_string()))?;

        let mut stream = self.peripheral.notifications().await?;
        let lost = self.lost.clone();
        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == characteristic {
                    callback(&notification.value);
                }
            }
            debug!("Notification stream ended");
            lost.cancel();
        });

        if let Ok(mut handles) = self.notifications.lock() {
            handles.push(handle);
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        self.abort_notifications();
        if !self.peripheral.is_connected().await? {
            return Err(Error::NotConnected);
        }
        let target = self.find_characteristic(characteristic)?;
        self.peripheral.unsubscribe(&target).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.abort_notifications();
        self.watcher.abort();
        self.lost.cancel();
        if !self.peripheral.is_connected().await? {
            return Err(Error::NotConnected);
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn closed(&self) -> Result<()> {
        self.lost.cancelled().await;
        Ok(())
    }

    async fn services(&self) -> Result<Vec<ServiceInfo>> {
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicInfo {
                        uuid: c.uuid,
                        properties: property_names(c.properties),
                    })
                    .collect(),
            })
            .collect())
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        self.abort_notifications();
        self.watcher.abort();
        if !self.lost.is_cancelled() {
            warn!(address = %self.address, "Link dropped while still open");
        }
    }
}
