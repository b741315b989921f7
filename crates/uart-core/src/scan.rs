//! Device discovery and name resolution.
//!
//! This module resolves a human-readable name token (for example
//! `CIRCUITPY`) to a connectable peer by scanning for a bounded window.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::Transport;

/// Default scan window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);

/// A peer seen advertising during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Connection identifier (MAC address on Linux/Windows, UUID on macOS).
    pub address: String,
    /// RSSI signal strength in dBm.
    pub rssi: Option<i16>,
}

impl DiscoveredPeer {
    /// Name for display, `"Unnamed"` when the peer advertised none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }

    /// Whether the advertised name contains `target` (case-sensitive).
    pub fn matches(&self, target: &str) -> bool {
        self.name.as_deref().is_some_and(|name| name.contains(target))
    }
}

/// Resolved identity of the peer to connect to.
///
/// Immutable once resolved; lives for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Advertised name that matched.
    pub name: String,
    /// Connection identifier.
    pub address: String,
}

impl DeviceHandle {
    /// Create a handle directly, bypassing discovery.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl From<&DiscoveredPeer> for DeviceHandle {
    fn from(peer: &DiscoveredPeer) -> Self {
        Self {
            name: peer.display_name().to_string(),
            address: peer.address.clone(),
        }
    }
}

/// Outcome of a locate call.
///
/// Not finding the device is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// The first peer whose name contains the target.
    Found(DeviceHandle),
    /// No match; carries every discovered peer for diagnostics.
    NotFound(Vec<DiscoveredPeer>),
}

impl Located {
    /// Convert into a result, turning `NotFound` into [`Error::DeviceNotFound`].
    pub fn into_result(self, target: &str) -> Result<DeviceHandle> {
        match self {
            Located::Found(device) => Ok(device),
            Located::NotFound(discovered) => Err(Error::device_not_found(target, discovered)),
        }
    }
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_WINDOW,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::invalid_config("scan duration must be > 0"));
        }
        Ok(())
    }
}

/// Pick the first peer, in discovery order, whose name contains `target`.
///
/// First match wins; there is no tie-break on signal strength, so two
/// boards advertising the same token resolve to whichever was heard first.
pub fn find_match<'a>(peers: &'a [DiscoveredPeer], target: &str) -> Option<&'a DiscoveredPeer> {
    peers.iter().find(|peer| peer.matches(target))
}

/// Scan for `options.duration` and resolve `target` to a device.
#[tracing::instrument(level = "info", skip(transport, options), fields(window = ?options.duration))]
pub async fn locate<T: Transport + ?Sized>(
    transport: &T,
    target: &str,
    options: &ScanOptions,
) -> Result<Located> {
    options.validate()?;

    info!("Scanning for '{}'...", target);
    let peers = transport.discover(options.duration).await?;
    info!("Scan complete. Found {} peer(s)", peers.len());

    match find_match(&peers, target) {
        Some(peer) => {
            let device = DeviceHandle::from(peer);
            info!(name = %device.name, address = %device.address, "Found target device");
            Ok(Located::Found(device))
        }
        None => Ok(Located::NotFound(peers)),
    }
}

/// Log every discovered peer, one line each, at debug level.
///
/// The list also travels in [`crate::Error::DeviceNotFound`] for callers to
/// present.
pub fn log_discovered(peers: &[DiscoveredPeer]) {
    if peers.is_empty() {
        debug!("No BLE devices found");
        return;
    }

    for peer in peers {
        debug!(
            "{} - {} - RSSI: {}",
            peer.display_name(),
            peer.address,
            peer.rssi
                .map_or_else(|| "n/a".to_string(), |rssi| format!("{} dBm", rssi))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_at(level: tracing::Level, peers: &[DiscoveredPeer]) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || log_discovered(peers));
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn peer(name: Option<&str>, address: &str, rssi: i16) -> DiscoveredPeer {
        DiscoveredPeer {
            name: name.map(str::to_string),
            address: address.to_string(),
            rssi: Some(rssi),
        }
    }

    #[test]
    fn test_scan_options_builder() {
        let opts = ScanOptions::new().duration_secs(10);
        assert_eq!(opts.duration, Duration::from_secs(10));
        assert!(opts.validate().is_ok());
        assert!(ScanOptions::new().duration(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_find_match_is_first_substring_match() {
        let peers = vec![
            peer(None, "00:00:00:00:00:01", -40),
            peer(Some("Phone"), "00:00:00:00:00:02", -50),
            peer(Some("CIRCUITPYa1b2"), "00:00:00:00:00:03", -80),
            peer(Some("CIRCUITPYc3d4"), "00:00:00:00:00:04", -30),
        ];
        let found = find_match(&peers, "CIRCUITPY").unwrap();
        assert_eq!(found.address, "00:00:00:00:00:03");
    }

    #[test]
    fn test_find_match_is_case_sensitive() {
        let peers = vec![peer(Some("circuitpy"), "00:00:00:00:00:01", -40)];
        assert!(find_match(&peers, "CIRCUITPY").is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(peer(None, "x", 0).display_name(), "Unnamed");
        let handle = DeviceHandle::from(&peer(Some("ARDUINO"), "x", 0));
        assert_eq!(handle, DeviceHandle::new("ARDUINO", "x"));
    }

    #[tokio::test]
    async fn test_locate_found() {
        let transport = MockTransport::builder()
            .peer(Some("Speaker"), "11:11:11:11:11:11", -70)
            .peer(Some("ARDUINO Nano"), "22:22:22:22:22:22", -55)
            .build();

        let located = locate(&transport, "ARDUINO", &ScanOptions::default())
            .await
            .unwrap();
        assert_eq!(
            located,
            Located::Found(DeviceHandle::new("ARDUINO Nano", "22:22:22:22:22:22"))
        );
    }

    #[tokio::test]
    async fn test_locate_not_found_reports_every_peer() {
        let transport = MockTransport::builder()
            .peer(Some("Speaker"), "11:11:11:11:11:11", -70)
            .peer(None, "22:22:22:22:22:22", -90)
            .peer(Some("Watch"), "33:33:33:33:33:33", -60)
            .build();

        let located = locate(&transport, "CIRCUITPY", &ScanOptions::default())
            .await
            .unwrap();
        let Located::NotFound(peers) = located else {
            panic!("expected NotFound");
        };
        assert_eq!(peers, transport.peers());

        let err = Located::NotFound(peers).into_result("CIRCUITPY").unwrap_err();
        assert_eq!(err.discovered_peers().map(<[_]>::len), Some(3));
    }

    #[tokio::test]
    async fn test_locate_propagates_scan_failure() {
        let transport = MockTransport::builder().fail_discover("adapter powered off").build();
        let result = locate(&transport, "ARDUINO", &ScanOptions::default()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_peer_list_is_debug_only() {
        let peers = [peer(Some("Phone"), "AA:BB:CC:DD:EE:07", -70)];

        assert!(!logged_at(tracing::Level::INFO, &peers).contains("AA:BB:CC:DD:EE:07"));
        let debug = logged_at(tracing::Level::DEBUG, &peers);
        assert!(debug.contains("Phone - AA:BB:CC:DD:EE:07 - RSSI: -70 dBm"));
        assert!(logged_at(tracing::Level::INFO, &[]).is_empty());
    }
}
