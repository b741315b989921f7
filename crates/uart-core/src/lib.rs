//! Host-side core for streaming telemetry over a BLE UART link.
//!
//! This crate connects to a microcontroller advertising the Nordic UART
//! service (an Arduino or CircuitPython board), subscribes to its TX
//! characteristic and turns the notification byte stream back into
//! newline-delimited records.
//!
//! # Features
//!
//! - **Device discovery**: resolve a name token like `CIRCUITPY` to a peer
//! - **Record reassembly**: rebuild lines split across notification chunks
//! - **Latest-value handoff**: consumers always see the freshest record
//! - **Session lifecycle**: connect, subscribe, stream, guaranteed cleanup
//! - **Supervised runs**: cancellable background task with optional reconnect
//! - **Mock transport**: exercise everything without hardware
//!
//! # Data Flow
//!
//! ```text
//! radio ─► Link notification callback ─► LineReassembler ─► latest slot ─► consumer
//! ```
//!
//! The notification callback is the only writer of the reassembler and the
//! slot. The consumer only ever reads the slot.
//!
//! # Platform Differences
//!
//! - **macOS**: peers are identified by a CoreBluetooth UUID, stable per host.
//! - **Linux/Windows**: peers are identified by their Bluetooth MAC address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use uart_core::{BtleTransport, Supervisor, SupervisorOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleTransport::new().await?);
//!     let mut stream = Supervisor::new(transport, SupervisorOptions::default()).run("ARDUINO");
//!
//!     if let Some(record) = stream.await_latest().await {
//!         println!("{}", record.display_spaced());
//!     }
//!     stream.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod mock;
pub mod reassembler;
pub mod reconnect;
pub mod scan;
pub mod session;
pub mod slot;
pub mod supervisor;
pub mod traits;
pub mod util;

pub use ble::{BtleLink, BtleTransport};
pub use error::{ConnectionFailureReason, Error, Result};
pub use mock::{MockLink, MockLinkHandle, MockTransport, MockTransportBuilder};
pub use reassembler::LineReassembler;
pub use reconnect::ReconnectOptions;
pub use scan::{DeviceHandle, DiscoveredPeer, Located, ScanOptions, locate, log_discovered};
pub use session::{NotificationHandler, Session, SessionOptions, SessionState, StreamEnd};
pub use slot::{SlotPublisher, SlotReceiver, latest_slot};
pub use supervisor::{StreamHandle, Supervisor, SupervisorOptions};
pub use traits::{CharacteristicInfo, Link, NotificationCallback, ServiceInfo, Transport};

// Re-export types from uart-types
pub use uart_types::{Microcontroller, ParseError, Record, TelemetrySample, uuids};
