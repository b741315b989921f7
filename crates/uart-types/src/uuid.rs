//! Bluetooth UUIDs for the Nordic UART service.
//!
//! The firmware exposes the de-facto standard Nordic UART Service (NUS):
//! one characteristic the host writes to and one the device notifies on.
//! Naming follows the peripheral's point of view, so `UART_TX` is the
//! channel the host subscribes to.

use uuid::{Uuid, uuid};

/// Nordic UART service.
pub const UART_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// Host-to-device write characteristic (RX on the peripheral).
pub const UART_RX: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Device-to-host notify characteristic (TX on the peripheral).
pub const UART_TX: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");
