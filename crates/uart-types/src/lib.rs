//! Platform-agnostic types for BLE UART telemetry streams.
//!
//! This crate provides the record model shared by the host-side streaming
//! core (uart-core) and its command-line front end.
//!
//! # Features
//!
//! - [`Record`]: one decoded text line from the UART stream
//! - [`TelemetrySample`]: the firmware's IMU sample and its exact wire format
//! - [`Microcontroller`]: the boards the host knows how to find
//! - UUID constants for the Nordic UART service
//!
//! # Example
//!
//! ```
//! use uart_types::{Record, TelemetrySample};
//!
//! let record = Record::new("0.010,0.100,-9.810,0.000,0.002,-0.010,1.000,-33.250,12.500,48.000,");
//! let sample: TelemetrySample = record.parse_sample().unwrap();
//! assert_eq!(sample.accel[1], -9.81);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{Microcontroller, Record, TelemetrySample};
pub use uuid as uuids;
