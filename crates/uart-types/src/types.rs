//! Core types for UART telemetry data.

use core::fmt;
use core::fmt::Write as _;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Microcontroller boards that stream telemetry over the UART service.
///
/// Each board advertises a name containing a fixed token; the host locates
/// its peer by looking for that token in advertised names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Microcontroller {
    /// Arduino board running the BLE UART sketch.
    Arduino,
    /// CircuitPython board (advertises as `CIRCUITPY....`).
    CircuitPy,
}

impl Microcontroller {
    /// All known boards, in CLI display order.
    pub const ALL: [Microcontroller; 2] = [Microcontroller::Arduino, Microcontroller::CircuitPy];

    /// The advertised-name token identifying this board.
    ///
    /// # Examples
    ///
    /// ```
    /// use uart_types::Microcontroller;
    ///
    /// assert_eq!(Microcontroller::CircuitPy.name_token(), "CIRCUITPY");
    /// ```
    #[must_use]
    pub fn name_token(&self) -> &'static str {
        match self {
            Microcontroller::Arduino => "ARDUINO",
            Microcontroller::CircuitPy => "CIRCUITPY",
        }
    }

    /// Detect the board from an advertised name (case-sensitive substring).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|board| name.contains(board.name_token()))
    }
}

impl fmt::Display for Microcontroller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_token())
    }
}

impl FromStr for Microcontroller {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        Self::ALL
            .into_iter()
            .find(|board| board.name_token().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownMicrocontroller(s.to_string()))
    }
}

/// One decoded text line from the UART stream.
///
/// A record is the unit of application meaning: the line as the firmware
/// wrote it, without the terminating newline (and without a trailing
/// carriage return, if the firmware sent CRLF).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Record(String);

impl Record {
    /// Wrap a decoded line.
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    /// The record text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the record and return the owned text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether the line was empty (two consecutive delimiters).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render the record with `", "` between fields, the way operators
    /// expect to read it on a terminal.
    ///
    /// ```
    /// use uart_types::Record;
    ///
    /// let record = Record::new("1.000,2.000,");
    /// assert_eq!(record.display_spaced(), "1.000, 2.000, ");
    /// ```
    #[must_use]
    pub fn display_spaced(&self) -> String {
        self.0.replace(',', ", ")
    }

    /// Parse the record as a telemetry sample.
    pub fn parse_sample(&self) -> ParseResult<TelemetrySample> {
        self.0.parse()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Record {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Record {
    fn from(line: String) -> Self {
        Self(line)
    }
}

impl From<&str> for Record {
    fn from(line: &str) -> Self {
        Self(line.to_string())
    }
}

/// A single IMU sample as streamed by the firmware.
///
/// Wire format: `<elapsed>,<ax>,<ay>,<az>,<gx>,<gy>,<gz>,<mx>,<my>,<mz>,\n`,
/// every field with three decimals and followed by a comma, including the
/// last one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetrySample {
    /// Seconds since the firmware started streaming.
    pub elapsed: f64,
    /// Acceleration in m/s² (x, y, z).
    pub accel: [f64; 3],
    /// Angular rate in rad/s (x, y, z).
    pub gyro: [f64; 3],
    /// Magnetic field in µT (x, y, z).
    pub mag: [f64; 3],
}

impl TelemetrySample {
    /// Number of numeric fields in one record.
    pub const FIELD_COUNT: usize = 10;

    /// Fixed number of decimals the firmware writes for every field.
    pub const DECIMALS: usize = 3;

    /// All fields in wire order.
    #[must_use]
    pub fn values(&self) -> [f64; Self::FIELD_COUNT] {
        [
            self.elapsed,
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.mag[0],
            self.mag[1],
            self.mag[2],
        ]
    }

    /// Encode the sample exactly as the firmware does, newline included.
    ///
    /// ```
    /// use uart_types::TelemetrySample;
    ///
    /// let sample = TelemetrySample { elapsed: 1.5, ..Default::default() };
    /// assert_eq!(
    ///     sample.encode_line(),
    ///     "1.500,0.000,0.000,0.000,0.000,0.000,0.000,0.000,0.000,0.000,\n"
    /// );
    /// ```
    #[must_use]
    pub fn encode_line(&self) -> String {
        let mut line = String::with_capacity(Self::FIELD_COUNT * 8 + 1);
        for value in self.values() {
            // Writing into a String cannot fail.
            let _ = write!(line, "{:.*},", Self::DECIMALS, value);
        }
        line.push('\n');
        line
    }
}

impl FromStr for TelemetrySample {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let line = s.trim_end();
        let line = line.strip_suffix(',').unwrap_or(line);

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != Self::FIELD_COUNT {
            return Err(ParseError::FieldCount {
                expected: Self::FIELD_COUNT,
                actual: fields.len(),
            });
        }

        let mut values = [0.0_f64; Self::FIELD_COUNT];
        for (index, (slot, field)) in values.iter_mut().zip(&fields).enumerate() {
            *slot = field.parse().map_err(|_| ParseError::InvalidField {
                index,
                value: (*field).to_string(),
            })?;
        }

        Ok(Self {
            elapsed: values[0],
            accel: [values[1], values[2], values[3]],
            gyro: [values[4], values[5], values[6]],
            mag: [values[7], values[8], values[9]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            elapsed: 12.3456,
            accel: [0.1, -9.81, 0.0],
            gyro: [0.002, -0.0104, 1.0],
            mag: [-33.25, 12.5, 48.0],
        }
    }

    #[test]
    fn test_encode_line_matches_firmware_format() {
        assert_eq!(
            sample().encode_line(),
            "12.346,0.100,-9.810,0.000,0.002,-0.010,1.000,-33.250,12.500,48.000,\n"
        );
    }

    #[test]
    fn test_parse_with_trailing_comma() {
        let parsed: TelemetrySample =
            "12.346,0.100,-9.810,0.000,0.002,-0.010,1.000,-33.250,12.500,48.000,"
                .parse()
                .unwrap();
        assert!((parsed.elapsed - 12.346).abs() < 1e-9);
        assert!((parsed.accel[1] + 9.81).abs() < 1e-9);
        assert!((parsed.mag[2] - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_without_trailing_comma() {
        let parsed: TelemetrySample = "1,2,3,4,5,6,7,8,9,10".parse().unwrap();
        assert_eq!(parsed.values(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_parse_spaced_record() {
        let record = Record::new("1,2,3,4,5,6,7,8,9,10,");
        let parsed: TelemetrySample = record.display_spaced().parse().unwrap();
        assert_eq!(parsed.gyro, [5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_parse_wrong_field_count() {
        let err = "12.0,1,2,3".parse::<TelemetrySample>().unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldCount {
                expected: 10,
                actual: 4
            }
        );
    }

    #[test]
    fn test_parse_invalid_field() {
        let err = "1,2,x,4,5,6,7,8,9,10,".parse::<TelemetrySample>().unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidField {
                index: 2,
                value: "x".to_string()
            }
        );
    }

    #[test]
    fn test_record_display_and_accessors() {
        let record = Record::from("34.0,4,5,6");
        assert_eq!(record.to_string(), "34.0,4,5,6");
        assert_eq!(record.as_str(), "34.0,4,5,6");
        assert!(!record.is_empty());
        assert_eq!(record.into_string(), "34.0,4,5,6");
    }

    #[test]
    fn test_microcontroller_tokens() {
        assert_eq!(Microcontroller::Arduino.name_token(), "ARDUINO");
        assert_eq!(
            Microcontroller::from_name("CIRCUITPY4f2a"),
            Some(Microcontroller::CircuitPy)
        );
        assert_eq!(Microcontroller::from_name("circuitpy4f2a"), None);
        assert_eq!(
            "arduino".parse::<Microcontroller>().unwrap(),
            Microcontroller::Arduino
        );
        assert!("esp32".parse::<Microcontroller>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_sample_serializes_to_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["accel"][1], serde_json::json!(-9.81));
        let record = serde_json::to_string(&Record::new("a,b")).unwrap();
        assert_eq!(record, "\"a,b\"");
    }
}
