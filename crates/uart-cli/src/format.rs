//! Output formatting for records and scan results.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use uart_core::DiscoveredPeer;
use uart_types::Record;

/// Format one record as a text line, fields separated by `", "`.
pub fn format_record_text(record: &Record) -> String {
    format!("{}\n", record.display_spaced())
}

/// Format one record as a JSON line.
///
/// Records that parse as a telemetry sample are emitted as an object with
/// named fields; anything else is emitted as `{"raw": "<line>"}`.
pub fn format_record_json(record: &Record) -> Result<String> {
    let value = match record.parse_sample() {
        Ok(sample) => serde_json::to_value(sample)?,
        Err(_) => json!({ "raw": record.as_str() }),
    };
    Ok(format!("{}\n", serde_json::to_string(&value)?))
}

/// Format scan results as text, one peer per line.
pub fn format_scan_text(peers: &[DiscoveredPeer]) -> String {
    if peers.is_empty() {
        return "No BLE devices found.\n".to_string();
    }

    let mut output = String::new();
    for peer in peers {
        let rssi = peer
            .rssi
            .map_or_else(|| "n/a".to_string(), |rssi| format!("{} dBm", rssi));
        output.push_str(&format!(
            "{} - {} - RSSI: {}\n",
            peer.display_name(),
            peer.address,
            rssi
        ));
    }
    output
}

#[derive(Serialize)]
struct ScanJson<'a> {
    count: usize,
    devices: &'a [DiscoveredPeer],
}

/// Format scan results as pretty JSON.
pub fn format_scan_json(peers: &[DiscoveredPeer]) -> Result<String> {
    let body = ScanJson {
        count: peers.len(),
        devices: peers,
    };
    Ok(format!("{}\n", serde_json::to_string_pretty(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: Option<&str>, rssi: Option<i16>) -> DiscoveredPeer {
        DiscoveredPeer {
            name: name.map(str::to_string),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            rssi,
        }
    }

    #[test]
    fn test_record_text_uses_spaced_separators() {
        let record = Record::new("1.000,2.000,3.000,");
        assert_eq!(format_record_text(&record), "1.000, 2.000, 3.000, \n");
    }

    #[test]
    fn test_record_json_named_fields() {
        let record =
            Record::new("12.346,0.100,-9.810,0.000,0.002,-0.010,1.000,-33.250,12.500,48.000,");
        let out = format_record_json(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["elapsed"], 12.346);
        assert_eq!(value["accel"][1], -9.81);
        assert_eq!(value["accel"][2], 0.0);
        assert_eq!(value["mag"][0], -33.25);
    }

    #[test]
    fn test_record_json_raw_fallback() {
        let out = format_record_json(&Record::new("hello, world")).unwrap();
        assert_eq!(out, "{\"raw\":\"hello, world\"}\n");
    }

    #[test]
    fn test_scan_text() {
        let out = format_scan_text(&[peer(Some("CIRCUITPY"), Some(-40)), peer(None, None)]);
        assert_eq!(
            out,
            "CIRCUITPY - AA:BB:CC:DD:EE:FF - RSSI: -40 dBm\nUnnamed - AA:BB:CC:DD:EE:FF - RSSI: n/a\n"
        );
        assert_eq!(format_scan_text(&[]), "No BLE devices found.\n");
    }

    #[test]
    fn test_scan_json() {
        let out = format_scan_json(&[peer(Some("ARDUINO"), Some(-60))]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["devices"][0]["name"], "ARDUINO");
        assert_eq!(value["devices"][0]["rssi"], -60);
    }
}
