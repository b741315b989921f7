//! Utility functions for uart-core.
//!
//! This module contains small helpers shared by the btleplug transport.

use btleplug::api::CharPropFlags;
use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_placeholder_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether the platform hid the real address behind all zeros.
pub fn is_placeholder_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}

/// Names of the flags set in a characteristic's properties.
pub fn property_names(flags: CharPropFlags) -> Vec<String> {
    const NAMES: [(CharPropFlags, &str); 8] = [
        (CharPropFlags::BROADCAST, "BROADCAST"),
        (CharPropFlags::READ, "READ"),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, "WRITE_WITHOUT_RESPONSE"),
        (CharPropFlags::WRITE, "WRITE"),
        (CharPropFlags::NOTIFY, "NOTIFY"),
        (CharPropFlags::INDICATE, "INDICATE"),
        (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, "AUTHENTICATED_SIGNED_WRITES"),
        (CharPropFlags::EXTENDED_PROPERTIES, "EXTENDED_PROPERTIES"),
    ];

    NAMES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| (*name).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_address() {
        assert!(is_placeholder_address("00:00:00:00:00:00"));
        assert!(!is_placeholder_address("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_property_names() {
        let names = property_names(CharPropFlags::NOTIFY | CharPropFlags::READ);
        assert_eq!(names, ["READ", "NOTIFY"]);
        assert!(property_names(CharPropFlags::empty()).is_empty());
    }
}
