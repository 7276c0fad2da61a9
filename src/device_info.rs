use crate::config::DEVICE_ID_PREFIX;

/// Device identifier derived from the network MAC address.
/// Used as pairing SSID, broker client id and network hostname.
pub fn device_id_from_mac(mac: [u8; 6]) -> String {
    format!(
        "{}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        DEVICE_ID_PREFIX, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// MAC address in standard colon notation, for logs
pub fn format_mac_address(mac: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Read the factory MAC from efuse
#[cfg(target_os = "espidf")]
pub fn read_factory_mac() -> anyhow::Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    esp_idf_svc::sys::esp!(unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) })?;
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_prefixed_lowercase_hex() {
        let id = device_id_from_mac([0x24, 0x0A, 0xC4, 0xFF, 0x01, 0xBE]);
        assert_eq!(id, "bridge_240ac4ff01be");
        assert_eq!(id.len(), 19);
    }

    #[test]
    fn mac_formats_for_logs() {
        assert_eq!(
            format_mac_address([0x24, 0x0A, 0xC4, 0xFF, 0x01, 0xBE]),
            "24:0A:C4:FF:01:BE"
        );
    }
}
