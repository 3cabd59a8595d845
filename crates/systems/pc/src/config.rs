//! Machine configuration
//!
//! Describes where the firmware image lives in the address space, where the
//! CPU starts executing, and which interrupts the host services itself.
//! Serialized as JSON.

use crate::PcError;
use serde::{Deserialize, Serialize};

/// Placement of the firmware image and the boot entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareEntry {
    /// Physical address of the start of the firmware window
    pub load_addr: u32,
    /// Offset inside the window where the image bytes are placed
    pub image_offset: u32,
    /// Size of the read-only window in bytes
    pub window_size: u32,
    pub boot_cs: u16,
    pub boot_ip: u16,
}

impl FirmwareEntry {
    /// Stock PC/XT BIOS: 8KB at the top of memory, entered at the reset vector
    pub const fn pc_xt() -> Self {
        Self {
            load_addr: 0xFE000,
            image_offset: 0,
            window_size: 0x2000,
            boot_cs: 0xFFFF,
            boot_ip: 0x0000,
        }
    }

    /// Small firmware that relies on the host for every interrupt service
    pub const fn high_level() -> Self {
        Self {
            load_addr: 0xF0000,
            image_offset: 0x100,
            window_size: 0x8000,
            boot_cs: 0xF000,
            boot_ip: 0x0100,
        }
    }

    /// Whether a physical address falls inside the firmware window
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.load_addr && addr - self.load_addr < self.window_size
    }
}

/// PC machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcConfig {
    pub firmware: FirmwareEntry,
    /// Service every software interrupt on the host instead of only INT 13h
    #[serde(default)]
    pub override_all_interrupts: bool,
    /// Global log level name ("off", "error", ..., "trace")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl PcConfig {
    /// Real PC/XT BIOS image; only disk services are emulated
    pub fn pc_xt() -> Self {
        Self {
            firmware: FirmwareEntry::pc_xt(),
            override_all_interrupts: false,
            log_level: None,
        }
    }

    /// Minimal firmware; the host services all interrupts
    pub fn high_level() -> Self {
        Self {
            firmware: FirmwareEntry::high_level(),
            override_all_interrupts: true,
            log_level: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PcError> {
        let config: PcConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, PcError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for PcConfig {
    fn default() -> Self {
        Self::high_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let xt = PcConfig::pc_xt();
        assert_eq!(xt.firmware.load_addr, 0xFE000);
        assert_eq!((xt.firmware.boot_cs, xt.firmware.boot_ip), (0xFFFF, 0x0000));
        assert!(!xt.override_all_interrupts);

        let hl = PcConfig::default();
        assert_eq!(hl.firmware.image_offset, 0x100);
        assert_eq!((hl.firmware.boot_cs, hl.firmware.boot_ip), (0xF000, 0x0100));
        assert!(hl.override_all_interrupts);
    }

    #[test]
    fn test_window_bounds() {
        let fw = FirmwareEntry::pc_xt();
        assert!(!fw.contains(0xFDFFF));
        assert!(fw.contains(0xFE000));
        assert!(fw.contains(0xFFFFF));

        let fw = FirmwareEntry::high_level();
        assert!(fw.contains(0xF7FFF));
        assert!(!fw.contains(0xF8000));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "firmware": {
                "load_addr": 1040384,
                "image_offset": 0,
                "window_size": 8192,
                "boot_cs": 65535,
                "boot_ip": 0
            }
        }"#;

        let config = PcConfig::from_json(json).unwrap();
        assert_eq!(config, PcConfig::pc_xt());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            PcConfig::from_json("{ \"firmware\": 7 }"),
            Err(PcError::Config(_))
        ));
    }
}
