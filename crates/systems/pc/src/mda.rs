//! Monochrome Display Adapter register model
//!
//! Only the register file is modelled: the 6845 CRTC index/data pair at
//! 0x3B4/0x3B5 and the mode control register at 0x3B8. Nothing is rendered.

use i86_core::logging::{log, LogCategory, LogLevel};

pub const CRTC_INDEX_PORT: u16 = 0x3B4;
pub const CRTC_DATA_PORT: u16 = 0x3B5;
pub const MODE_CONTROL_PORT: u16 = 0x3B8;

const CRTC_REGISTERS: usize = 32;

/// Mode control bit 0: high resolution; must be set for defined behaviour
const MODE_HIRES: u8 = 0x01;
const MODE_VIDEO_ENABLE: u8 = 0x08;
const MODE_BLINK_ENABLE: u8 = 0x20;

#[derive(Debug, Clone)]
pub struct Mda {
    crtc_index: u8,
    crtc: [u8; CRTC_REGISTERS],
    video_enabled: bool,
    blink_enabled: bool,
}

impl Mda {
    pub fn new() -> Self {
        Self {
            crtc_index: 0,
            crtc: [0; CRTC_REGISTERS],
            video_enabled: false,
            blink_enabled: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Select a CRTC register (5-bit index)
    pub fn write_index(&mut self, value: u8) {
        self.crtc_index = value & 0x1F;
    }

    pub fn write_data(&mut self, value: u8) {
        log(LogCategory::Video, LogLevel::Debug, || {
            format!("MDA CRTC R{} <- 0x{:02X}", self.crtc_index, value)
        });
        self.crtc[self.crtc_index as usize] = value;
    }

    pub fn read_data(&self) -> u8 {
        self.crtc[self.crtc_index as usize]
    }

    /// Write the mode control register
    ///
    /// Writes with the high-resolution bit clear are ignored.
    pub fn write_control(&mut self, value: u8) {
        if value & MODE_HIRES == 0 {
            log(LogCategory::Video, LogLevel::Warn, || {
                format!("MDA mode control 0x{:02X} without high-resolution bit; ignored", value)
            });
            return;
        }

        self.blink_enabled = value & MODE_BLINK_ENABLE != 0;
        self.video_enabled = value & MODE_VIDEO_ENABLE != 0;

        log(LogCategory::Video, LogLevel::Info, || {
            format!(
                "MDA blinking {}, video output {}",
                if self.blink_enabled { "enabled" } else { "disabled" },
                if self.video_enabled { "enabled" } else { "disabled" }
            )
        });
    }

    pub fn crtc_index(&self) -> u8 {
        self.crtc_index
    }

    pub fn crtc_register(&self, index: u8) -> u8 {
        self.crtc[(index & 0x1F) as usize]
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn is_blink_enabled(&self) -> bool {
        self.blink_enabled
    }
}

impl Default for Mda {
    fn default() -> Self {
        Self::new()
    }
}
