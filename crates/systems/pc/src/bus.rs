//! PC memory and I/O bus
//!
//! Memory layout:
//! - 0x00000-0xFFFFF: RAM (1 MiB)
//! - firmware window: read-only image overlaying RAM, placed by [`FirmwareEntry`]
//!
//! The port map covers the MDA registers, a handful of ports that are written
//! during POST and ignored, and the 0x4F8/0x4F9 pair the firmware uses to
//! report interrupts it does not implement.

use crate::bios;
use crate::config::{FirmwareEntry, PcConfig};
use crate::disk::FloppyImage;
use crate::mda::{Mda, CRTC_DATA_PORT, CRTC_INDEX_PORT, MODE_CONTROL_PORT};
use crate::PcError;
use i86_core::cpu_8086::{Bus8086, BusError, Registers};
use i86_core::logging::{log, LogCategory, LogLevel};

const RAM_SIZE: usize = 0x100000;

/// Firmware writes the vector number of an unimplemented interrupt here
const UNIMPLEMENTED_VECTOR_PORT: u16 = 0x4F8;
/// ...followed by the service number here
const UNIMPLEMENTED_SERVICE_PORT: u16 = 0x4F9;

/// Written during POST; accepted and discarded
const IGNORED_PORTS: [u16; 3] = [0x063, 0x0A0, 0x3D8];

/// PC memory bus
pub struct PcBus {
    ram: Vec<u8>,
    /// Firmware window contents, `window_size` bytes
    firmware: Vec<u8>,
    entry: FirmwareEntry,
    override_all_interrupts: bool,
    /// Drive A:
    floppy: Option<FloppyImage>,
    mda: Mda,
    /// Status of the last INT 13h operation
    disk_status: u8,
    /// Vector latched through port 0x4F8
    unimplemented_vector: Option<u8>,
}

impl PcBus {
    pub fn new(config: &PcConfig) -> Self {
        Self {
            ram: vec![0; RAM_SIZE],
            firmware: vec![0; config.firmware.window_size as usize],
            entry: config.firmware,
            override_all_interrupts: config.override_all_interrupts,
            floppy: None,
            mda: Mda::new(),
            disk_status: 0,
            unimplemented_vector: None,
        }
    }

    /// Place a firmware image in the read-only window
    ///
    /// The image lands at `image_offset` inside the window; the rest of the
    /// window reads as zero.
    pub fn load_firmware(&mut self, image: &[u8]) -> Result<(), PcError> {
        if image.is_empty() {
            return Err(PcError::EmptyFirmwareImage);
        }

        let offset = self.entry.image_offset as usize;
        let window = self.entry.window_size as usize;
        if offset + image.len() > window {
            return Err(PcError::FirmwareTooLarge {
                size: image.len(),
                offset: self.entry.image_offset,
                window: self.entry.window_size,
            });
        }

        self.firmware.fill(0);
        self.firmware[offset..offset + image.len()].copy_from_slice(image);

        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "Loaded {} byte firmware at 0x{:05X}",
                image.len(),
                self.entry.load_addr + self.entry.image_offset
            )
        });
        Ok(())
    }

    /// Copy bytes straight into RAM, bypassing the firmware window
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let addr = (addr as usize + i) & (RAM_SIZE - 1);
            self.ram[addr] = byte;
        }
    }

    pub fn mount_floppy(&mut self, image: Vec<u8>) {
        self.floppy = Some(FloppyImage::open(image));
    }

    pub fn unmount_floppy(&mut self) {
        if let Some(mut floppy) = self.floppy.take() {
            floppy.close();
        }
    }

    pub fn floppy(&self) -> Option<&FloppyImage> {
        self.floppy.as_ref()
    }

    pub(crate) fn floppy_mut(&mut self) -> Option<&mut FloppyImage> {
        self.floppy.as_mut()
    }

    pub fn mda(&self) -> &Mda {
        &self.mda
    }

    /// Status byte returned by INT 13h AH=01h
    pub fn disk_status(&self) -> u8 {
        self.disk_status
    }

    pub(crate) fn set_disk_status(&mut self, status: u8) {
        self.disk_status = status;
    }

    pub fn firmware_entry(&self) -> FirmwareEntry {
        self.entry
    }

    /// Clear RAM and device state; firmware and the mounted disk are kept
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.mda.reset();
        self.disk_status = 0;
        self.unimplemented_vector = None;
    }
}

impl Bus8086 for PcBus {
    fn read_byte(&self, addr: u32) -> u8 {
        let addr = addr & 0xFFFFF;
        if self.entry.contains(addr) {
            self.firmware[(addr - self.entry.load_addr) as usize]
        } else {
            self.ram[addr as usize]
        }
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        let addr = addr & 0xFFFFF;
        if self.entry.contains(addr) {
            log(LogCategory::Bus, LogLevel::Trace, || {
                format!("Dropped write of 0x{:02X} to firmware at 0x{:05X}", val, addr)
            });
            return;
        }
        self.ram[addr as usize] = val;
    }

    fn port_in(&mut self, port: u16) -> Result<u8, BusError> {
        let value = match port {
            CRTC_DATA_PORT => self.mda.read_data(),
            _ => return Err(BusError::UnhandledPortRead(port)),
        };

        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("I/O read port 0x{:04X} = 0x{:02X}", port, value)
        });
        Ok(value)
    }

    fn port_out(&mut self, port: u16, val: u8) -> Result<(), BusError> {
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("I/O write port 0x{:04X} = 0x{:02X}", port, val)
        });

        match port {
            p if IGNORED_PORTS.contains(&p) => {}
            CRTC_INDEX_PORT => self.mda.write_index(val),
            CRTC_DATA_PORT => self.mda.write_data(val),
            MODE_CONTROL_PORT => self.mda.write_control(val),
            UNIMPLEMENTED_VECTOR_PORT => self.unimplemented_vector = Some(val),
            UNIMPLEMENTED_SERVICE_PORT => {
                if let Some(vector) = self.unimplemented_vector.take() {
                    return Err(BusError::UnimplementedInterrupt {
                        vector,
                        service: val,
                    });
                }
            }
            _ => return Err(BusError::UnhandledPortWrite { port, value: val }),
        }
        Ok(())
    }

    fn is_interrupt_override(&self, vector: u8) -> bool {
        vector == 0x13 || self.override_all_interrupts
    }

    fn interrupt_override(&mut self, regs: &mut Registers, vector: u8) -> Result<(), BusError> {
        bios::service_interrupt(self, regs, vector)
    }
}
