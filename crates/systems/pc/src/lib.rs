//! IBM PC/XT-style host for the 8086 core
//!
//! Wires the CPU to a [`PcBus`]: 1 MiB of RAM, a read-only firmware window, a
//! floppy image on drive A:, the MDA registers, and host-side INT 13h disk
//! services. Firmware and disk images are passed in as bytes.

mod bios;
mod bus;
pub mod config;
pub mod disk;
pub mod mda;

pub use bios::{STATUS_INVALID_COMMAND, STATUS_NOT_READY, STATUS_OK, STATUS_SECTOR_NOT_FOUND};
pub use bus::PcBus;
pub use config::{FirmwareEntry, PcConfig};
pub use disk::{FloppyFormat, FloppyImage, Geometry};

use i86_core::cpu_8086::{Cpu8086, CpuError};
use i86_core::logging::{apply_level_str, log, LogCategory, LogLevel};
use i86_core::Cpu;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcError {
    #[error("firmware image is empty")]
    EmptyFirmwareImage,
    #[error("firmware image of {size} bytes does not fit at offset 0x{offset:X} of a 0x{window:X} byte window")]
    FirmwareTooLarge { size: usize, offset: u32, window: u32 },
    #[error("disk image is empty")]
    EmptyDiskImage,
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// PC system: CPU, bus and configuration
pub struct PcMachine {
    cpu: Cpu8086<PcBus>,
    config: PcConfig,
    instructions: u64,
}

impl PcMachine {
    /// Build a machine with `firmware` in the ROM window and `disk` in drive A:
    pub fn new(config: PcConfig, firmware: &[u8], disk: &[u8]) -> Result<Self, PcError> {
        if let Some(level) = config.log_level.as_deref() {
            if !apply_level_str(level) {
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    format!("Ignoring unknown log level '{}'", level)
                });
            }
        }

        if disk.is_empty() {
            return Err(PcError::EmptyDiskImage);
        }

        let mut bus = PcBus::new(&config);
        bus.load_firmware(firmware)?;
        bus.mount_floppy(disk.to_vec());

        let entry = config.firmware;
        let mut cpu = Cpu8086::new(bus);
        cpu.init(entry.boot_cs, entry.boot_ip);

        Ok(Self {
            cpu,
            config,
            instructions: 0,
        })
    }

    /// Execute one instruction and return the cycles it took
    pub fn step(&mut self) -> Result<u32, PcError> {
        let cycles = self.cpu.step()?;
        self.instructions += 1;
        Ok(cycles)
    }

    /// Execute up to `max_instructions`, stopping early on HLT or at the first error
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self, max_instructions: u64) -> Result<u64, PcError> {
        let mut executed = 0;
        while executed < max_instructions {
            if self.cpu.is_halted() {
                break;
            }
            if let Err(err) = self.step() {
                log(LogCategory::CPU, LogLevel::Error, || {
                    format!("Stopped after {} instructions: {}", executed, err)
                });
                return Err(err);
            }
            executed += 1;
        }
        Ok(executed)
    }

    /// Restart at the firmware entry point; RAM and devices are cleared
    pub fn reset(&mut self) {
        let entry = self.config.firmware;
        self.cpu.bus.reset();
        self.cpu.reset(entry.boot_cs, entry.boot_ip);
        self.instructions = 0;
    }

    /// Stop the machine and hand back its bus
    pub fn shutdown(self) -> PcBus {
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("PC: shutting down after {} instructions", self.instructions)
        });
        self.cpu.shutdown()
    }

    pub fn cpu(&self) -> &Cpu8086<PcBus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu8086<PcBus> {
        &mut self.cpu
    }

    pub fn bus(&self) -> &PcBus {
        &self.cpu.bus
    }

    pub fn bus_mut(&mut self) -> &mut PcBus {
        &mut self.cpu.bus
    }

    pub fn config(&self) -> &PcConfig {
        &self.config
    }

    /// Instructions executed since construction or the last reset
    pub fn instructions(&self) -> u64 {
        self.instructions
    }
}
