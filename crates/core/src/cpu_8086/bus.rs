//! Bus interface consumed by the 8086 core
//!
//! Systems using the 8086 implement [`Bus8086`] to provide memory, I/O ports,
//! segment translation and (optionally) host emulation of software interrupts.

use super::registers::Registers;
use thiserror::Error;

/// Errors raised by a host bus while servicing the CPU
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unhandled read from I/O port 0x{0:04X}")]
    UnhandledPortRead(u16),
    #[error("unhandled write of 0x{value:02X} to I/O port 0x{port:04X}")]
    UnhandledPortWrite { port: u16, value: u8 },
    #[error("unrecognized interrupt 0x{0:02X}")]
    UnrecognizedInterrupt(u8),
    #[error("unrecognized INT {vector:02X}h service number 0x{service:02X}")]
    UnrecognizedService { vector: u8, service: u8 },
    #[error("firmware reported unimplemented interrupt 0x{vector:02X}, service 0x{service:02X}")]
    UnimplementedInterrupt { vector: u8, service: u8 },
}

/// Translate segment:offset into a 20-bit real-mode physical address
#[inline]
pub fn physical_address(segment: u16, offset: u16) -> u32 {
    (((segment as u32) << 4) + offset as u32) & 0xFFFFF
}

/// Memory, port and interrupt-hook interface for the 8086 CPU
pub trait Bus8086 {
    /// Read a byte from memory at the given physical address
    fn read_byte(&self, addr: u32) -> u8;

    /// Write a byte to memory at the given physical address
    fn write_byte(&mut self, addr: u32, val: u8);

    /// Read a byte from an I/O port
    fn port_in(&mut self, port: u16) -> Result<u8, BusError>;

    /// Write a byte to an I/O port
    fn port_out(&mut self, port: u16, val: u8) -> Result<(), BusError>;

    /// Convert segment and offset to a physical address
    fn convert_seg(&self, seg: u16, offset: u16) -> u32 {
        physical_address(seg, offset)
    }

    /// Whether the host services this interrupt vector itself
    fn is_interrupt_override(&self, _vector: u8) -> bool {
        false
    }

    /// Host implementation of an overridden interrupt
    ///
    /// Called instead of the vector-table dispatch; no stack frame is pushed and
    /// CS:IP is left at the instruction after `INT`. The handler owns every
    /// register and flag side effect.
    fn interrupt_override(&mut self, _regs: &mut Registers, vector: u8) -> Result<(), BusError> {
        Err(BusError::UnrecognizedInterrupt(vector))
    }
}

/// Bus used when nothing is attached: reads return 0 and writes are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl Bus8086 for NullBus {
    fn read_byte(&self, _addr: u32) -> u8 {
        0
    }

    fn write_byte(&mut self, _addr: u32, _val: u8) {}

    fn port_in(&mut self, _port: u16) -> Result<u8, BusError> {
        Ok(0)
    }

    fn port_out(&mut self, _port: u16, _val: u8) -> Result<(), BusError> {
        Ok(())
    }
}

/// Flat 1 MiB RAM with latched I/O ports, for tests and benchmarks
pub struct ArrayBus {
    data: Vec<u8>,
    ports: Vec<u8>,
}

impl ArrayBus {
    pub fn new() -> Self {
        Self {
            data: vec![0; 0x100000],
            ports: vec![0; 0x10000],
        }
    }

    /// Load a program at a specific physical address
    pub fn load(&mut self, addr: u32, program: &[u8]) {
        for (i, &byte) in program.iter().enumerate() {
            self.write_byte((addr + i as u32) & 0xFFFFF, byte);
        }
    }

    /// Read a 16-bit word from memory (little-endian)
    pub fn read_u16(&self, addr: u32) -> u16 {
        let low = self.read_byte(addr);
        let high = self.read_byte((addr + 1) & 0xFFFFF);
        (high as u16) << 8 | low as u16
    }

    /// Write a 16-bit word to memory (little-endian)
    pub fn write_u16(&mut self, addr: u32, val: u16) {
        self.write_byte(addr, val as u8);
        self.write_byte((addr + 1) & 0xFFFFF, (val >> 8) as u8);
    }

    /// Last value written to a port
    pub fn port(&self, port: u16) -> u8 {
        self.ports[port as usize]
    }
}

impl Default for ArrayBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus8086 for ArrayBus {
    fn read_byte(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0)
    }

    fn write_byte(&mut self, addr: u32, val: u8) {
        if let Some(cell) = self.data.get_mut(addr as usize) {
            *cell = val;
        }
    }

    fn port_in(&mut self, port: u16) -> Result<u8, BusError> {
        Ok(self.ports[port as usize])
    }

    fn port_out(&mut self, port: u16, val: u8) -> Result<(), BusError> {
        self.ports[port as usize] = val;
        Ok(())
    }
}
