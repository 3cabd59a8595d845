//! Intel 8086 CPU core implementation
//!
//! This module provides a reusable real-mode 8086 interpreter that can be driven
//! by any host implementing the [`Bus8086`] trait. The host supplies memory,
//! I/O ports and segment translation, and may take over individual software
//! interrupts to emulate firmware services without shipping firmware code.
//!
//! Execution is strictly one instruction per [`Cpu8086::run_instruction`]
//! call. Conditions the interpreter cannot continue from (unknown
//! opcodes, host protocol violations) come back as [`CpuError`] so that the
//! driving loop decides whether to halt.

mod bus;
mod disasm;
mod execute;
mod flags;
mod interrupt;
mod modrm;
mod registers;

#[cfg(test)]
mod tests;

pub use bus::{physical_address, ArrayBus, Bus8086, BusError, NullBus};
pub use disasm::{disassemble, Cursor, Disassembly};
pub use flags::{
    Flags, Width, FLAG_AF, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_PF, FLAG_SF, FLAG_TF, FLAG_ZF,
};
pub use interrupt::InterruptRequest;
pub use modrm::{Address, Base, ByteSource, ModRm, Operand};
pub use registers::{RegisterPair, Registers, Segment};

use crate::logging::{log, LogCategory, LogLevel};
use thiserror::Error;

/// Reset vector used by [`Cpu8086::new`] (physical 0xFFFF0)
pub const DEFAULT_BOOT_CS: u16 = 0xF000;
pub const DEFAULT_BOOT_IP: u16 = 0xFFF0;

/// Cost of each consumed prefix byte
const PREFIX_CYCLES: u32 = 2;

/// Fatal conditions surfaced to the driving loop
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("unrecognized opcode 0x{opcode:02X} at {cs:04X}:{ip:04X}")]
    UnrecognizedOpcode { opcode: u8, cs: u16, ip: u16 },
    #[error("opcode 0x{opcode:02X} has no operation /{extension} (at {cs:04X}:{ip:04X})")]
    UnrecognizedExtension {
        opcode: u8,
        extension: u8,
        cs: u16,
        ip: u16,
    },
    #[error("prefix bytes fill the code segment from {cs:04X}:{ip:04X}")]
    PrefixOverrun { cs: u16, ip: u16 },
    #[error("host bus error: {0}")]
    Bus(#[from] BusError),
}

/// Pending REP prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPrefix {
    /// 0xF3: REP, or REPE/REPZ for CMPS/SCAS
    Rep,
    /// 0xF2: REPNE/REPNZ
    RepNe,
}

/// Handler for one opcode; receives the opcode byte and returns cycles used
pub(crate) type Handler<B> = fn(&mut Cpu8086<B>, u8) -> Result<u32, CpuError>;

/// Intel 8086 CPU state and execution engine
pub struct Cpu8086<B: Bus8086 = NullBus> {
    /// Programmer-visible registers and flags
    pub regs: Registers,

    /// Host bus
    pub bus: B,

    /// Segment override for the current instruction only
    segment_override: Option<Segment>,

    /// REP prefix for the current string instruction only
    repeat: Option<RepeatPrefix>,

    /// Set by HLT
    halted: bool,

    /// Total cycles executed
    cycles: u64,

    /// CS:IP of the first byte (prefixes included) of the current instruction
    instruction_start: (u16, u16),
}

impl Cpu8086<NullBus> {
    /// A CPU with no bus attached: memory reads as zero and writes are dropped
    pub fn headless() -> Self {
        Self::new(NullBus)
    }
}

impl<B: Bus8086> Cpu8086<B> {
    /// Create a new 8086 CPU at the default reset vector
    pub fn new(bus: B) -> Self {
        Self::with_entry(bus, DEFAULT_BOOT_CS, DEFAULT_BOOT_IP)
    }

    /// Create a new 8086 CPU that starts executing at `cs:ip`
    pub fn with_entry(bus: B, cs: u16, ip: u16) -> Self {
        Self {
            regs: Registers::with_entry(cs, ip),
            bus,
            segment_override: None,
            repeat: None,
            halted: false,
            cycles: 0,
            instruction_start: (cs, ip),
        }
    }

    /// Initialize the CPU: all registers zero except CS:IP
    pub fn init(&mut self, cs: u16, ip: u16) {
        self.regs = Registers::with_entry(cs, ip);
        self.segment_override = None;
        self.repeat = None;
        self.halted = false;
        self.cycles = 0;
        self.instruction_start = (cs, ip);
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("8086: initialized at {:04X}:{:04X}", cs, ip)
        });
    }

    /// Reset the CPU (equivalent to `init`)
    pub fn reset(&mut self, cs: u16, ip: u16) {
        log(LogCategory::CPU, LogLevel::Info, || "8086: resetting".to_string());
        self.init(cs, ip);
    }

    /// Stop the CPU and hand the bus back to the caller
    pub fn shutdown(self) -> B {
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("8086: shutting down after {} cycles", self.cycles)
        });
        self.bus
    }

    /// Total cycles executed since `init`
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check if the CPU is halted
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Set the CPU halted state
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Execute one instruction (including its prefixes) and return cycles used
    pub fn run_instruction(&mut self) -> Result<u32, CpuError> {
        if self.halted {
            self.cycles += 1;
            return Ok(1);
        }

        self.instruction_start = (self.regs.cs, self.regs.ip);

        let mut prefix_cycles = 0;
        let mut opcode = self.fetch_u8();
        loop {
            match opcode {
                // ES: CS: SS: DS:
                0x26 | 0x2E | 0x36 | 0x3E => {
                    self.segment_override = Some(Segment::from_index(opcode >> 3));
                }
                0xF2 => self.repeat = Some(RepeatPrefix::RepNe),
                0xF3 => self.repeat = Some(RepeatPrefix::Rep),
                _ => break,
            }
            prefix_cycles += PREFIX_CYCLES;
            if self.regs.ip == self.instruction_start.1 {
                self.segment_override = None;
                self.repeat = None;
                return Err(CpuError::PrefixOverrun {
                    cs: self.instruction_start.0,
                    ip: self.instruction_start.1,
                });
            }
            opcode = self.fetch_u8();
        }

        log(LogCategory::CPU, LogLevel::Trace, || {
            format!(
                "{:04X}:{:04X} opcode {:02X} AX={:04X} BX={:04X} CX={:04X} DX={:04X} SP={:04X} FLAGS={:04X}",
                self.instruction_start.0,
                self.instruction_start.1,
                opcode,
                self.regs.ax(),
                self.regs.bx(),
                self.regs.cx(),
                self.regs.dx(),
                self.regs.sp,
                self.regs.flags.bits()
            )
        });

        let result = match Self::DISPATCH[opcode as usize] {
            Some(handler) => handler(self, opcode),
            None => Err(CpuError::UnrecognizedOpcode {
                opcode,
                cs: self.instruction_start.0,
                ip: self.instruction_start.1,
            }),
        };

        // Prefixes never outlive the instruction they modify, even on error
        self.segment_override = None;
        self.repeat = None;

        let cycles = result? + prefix_cycles;
        self.cycles += cycles as u64;
        Ok(cycles)
    }

    /// Every opcode byte with an entry in the dispatch table (prefixes excluded)
    pub fn implemented_opcodes() -> Vec<u8> {
        (0..=255u8)
            .filter(|&op| Self::DISPATCH[op as usize].is_some())
            .collect()
    }

    /// Disassemble the instruction at CS:IP without touching CPU state
    pub fn disassemble_current(&self) -> Disassembly {
        let mut cursor = Cursor::new(self.regs.cs, self.regs.ip);
        disassemble(&self.bus, &mut cursor)
    }

    /// Register dump, optionally followed by the instruction at CS:IP
    pub fn debug_string(&self, with_disassembly: bool) -> String {
        let r = &self.regs;
        let mut out = format!(
            "AX: {:04X}  BX: {:04X}  CX: {:04X}  DX: {:04X}\n\
             SI: {:04X}  DI: {:04X}  BP: {:04X}  SP: {:04X}\n\
             CS: {:04X}  DS: {:04X}  ES: {:04X}  SS: {:04X}\n\
             IP: {:04X}  Flags: {:04X}",
            r.ax(),
            r.bx(),
            r.cx(),
            r.dx(),
            r.si,
            r.di,
            r.bp,
            r.sp,
            r.cs,
            r.ds,
            r.es,
            r.ss,
            r.ip,
            r.flags.bits()
        );
        if with_disassembly {
            let dis = self.disassemble_current();
            out.push_str(&format!("\nCurrent instruction: {}", dis.text));
        }
        out
    }

    /// Emit the register dump through the CPU log category
    pub fn debug_output(&self, with_disassembly: bool) {
        log(LogCategory::CPU, LogLevel::Debug, || {
            self.debug_string(with_disassembly)
        });
    }

    /// Segment override active for the instruction being executed
    pub(crate) fn segment_override(&self) -> Option<Segment> {
        self.segment_override
    }

    /// REP prefix active for the instruction being executed
    pub(crate) fn repeat_prefix(&self) -> Option<RepeatPrefix> {
        self.repeat
    }

    /// Segment register value honouring any override
    pub(crate) fn data_segment(&self, default: Segment) -> u16 {
        self.regs
            .seg(self.segment_override.unwrap_or(default).index())
    }

    pub(crate) fn unrecognized_extension(&self, opcode: u8, extension: u8) -> CpuError {
        CpuError::UnrecognizedExtension {
            opcode,
            extension,
            cs: self.instruction_start.0,
            ip: self.instruction_start.1,
        }
    }

    /// Read a byte from code segment at IP
    #[inline]
    pub(crate) fn fetch_u8(&mut self) -> u8 {
        let addr = self.bus.convert_seg(self.regs.cs, self.regs.ip);
        self.regs.ip = self.regs.ip.wrapping_add(1);
        self.bus.read_byte(addr)
    }

    /// Read a word from code segment at IP
    #[inline]
    pub(crate) fn fetch_u16(&mut self) -> u16 {
        self.next_word()
    }

    #[inline]
    pub(crate) fn read_u8(&self, segment: u16, offset: u16) -> u8 {
        self.bus.read_byte(self.bus.convert_seg(segment, offset))
    }

    /// Little-endian word; the high byte wraps within the segment
    #[inline]
    pub(crate) fn read_u16(&self, segment: u16, offset: u16) -> u16 {
        let low = self.read_u8(segment, offset) as u16;
        let high = self.read_u8(segment, offset.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    #[inline]
    pub(crate) fn write_u8(&mut self, segment: u16, offset: u16, val: u8) {
        let addr = self.bus.convert_seg(segment, offset);
        self.bus.write_byte(addr, val);
    }

    #[inline]
    pub(crate) fn write_u16(&mut self, segment: u16, offset: u16, val: u16) {
        self.write_u8(segment, offset, val as u8);
        self.write_u8(segment, offset.wrapping_add(1), (val >> 8) as u8);
    }

    /// Push a word onto the stack
    #[inline]
    pub(crate) fn push(&mut self, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write_u16(self.regs.ss, self.regs.sp, val);
    }

    /// Pop a word from the stack
    #[inline]
    pub(crate) fn pop(&mut self) -> u16 {
        let val = self.read_u16(self.regs.ss, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }
}

impl<B: Bus8086> ByteSource for Cpu8086<B> {
    fn next_byte(&mut self) -> u8 {
        self.fetch_u8()
    }
}

impl<B: Bus8086 + Default> Default for Cpu8086<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}
