//! ModR/M operand decoding
//!
//! The decoder is shared by the execution engine and the disassembler. Both
//! feed it through a [`ByteSource`], so displacement bytes are consumed the
//! same way on both paths and instruction lengths cannot drift apart.

use super::registers::{Registers, Segment};

/// Anything that can supply instruction-stream bytes
pub trait ByteSource {
    fn next_byte(&mut self) -> u8;

    /// Little-endian word from the stream
    fn next_word(&mut self) -> u16 {
        let low = self.next_byte() as u16;
        let high = self.next_byte() as u16;
        (high << 8) | low
    }
}

/// Base/index combination of a memory operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    BxSi,
    BxDi,
    BpSi,
    BpDi,
    Si,
    Di,
    Bp,
    Bx,
    /// mod=00 rm=110: 16-bit absolute offset, no registers
    Direct,
}

impl Base {
    fn from_rm(rm: u8) -> Self {
        match rm & 0x07 {
            0 => Base::BxSi,
            1 => Base::BxDi,
            2 => Base::BpSi,
            3 => Base::BpDi,
            4 => Base::Si,
            5 => Base::Di,
            6 => Base::Bp,
            7 => Base::Bx,
            _ => unreachable!(),
        }
    }

    /// BP-relative forms default to SS, everything else to DS
    pub fn default_segment(self) -> Segment {
        match self {
            Base::BpSi | Base::BpDi | Base::Bp => Segment::Ss,
            _ => Segment::Ds,
        }
    }

    /// Sum of the base/index registers (without displacement)
    pub fn offset(self, regs: &Registers) -> u16 {
        let bx = regs.bx();
        match self {
            Base::BxSi => bx.wrapping_add(regs.si),
            Base::BxDi => bx.wrapping_add(regs.di),
            Base::BpSi => regs.bp.wrapping_add(regs.si),
            Base::BpDi => regs.bp.wrapping_add(regs.di),
            Base::Si => regs.si,
            Base::Di => regs.di,
            Base::Bp => regs.bp,
            Base::Bx => bx,
            Base::Direct => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Base::BxSi => "bx+si",
            Base::BxDi => "bx+di",
            Base::BpSi => "bp+si",
            Base::BpDi => "bp+di",
            Base::Si => "si",
            Base::Di => "di",
            Base::Bp => "bp",
            Base::Bx => "bx",
            Base::Direct => "",
        }
    }

    /// 8086 effective-address calculation time, excluding displacement
    fn cycles(self) -> u32 {
        match self {
            Base::Direct => 6,
            Base::Si | Base::Di | Base::Bp | Base::Bx => 5,
            Base::BpDi | Base::BxSi => 7,
            Base::BpSi | Base::BxDi => 8,
        }
    }
}

/// Decoded r/m operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// mod=11: register index into the 8- or 16-bit register file
    Register(u8),
    /// Memory operand; `disp` is already sign-extended for 8-bit displacements
    Memory { base: Base, disp: u16, has_disp: bool },
}

/// A segment:offset pair produced by resolving a memory operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub segment: u16,
    pub offset: u16,
}

/// Decoded ModR/M byte plus its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
    pub operand: Operand,
}

impl ModRm {
    /// Split a ModR/M byte into (mod, reg, rm)
    #[inline]
    pub fn split(byte: u8) -> (u8, u8, u8) {
        ((byte >> 6) & 0x03, (byte >> 3) & 0x07, byte & 0x07)
    }

    /// Decode a ModR/M byte, pulling any displacement from `src`
    pub fn decode<S: ByteSource>(byte: u8, src: &mut S) -> Self {
        let (mode, reg, rm) = Self::split(byte);
        let operand = match (mode, rm) {
            (0b11, _) => Operand::Register(rm),
            (0b00, 0b110) => Operand::Memory {
                base: Base::Direct,
                disp: src.next_word(),
                has_disp: true,
            },
            (0b00, _) => Operand::Memory {
                base: Base::from_rm(rm),
                disp: 0,
                has_disp: false,
            },
            (0b01, _) => Operand::Memory {
                base: Base::from_rm(rm),
                disp: src.next_byte() as i8 as i16 as u16,
                has_disp: true,
            },
            _ => Operand::Memory {
                base: Base::from_rm(rm),
                disp: src.next_word(),
                has_disp: true,
            },
        };
        Self {
            mode,
            reg,
            rm,
            operand,
        }
    }

    #[inline]
    pub fn is_register(&self) -> bool {
        matches!(self.operand, Operand::Register(_))
    }

    /// Resolve a memory operand against the current registers
    ///
    /// An active segment override replaces the default segment. Returns `None`
    /// for register operands.
    pub fn address(&self, regs: &Registers, segment_override: Option<Segment>) -> Option<Address> {
        match self.operand {
            Operand::Register(_) => None,
            Operand::Memory { base, disp, .. } => {
                let segment = segment_override.unwrap_or(base.default_segment());
                Some(Address {
                    segment: regs.seg(segment.index()),
                    offset: base.offset(regs).wrapping_add(disp),
                })
            }
        }
    }

    /// Effective-address cycles to add to the memory form of an instruction
    pub fn ea_cycles(&self) -> u32 {
        match self.operand {
            Operand::Register(_) => 0,
            Operand::Memory {
                base: Base::Direct, ..
            } => Base::Direct.cycles(),
            Operand::Memory { base, has_disp, .. } => base.cycles() + if has_disp { 4 } else { 0 },
        }
    }
}
