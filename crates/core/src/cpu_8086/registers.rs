//! 8086 register file
//!
//! The four general-purpose registers are stored as independent high/low byte
//! halves so that AH/AL style access never needs masking at the call site.

use super::flags::Flags;
use serde::{Deserialize, Serialize};

/// Segment register selector, in ModR/M `sreg` order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Es,
    Cs,
    Ss,
    Ds,
}

impl Segment {
    pub fn from_index(index: u8) -> Self {
        match index & 0x03 {
            0 => Segment::Es,
            1 => Segment::Cs,
            2 => Segment::Ss,
            3 => Segment::Ds,
            _ => unreachable!(),
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Segment::Es => "es",
            Segment::Cs => "cs",
            Segment::Ss => "ss",
            Segment::Ds => "ds",
        }
    }
}

/// A 16-bit register made of two independently addressable bytes (e.g. AX = AH:AL)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPair {
    hi: u8,
    lo: u8,
}

impl RegisterPair {
    pub const fn new(value: u16) -> Self {
        Self {
            hi: (value >> 8) as u8,
            lo: value as u8,
        }
    }

    #[inline]
    pub fn get(&self) -> u16 {
        ((self.hi as u16) << 8) | self.lo as u16
    }

    #[inline]
    pub fn set(&mut self, value: u16) {
        self.hi = (value >> 8) as u8;
        self.lo = value as u8;
    }

    #[inline]
    pub fn hi(&self) -> u8 {
        self.hi
    }

    #[inline]
    pub fn set_hi(&mut self, value: u8) {
        self.hi = value;
    }

    #[inline]
    pub fn lo(&self) -> u8 {
        self.lo
    }

    #[inline]
    pub fn set_lo(&mut self, value: u8) {
        self.lo = value;
    }
}

/// Complete programmer-visible CPU state
///
/// This is what a host interrupt override receives: it may read and modify any
/// register or flag to synthesize the effect of a firmware service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub ax: RegisterPair,
    pub bx: RegisterPair,
    pub cx: RegisterPair,
    pub dx: RegisterPair,

    /// Instruction pointer, always addresses the next unfetched byte
    pub ip: u16,
    pub sp: u16,
    pub bp: u16,
    pub si: u16,
    pub di: u16,

    pub cs: u16,
    pub ds: u16,
    pub ss: u16,
    pub es: u16,

    pub flags: Flags,
}

impl Registers {
    /// Power-on state: everything zero except CS:IP
    pub fn with_entry(cs: u16, ip: u16) -> Self {
        Self {
            cs,
            ip,
            ..Self::default()
        }
    }

    /// Read an 8-bit register by ModR/M index (AL, CL, DL, BL, AH, CH, DH, BH)
    pub fn reg8(&self, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.ax.lo(),
            1 => self.cx.lo(),
            2 => self.dx.lo(),
            3 => self.bx.lo(),
            4 => self.ax.hi(),
            5 => self.cx.hi(),
            6 => self.dx.hi(),
            7 => self.bx.hi(),
            _ => unreachable!(),
        }
    }

    pub fn set_reg8(&mut self, index: u8, value: u8) {
        match index & 0x07 {
            0 => self.ax.set_lo(value),
            1 => self.cx.set_lo(value),
            2 => self.dx.set_lo(value),
            3 => self.bx.set_lo(value),
            4 => self.ax.set_hi(value),
            5 => self.cx.set_hi(value),
            6 => self.dx.set_hi(value),
            7 => self.bx.set_hi(value),
            _ => unreachable!(),
        }
    }

    /// Read a 16-bit register by ModR/M index (AX, CX, DX, BX, SP, BP, SI, DI)
    pub fn reg16(&self, index: u8) -> u16 {
        match index & 0x07 {
            0 => self.ax.get(),
            1 => self.cx.get(),
            2 => self.dx.get(),
            3 => self.bx.get(),
            4 => self.sp,
            5 => self.bp,
            6 => self.si,
            7 => self.di,
            _ => unreachable!(),
        }
    }

    pub fn set_reg16(&mut self, index: u8, value: u16) {
        match index & 0x07 {
            0 => self.ax.set(value),
            1 => self.cx.set(value),
            2 => self.dx.set(value),
            3 => self.bx.set(value),
            4 => self.sp = value,
            5 => self.bp = value,
            6 => self.si = value,
            7 => self.di = value,
            _ => unreachable!(),
        }
    }

    /// Read a segment register by index (ES, CS, SS, DS)
    pub fn seg(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.es,
            1 => self.cs,
            2 => self.ss,
            3 => self.ds,
            _ => unreachable!(),
        }
    }

    pub fn set_seg(&mut self, index: u8, value: u16) {
        match index & 0x03 {
            0 => self.es = value,
            1 => self.cs = value,
            2 => self.ss = value,
            3 => self.ds = value,
            _ => unreachable!(),
        }
    }

    pub fn ah(&self) -> u8 {
        self.ax.hi()
    }
    pub fn al(&self) -> u8 {
        self.ax.lo()
    }
    pub fn ax(&self) -> u16 {
        self.ax.get()
    }
    pub fn bh(&self) -> u8 {
        self.bx.hi()
    }
    pub fn bl(&self) -> u8 {
        self.bx.lo()
    }
    pub fn bx(&self) -> u16 {
        self.bx.get()
    }
    pub fn ch(&self) -> u8 {
        self.cx.hi()
    }
    pub fn cl(&self) -> u8 {
        self.cx.lo()
    }
    pub fn cx(&self) -> u16 {
        self.cx.get()
    }
    pub fn dh(&self) -> u8 {
        self.dx.hi()
    }
    pub fn dl(&self) -> u8 {
        self.dx.lo()
    }
    pub fn dx(&self) -> u16 {
        self.dx.get()
    }

    pub fn set_ah(&mut self, value: u8) {
        self.ax.set_hi(value);
    }
    pub fn set_al(&mut self, value: u8) {
        self.ax.set_lo(value);
    }
    pub fn set_ax(&mut self, value: u16) {
        self.ax.set(value);
    }
    pub fn set_bh(&mut self, value: u8) {
        self.bx.set_hi(value);
    }
    pub fn set_bl(&mut self, value: u8) {
        self.bx.set_lo(value);
    }
    pub fn set_bx(&mut self, value: u16) {
        self.bx.set(value);
    }
    pub fn set_ch(&mut self, value: u8) {
        self.cx.set_hi(value);
    }
    pub fn set_cl(&mut self, value: u8) {
        self.cx.set_lo(value);
    }
    pub fn set_cx(&mut self, value: u16) {
        self.cx.set(value);
    }
    pub fn set_dh(&mut self, value: u8) {
        self.dx.set_hi(value);
    }
    pub fn set_dl(&mut self, value: u8) {
        self.dx.set_lo(value);
    }
    pub fn set_dx(&mut self, value: u16) {
        self.dx.set(value);
    }

    /// Set or clear the carry flag (firmware services report status through it)
    pub fn set_carry(&mut self, value: bool) {
        self.flags.set_carry(value);
    }
}
