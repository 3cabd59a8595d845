//! FLAGS register and condition-code derivation
//!
//! Only the primitive condition bits are stored. Composite conditions used by
//! the conditional jumps (above, less, ...) are computed on demand.

use serde::{Deserialize, Serialize};

// Flag bit positions in FLAGS register
pub const FLAG_CF: u16 = 0x0001; // Carry Flag
pub const FLAG_PF: u16 = 0x0004; // Parity Flag
pub const FLAG_AF: u16 = 0x0010; // Auxiliary Carry Flag
pub const FLAG_ZF: u16 = 0x0040; // Zero Flag
pub const FLAG_SF: u16 = 0x0080; // Sign Flag
pub const FLAG_TF: u16 = 0x0100; // Trap Flag
pub const FLAG_IF: u16 = 0x0200; // Interrupt Enable Flag
pub const FLAG_DF: u16 = 0x0400; // Direction Flag
pub const FLAG_OF: u16 = 0x0800; // Overflow Flag

/// Bit 1 reads as 1 on every x86
const FLAG_RESERVED: u16 = 0x0002;
const FLAG_MASK: u16 = FLAG_CF
    | FLAG_PF
    | FLAG_AF
    | FLAG_ZF
    | FLAG_SF
    | FLAG_TF
    | FLAG_IF
    | FLAG_DF
    | FLAG_OF;

/// Operand width of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    /// Width selected by the low opcode bit (0 = byte, 1 = word)
    #[inline]
    pub fn from_opcode(opcode: u8) -> Self {
        if opcode & 1 == 0 {
            Width::Byte
        } else {
            Width::Word
        }
    }

    #[inline]
    pub fn mask(self) -> u16 {
        match self {
            Width::Byte => 0x00FF,
            Width::Word => 0xFFFF,
        }
    }

    #[inline]
    pub fn sign_bit(self) -> u16 {
        match self {
            Width::Byte => 0x0080,
            Width::Word => 0x8000,
        }
    }

    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
        }
    }

    #[inline]
    pub fn bytes(self) -> u16 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// The 8086 FLAGS word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub struct Flags(u16);

impl From<u16> for Flags {
    fn from(bits: u16) -> Self {
        Flags::from_bits(bits)
    }
}

impl From<Flags> for u16 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags(FLAG_RESERVED)
    }
}

impl Flags {
    /// Build from a raw word (as popped by POPF/IRET); undefined bits are normalised
    pub fn from_bits(bits: u16) -> Self {
        Flags((bits & FLAG_MASK) | FLAG_RESERVED)
    }

    #[inline]
    pub fn bits(&self) -> u16 {
        self.0
    }

    #[inline]
    pub fn get(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u16, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn carry(&self) -> bool {
        self.get(FLAG_CF)
    }
    pub fn set_carry(&mut self, value: bool) {
        self.set(FLAG_CF, value);
    }
    pub fn zero(&self) -> bool {
        self.get(FLAG_ZF)
    }
    pub fn set_zero(&mut self, value: bool) {
        self.set(FLAG_ZF, value);
    }
    pub fn sign(&self) -> bool {
        self.get(FLAG_SF)
    }
    pub fn overflow(&self) -> bool {
        self.get(FLAG_OF)
    }
    pub fn set_overflow(&mut self, value: bool) {
        self.set(FLAG_OF, value);
    }
    pub fn parity(&self) -> bool {
        self.get(FLAG_PF)
    }
    pub fn aux_carry(&self) -> bool {
        self.get(FLAG_AF)
    }
    pub fn direction(&self) -> bool {
        self.get(FLAG_DF)
    }
    pub fn set_direction(&mut self, value: bool) {
        self.set(FLAG_DF, value);
    }
    pub fn interrupt_enable(&self) -> bool {
        self.get(FLAG_IF)
    }
    pub fn set_interrupt_enable(&mut self, value: bool) {
        self.set(FLAG_IF, value);
    }

    /// Unsigned greater-than: !CF && !ZF
    pub fn above(&self) -> bool {
        !self.carry() && !self.zero()
    }

    /// Unsigned less-or-equal: CF || ZF
    pub fn below_or_equal(&self) -> bool {
        self.carry() || self.zero()
    }

    /// Signed less-than: SF != OF
    pub fn less(&self) -> bool {
        self.sign() != self.overflow()
    }

    /// Signed less-or-equal: (SF != OF) || ZF
    pub fn less_or_equal(&self) -> bool {
        self.less() || self.zero()
    }

    /// Evaluate a Jcc condition code (low nibble of opcodes 0x70-0x7F)
    /// 0=O, 1=NO, 2=B, 3=NB, 4=Z, 5=NZ, 6=BE, 7=A, 8=S, 9=NS, A=P, B=NP, C=L, D=NL, E=LE, F=G
    pub fn condition(&self, code: u8) -> bool {
        let base = match (code >> 1) & 0x07 {
            0 => self.overflow(),
            1 => self.carry(),
            2 => self.zero(),
            3 => self.below_or_equal(),
            4 => self.sign(),
            5 => self.parity(),
            6 => self.less(),
            7 => self.less_or_equal(),
            _ => unreachable!(),
        };
        // Odd codes are the negated form
        base != (code & 1 == 1)
    }

    /// Update ZF, SF and PF from a result; PF only looks at the low byte
    pub fn update_szp(&mut self, width: Width, result: u16) {
        let result = result & width.mask();
        self.set(FLAG_ZF, result == 0);
        self.set(FLAG_SF, result & width.sign_bit() != 0);
        self.set(FLAG_PF, (result as u8).count_ones() % 2 == 0);
    }

    /// ADD/ADC: returns the truncated sum and sets CF, OF, AF, ZF, SF, PF
    pub fn add(&mut self, width: Width, dst: u16, src: u16, carry_in: bool) -> u16 {
        let mask = width.mask() as u32;
        let (a, b) = (dst as u32 & mask, src as u32 & mask);
        let full = a + b + carry_in as u32;
        let result = (full & mask) as u16;
        let sign = width.sign_bit();

        self.set(FLAG_CF, full > mask);
        self.set(FLAG_OF, (!(dst ^ src) & (dst ^ result) & sign) != 0);
        self.set(FLAG_AF, ((a ^ b ^ full) & 0x10) != 0);
        self.update_szp(width, result);
        result
    }

    /// SUB/SBB/CMP: returns the truncated difference and sets CF, OF, AF, ZF, SF, PF
    pub fn sub(&mut self, width: Width, dst: u16, src: u16, borrow_in: bool) -> u16 {
        let mask = width.mask() as u32;
        let (a, b) = (dst as u32 & mask, src as u32 & mask);
        let full = a.wrapping_sub(b).wrapping_sub(borrow_in as u32);
        let result = (full & mask) as u16;
        let sign = width.sign_bit();

        self.set(FLAG_CF, a < b + borrow_in as u32);
        self.set(FLAG_OF, ((dst ^ src) & (dst ^ result) & sign) != 0);
        self.set(FLAG_AF, ((a ^ b ^ full) & 0x10) != 0);
        self.update_szp(width, result);
        result
    }

    /// AND/OR/XOR/TEST: CF and OF cleared, ZF/SF/PF from the result
    pub fn logic(&mut self, width: Width, result: u16) -> u16 {
        let result = result & width.mask();
        self.set(FLAG_CF, false);
        self.set(FLAG_OF, false);
        self.update_szp(width, result);
        result
    }

    /// INC leaves CF untouched
    pub fn inc(&mut self, width: Width, value: u16) -> u16 {
        let carry = self.carry();
        let result = self.add(width, value, 1, false);
        self.set_carry(carry);
        result
    }

    /// DEC leaves CF untouched
    pub fn dec(&mut self, width: Width, value: u16) -> u16 {
        let carry = self.carry();
        let result = self.sub(width, value, 1, false);
        self.set_carry(carry);
        result
    }
}
