//! Opcode dispatch table and instruction handlers
//!
//! Every implemented opcode maps to one handler in [`Cpu8086::DISPATCH`].
//! Related opcodes that differ only in width or direction bits share a handler
//! and decode those bits from the opcode byte they are called with.

use super::flags::Width;
use super::modrm::{Address, ModRm};
use super::registers::Segment;
use super::{Bus8086, Cpu8086, CpuError, Handler, RepeatPrefix};
use crate::logging::{log, LogCategory, LogLevel};

/// Where a decoded r/m operand lives; resolved once per instruction
#[derive(Debug, Clone, Copy)]
pub(super) enum Location {
    Register(u8),
    Memory(Address),
}

// Group 1 / ALU operation numbers (bits 5-3 of the opcode or ModR/M reg)
const ALU_ADD: u8 = 0;
const ALU_OR: u8 = 1;
const ALU_ADC: u8 = 2;
const ALU_SBB: u8 = 3;
const ALU_AND: u8 = 4;
const ALU_SUB: u8 = 5;
const ALU_XOR: u8 = 6;
const ALU_CMP: u8 = 7;

// String primitives (opcode with the width bit cleared)
const MOVS: u8 = 0xA4;
const CMPS: u8 = 0xA6;
const STOS: u8 = 0xAA;
const LODS: u8 = 0xAC;
const SCAS: u8 = 0xAE;

impl<B: Bus8086> Cpu8086<B> {
    pub(super) const DISPATCH: [Option<Handler<B>>; 256] = {
        let mut table: [Option<Handler<B>>; 256] = [None; 256];

        // 00-3F: ALU rows; columns 6/7 are segment push/pop or prefixes
        let mut op = 0;
        while op < 0x40 {
            match op & 0x07 {
                0..=5 => table[op] = Some(Self::op_alu as Handler<B>),
                _ => {}
            }
            op += 1;
        }
        table[0x06] = Some(Self::op_push_seg as Handler<B>);
        table[0x0E] = Some(Self::op_push_seg as Handler<B>);
        table[0x16] = Some(Self::op_push_seg as Handler<B>);
        table[0x1E] = Some(Self::op_push_seg as Handler<B>);
        table[0x07] = Some(Self::op_pop_seg as Handler<B>);
        table[0x0F] = Some(Self::op_pop_seg as Handler<B>);
        table[0x17] = Some(Self::op_pop_seg as Handler<B>);
        table[0x1F] = Some(Self::op_pop_seg as Handler<B>);

        let mut op = 0x40;
        while op < 0x50 {
            table[op] = Some(Self::op_inc_dec_reg as Handler<B>);
            op += 1;
        }
        while op < 0x58 {
            table[op] = Some(Self::op_push_reg as Handler<B>);
            op += 1;
        }
        while op < 0x60 {
            table[op] = Some(Self::op_pop_reg as Handler<B>);
            op += 1;
        }

        let mut op = 0x70;
        while op < 0x80 {
            table[op] = Some(Self::op_jcc as Handler<B>);
            op += 1;
        }

        table[0x80] = Some(Self::op_group1 as Handler<B>);
        table[0x81] = Some(Self::op_group1 as Handler<B>);
        table[0x82] = Some(Self::op_group1 as Handler<B>);
        table[0x83] = Some(Self::op_group1 as Handler<B>);
        table[0x84] = Some(Self::op_test_rm as Handler<B>);
        table[0x85] = Some(Self::op_test_rm as Handler<B>);
        table[0x86] = Some(Self::op_xchg_rm as Handler<B>);
        table[0x87] = Some(Self::op_xchg_rm as Handler<B>);
        table[0x88] = Some(Self::op_mov_rm as Handler<B>);
        table[0x89] = Some(Self::op_mov_rm as Handler<B>);
        table[0x8A] = Some(Self::op_mov_rm as Handler<B>);
        table[0x8B] = Some(Self::op_mov_rm as Handler<B>);
        table[0x8C] = Some(Self::op_mov_rm_sreg as Handler<B>);
        table[0x8D] = Some(Self::op_lea as Handler<B>);
        table[0x8E] = Some(Self::op_mov_sreg_rm as Handler<B>);
        table[0x8F] = Some(Self::op_pop_rm as Handler<B>);

        let mut op = 0x90;
        while op < 0x98 {
            table[op] = Some(Self::op_xchg_ax as Handler<B>);
            op += 1;
        }
        table[0x98] = Some(Self::op_cbw as Handler<B>);
        table[0x99] = Some(Self::op_cwd as Handler<B>);
        table[0x9A] = Some(Self::op_call_far as Handler<B>);
        table[0x9C] = Some(Self::op_pushf as Handler<B>);
        table[0x9D] = Some(Self::op_popf as Handler<B>);
        table[0x9E] = Some(Self::op_sahf as Handler<B>);
        table[0x9F] = Some(Self::op_lahf as Handler<B>);

        let mut op = 0xA0;
        while op < 0xA4 {
            table[op] = Some(Self::op_mov_acc_moffs as Handler<B>);
            op += 1;
        }
        while op < 0xB0 {
            match op {
                0xA8 | 0xA9 => table[op] = Some(Self::op_test_acc_imm as Handler<B>),
                _ => table[op] = Some(Self::op_string as Handler<B>),
            }
            op += 1;
        }
        while op < 0xC0 {
            table[op] = Some(Self::op_mov_reg_imm as Handler<B>);
            op += 1;
        }

        table[0xC2] = Some(Self::op_ret_near as Handler<B>);
        table[0xC3] = Some(Self::op_ret_near as Handler<B>);
        table[0xC4] = Some(Self::op_load_far_pointer as Handler<B>);
        table[0xC5] = Some(Self::op_load_far_pointer as Handler<B>);
        table[0xC6] = Some(Self::op_mov_rm_imm as Handler<B>);
        table[0xC7] = Some(Self::op_mov_rm_imm as Handler<B>);
        table[0xCA] = Some(Self::op_ret_far as Handler<B>);
        table[0xCB] = Some(Self::op_ret_far as Handler<B>);
        table[0xCC] = Some(Self::op_int3 as Handler<B>);
        table[0xCD] = Some(Self::op_int as Handler<B>);
        table[0xCE] = Some(Self::op_into as Handler<B>);
        table[0xCF] = Some(Self::op_iret as Handler<B>);

        table[0xD0] = Some(Self::op_group2 as Handler<B>);
        table[0xD1] = Some(Self::op_group2 as Handler<B>);
        table[0xD2] = Some(Self::op_group2 as Handler<B>);
        table[0xD3] = Some(Self::op_group2 as Handler<B>);
        table[0xD7] = Some(Self::op_xlat as Handler<B>);

        table[0xE0] = Some(Self::op_loop as Handler<B>);
        table[0xE1] = Some(Self::op_loop as Handler<B>);
        table[0xE2] = Some(Self::op_loop as Handler<B>);
        table[0xE3] = Some(Self::op_loop as Handler<B>);
        table[0xE4] = Some(Self::op_in_out as Handler<B>);
        table[0xE5] = Some(Self::op_in_out as Handler<B>);
        table[0xE6] = Some(Self::op_in_out as Handler<B>);
        table[0xE7] = Some(Self::op_in_out as Handler<B>);
        table[0xE8] = Some(Self::op_call_near as Handler<B>);
        table[0xE9] = Some(Self::op_jmp_near as Handler<B>);
        table[0xEA] = Some(Self::op_jmp_far as Handler<B>);
        table[0xEB] = Some(Self::op_jmp_short as Handler<B>);
        table[0xEC] = Some(Self::op_in_out as Handler<B>);
        table[0xED] = Some(Self::op_in_out as Handler<B>);
        table[0xEE] = Some(Self::op_in_out as Handler<B>);
        table[0xEF] = Some(Self::op_in_out as Handler<B>);

        table[0xF4] = Some(Self::op_hlt as Handler<B>);
        table[0xF5] = Some(Self::op_flag as Handler<B>);
        table[0xF6] = Some(Self::op_group3 as Handler<B>);
        table[0xF7] = Some(Self::op_group3 as Handler<B>);
        let mut op = 0xF8;
        while op < 0xFE {
            table[op] = Some(Self::op_flag as Handler<B>);
            op += 1;
        }
        table[0xFE] = Some(Self::op_group4 as Handler<B>);
        table[0xFF] = Some(Self::op_group5 as Handler<B>);

        table
    };

    // ----- operand helpers -----

    #[inline]
    fn fetch_modrm(&mut self) -> ModRm {
        let byte = self.fetch_u8();
        ModRm::decode(byte, self)
    }

    fn fetch_imm(&mut self, width: Width) -> u16 {
        match width {
            Width::Byte => self.fetch_u8() as u16,
            Width::Word => self.fetch_u16(),
        }
    }

    pub(super) fn locate(&self, modrm: &ModRm) -> Location {
        match modrm.address(&self.regs, self.segment_override()) {
            Some(addr) => Location::Memory(addr),
            None => Location::Register(modrm.rm),
        }
    }

    pub(super) fn read_loc(&self, width: Width, loc: Location) -> u16 {
        match (loc, width) {
            (Location::Register(r), Width::Byte) => self.regs.reg8(r) as u16,
            (Location::Register(r), Width::Word) => self.regs.reg16(r),
            (Location::Memory(a), Width::Byte) => self.read_u8(a.segment, a.offset) as u16,
            (Location::Memory(a), Width::Word) => self.read_u16(a.segment, a.offset),
        }
    }

    pub(super) fn write_loc(&mut self, width: Width, loc: Location, value: u16) {
        match (loc, width) {
            (Location::Register(r), Width::Byte) => self.regs.set_reg8(r, value as u8),
            (Location::Register(r), Width::Word) => self.regs.set_reg16(r, value),
            (Location::Memory(a), Width::Byte) => self.write_u8(a.segment, a.offset, value as u8),
            (Location::Memory(a), Width::Word) => self.write_u16(a.segment, a.offset, value),
        }
    }

    fn reg(&self, width: Width, index: u8) -> u16 {
        match width {
            Width::Byte => self.regs.reg8(index) as u16,
            Width::Word => self.regs.reg16(index),
        }
    }

    fn set_reg(&mut self, width: Width, index: u8, value: u16) {
        match width {
            Width::Byte => self.regs.set_reg8(index, value as u8),
            Width::Word => self.regs.set_reg16(index, value),
        }
    }

    /// Cycle cost: `reg` for register operands, `mem` plus EA time otherwise
    #[inline]
    fn timing(modrm: &ModRm, reg: u32, mem: u32) -> u32 {
        if modrm.is_register() {
            reg
        } else {
            mem + modrm.ea_cycles()
        }
    }

    /// Apply one of the eight ALU operations and return the result
    fn alu(&mut self, op: u8, width: Width, dst: u16, src: u16) -> u16 {
        let flags = &mut self.regs.flags;
        match op {
            ALU_ADD => flags.add(width, dst, src, false),
            ALU_OR => flags.logic(width, dst | src),
            ALU_ADC => {
                let carry = flags.carry();
                flags.add(width, dst, src, carry)
            }
            ALU_SBB => {
                let borrow = flags.carry();
                flags.sub(width, dst, src, borrow)
            }
            ALU_AND => flags.logic(width, dst & src),
            ALU_SUB => flags.sub(width, dst, src, false),
            ALU_XOR => flags.logic(width, dst ^ src),
            _ => flags.sub(width, dst, src, false),
        }
    }

    #[inline]
    fn jump_relative(&mut self, disp: u16) {
        self.regs.ip = self.regs.ip.wrapping_add(disp);
    }

    // ----- 00-3F -----

    /// ADD/OR/ADC/SBB/AND/SUB/XOR/CMP in their r/m and accumulator forms
    fn op_alu(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let op = (opcode >> 3) & 0x07;
        let width = Width::from_opcode(opcode);

        if opcode & 0x04 != 0 {
            // AL/AX, imm
            let imm = self.fetch_imm(width);
            let acc = self.reg(width, 0);
            let result = self.alu(op, width, acc, imm);
            if op != ALU_CMP {
                self.set_reg(width, 0, result);
            }
            return Ok(4);
        }

        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);
        let to_reg = opcode & 0x02 != 0;
        let reg = self.reg(width, modrm.reg);
        let rm = self.read_loc(width, loc);

        if to_reg {
            let result = self.alu(op, width, reg, rm);
            if op != ALU_CMP {
                self.set_reg(width, modrm.reg, result);
            }
            Ok(Self::timing(&modrm, 3, 9))
        } else {
            let result = self.alu(op, width, rm, reg);
            if op != ALU_CMP {
                self.write_loc(width, loc, result);
                Ok(Self::timing(&modrm, 3, 16))
            } else {
                Ok(Self::timing(&modrm, 3, 9))
            }
        }
    }

    fn op_push_seg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let value = self.regs.seg((opcode >> 3) & 0x03);
        self.push(value);
        Ok(10)
    }

    fn op_pop_seg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let value = self.pop();
        self.regs.set_seg((opcode >> 3) & 0x03, value);
        Ok(8)
    }

    // ----- 40-5F -----

    fn op_inc_dec_reg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let index = opcode & 0x07;
        let value = self.regs.reg16(index);
        let result = if opcode < 0x48 {
            self.regs.flags.inc(Width::Word, value)
        } else {
            self.regs.flags.dec(Width::Word, value)
        };
        self.regs.set_reg16(index, result);
        Ok(3)
    }

    fn op_push_reg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let index = opcode & 0x07;
        // PUSH SP stores the already-decremented value on the 8086
        let value = if index == 4 {
            self.regs.sp.wrapping_sub(2)
        } else {
            self.regs.reg16(index)
        };
        self.push(value);
        Ok(11)
    }

    fn op_pop_reg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let value = self.pop();
        self.regs.set_reg16(opcode & 0x07, value);
        Ok(8)
    }

    // ----- 70-7F -----

    fn op_jcc(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let disp = self.fetch_u8() as i8 as i16 as u16;
        if self.regs.flags.condition(opcode & 0x0F) {
            self.jump_relative(disp);
            Ok(16)
        } else {
            Ok(4)
        }
    }

    // ----- 80-8F -----

    /// Group 1: ALU r/m, imm (0x82 is an alias of 0x80, 0x83 sign-extends imm8)
    fn op_group1(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let imm = match opcode {
            0x81 => self.fetch_u16(),
            0x83 => self.fetch_u8() as i8 as i16 as u16,
            _ => self.fetch_u8() as u16,
        };
        let loc = self.locate(&modrm);
        let dst = self.read_loc(width, loc);
        let result = self.alu(modrm.reg, width, dst, imm);
        if modrm.reg == ALU_CMP {
            return Ok(Self::timing(&modrm, 4, 10));
        }
        self.write_loc(width, loc, result);
        Ok(Self::timing(&modrm, 4, 17))
    }

    fn op_test_rm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);
        let value = self.read_loc(width, loc) & self.reg(width, modrm.reg);
        self.regs.flags.logic(width, value);
        Ok(Self::timing(&modrm, 3, 9))
    }

    fn op_xchg_rm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);
        let rm = self.read_loc(width, loc);
        let reg = self.reg(width, modrm.reg);
        self.write_loc(width, loc, reg);
        self.set_reg(width, modrm.reg, rm);
        Ok(Self::timing(&modrm, 4, 17))
    }

    /// MOV r/m,reg (88/89) and MOV reg,r/m (8A/8B)
    fn op_mov_rm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);
        if opcode & 0x02 != 0 {
            let value = self.read_loc(width, loc);
            self.set_reg(width, modrm.reg, value);
            Ok(Self::timing(&modrm, 2, 8))
        } else {
            let value = self.reg(width, modrm.reg);
            self.write_loc(width, loc, value);
            Ok(Self::timing(&modrm, 2, 9))
        }
    }

    fn op_mov_rm_sreg(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        if modrm.reg > 3 {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        }
        let loc = self.locate(&modrm);
        let value = self.regs.seg(modrm.reg);
        self.write_loc(Width::Word, loc, value);
        Ok(Self::timing(&modrm, 2, 9))
    }

    fn op_lea(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        match self.locate(&modrm) {
            Location::Memory(addr) => {
                self.regs.set_reg16(modrm.reg, addr.offset);
                Ok(2 + modrm.ea_cycles())
            }
            Location::Register(_) => Err(self.unrecognized_extension(opcode, modrm.reg)),
        }
    }

    fn op_mov_sreg_rm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        if modrm.reg > 3 {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        }
        let loc = self.locate(&modrm);
        let value = self.read_loc(Width::Word, loc);
        self.regs.set_seg(modrm.reg, value);
        Ok(Self::timing(&modrm, 2, 8))
    }

    fn op_pop_rm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        if modrm.reg != 0 {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        }
        let value = self.pop();
        let loc = self.locate(&modrm);
        self.write_loc(Width::Word, loc, value);
        Ok(Self::timing(&modrm, 8, 17))
    }

    // ----- 90-9F -----

    /// XCHG AX, reg16 (0x90 is NOP)
    fn op_xchg_ax(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let index = opcode & 0x07;
        let other = self.regs.reg16(index);
        let ax = self.regs.ax();
        self.regs.set_reg16(index, ax);
        self.regs.set_ax(other);
        Ok(3)
    }

    fn op_cbw(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let al = self.regs.al() as i8 as i16 as u16;
        self.regs.set_ax(al);
        Ok(2)
    }

    fn op_cwd(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let dx = if self.regs.ax() & 0x8000 != 0 { 0xFFFF } else { 0 };
        self.regs.set_dx(dx);
        Ok(5)
    }

    fn op_call_far(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let offset = self.fetch_u16();
        let segment = self.fetch_u16();
        self.push(self.regs.cs);
        self.push(self.regs.ip);
        self.regs.cs = segment;
        self.regs.ip = offset;
        Ok(28)
    }

    fn op_pushf(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        self.push(self.regs.flags.bits());
        Ok(10)
    }

    fn op_popf(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let bits = self.pop();
        self.regs.flags = super::Flags::from_bits(bits);
        Ok(8)
    }

    /// SAHF: SF ZF AF PF CF from AH
    fn op_sahf(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        const SAHF_MASK: u16 = 0x00D5;
        let bits = (self.regs.flags.bits() & !SAHF_MASK) | (self.regs.ah() as u16 & SAHF_MASK);
        self.regs.flags = super::Flags::from_bits(bits);
        Ok(4)
    }

    fn op_lahf(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let low = self.regs.flags.bits() as u8;
        self.regs.set_ah(low);
        Ok(4)
    }

    // ----- A0-BF -----

    /// MOV AL/AX, [moffs] (A0/A1) and MOV [moffs], AL/AX (A2/A3)
    fn op_mov_acc_moffs(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let offset = self.fetch_u16();
        let loc = Location::Memory(Address {
            segment: self.data_segment(Segment::Ds),
            offset,
        });
        if opcode & 0x02 == 0 {
            let value = self.read_loc(width, loc);
            self.set_reg(width, 0, value);
        } else {
            let value = self.reg(width, 0);
            self.write_loc(width, loc, value);
        }
        Ok(10)
    }

    fn op_test_acc_imm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let imm = self.fetch_imm(width);
        let value = self.reg(width, 0) & imm;
        self.regs.flags.logic(width, value);
        Ok(4)
    }

    /// MOVS, CMPS, STOS, LODS and SCAS, with or without a REP prefix
    fn op_string(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let kind = opcode & 0xFE;

        let (single, per_iteration) = match kind {
            MOVS => (18, 17),
            CMPS => (22, 22),
            STOS => (11, 10),
            LODS => (12, 13),
            _ => (15, 15),
        };

        let Some(repeat) = self.repeat_prefix() else {
            self.string_step(kind, width);
            return Ok(single);
        };

        let mut cycles = 9;
        while self.regs.cx() != 0 {
            self.string_step(kind, width);
            self.regs.set_cx(self.regs.cx().wrapping_sub(1));
            cycles += per_iteration;

            if kind == CMPS || kind == SCAS {
                let zero = self.regs.flags.zero();
                let done = match repeat {
                    RepeatPrefix::Rep => !zero,
                    RepeatPrefix::RepNe => zero,
                };
                if done {
                    break;
                }
            }
        }
        Ok(cycles)
    }

    /// One iteration of a string primitive, including SI/DI stepping
    fn string_step(&mut self, kind: u8, width: Width) {
        let delta = if self.regs.flags.direction() {
            width.bytes().wrapping_neg()
        } else {
            width.bytes()
        };
        let src = Location::Memory(Address {
            segment: self.data_segment(Segment::Ds),
            offset: self.regs.si,
        });
        let dst = Location::Memory(Address {
            segment: self.regs.es,
            offset: self.regs.di,
        });

        match kind {
            MOVS => {
                let value = self.read_loc(width, src);
                self.write_loc(width, dst, value);
                self.regs.si = self.regs.si.wrapping_add(delta);
                self.regs.di = self.regs.di.wrapping_add(delta);
            }
            CMPS => {
                let a = self.read_loc(width, src);
                let b = self.read_loc(width, dst);
                self.regs.flags.sub(width, a, b, false);
                self.regs.si = self.regs.si.wrapping_add(delta);
                self.regs.di = self.regs.di.wrapping_add(delta);
            }
            STOS => {
                let value = self.reg(width, 0);
                self.write_loc(width, dst, value);
                self.regs.di = self.regs.di.wrapping_add(delta);
            }
            LODS => {
                let value = self.read_loc(width, src);
                self.set_reg(width, 0, value);
                self.regs.si = self.regs.si.wrapping_add(delta);
            }
            _ => {
                let acc = self.reg(width, 0);
                let value = self.read_loc(width, dst);
                self.regs.flags.sub(width, acc, value, false);
                self.regs.di = self.regs.di.wrapping_add(delta);
            }
        }
    }

    /// MOV reg, imm (B0-B7 byte registers, B8-BF word registers)
    fn op_mov_reg_imm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = if opcode < 0xB8 { Width::Byte } else { Width::Word };
        let imm = self.fetch_imm(width);
        self.set_reg(width, opcode & 0x07, imm);
        Ok(4)
    }

    // ----- C0-CF -----

    /// RET near, optionally releasing imm16 bytes of arguments (C2)
    fn op_ret_near(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let release = if opcode == 0xC2 { self.fetch_u16() } else { 0 };
        self.regs.ip = self.pop();
        self.regs.sp = self.regs.sp.wrapping_add(release);
        Ok(if opcode == 0xC2 { 12 } else { 8 })
    }

    fn op_ret_far(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let release = if opcode == 0xCA { self.fetch_u16() } else { 0 };
        self.regs.ip = self.pop();
        self.regs.cs = self.pop();
        self.regs.sp = self.regs.sp.wrapping_add(release);
        Ok(if opcode == 0xCA { 17 } else { 18 })
    }

    /// LES (C4) and LDS (C5)
    fn op_load_far_pointer(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        let Location::Memory(addr) = self.locate(&modrm) else {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        };
        let offset = self.read_u16(addr.segment, addr.offset);
        let segment = self.read_u16(addr.segment, addr.offset.wrapping_add(2));
        self.regs.set_reg16(modrm.reg, offset);
        if opcode == 0xC4 {
            self.regs.es = segment;
        } else {
            self.regs.ds = segment;
        }
        Ok(16 + modrm.ea_cycles())
    }

    fn op_mov_rm_imm(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        if modrm.reg != 0 {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        }
        let imm = self.fetch_imm(width);
        let loc = self.locate(&modrm);
        self.write_loc(width, loc, imm);
        Ok(Self::timing(&modrm, 4, 10))
    }

    // ----- D0-DF -----

    /// Group 2: rotates and shifts by 1 (D0/D1) or by CL (D2/D3)
    fn op_group2(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let by_cl = opcode & 0x02 != 0;
        let count = if by_cl { self.regs.cl() } else { 1 };

        let loc = self.locate(&modrm);
        let value = self.read_loc(width, loc);
        let result = self.shift(modrm.reg, width, value, count);
        self.write_loc(width, loc, result);

        Ok(if by_cl {
            Self::timing(&modrm, 8, 20) + 4 * count as u32
        } else {
            Self::timing(&modrm, 2, 15)
        })
    }

    /// Rotate or shift `value` by `count` bits; a count of zero changes nothing
    fn shift(&mut self, op: u8, width: Width, value: u16, count: u8) -> u16 {
        if count == 0 {
            return value;
        }
        let mask = width.mask();
        let sign = width.sign_bit();
        let mut result = value & mask;
        let flags = &mut self.regs.flags;

        for _ in 0..count {
            match op {
                // ROL
                0 => {
                    let out = result & sign != 0;
                    result = ((result << 1) | out as u16) & mask;
                    flags.set_carry(out);
                }
                // ROR
                1 => {
                    let out = result & 1 != 0;
                    result = (result >> 1) | if out { sign } else { 0 };
                    flags.set_carry(out);
                }
                // RCL
                2 => {
                    let out = result & sign != 0;
                    result = ((result << 1) | flags.carry() as u16) & mask;
                    flags.set_carry(out);
                }
                // RCR
                3 => {
                    let out = result & 1 != 0;
                    result = (result >> 1) | if flags.carry() { sign } else { 0 };
                    flags.set_carry(out);
                }
                // SHL, SAL
                4 | 6 => {
                    flags.set_carry(result & sign != 0);
                    result = (result << 1) & mask;
                }
                // SHR
                5 => {
                    flags.set_carry(result & 1 != 0);
                    result >>= 1;
                }
                // SAR
                _ => {
                    flags.set_carry(result & 1 != 0);
                    result = (result >> 1) | (result & sign);
                }
            }
        }

        let msb = result & sign != 0;
        match op {
            0 | 2 | 4 | 6 => flags.set_overflow(msb != flags.carry()),
            1 | 3 => flags.set_overflow(msb != (result & (sign >> 1) != 0)),
            5 => flags.set_overflow(value & sign != 0),
            _ => flags.set_overflow(false),
        }
        if op >= 4 {
            flags.update_szp(width, result);
        }
        result
    }

    fn op_xlat(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let segment = self.data_segment(Segment::Ds);
        let offset = self.regs.bx().wrapping_add(self.regs.al() as u16);
        let value = self.read_u8(segment, offset);
        self.regs.set_al(value);
        Ok(11)
    }

    // ----- E0-EF -----

    /// LOOPNZ (E0), LOOPZ (E1), LOOP (E2) and JCXZ (E3)
    fn op_loop(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let disp = self.fetch_u8() as i8 as i16 as u16;
        let (taken, taken_cycles, fallthrough_cycles) = if opcode == 0xE3 {
            (self.regs.cx() == 0, 18, 6)
        } else {
            let cx = self.regs.cx().wrapping_sub(1);
            self.regs.set_cx(cx);
            let zero = self.regs.flags.zero();
            match opcode {
                0xE0 => (cx != 0 && !zero, 19, 5),
                0xE1 => (cx != 0 && zero, 18, 6),
                _ => (cx != 0, 17, 5),
            }
        };
        if taken {
            self.jump_relative(disp);
            Ok(taken_cycles)
        } else {
            Ok(fallthrough_cycles)
        }
    }

    /// IN/OUT with an immediate port (E4-E7) or the port in DX (EC-EF)
    ///
    /// Word transfers use `port` for the low byte and `port + 1` for the high byte.
    fn op_in_out(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let (port, cycles) = if opcode & 0x08 == 0 {
            (self.fetch_u8() as u16, 10)
        } else {
            (self.regs.dx(), 8)
        };

        if opcode & 0x02 == 0 {
            let low = self.bus.port_in(port)?;
            match width {
                Width::Byte => self.regs.set_al(low),
                Width::Word => {
                    let high = self.bus.port_in(port.wrapping_add(1))?;
                    self.regs.set_ax(((high as u16) << 8) | low as u16);
                }
            }
        } else {
            self.bus.port_out(port, self.regs.al())?;
            if width == Width::Word {
                self.bus.port_out(port.wrapping_add(1), self.regs.ah())?;
            }
        }
        Ok(cycles)
    }

    fn op_call_near(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let disp = self.fetch_u16();
        self.push(self.regs.ip);
        self.jump_relative(disp);
        Ok(19)
    }

    fn op_jmp_near(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let disp = self.fetch_u16();
        self.jump_relative(disp);
        Ok(15)
    }

    fn op_jmp_far(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let offset = self.fetch_u16();
        let segment = self.fetch_u16();
        self.regs.cs = segment;
        self.regs.ip = offset;
        Ok(15)
    }

    fn op_jmp_short(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        let disp = self.fetch_u8() as i8 as i16 as u16;
        self.jump_relative(disp);
        Ok(15)
    }

    // ----- F0-FF -----

    fn op_hlt(&mut self, _opcode: u8) -> Result<u32, CpuError> {
        log(LogCategory::CPU, LogLevel::Debug, || {
            format!("8086: HLT at {:04X}:{:04X}", self.regs.cs, self.regs.ip)
        });
        self.set_halted(true);
        Ok(2)
    }

    /// CMC, CLC, STC, CLI, STI, CLD, STD
    fn op_flag(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let flags = &mut self.regs.flags;
        match opcode {
            0xF5 => {
                let carry = flags.carry();
                flags.set_carry(!carry);
            }
            0xF8 => flags.set_carry(false),
            0xF9 => flags.set_carry(true),
            0xFA => flags.set_interrupt_enable(false),
            0xFB => flags.set_interrupt_enable(true),
            0xFC => flags.set_direction(false),
            _ => flags.set_direction(true),
        }
        Ok(2)
    }

    /// Group 3: TEST imm, NOT, NEG, MUL, IMUL, DIV, IDIV
    fn op_group3(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let width = Width::from_opcode(opcode);
        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);
        let word = width == Width::Word;

        match modrm.reg {
            // TEST r/m, imm (/1 is an undocumented alias)
            0 | 1 => {
                let imm = self.fetch_imm(width);
                let value = self.read_loc(width, loc) & imm;
                self.regs.flags.logic(width, value);
                Ok(Self::timing(&modrm, 5, 11))
            }
            2 => {
                let value = self.read_loc(width, loc);
                self.write_loc(width, loc, !value & width.mask());
                Ok(Self::timing(&modrm, 3, 16))
            }
            3 => {
                let value = self.read_loc(width, loc);
                let result = self.regs.flags.sub(width, 0, value, false);
                self.write_loc(width, loc, result);
                Ok(Self::timing(&modrm, 3, 16))
            }
            4 => {
                let src = self.read_loc(width, loc);
                let high = if word {
                    let product = self.regs.ax() as u32 * src as u32;
                    self.regs.set_ax(product as u16);
                    self.regs.set_dx((product >> 16) as u16);
                    (product >> 16) as u16
                } else {
                    let product = self.regs.al() as u16 * src;
                    self.regs.set_ax(product);
                    product >> 8
                };
                self.regs.flags.set_carry(high != 0);
                self.regs.flags.set_overflow(high != 0);
                Ok(if word {
                    Self::timing(&modrm, 118, 124)
                } else {
                    Self::timing(&modrm, 70, 76)
                })
            }
            5 => {
                let src = self.read_loc(width, loc);
                let extended = if word {
                    let product = self.regs.ax() as i16 as i32 * src as i16 as i32;
                    self.regs.set_ax(product as u16);
                    self.regs.set_dx((product >> 16) as u16);
                    product != product as i16 as i32
                } else {
                    let product = self.regs.al() as i8 as i16 * src as u8 as i8 as i16;
                    self.regs.set_ax(product as u16);
                    product != product as i8 as i16
                };
                self.regs.flags.set_carry(extended);
                self.regs.flags.set_overflow(extended);
                Ok(if word {
                    Self::timing(&modrm, 128, 134)
                } else {
                    Self::timing(&modrm, 80, 86)
                })
            }
            6 => {
                let divisor = self.read_loc(width, loc);
                let cycles = if word {
                    Self::timing(&modrm, 144, 150)
                } else {
                    Self::timing(&modrm, 80, 86)
                };
                if !self.divide_unsigned(width, divisor) {
                    return self.divide_error(cycles);
                }
                Ok(cycles)
            }
            _ => {
                let divisor = self.read_loc(width, loc);
                let cycles = if word {
                    Self::timing(&modrm, 165, 171)
                } else {
                    Self::timing(&modrm, 101, 107)
                };
                if !self.divide_signed(width, divisor) {
                    return self.divide_error(cycles);
                }
                Ok(cycles)
            }
        }
    }

    /// DIV; returns false on divide-by-zero or quotient overflow
    fn divide_unsigned(&mut self, width: Width, divisor: u16) -> bool {
        if divisor == 0 {
            return false;
        }
        match width {
            Width::Byte => {
                let dividend = self.regs.ax();
                let quotient = dividend / divisor;
                if quotient > 0xFF {
                    return false;
                }
                self.regs.set_al(quotient as u8);
                self.regs.set_ah((dividend % divisor) as u8);
            }
            Width::Word => {
                let dividend = ((self.regs.dx() as u32) << 16) | self.regs.ax() as u32;
                let quotient = dividend / divisor as u32;
                if quotient > 0xFFFF {
                    return false;
                }
                self.regs.set_ax(quotient as u16);
                self.regs.set_dx((dividend % divisor as u32) as u16);
            }
        }
        true
    }

    /// IDIV; returns false on divide-by-zero or quotient overflow
    fn divide_signed(&mut self, width: Width, divisor: u16) -> bool {
        if divisor == 0 {
            return false;
        }
        match width {
            Width::Byte => {
                let dividend = self.regs.ax() as i16 as i32;
                let divisor = divisor as u8 as i8 as i32;
                let quotient = dividend / divisor;
                if !(-127..=127).contains(&quotient) {
                    return false;
                }
                self.regs.set_al(quotient as u8);
                self.regs.set_ah((dividend % divisor) as u8);
            }
            Width::Word => {
                let dividend = (((self.regs.dx() as u32) << 16) | self.regs.ax() as u32) as i32 as i64;
                let divisor = divisor as i16 as i64;
                let quotient = dividend / divisor;
                if !(-32767..=32767).contains(&quotient) {
                    return false;
                }
                self.regs.set_ax(quotient as u16);
                self.regs.set_dx((dividend % divisor) as u16);
            }
        }
        true
    }

    /// Raise INT 0; the pushed IP addresses the instruction after the divide
    fn divide_error(&mut self, cycles: u32) -> Result<u32, CpuError> {
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!("8086: divide error at {:04X}:{:04X}", self.regs.cs, self.regs.ip)
        });
        self.interrupt(0)?;
        Ok(cycles + 51)
    }

    /// Group 4: INC/DEC r/m8
    fn op_group4(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        if modrm.reg > 1 {
            return Err(self.unrecognized_extension(opcode, modrm.reg));
        }
        let loc = self.locate(&modrm);
        let value = self.read_loc(Width::Byte, loc);
        let result = if modrm.reg == 0 {
            self.regs.flags.inc(Width::Byte, value)
        } else {
            self.regs.flags.dec(Width::Byte, value)
        };
        self.write_loc(Width::Byte, loc, result);
        Ok(Self::timing(&modrm, 3, 15))
    }

    /// Group 5: INC, DEC, CALL, CALL far, JMP, JMP far, PUSH on r/m16
    fn op_group5(&mut self, opcode: u8) -> Result<u32, CpuError> {
        let modrm = self.fetch_modrm();
        let loc = self.locate(&modrm);

        match modrm.reg {
            0 | 1 => {
                let value = self.read_loc(Width::Word, loc);
                let result = if modrm.reg == 0 {
                    self.regs.flags.inc(Width::Word, value)
                } else {
                    self.regs.flags.dec(Width::Word, value)
                };
                self.write_loc(Width::Word, loc, result);
                Ok(Self::timing(&modrm, 3, 15))
            }
            2 => {
                let target = self.read_loc(Width::Word, loc);
                self.push(self.regs.ip);
                self.regs.ip = target;
                Ok(Self::timing(&modrm, 16, 21))
            }
            3 | 5 => {
                let Location::Memory(addr) = loc else {
                    return Err(self.unrecognized_extension(opcode, modrm.reg));
                };
                let offset = self.read_u16(addr.segment, addr.offset);
                let segment = self.read_u16(addr.segment, addr.offset.wrapping_add(2));
                if modrm.reg == 3 {
                    self.push(self.regs.cs);
                    self.push(self.regs.ip);
                }
                self.regs.cs = segment;
                self.regs.ip = offset;
                Ok((if modrm.reg == 3 { 37 } else { 24 }) + modrm.ea_cycles())
            }
            4 => {
                self.regs.ip = self.read_loc(Width::Word, loc);
                Ok(Self::timing(&modrm, 11, 18))
            }
            6 => {
                let value = self.read_loc(Width::Word, loc);
                self.push(value);
                Ok(Self::timing(&modrm, 11, 16))
            }
            ext => Err(self.unrecognized_extension(opcode, ext)),
        }
    }
}
