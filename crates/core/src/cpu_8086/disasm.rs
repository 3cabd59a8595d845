//! Read-only 8086 disassembler
//!
//! Decodes the same prefix/opcode/ModR/M grammar as the execution engine but
//! only produces text. All position state lives in the caller's [`Cursor`].

use super::bus::Bus8086;
use super::flags::Width;
use super::modrm::{Base, ByteSource, ModRm, Operand};
use super::registers::Segment;

const REG8: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];
const REG16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
const SREG: [&str; 4] = ["es", "cs", "ss", "ds"];
const ALU: [&str; 8] = ["add", "or", "adc", "sbb", "and", "sub", "xor", "cmp"];
const SHIFTS: [&str; 8] = ["rol", "ror", "rcl", "rcr", "shl", "shr", "sal", "sar"];
const GROUP3: [&str; 8] = ["test", "test", "not", "neg", "mul", "imul", "div", "idiv"];
const JCC: [&str; 16] = [
    "jo", "jno", "jb", "jnb", "jz", "jnz", "jbe", "ja", "js", "jns", "jp", "jnp", "jl", "jnl",
    "jle", "jg",
];

/// Position in memory to disassemble from; advanced past each decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub segment: u16,
    pub offset: u16,
}

impl Cursor {
    pub fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub text: String,
    /// Bytes consumed, prefixes included
    pub length: u16,
}

/// Disassemble the instruction at `cursor` and advance it past the instruction
pub fn disassemble<B: Bus8086>(bus: &B, cursor: &mut Cursor) -> Disassembly {
    let mut dec = Decoder {
        bus,
        segment: cursor.segment,
        offset: cursor.offset,
        length: 0,
        segment_override: None,
        override_used: false,
    };

    let first = dec.next_byte();
    let mut opcode = first;
    let mut repeat: Option<u8> = None;
    loop {
        match opcode {
            0x26 | 0x2E | 0x36 | 0x3E => {
                dec.segment_override = Some(Segment::from_index(opcode >> 3));
            }
            0xF2 | 0xF3 => repeat = Some(opcode),
            _ => break,
        }
        if dec.offset == cursor.offset {
            // Nothing but prefixes in the whole segment
            return undecodable(cursor, first);
        }
        opcode = dec.next_byte();
    }

    let Some(body) = dec.instruction(opcode) else {
        return undecodable(cursor, first);
    };

    let mut text = String::new();
    if let Some(seg) = dec.segment_override {
        if !dec.override_used {
            text.push_str(seg.name());
            text.push_str(": ");
        }
    }
    if let Some(prefix) = repeat {
        let compares = matches!(opcode, 0xA6 | 0xA7 | 0xAE | 0xAF);
        text.push_str(match (prefix, compares) {
            (0xF2, _) => "repne ",
            (_, true) => "repe ",
            _ => "rep ",
        });
    }
    text.push_str(&body);

    cursor.offset = dec.offset;
    Disassembly {
        text,
        length: dec.length,
    }
}

/// Render a byte outside the grammar as data and step over it
fn undecodable(cursor: &mut Cursor, byte: u8) -> Disassembly {
    cursor.offset = cursor.offset.wrapping_add(1);
    Disassembly {
        text: format!("db 0x{:02x}", byte),
        length: 1,
    }
}

struct Decoder<'a, B: Bus8086> {
    bus: &'a B,
    segment: u16,
    offset: u16,
    length: u16,
    segment_override: Option<Segment>,
    override_used: bool,
}

impl<B: Bus8086> ByteSource for Decoder<'_, B> {
    fn next_byte(&mut self) -> u8 {
        let byte = self
            .bus
            .read_byte(self.bus.convert_seg(self.segment, self.offset));
        self.offset = self.offset.wrapping_add(1);
        self.length = self.length.wrapping_add(1);
        byte
    }
}

impl<B: Bus8086> Decoder<'_, B> {
    fn modrm(&mut self) -> ModRm {
        let byte = self.next_byte();
        ModRm::decode(byte, self)
    }

    fn reg(width: Width, index: u8) -> &'static str {
        match width {
            Width::Byte => REG8[index as usize & 7],
            Width::Word => REG16[index as usize & 7],
        }
    }

    /// `[...]` with any segment override folded in
    fn memory(&mut self, inner: String) -> String {
        match self.segment_override {
            Some(seg) => {
                self.override_used = true;
                format!("{}:[{}]", seg.name(), inner)
            }
            None => format!("[{}]", inner),
        }
    }

    /// Text for an r/m operand; `sized` adds a byte/word keyword to memory forms
    fn rm(&mut self, modrm: &ModRm, width: Width, sized: bool) -> String {
        match modrm.operand {
            Operand::Register(r) => Self::reg(width, r).to_string(),
            Operand::Memory { base, disp, has_disp } => {
                let inner = match base {
                    Base::Direct => format!("0x{:04x}", disp),
                    _ if !has_disp => base.name().to_string(),
                    _ => {
                        let signed = disp as i16;
                        if signed < 0 {
                            format!("{}-0x{:x}", base.name(), -(signed as i32))
                        } else {
                            format!("{}+0x{:x}", base.name(), signed)
                        }
                    }
                };
                let mem = self.memory(inner);
                if sized {
                    let keyword = match width {
                        Width::Byte => "byte",
                        Width::Word => "word",
                    };
                    format!("{} {}", keyword, mem)
                } else {
                    mem
                }
            }
        }
    }

    fn imm(&mut self, width: Width) -> String {
        match width {
            Width::Byte => format!("0x{:02x}", self.next_byte()),
            Width::Word => format!("0x{:04x}", self.next_word()),
        }
    }

    fn rel8(&mut self) -> String {
        let disp = self.next_byte() as i8 as i16 as u16;
        format!("0x{:04x}", self.offset.wrapping_add(disp))
    }

    fn rel16(&mut self) -> String {
        let disp = self.next_word();
        format!("0x{:04x}", self.offset.wrapping_add(disp))
    }

    fn far(&mut self) -> String {
        let offset = self.next_word();
        let segment = self.next_word();
        format!("0x{:04x}:0x{:04x}", segment, offset)
    }

    /// Decode one instruction body; `None` when the bytes are outside the grammar
    fn instruction(&mut self, opcode: u8) -> Option<String> {
        let width = Width::from_opcode(opcode);
        let text = match opcode {
            0x00..=0x3F if opcode & 0x07 < 6 => {
                let op = ALU[(opcode >> 3) as usize & 7];
                if opcode & 0x04 != 0 {
                    let imm = self.imm(width);
                    format!("{} {}, {}", op, Self::reg(width, 0), imm)
                } else {
                    let m = self.modrm();
                    let rm = self.rm(&m, width, false);
                    let reg = Self::reg(width, m.reg);
                    if opcode & 0x02 != 0 {
                        format!("{} {}, {}", op, reg, rm)
                    } else {
                        format!("{} {}, {}", op, rm, reg)
                    }
                }
            }
            0x06 | 0x0E | 0x16 | 0x1E => format!("push {}", SREG[(opcode >> 3) as usize & 3]),
            0x07 | 0x0F | 0x17 | 0x1F => format!("pop {}", SREG[(opcode >> 3) as usize & 3]),
            0x40..=0x47 => format!("inc {}", REG16[opcode as usize & 7]),
            0x48..=0x4F => format!("dec {}", REG16[opcode as usize & 7]),
            0x50..=0x57 => format!("push {}", REG16[opcode as usize & 7]),
            0x58..=0x5F => format!("pop {}", REG16[opcode as usize & 7]),
            0x70..=0x7F => {
                let target = self.rel8();
                format!("{} {}", JCC[opcode as usize & 0x0F], target)
            }
            0x80..=0x83 => {
                let m = self.modrm();
                let rm = self.rm(&m, width, true);
                let imm = match opcode {
                    0x81 => self.imm(Width::Word),
                    0x83 => format!("0x{:04x}", self.next_byte() as i8 as i16 as u16),
                    _ => self.imm(Width::Byte),
                };
                format!("{} {}, {}", ALU[m.reg as usize], rm, imm)
            }
            0x84..=0x89 => {
                let m = self.modrm();
                let rm = self.rm(&m, width, false);
                let op = match opcode {
                    0x84 | 0x85 => "test",
                    0x86 | 0x87 => "xchg",
                    _ => "mov",
                };
                format!("{} {}, {}", op, rm, Self::reg(width, m.reg))
            }
            0x8A | 0x8B => {
                let m = self.modrm();
                let rm = self.rm(&m, width, false);
                format!("mov {}, {}", Self::reg(width, m.reg), rm)
            }
            0x8C | 0x8E => {
                let m = self.modrm();
                if m.reg > 3 {
                    return None;
                }
                let rm = self.rm(&m, Width::Word, false);
                let sreg = SREG[m.reg as usize];
                if opcode == 0x8C {
                    format!("mov {}, {}", rm, sreg)
                } else {
                    format!("mov {}, {}", sreg, rm)
                }
            }
            0x8D | 0xC4 | 0xC5 => {
                let m = self.modrm();
                if m.is_register() {
                    return None;
                }
                let rm = self.rm(&m, Width::Word, false);
                let op = match opcode {
                    0x8D => "lea",
                    0xC4 => "les",
                    _ => "lds",
                };
                format!("{} {}, {}", op, REG16[m.reg as usize], rm)
            }
            0x8F => {
                let m = self.modrm();
                if m.reg != 0 {
                    return None;
                }
                format!("pop {}", self.rm(&m, Width::Word, true))
            }
            0x90 => "nop".to_string(),
            0x91..=0x97 => format!("xchg ax, {}", REG16[opcode as usize & 7]),
            0x98 => "cbw".to_string(),
            0x99 => "cwd".to_string(),
            0x9A => format!("call {}", self.far()),
            0x9C => "pushf".to_string(),
            0x9D => "popf".to_string(),
            0x9E => "sahf".to_string(),
            0x9F => "lahf".to_string(),
            0xA0..=0xA3 => {
                let offset = self.next_word();
                let mem = self.memory(format!("0x{:04x}", offset));
                let acc = Self::reg(width, 0);
                if opcode & 0x02 == 0 {
                    format!("mov {}, {}", acc, mem)
                } else {
                    format!("mov {}, {}", mem, acc)
                }
            }
            0xA8 | 0xA9 => {
                let imm = self.imm(width);
                format!("test {}, {}", Self::reg(width, 0), imm)
            }
            0xA4..=0xAF => {
                let op = match opcode & 0xFE {
                    0xA4 => "movs",
                    0xA6 => "cmps",
                    0xAA => "stos",
                    0xAC => "lods",
                    _ => "scas",
                };
                let suffix = if width == Width::Byte { 'b' } else { 'w' };
                format!("{}{}", op, suffix)
            }
            0xB0..=0xB7 => {
                let imm = self.imm(Width::Byte);
                format!("mov {}, {}", REG8[opcode as usize & 7], imm)
            }
            0xB8..=0xBF => {
                let imm = self.imm(Width::Word);
                format!("mov {}, {}", REG16[opcode as usize & 7], imm)
            }
            0xC2 => format!("ret {}", self.imm(Width::Word)),
            0xC3 => "ret".to_string(),
            0xC6 | 0xC7 => {
                let m = self.modrm();
                if m.reg != 0 {
                    return None;
                }
                let rm = self.rm(&m, width, true);
                let imm = self.imm(width);
                format!("mov {}, {}", rm, imm)
            }
            0xCA => format!("retf {}", self.imm(Width::Word)),
            0xCB => "retf".to_string(),
            0xCC => "int3".to_string(),
            0xCD => format!("int {}", self.imm(Width::Byte)),
            0xCE => "into".to_string(),
            0xCF => "iret".to_string(),
            0xD0..=0xD3 => {
                let m = self.modrm();
                let rm = self.rm(&m, width, true);
                let count = if opcode & 0x02 != 0 { "cl" } else { "1" };
                format!("{} {}, {}", SHIFTS[m.reg as usize], rm, count)
            }
            0xD7 => "xlat".to_string(),
            0xE0..=0xE3 => {
                let op = ["loopnz", "loopz", "loop", "jcxz"][opcode as usize & 3];
                format!("{} {}", op, self.rel8())
            }
            0xE4..=0xE7 | 0xEC..=0xEF => {
                let port = if opcode & 0x08 == 0 {
                    self.imm(Width::Byte)
                } else {
                    "dx".to_string()
                };
                let acc = Self::reg(width, 0);
                if opcode & 0x02 == 0 {
                    format!("in {}, {}", acc, port)
                } else {
                    format!("out {}, {}", port, acc)
                }
            }
            0xE8 => format!("call {}", self.rel16()),
            0xE9 => format!("jmp {}", self.rel16()),
            0xEA => format!("jmp {}", self.far()),
            0xEB => format!("jmp {}", self.rel8()),
            0xF4 => "hlt".to_string(),
            0xF5 => "cmc".to_string(),
            0xF6 | 0xF7 => {
                let m = self.modrm();
                let rm = self.rm(&m, width, true);
                if m.reg < 2 {
                    let imm = self.imm(width);
                    format!("test {}, {}", rm, imm)
                } else {
                    format!("{} {}", GROUP3[m.reg as usize], rm)
                }
            }
            0xF8 => "clc".to_string(),
            0xF9 => "stc".to_string(),
            0xFA => "cli".to_string(),
            0xFB => "sti".to_string(),
            0xFC => "cld".to_string(),
            0xFD => "std".to_string(),
            0xFE => {
                let m = self.modrm();
                let op = match m.reg {
                    0 => "inc",
                    1 => "dec",
                    _ => return None,
                };
                format!("{} {}", op, self.rm(&m, Width::Byte, true))
            }
            0xFF => {
                let m = self.modrm();
                match m.reg {
                    0 | 1 | 6 => {
                        let op = ["inc", "dec", "", "", "", "", "push"][m.reg as usize];
                        format!("{} {}", op, self.rm(&m, Width::Word, true))
                    }
                    2 | 4 => {
                        let op = if m.reg == 2 { "call" } else { "jmp" };
                        format!("{} {}", op, self.rm(&m, Width::Word, false))
                    }
                    3 | 5 => {
                        if m.is_register() {
                            return None;
                        }
                        let op = if m.reg == 3 { "call far" } else { "jmp far" };
                        format!("{} {}", op, self.rm(&m, Width::Word, false))
                    }
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_8086::ArrayBus;

    fn dis(bytes: &[u8]) -> Disassembly {
        let mut bus = ArrayBus::new();
        bus.load(0xF0100, bytes);
        let mut cursor = Cursor::new(0xF000, 0x0100);
        disassemble(&bus, &mut cursor)
    }

    #[test]
    fn test_mov_immediate() {
        let d = dis(&[0xB8, 0x34, 0x12]);
        assert_eq!(d.text, "mov ax, 0x1234");
        assert_eq!(d.length, 3);
    }

    #[test]
    fn test_sized_memory_operand() {
        let d = dis(&[0x80, 0x40, 0x10, 0x05]);
        assert_eq!(d.text, "add byte [bx+si+0x10], 0x05");
        assert_eq!(d.length, 4);
    }

    #[test]
    fn test_relative_jump_shows_absolute_target() {
        let d = dis(&[0x74, 0x03]);
        assert_eq!(d.text, "jz 0x0105");
        let d = dis(&[0xEB, 0xFE]);
        assert_eq!(d.text, "jmp 0x0100");
    }

    #[test]
    fn test_far_jump() {
        let d = dis(&[0xEA, 0x00, 0x01, 0x00, 0xF0]);
        assert_eq!(d.text, "jmp 0xf000:0x0100");
        assert_eq!(d.length, 5);
    }

    #[test]
    fn test_segment_override_placement() {
        let d = dis(&[0x2E, 0x8B, 0x07]);
        assert_eq!(d.text, "mov ax, cs:[bx]");
        assert_eq!(d.length, 3);

        let d = dis(&[0x2E, 0xA4]);
        assert_eq!(d.text, "cs: movsb");
    }

    #[test]
    fn test_repeat_prefixes() {
        assert_eq!(dis(&[0xF3, 0xA5]).text, "rep movsw");
        assert_eq!(dis(&[0xF3, 0xA6]).text, "repe cmpsb");
        assert_eq!(dis(&[0xF2, 0xAE]).text, "repne scasb");
    }

    #[test]
    fn test_negative_displacement() {
        assert_eq!(dis(&[0x8B, 0x46, 0xFE]).text, "mov ax, [bp-0x2]");
    }

    #[test]
    fn test_unknown_byte() {
        let d = dis(&[0x0F]);
        assert_eq!(d.text, "pop cs");

        let d = dis(&[0x27]);
        assert_eq!(d.text, "db 0x27");
        assert_eq!(d.length, 1);

        let d = dis(&[0xFE, 0xD0]);
        assert_eq!(d.text, "db 0xfe");
        assert_eq!(d.length, 1);
    }

    #[test]
    fn test_cursor_advances() {
        let mut bus = ArrayBus::new();
        bus.load(0x0500, &[0x90, 0xCD, 0x13, 0xF4]);
        let mut cursor = Cursor::new(0x0000, 0x0500);

        assert_eq!(disassemble(&bus, &mut cursor).text, "nop");
        assert_eq!(disassemble(&bus, &mut cursor).text, "int 0x13");
        assert_eq!(disassemble(&bus, &mut cursor).text, "hlt");
        assert_eq!(cursor.offset, 0x0504);
    }
}
