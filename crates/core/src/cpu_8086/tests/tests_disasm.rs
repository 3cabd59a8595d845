//! Disassembler agreement with the execution engine

use super::cpu_with_program;
use crate::cpu_8086::{disassemble, ArrayBus, Cpu8086, Cursor};

const PREFIXES: [u8; 6] = [0x26, 0x2E, 0x36, 0x3E, 0xF2, 0xF3];

/// Opcodes whose next IP comes from memory or the vector table
const NON_SEQUENTIAL: [u8; 9] = [0x9A, 0xC2, 0xC3, 0xCA, 0xCB, 0xCC, 0xCD, 0xCF, 0xEA];

/// ModR/M bytes covering register, no displacement, disp8, disp16 and direct forms.
/// All use reg=0 so group opcodes select a defined operation.
const MODRM_FORMS: [u8; 5] = [0xC0, 0x00, 0x46, 0x86, 0x06];

fn disassembled_length(program: &[u8]) -> (String, u16) {
    let mut bus = ArrayBus::new();
    bus.load(0xF0100, program);
    let mut cursor = Cursor::new(0xF000, 0x0100);
    let dis = disassemble(&bus, &mut cursor);
    assert_eq!(cursor.offset, 0x0100 + dis.length);
    (dis.text, dis.length)
}

#[test]
fn test_lengths_match_execution_for_every_opcode() {
    for opcode in Cpu8086::<ArrayBus>::implemented_opcodes() {
        if NON_SEQUENTIAL.contains(&opcode) {
            continue;
        }
        for modrm in MODRM_FORMS {
            // Trailing zero bytes keep relative branches sequential when the
            // second byte is their displacement
            let program = [opcode, modrm, 0x00, 0x00, 0x00, 0x00];
            let mut cpu = cpu_with_program(&program);
            cpu.regs.sp = 0x8000;

            if cpu.run_instruction().is_err() {
                // Register-form LEA/LES/LDS: disassembler must reject it too
                let (text, length) = disassembled_length(&program);
                assert!(text.starts_with("db "), "{:02X} {:02X}: {}", opcode, modrm, text);
                assert_eq!(length, 1);
                continue;
            }

            // Relative branches with a non-zero displacement are not sequential
            let branched = cpu.regs.cs != 0xF000 || {
                let is_relative = matches!(opcode, 0x70..=0x7F | 0xE0..=0xE3 | 0xE8 | 0xE9 | 0xEB);
                is_relative && modrm != 0x00
            };
            if branched {
                continue;
            }

            let executed = cpu.regs.ip.wrapping_sub(0x0100);
            let (text, length) = disassembled_length(&program);
            assert_eq!(
                length, executed,
                "opcode {:02X} modrm {:02X} ({}) disassembled to {} bytes, executed {}",
                opcode, modrm, text, length, executed
            );
        }
    }
}

#[test]
fn test_prefixed_lengths_match_execution() {
    let programs: [&[u8]; 6] = [
        &[0x2E, 0x8B, 0x07],
        &[0x26, 0xA1, 0x00, 0x02],
        &[0xF3, 0xA4],
        &[0x36, 0xF3, 0xAB],
        &[0x3E, 0x80, 0x46, 0x02, 0x05],
        &[0xF2, 0x2E, 0xC7, 0x06, 0x00, 0x01, 0x34, 0x12],
    ];

    for program in programs {
        let mut cpu = cpu_with_program(program);
        cpu.run_instruction().unwrap();
        let (text, length) = disassembled_length(program);
        assert_eq!(length, cpu.regs.ip - 0x0100, "{}", text);
        assert_eq!(length as usize, program.len(), "{}", text);
    }
}

#[test]
fn test_disassembler_covers_exactly_the_dispatch_table() {
    let implemented = Cpu8086::<ArrayBus>::implemented_opcodes();
    for opcode in 0..=255u8 {
        if PREFIXES.contains(&opcode) {
            continue;
        }
        let (text, _) = disassembled_length(&[opcode, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            implemented.contains(&opcode),
            !text.starts_with("db "),
            "opcode {:02X} rendered as {}",
            opcode,
            text
        );
    }
}

#[test]
fn test_disassemble_current_leaves_cpu_untouched() {
    let cpu = cpu_with_program(&[0xCD, 0x13]);
    let before = cpu.regs.clone();

    let dis = cpu.disassemble_current();

    assert_eq!(dis.text, "int 0x13");
    assert_eq!(dis.length, 2);
    assert_eq!(cpu.regs, before);
}

#[test]
fn test_sequential_listing() {
    let program = [
        0xB8, 0x34, 0x12, // mov ax, 0x1234
        0x8E, 0xD8, // mov ds, ax
        0xC6, 0x06, 0x00, 0x02, 0x41, // mov byte [0x0200], 0x41
        0x74, 0x03, // jz
        0xE8, 0xFD, 0xFF, // call
        0xF4, // hlt
    ];
    let mut bus = ArrayBus::new();
    bus.load(0xF0100, &program);
    let mut cursor = Cursor::new(0xF000, 0x0100);

    let listing: Vec<String> = (0..6).map(|_| disassemble(&bus, &mut cursor).text).collect();

    assert_eq!(
        listing,
        vec![
            "mov ax, 0x1234",
            "mov ds, ax",
            "mov byte [0x0200], 0x41",
            "jz 0x010f",
            "call 0x010c",
            "hlt",
        ]
    );
    assert_eq!(cursor.offset, 0x0100 + program.len() as u16);
}
