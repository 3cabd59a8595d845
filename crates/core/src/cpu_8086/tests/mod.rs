//! Instruction-level tests for the 8086 core, grouped by area

mod tests_disasm;
mod tests_jumps;

use super::{ArrayBus, Cpu8086, CpuError, NullBus};

/// Physical address of F000:0100, where test programs are loaded
const PROGRAM_BASE: u32 = 0xF0100;

/// CPU over a fresh [`ArrayBus`] with `program` at F000:0100 and CS:IP pointing at it
fn cpu_with_program(program: &[u8]) -> Cpu8086<ArrayBus> {
    let mut bus = ArrayBus::new();
    bus.load(PROGRAM_BASE, program);
    let mut cpu = Cpu8086::new(bus);
    cpu.init(0xF000, 0x0100);
    cpu
}

/// Run `n` instructions, panicking on the first error
fn run(cpu: &mut Cpu8086<ArrayBus>, n: usize) -> u32 {
    let mut total = 0;
    for _ in 0..n {
        total += cpu.run_instruction().expect("instruction failed");
    }
    total
}

#[test]
fn test_mov_ax_imm_end_to_end() {
    let mut cpu = cpu_with_program(&[0xB8, 0x34, 0x12]);

    let cycles = cpu.run_instruction().unwrap();

    assert_eq!(cycles, 4);
    assert_eq!(cpu.regs.ax(), 0x1234);
    assert_eq!(cpu.regs.ip, 0x0103);
    assert_eq!(cpu.cycles(), 4);
}

#[test]
fn test_init_zeroes_registers() {
    let mut cpu = cpu_with_program(&[]);
    cpu.regs.set_ax(0xFFFF);
    cpu.regs.sp = 0x1234;
    cpu.regs.flags.set_carry(true);

    cpu.init(0x1000, 0x0020);

    assert_eq!(cpu.regs, super::Registers::with_entry(0x1000, 0x0020));
    assert_eq!(cpu.regs.flags.bits(), 0x0002);
    assert_eq!(cpu.cycles(), 0);
}

#[test]
fn test_new_uses_reset_vector() {
    let cpu = Cpu8086::new(NullBus);
    assert_eq!(cpu.regs.cs, 0xF000);
    assert_eq!(cpu.regs.ip, 0xFFF0);
}

#[test]
fn test_headless_cpu_executes_zero_bytes() {
    // With nothing attached memory reads as 00: ADD [BX+SI], AL
    let mut cpu = Cpu8086::headless();
    cpu.init(0x0000, 0x0000);
    assert_eq!(cpu.run_instruction(), Ok(16 + 7));
    assert_eq!(cpu.regs.ip, 0x0002);
}

#[test]
fn test_unknown_opcode_is_an_error() {
    // DAA is not implemented
    let mut cpu = cpu_with_program(&[0x27]);
    assert_eq!(
        cpu.run_instruction(),
        Err(CpuError::UnrecognizedOpcode {
            opcode: 0x27,
            cs: 0xF000,
            ip: 0x0100
        })
    );
    assert_eq!(cpu.cycles(), 0);
}

#[test]
fn test_unknown_opcode_reports_prefix_start() {
    let mut cpu = cpu_with_program(&[0x2E, 0xF3, 0x27]);
    let err = cpu.run_instruction().unwrap_err();
    assert_eq!(
        err,
        CpuError::UnrecognizedOpcode {
            opcode: 0x27,
            cs: 0xF000,
            ip: 0x0100
        }
    );
}

#[test]
fn test_undefined_group_extension_is_an_error() {
    // FE /7
    let mut cpu = cpu_with_program(&[0xFE, 0xF8]);
    assert_eq!(
        cpu.run_instruction(),
        Err(CpuError::UnrecognizedExtension {
            opcode: 0xFE,
            extension: 7,
            cs: 0xF000,
            ip: 0x0100
        })
    );

    // LEA with a register operand
    let mut cpu = cpu_with_program(&[0x8D, 0xC0]);
    assert!(matches!(
        cpu.run_instruction(),
        Err(CpuError::UnrecognizedExtension { opcode: 0x8D, .. })
    ));
}

#[test]
fn test_hlt_stops_fetching() {
    let mut cpu = cpu_with_program(&[0xF4, 0x40]);

    assert_eq!(cpu.run_instruction(), Ok(2));
    assert!(cpu.is_halted());
    assert_eq!(cpu.regs.ip, 0x0101);

    assert_eq!(cpu.run_instruction(), Ok(1));
    assert_eq!(cpu.regs.ip, 0x0101);
    assert_eq!(cpu.regs.ax(), 0);
    assert_eq!(cpu.cycles(), 3);
}

#[test]
fn test_shutdown_returns_bus() {
    let mut cpu = cpu_with_program(&[0xA2, 0x00, 0x05]); // mov [0x0500], al
    cpu.regs.set_al(0x5A);
    run(&mut cpu, 1);

    let bus = cpu.shutdown();
    assert_eq!(bus.read_u16(0x0500) & 0xFF, 0x5A);
}

/// CPU at F000:0100 whose entire code segment is `byte`
fn cpu_in_filled_segment(byte: u8) -> Cpu8086<ArrayBus> {
    let mut bus = ArrayBus::new();
    bus.load(0xF0000, &vec![byte; 0x10000]);
    let mut cpu = Cpu8086::new(bus);
    cpu.init(0xF000, 0x0100);
    cpu
}

#[test]
fn test_segment_of_prefixes_is_an_error() {
    for prefix in [0x26, 0x2E, 0x36, 0x3E, 0xF2, 0xF3] {
        let mut cpu = cpu_in_filled_segment(prefix);

        assert_eq!(
            cpu.run_instruction(),
            Err(CpuError::PrefixOverrun {
                cs: 0xF000,
                ip: 0x0100
            }),
            "prefix {:02X}",
            prefix
        );
        assert_eq!(cpu.regs.ip, 0x0100, "IP wrapped once around the segment");
        assert_eq!(cpu.cycles(), 0);
    }
}

#[test]
fn test_prefix_state_cleared_after_overrun() {
    let mut cpu = cpu_in_filled_segment(0x26);
    assert!(cpu.run_instruction().is_err());

    // mov al, [0x0000] must read DS:0000 again, not ES:0000
    cpu.bus.load(0xF0100, &[0xA0, 0x00, 0x00]);
    cpu.regs.ds = 0x1000;
    cpu.bus.load(0x10000, &[0x11]);
    cpu.bus.load(0x00000, &[0x22]);

    cpu.run_instruction().unwrap();
    assert_eq!(cpu.regs.al(), 0x11);
}

#[test]
fn test_segment_of_prefixes_disassembles_as_data() {
    let cpu = cpu_in_filled_segment(0xF3);

    let d = cpu.disassemble_current();
    assert_eq!(d.text, "db 0xf3");
    assert_eq!(d.length, 1);
    assert!(cpu
        .debug_string(true)
        .ends_with("Current instruction: db 0xf3"));
}

#[test]
fn test_debug_string_includes_disassembly() {
    let mut cpu = cpu_with_program(&[0xB8, 0x34, 0x12]);
    cpu.regs.set_bx(0xBEEF);

    let text = cpu.debug_string(true);
    assert!(text.contains("BX: BEEF"));
    assert!(text.contains("IP: 0100"));
    assert!(text.ends_with("Current instruction: mov ax, 0x1234"));

    assert!(!cpu.debug_string(false).contains("Current instruction"));
    // Rendering must not move the CPU
    assert_eq!(cpu.regs.ip, 0x0100);
}

#[test]
fn test_implemented_opcodes_exclude_prefixes() {
    let ops = Cpu8086::<ArrayBus>::implemented_opcodes();
    for prefix in [0x26, 0x2E, 0x36, 0x3E, 0xF2, 0xF3] {
        assert!(!ops.contains(&prefix), "prefix {:02X} in dispatch table", prefix);
    }
    assert!(ops.contains(&0xB8));
    assert!(ops.contains(&0xCD));
    assert!(!ops.contains(&0x27));
}
