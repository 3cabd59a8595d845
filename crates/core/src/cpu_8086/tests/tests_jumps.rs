//! Jumps, calls, returns and loops

use super::{cpu_with_program, run};
use crate::cpu_8086::{physical_address, FLAG_SF, FLAG_ZF};

#[test]
fn test_jmp_short_forward_and_back() {
    // jmp +2 ; (skipped) ; jmp -4
    let mut cpu = cpu_with_program(&[0xEB, 0x02, 0x90, 0x90, 0xEB, 0xFA]);

    assert_eq!(run(&mut cpu, 1), 15);
    assert_eq!(cpu.regs.ip, 0x0104);

    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0100);
}

#[test]
fn test_jcc_taken_and_not_taken() {
    // jz +0x10
    let mut cpu = cpu_with_program(&[0x74, 0x10]);
    assert_eq!(run(&mut cpu, 1), 4);
    assert_eq!(cpu.regs.ip, 0x0102);

    let mut cpu = cpu_with_program(&[0x74, 0x10]);
    cpu.regs.flags.set(FLAG_ZF, true);
    assert_eq!(run(&mut cpu, 1), 16);
    assert_eq!(cpu.regs.ip, 0x0112);
}

#[test]
fn test_signed_and_unsigned_conditions() {
    // cmp al, 0x01 ; jl +2 ; nop ; nop ; ja +2
    let mut cpu = cpu_with_program(&[0x3C, 0x01, 0x7C, 0x02, 0x90, 0x90, 0x77, 0x02]);
    cpu.regs.set_al(0xFF); // -1 signed, 255 unsigned

    run(&mut cpu, 2);
    assert_eq!(cpu.regs.ip, 0x0106, "-1 < 1 signed");

    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x010A, "255 > 1 unsigned");
}

#[test]
fn test_js_jns() {
    let mut cpu = cpu_with_program(&[0x78, 0x05]);
    cpu.regs.flags.set(FLAG_SF, true);
    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0107);

    let mut cpu = cpu_with_program(&[0x79, 0x05]);
    cpu.regs.flags.set(FLAG_SF, true);
    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0102);
}

#[test]
fn test_jmp_near_and_far() {
    // jmp near +0x0100 ; ... ; jmp 0x1234:0x5678
    let mut cpu = cpu_with_program(&[0xE9, 0x00, 0x01]);
    cpu.bus.load(0xF0203, &[0xEA, 0x78, 0x56, 0x34, 0x12]);

    assert_eq!(run(&mut cpu, 1), 15);
    assert_eq!(cpu.regs.ip, 0x0203);

    assert_eq!(run(&mut cpu, 1), 15);
    assert_eq!(cpu.regs.cs, 0x1234);
    assert_eq!(cpu.regs.ip, 0x5678);
}

#[test]
fn test_call_and_ret_near() {
    // call +0x0010 ; ... ; ret
    let mut cpu = cpu_with_program(&[0xE8, 0x10, 0x00]);
    cpu.bus.load(0xF0113, &[0xC3]);
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x0100;

    assert_eq!(run(&mut cpu, 1), 19);
    assert_eq!(cpu.regs.ip, 0x0113);
    assert_eq!(cpu.regs.sp, 0x00FE);
    assert_eq!(cpu.bus.read_u16(physical_address(0x2000, 0x00FE)), 0x0103);

    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0103);
    assert_eq!(cpu.regs.sp, 0x0100);
}

#[test]
fn test_ret_imm_releases_arguments() {
    let mut cpu = cpu_with_program(&[0xC2, 0x04, 0x00]);
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x00F0;
    cpu.bus.write_u16(physical_address(0x2000, 0x00F0), 0x0400);

    run(&mut cpu, 1);

    assert_eq!(cpu.regs.ip, 0x0400);
    assert_eq!(cpu.regs.sp, 0x00F6);
}

#[test]
fn test_call_far_and_retf() {
    // call 0x1000:0x0020 ; at target: retf
    let mut cpu = cpu_with_program(&[0x9A, 0x20, 0x00, 0x00, 0x10]);
    cpu.bus.load(physical_address(0x1000, 0x0020), &[0xCB]);
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x0100;

    assert_eq!(run(&mut cpu, 1), 28);
    assert_eq!((cpu.regs.cs, cpu.regs.ip), (0x1000, 0x0020));
    assert_eq!(cpu.bus.read_u16(physical_address(0x2000, 0x00FE)), 0xF000);
    assert_eq!(cpu.bus.read_u16(physical_address(0x2000, 0x00FC)), 0x0105);

    run(&mut cpu, 1);
    assert_eq!((cpu.regs.cs, cpu.regs.ip), (0xF000, 0x0105));
    assert_eq!(cpu.regs.sp, 0x0100);
}

#[test]
fn test_indirect_call_and_jumps() {
    // call bx ; (at 0x0200) jmp word [si] ; (at 0x0300) jmp far [si+2]
    let mut cpu = cpu_with_program(&[0xFF, 0xD3]);
    cpu.bus.load(0xF0200, &[0xFF, 0x24]);
    cpu.bus.load(0xF0300, &[0xFF, 0x6C, 0x02]);
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x0100;
    cpu.regs.ds = 0x3000;
    cpu.regs.set_bx(0x0200);
    cpu.regs.si = 0x0010;
    cpu.bus.write_u16(physical_address(0x3000, 0x0010), 0x0300);
    cpu.bus.write_u16(physical_address(0x3000, 0x0012), 0x0044);
    cpu.bus.write_u16(physical_address(0x3000, 0x0014), 0x5000);

    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0200);
    assert_eq!(cpu.bus.read_u16(physical_address(0x2000, 0x00FE)), 0x0102);

    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0300);

    run(&mut cpu, 1);
    assert_eq!((cpu.regs.cs, cpu.regs.ip), (0x5000, 0x0044));
}

#[test]
fn test_far_indirect_call_pushes_return() {
    // call far [bx]
    let mut cpu = cpu_with_program(&[0xFF, 0x1F]);
    cpu.regs.ss = 0x2000;
    cpu.regs.sp = 0x0100;
    cpu.regs.ds = 0x3000;
    cpu.bus.write_u16(physical_address(0x3000, 0), 0x0010);
    cpu.bus.write_u16(physical_address(0x3000, 2), 0x4000);

    assert_eq!(run(&mut cpu, 1), 37 + 5);
    assert_eq!((cpu.regs.cs, cpu.regs.ip), (0x4000, 0x0010));
    assert_eq!(cpu.regs.sp, 0x00FC);
}

#[test]
fn test_loop_counts_down() {
    // mov cx, 3 ; inc ax ; loop -3
    let mut cpu = cpu_with_program(&[0xB9, 0x03, 0x00, 0x40, 0xE2, 0xFD]);

    run(&mut cpu, 1);
    let mut loops = 0;
    while cpu.regs.ip != 0x0106 {
        run(&mut cpu, 2);
        loops += 1;
        assert!(loops <= 3);
    }

    assert_eq!(cpu.regs.ax(), 3);
    assert_eq!(cpu.regs.cx(), 0);
}

#[test]
fn test_loop_cycles() {
    let mut cpu = cpu_with_program(&[0xE2, 0x00, 0xE2, 0x00]);
    cpu.regs.set_cx(2);
    assert_eq!(run(&mut cpu, 1), 17);
    assert_eq!(run(&mut cpu, 1), 5);
}

#[test]
fn test_loopz_loopnz_and_jcxz() {
    // loopnz +4 with ZF set falls through
    let mut cpu = cpu_with_program(&[0xE0, 0x04]);
    cpu.regs.set_cx(5);
    cpu.regs.flags.set(FLAG_ZF, true);
    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0102);
    assert_eq!(cpu.regs.cx(), 4);

    // loopz +4 with ZF set is taken
    let mut cpu = cpu_with_program(&[0xE1, 0x04]);
    cpu.regs.set_cx(5);
    cpu.regs.flags.set(FLAG_ZF, true);
    run(&mut cpu, 1);
    assert_eq!(cpu.regs.ip, 0x0106);

    // jcxz does not decrement
    let mut cpu = cpu_with_program(&[0xE3, 0x04]);
    assert_eq!(run(&mut cpu, 1), 18);
    assert_eq!(cpu.regs.ip, 0x0106);
    assert_eq!(cpu.regs.cx(), 0);
}

#[test]
fn test_ip_wraps_within_code_segment() {
    let mut cpu = cpu_with_program(&[]);
    cpu.bus.load(physical_address(0x1000, 0xFFFF), &[0x40]);
    cpu.init(0x1000, 0xFFFF);

    run(&mut cpu, 1);

    assert_eq!(cpu.regs.ip, 0x0000);
    assert_eq!(cpu.regs.cs, 0x1000);
    assert_eq!(cpu.regs.ax(), 1);
}
