use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use i86_core::cpu_8086::{disassemble, ArrayBus, Cpu8086, Cursor};

/// Register arithmetic loop at F000:0100
///
/// ```text
/// mov ax, 0x1234
/// mov bx, 0x0010
/// add ax, bx
/// inc cx
/// xor dx, ax
/// jmp 0x0100
/// ```
const ALU_LOOP: &[u8] = &[
    0xB8, 0x34, 0x12, 0xBB, 0x10, 0x00, 0x01, 0xD8, 0x41, 0x31, 0xC2, 0xEB, 0xF3,
];

/// Memory traffic through ModR/M addressing
///
/// ```text
/// mov [bx+si+0x10], ax
/// mov cx, [bp+di]
/// add word [0x2000], 0x0001
/// jmp 0x0100
/// ```
const MEMORY_LOOP: &[u8] = &[
    0x89, 0x40, 0x10, 0x8B, 0x0B, 0x83, 0x06, 0x00, 0x20, 0x01, 0xEB, 0xF4,
];

fn cpu_with(program: &[u8]) -> Cpu8086<ArrayBus> {
    let mut bus = ArrayBus::new();
    bus.load(0xF0100, program);
    let mut cpu = Cpu8086::new(bus);
    cpu.init(0xF000, 0x0100);
    cpu.regs.ds = 0x1000;
    cpu.regs.ss = 0x2000;
    cpu
}

fn bench_instruction_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_execution");

    for (name, program) in [("alu_loop", ALU_LOOP), ("memory_loop", MEMORY_LOOP)] {
        group.bench_with_input(BenchmarkId::new("1000_instructions", name), program, |b, p| {
            let mut cpu = cpu_with(p);
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(cpu.run_instruction().ok());
                }
            });
        });
    }

    group.finish();
}

fn bench_rep_movsw(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_8086_strings");

    for &count in &[16u16, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("rep_movsw", count), &count, |b, &count| {
            let mut cpu = cpu_with(&[0xF3, 0xA5]);
            cpu.regs.es = 0x3000;
            b.iter(|| {
                cpu.regs.ip = 0x0100;
                cpu.regs.si = 0;
                cpu.regs.di = 0;
                cpu.regs.set_cx(count);
                black_box(cpu.run_instruction().ok())
            });
        });
    }

    group.finish();
}

fn bench_disassembly(c: &mut Criterion) {
    let mut bus = ArrayBus::new();
    bus.load(0xF0100, MEMORY_LOOP);

    c.bench_function("disassemble_memory_loop", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(0xF000, 0x0100);
            for _ in 0..4 {
                black_box(disassemble(&bus, &mut cursor));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_instruction_execution,
    bench_rep_movsw,
    bench_disassembly
);
criterion_main!(benches);
