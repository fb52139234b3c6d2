//! DD/FD prefix behaviour: the HL rewrite, displacement addressing,
//! and the DD CB / FD CB displaced bit operations.

use cpu_z80::{Z80, CF, SF, ZF};
use emu_core::{Bus, Cpu, SimpleBus};

fn run_until_halt(cpu: &mut Z80, bus: &mut SimpleBus) {
    let mut steps = 0u32;
    while !cpu.is_halted() && steps < 100_000 {
        cpu.step(bus);
        steps += 1;
    }
    assert!(cpu.is_halted(), "program did not halt");
}

fn run_program(program: &[u8]) -> (Z80, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, program);
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);
    (cpu, bus)
}

#[test]
fn ld_ix_iy_nn() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0x34, 0x12, // LD IX, 0x1234
        0xFD, 0x21, 0x78, 0x56, // LD IY, 0x5678
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0x1234);
    assert_eq!(cpu.regs.iy, 0x5678);
    assert_eq!(cpu.regs.hl(), 0x0000);
}

#[test]
fn index_halves_are_addressable() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0x34, 0x12, // LD IX, 0x1234
        0xDD, 0x7C, // LD A, IXH
        0x47, // LD B, A
        0xDD, 0x7D, // LD A, IXL
        0x4F, // LD C, A
        0x76,
    ]);
    assert_eq!(cpu.regs.b, 0x12);
    assert_eq!(cpu.regs.c, 0x34);
}

#[test]
fn writing_index_halves() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0x00, 0x00, // LD IX, 0
        0x3E, 0xAB, // LD A, 0xAB
        0xDD, 0x67, // LD IXH, A
        0x3E, 0xCD, // LD A, 0xCD
        0xDD, 0x6F, // LD IXL, A
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0xABCD);
    assert_eq!(cpu.regs.hl(), 0x0000);
}

#[test]
fn displaced_load_positive() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0x21, 0x00, 0x20, 0xDD, 0x7E, 0x05, 0x76]);
    bus.write(0x2005, 0x99);
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x99);
}

#[test]
fn displaced_load_negative() {
    let mut bus = SimpleBus::new();
    // LD A, (IX-5)
    bus.load(0x0000, &[0xDD, 0x21, 0x00, 0x20, 0xDD, 0x7E, 0xFB, 0x76]);
    bus.write(0x1FFB, 0x42);
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x42);
}

#[test]
fn displaced_store_and_immediate() {
    let (_, mut bus) = run_program(&[
        0xFD, 0x21, 0x00, 0x30, // LD IY, 0x3000
        0x3E, 0x11, // LD A, 0x11
        0xFD, 0x77, 0x02, // LD (IY+2), A
        0xFD, 0x36, 0x03, 0x22, // LD (IY+3), 0x22
        0x76,
    ]);
    assert_eq!(bus.read(0x3002), 0x11);
    assert_eq!(bus.read(0x3003), 0x22);
}

#[test]
fn memory_form_uses_true_h_and_l() {
    // With a displaced memory operand, H and L name the real registers,
    // not the index halves.
    let mut bus = SimpleBus::new();
    bus.load(
        0x0000,
        &[
            0xDD, 0x21, 0x00, 0x20, // LD IX, 0x2000
            0x21, 0x34, 0x12, // LD HL, 0x1234
            0xDD, 0x66, 0x01, // LD H, (IX+1)
            0xDD, 0x74, 0x02, // LD (IX+2), H
            0x76,
        ],
    );
    bus.write(0x2001, 0x77);
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);

    assert_eq!(cpu.regs.h, 0x77);
    assert_eq!(cpu.regs.l, 0x34);
    assert_eq!(cpu.regs.ix, 0x2000); // IXH untouched
    assert_eq!(bus.read(0x2002), 0x77);
}

#[test]
fn displaced_arithmetic() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0x21, 0x00, 0x20, 0x3E, 0x10, 0xDD, 0x86, 0x04, 0x76]);
    bus.write(0x2004, 0x0A); // ADD A, (IX+4)
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);
    assert_eq!(cpu.regs.a, 0x1A);
}

#[test]
fn displaced_inc_dec() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0x21, 0x00, 0x20, 0xDD, 0x34, 0x00, 0xDD, 0x35, 0x01, 0x76]);
    bus.write(0x2000, 0x0F);
    bus.write(0x2001, 0x01);
    let mut cpu = Z80::new();
    run_until_halt(&mut cpu, &mut bus);
    assert_eq!(bus.read(0x2000), 0x10);
    assert_eq!(bus.read(0x2001), 0x00);
    assert!(cpu.regs.flag(ZF));
}

#[test]
fn add_ix_rr() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0x00, 0x10, // LD IX, 0x1000
        0x01, 0x34, 0x02, // LD BC, 0x0234
        0xDD, 0x09, // ADD IX, BC
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0x1234);
    assert_eq!(cpu.regs.hl(), 0x0000);
}

#[test]
fn inc_dec_ix() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0xFF, 0xFF, // LD IX, 0xFFFF
        0xDD, 0x23, // INC IX -> 0
        0xFD, 0x2B, // DEC IY -> 0xFFFF
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0x0000);
    assert_eq!(cpu.regs.iy, 0xFFFF);
}

#[test]
fn push_pop_ix() {
    let (cpu, _) = run_program(&[
        0x31, 0x00, 0x80, // LD SP, 0x8000
        0xDD, 0x21, 0x34, 0x12, // LD IX, 0x1234
        0xDD, 0xE5, // PUSH IX
        0xDD, 0x21, 0x00, 0x00, // LD IX, 0
        0xDD, 0xE1, // POP IX
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0x1234);
    assert_eq!(cpu.regs.sp, 0x8000);
}

#[test]
fn ex_de_hl_ignores_prefix() {
    // DD EB still swaps DE with the true HL.
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0xAA, 0xBB, // LD IX, 0xBBAA
        0x21, 0x11, 0x11, // LD HL, 0x1111
        0x11, 0x22, 0x22, // LD DE, 0x2222
        0xDD, 0xEB, // EX DE, HL (prefix has no effect)
        0x76,
    ]);
    assert_eq!(cpu.regs.hl(), 0x2222);
    assert_eq!(cpu.regs.de(), 0x1111);
    assert_eq!(cpu.regs.ix, 0xBBAA);
}

#[test]
fn jp_ix_and_ld_sp_ix() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0x08, 0x00, // LD IX, 0x0008
        0xDD, 0xF9, // LD SP, IX
        0xDD, 0xE9, // JP (IX)
        0x76, // 0x0008: HALT
    ]);
    assert_eq!(cpu.regs.pc, 0x0008);
    assert_eq!(cpu.regs.sp, 0x0008);
}

#[test]
fn ex_sp_ix() {
    let (cpu, mut bus) = run_program(&[
        0x31, 0x00, 0x80, // LD SP, 0x8000
        0x21, 0x78, 0x56, // LD HL, 0x5678
        0xE5, // PUSH HL
        0xDD, 0x21, 0x34, 0x12, // LD IX, 0x1234
        0xDD, 0xE3, // EX (SP), IX
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0x5678);
    assert_eq!(bus.read16(0x7FFE), 0x1234);
    assert_eq!(cpu.regs.hl(), 0x5678);
}

#[test]
fn prefix_chain_last_one_wins() {
    // DD FD 21: the FD decides, so this is LD IY, nn.
    let (cpu, _) = run_program(&[0xDD, 0xFD, 0x21, 0x34, 0x12, 0x76]);
    assert_eq!(cpu.regs.iy, 0x1234);
    assert_eq!(cpu.regs.ix, 0x0000);
    assert_eq!(cpu.regs.hl(), 0x0000);
}

#[test]
fn prefix_applies_to_one_instruction_only() {
    let (cpu, _) = run_program(&[
        0xDD, 0x21, 0xAA, 0xBB, // LD IX, 0xBBAA
        0xFD, 0x21, 0xCC, 0xDD, // LD IY, 0xDDCC
        0x26, 0x11, // LD H, 0x11 (plain HL)
        0x2E, 0x22, // LD L, 0x22
        0x7C, // LD A, H
        0x85, // ADD A, L
        0x76,
    ]);
    assert_eq!(cpu.regs.ix, 0xBBAA);
    assert_eq!(cpu.regs.iy, 0xDDCC);
    assert_eq!(cpu.regs.hl(), 0x1122);
    assert_eq!(cpu.regs.a, 0x33);
}

// === DD CB / FD CB ===

#[test]
fn scenario_ddcb_rotate_with_result_copy() {
    // RLC (IX+5) with the undocumented copy into L.
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0xCB, 0x05, 0x05, 0x76]);
    bus.write(0x2005, 0x81);
    let mut cpu = Z80::new();
    cpu.regs.ix = 0x2000;
    cpu.regs.set_hl(0x1234);
    run_until_halt(&mut cpu, &mut bus);

    assert_eq!(bus.read(0x2005), 0x03);
    assert_eq!(cpu.regs.l, 0x03); // copy goes to the true L
    assert_eq!(cpu.regs.h, 0x12); // H untouched
    assert_eq!(cpu.regs.ix, 0x2000);
    assert!(cpu.regs.flag(CF));
}

#[test]
fn ddcb_copy_targets_true_register() {
    // SLA (IX+1) -> B; B gets the shifted value, memory too.
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0xCB, 0x01, 0x20, 0x76]);
    bus.write(0x4001, 0x21);
    let mut cpu = Z80::new();
    cpu.regs.ix = 0x4000;
    run_until_halt(&mut cpu, &mut bus);

    assert_eq!(bus.read(0x4001), 0x42);
    assert_eq!(cpu.regs.b, 0x42);
}

#[test]
fn ddcb_without_copy_when_target_is_memory() {
    // RLC (IX+0) with rrr = 110: memory only, no register copy.
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0xCB, 0x00, 0x06, 0x76]);
    bus.write(0x4000, 0x80);
    let mut cpu = Z80::new();
    cpu.regs.ix = 0x4000;
    run_until_halt(&mut cpu, &mut bus);

    assert_eq!(bus.read(0x4000), 0x01);
    assert_eq!(cpu.regs.b, 0x00);
    assert_eq!(cpu.regs.hl(), 0x0000);
}

#[test]
fn fdcb_set_res() {
    let mut bus = SimpleBus::new();
    bus.load(
        0x0000,
        &[
            0xFD, 0xCB, 0x02, 0xC6, // SET 0, (IY+2)
            0xFD, 0xCB, 0x02, 0xBE, // RES 7, (IY+2)
            0x76,
        ],
    );
    bus.write(0x5002, 0x80);
    let mut cpu = Z80::new();
    cpu.regs.iy = 0x5000;
    run_until_halt(&mut cpu, &mut bus);

    assert_eq!(bus.read(0x5002), 0x01);
}

#[test]
fn ddcb_bit_reads_memory_only() {
    // BIT 7, (IX+3): Z reflects the complement; memory untouched.
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0xCB, 0x03, 0x7E, 0x76]);
    bus.write(0x6003, 0x80);
    let mut cpu = Z80::new();
    cpu.regs.ix = 0x6000;
    run_until_halt(&mut cpu, &mut bus);

    assert!(!cpu.regs.flag(ZF));
    assert!(cpu.regs.flag(SF));
    assert_eq!(bus.read(0x6003), 0x80);

    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xDD, 0xCB, 0x03, 0x5E, 0x76]); // BIT 3, (IX+3)
    bus.write(0x6003, 0x00);
    let mut cpu = Z80::new();
    cpu.regs.ix = 0x6000;
    run_until_halt(&mut cpu, &mut bus);
    assert!(cpu.regs.flag(ZF));
}

#[test]
fn fdcb_negative_displacement() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xFD, 0xCB, 0xFE, 0xC6, 0x76]); // SET 0, (IY-2)
    let mut cpu = Z80::new();
    cpu.regs.iy = 0x5002;
    run_until_halt(&mut cpu, &mut bus);
    assert_eq!(bus.read(0x5000), 0x01);
}
