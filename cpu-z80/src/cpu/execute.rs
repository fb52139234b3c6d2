//! Instruction execution for the Z80.
//!
//! One function per decode space: the unprefixed table, the ED table,
//! and the algorithmic CB decoder (plain and displaced). Handlers add
//! the documented T-state total of their unprefixed form; prefix bytes
//! are charged by the fetch loop in `cpu.rs`.

#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use emu_core::{Bus, IoBus};

use crate::alu::{self, AluResult};
use crate::flags::{sz53, sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};

use super::Z80;

impl Z80 {
    /// Execute an unprefixed instruction (with any DD/FD rewrite active).
    pub(super) fn execute_main<B: IoBus>(&mut self, bus: &mut B, op: u8) {
        match op {
            // NOP
            0x00 => self.cycles += 4,

            // LD rr, nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch16(bus);
                self.set_reg16((op >> 4) & 3, value);
                self.cycles += 10;
            }

            // LD (BC), A / LD (DE), A
            0x02 | 0x12 => {
                let addr = if op == 0x02 {
                    self.regs.bc()
                } else {
                    self.regs.de()
                };
                self.regs.wz = addr;
                bus.write(addr, self.regs.a);
                self.cycles += 7;
            }

            // LD A, (BC) / LD A, (DE)
            0x0A | 0x1A => {
                let addr = if op == 0x0A {
                    self.regs.bc()
                } else {
                    self.regs.de()
                };
                self.regs.wz = addr;
                self.regs.a = bus.read(addr);
                self.cycles += 7;
            }

            // INC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                let code = (op >> 4) & 3;
                self.set_reg16(code, self.get_reg16(code).wrapping_add(1));
                self.cycles += 6;
            }

            // DEC rr
            0x0B | 0x1B | 0x2B | 0x3B => {
                let code = (op >> 4) & 3;
                self.set_reg16(code, self.get_reg16(code).wrapping_sub(1));
                self.cycles += 6;
            }

            // ADD HL, rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let operand = self.get_reg16((op >> 4) & 3);
                let (value, flags) = alu::add16(self.effective_hl(), operand);
                self.set_effective_hl(value);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                self.cycles += 11;
            }

            // INC r / INC (HL)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let code = (op >> 3) & 7;
                let result = if code == 6 {
                    let addr = self.mem_operand_addr(bus);
                    let result = alu::inc8(bus.read(addr));
                    bus.write(addr, result.value);
                    self.cycles += 11;
                    result
                } else {
                    let result = alu::inc8(self.get_reg8_idx(code));
                    self.set_reg8_idx(code, result.value);
                    self.cycles += 4;
                    result
                };
                self.regs.f = (self.regs.f & CF) | result.flags;
            }

            // DEC r / DEC (HL)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let code = (op >> 3) & 7;
                let result = if code == 6 {
                    let addr = self.mem_operand_addr(bus);
                    let result = alu::dec8(bus.read(addr));
                    bus.write(addr, result.value);
                    self.cycles += 11;
                    result
                } else {
                    let result = alu::dec8(self.get_reg8_idx(code));
                    self.set_reg8_idx(code, result.value);
                    self.cycles += 4;
                    result
                };
                self.regs.f = (self.regs.f & CF) | result.flags;
            }

            // LD r, n / LD (HL), n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let code = (op >> 3) & 7;
                if code == 6 {
                    // Displacement precedes the immediate in the
                    // instruction stream (DD 36 d n).
                    let addr = self.mem_operand_addr(bus);
                    let value = self.fetch8(bus);
                    bus.write(addr, value);
                    self.cycles += 10;
                } else {
                    let value = self.fetch8(bus);
                    self.set_reg8_idx(code, value);
                    self.cycles += 7;
                }
            }

            // RLCA
            0x07 => {
                let carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if carry != 0 { CF } else { 0 };
                self.cycles += 4;
            }

            // RRCA
            0x0F => {
                let carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | (carry << 7);
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if carry != 0 { CF } else { 0 };
                self.cycles += 4;
            }

            // RLA
            0x17 => {
                let old_carry = u8::from(self.regs.f & CF != 0);
                let new_carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | old_carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if new_carry != 0 { CF } else { 0 };
                self.cycles += 4;
            }

            // RRA
            0x1F => {
                let old_carry = if self.regs.f & CF != 0 { 0x80 } else { 0 };
                let new_carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | old_carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if new_carry != 0 { CF } else { 0 };
                self.cycles += 4;
            }

            // EX AF, AF'
            0x08 => {
                self.regs.swap_af();
                self.cycles += 4;
            }

            // DJNZ e
            0x10 => {
                let displacement = self.fetch8(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.jump_relative(displacement);
                    self.cycles += 13;
                } else {
                    self.cycles += 8;
                }
            }

            // JR e
            0x18 => {
                let displacement = self.fetch8(bus) as i8;
                self.jump_relative(displacement);
                self.cycles += 12;
            }

            // JR cc, e
            0x20 | 0x28 | 0x30 | 0x38 => {
                let displacement = self.fetch8(bus) as i8;
                if self.condition((op >> 3) & 3) {
                    self.jump_relative(displacement);
                    self.cycles += 12;
                } else {
                    self.cycles += 7;
                }
            }

            // LD (nn), HL
            0x22 => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                let value = self.effective_hl();
                self.write16(bus, addr, value);
                self.cycles += 16;
            }

            // LD HL, (nn)
            0x2A => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                let value = self.read16(bus, addr);
                self.set_effective_hl(value);
                self.cycles += 16;
            }

            // LD (nn), A
            0x32 => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                bus.write(addr, self.regs.a);
                self.cycles += 13;
            }

            // LD A, (nn)
            0x3A => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                self.regs.a = bus.read(addr);
                self.cycles += 13;
            }

            // DAA
            0x27 => {
                let a = self.regs.a;
                let nf = self.regs.f & NF != 0;
                let cf = self.regs.f & CF != 0;
                let hf = self.regs.f & HF != 0;

                let mut correction: u8 = 0;
                let mut new_cf = cf;
                if hf || (a & 0x0F) > 9 {
                    correction |= 0x06;
                }
                if cf || a > 0x99 {
                    correction |= 0x60;
                    new_cf = true;
                }

                let result = if nf {
                    a.wrapping_sub(correction)
                } else {
                    a.wrapping_add(correction)
                };
                let new_hf = if nf {
                    hf && (a & 0x0F) < 6
                } else {
                    (a & 0x0F) > 9
                };

                self.regs.a = result;
                self.regs.f = sz53p(result)
                    | if nf { NF } else { 0 }
                    | if new_cf { CF } else { 0 }
                    | if new_hf { HF } else { 0 };
                self.cycles += 4;
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (YF | XF));
                self.cycles += 4;
            }

            // SCF
            0x37 => {
                self.regs.f =
                    (self.regs.f & (SF | ZF | PF)) | CF | (self.regs.a & (YF | XF));
                self.cycles += 4;
            }

            // CCF: H takes the old carry, C flips.
            0x3F => {
                let old_cf = self.regs.f & CF;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if old_cf != 0 { HF } else { CF };
                self.cycles += 4;
            }

            // HALT: sticky, PC stays on the opcode.
            0x76 => {
                self.regs.halted = true;
                self.regs.pc = self.regs.pc.wrapping_sub(1);
                self.cycles += 4;
            }

            // LD r, r' / LD r, (HL) / LD (HL), r
            0x40..=0x7F => {
                let dst = (op >> 3) & 7;
                let src = op & 7;
                if src == 6 {
                    // With a memory operand, H and L name the true
                    // registers even under DD/FD.
                    let addr = self.mem_operand_addr(bus);
                    let value = bus.read(addr);
                    self.set_reg8(dst, value);
                    self.cycles += 7;
                } else if dst == 6 {
                    let addr = self.mem_operand_addr(bus);
                    bus.write(addr, self.get_reg8(src));
                    self.cycles += 7;
                } else {
                    let value = self.get_reg8_idx(src);
                    self.set_reg8_idx(dst, value);
                    self.cycles += 4;
                }
            }

            // ADD/ADC/SUB/SBC/AND/XOR/OR/CP A, r / (HL)
            0x80..=0xBF => {
                let src = op & 7;
                let value = if src == 6 {
                    let addr = self.mem_operand_addr(bus);
                    self.cycles += 7;
                    bus.read(addr)
                } else {
                    self.cycles += 4;
                    self.get_reg8_idx(src)
                };
                self.apply_alu((op >> 3) & 7, value);
            }

            // ALU A, n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch8(bus);
                self.apply_alu((op >> 3) & 7, value);
                self.cycles += 7;
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = self.pop16(bus);
                    self.cycles += 11;
                } else {
                    self.cycles += 5;
                }
            }

            // POP rr
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop16(bus);
                self.set_reg16_af((op >> 4) & 3, value);
                self.cycles += 10;
            }

            // PUSH rr
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = self.get_reg16_af((op >> 4) & 3);
                self.push16(bus, value);
                self.cycles += 11;
            }

            // JP nn
            0xC3 => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                self.regs.pc = addr;
                self.cycles += 10;
            }

            // JP cc, nn (10 T-states taken or not)
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = addr;
                }
                self.cycles += 10;
            }

            // CALL nn
            0xCD => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                let pc = self.regs.pc;
                self.push16(bus, pc);
                self.regs.pc = addr;
                self.cycles += 17;
            }

            // CALL cc, nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                if self.condition((op >> 3) & 7) {
                    let pc = self.regs.pc;
                    self.push16(bus, pc);
                    self.regs.pc = addr;
                    self.cycles += 17;
                } else {
                    self.cycles += 10;
                }
            }

            // RET
            0xC9 => {
                self.regs.pc = self.pop16(bus);
                self.cycles += 10;
            }

            // RST 00h..38h
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let pc = self.regs.pc;
                self.push16(bus, pc);
                self.regs.pc = u16::from(op & 0x38);
                self.cycles += 11;
            }

            // OUT (n), A
            0xD3 => {
                let port = self.fetch8(bus);
                bus.write_io(u16::from(port), self.regs.a);
                self.cycles += 11;
            }

            // IN A, (n): no flags.
            0xDB => {
                let port = self.fetch8(bus);
                self.regs.a = bus.read_io(u16::from(port));
                self.cycles += 11;
            }

            // EXX
            0xD9 => {
                self.regs.swap_main_set();
                self.cycles += 4;
            }

            // EX (SP), HL
            0xE3 => {
                let sp = self.regs.sp;
                let from_stack = self.read16(bus, sp);
                let value = self.effective_hl();
                self.write16(bus, sp, value);
                self.set_effective_hl(from_stack);
                self.regs.wz = from_stack;
                self.cycles += 19;
            }

            // JP (HL)
            0xE9 => {
                self.regs.pc = self.effective_hl();
                self.cycles += 4;
            }

            // EX DE, HL: always the true HL, even under DD/FD.
            0xEB => {
                let de = self.regs.de();
                let hl = self.regs.hl();
                self.regs.set_de(hl);
                self.regs.set_hl(de);
                self.cycles += 4;
            }

            // LD SP, HL
            0xF9 => {
                self.regs.sp = self.effective_hl();
                self.cycles += 6;
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                self.cycles += 4;
            }

            // EI
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.cycles += 4;
            }

            // Prefix bytes never reach this table; anything else is a NOP.
            _ => self.cycles += 4,
        }
    }

    /// Relative jump: sign-extend the displacement onto PC.
    fn jump_relative(&mut self, displacement: i8) {
        self.regs.pc = self.regs.pc.wrapping_add(displacement as i16 as u16);
        self.regs.wz = self.regs.pc;
    }

    /// The eight-way ALU selector shared by the register, memory and
    /// immediate operand forms (encoding `oo kkk rrr`, k = operation).
    fn apply_alu(&mut self, kind: u8, value: u8) {
        let a = self.regs.a;
        let carry = self.regs.f & CF != 0;
        let result = match kind & 7 {
            0 => alu::add8(a, value, false),
            1 => alu::add8(a, value, carry),
            2 => alu::sub8(a, value, false),
            3 => alu::sub8(a, value, carry),
            4 => alu::and8(a, value),
            5 => alu::xor8(a, value),
            6 => alu::or8(a, value),
            _ => {
                // CP: flags only.
                self.regs.f = alu::cp8(a, value);
                return;
            }
        };
        self.regs.a = result.value;
        self.regs.f = result.flags;
    }

    // === CB space ===

    /// Rotate/shift dispatch for the CB `oo = 00` group.
    fn rotate_shift(selector: u8, value: u8, carry: bool) -> AluResult {
        match selector & 7 {
            0 => alu::rlc8(value),
            1 => alu::rrc8(value),
            2 => alu::rl8(value, carry),
            3 => alu::rr8(value, carry),
            4 => alu::sla8(value),
            5 => alu::sra8(value),
            6 => alu::sll8(value),
            _ => alu::srl8(value),
        }
    }

    /// BIT b: Z from the complement of the bit, H set, N clear, C kept.
    /// S only for a set bit 7; P/V mirrors Z.
    fn bit_test(&mut self, bit: u8, value: u8) {
        let set = value & (1 << bit) != 0;
        let mut f = (self.regs.f & CF) | HF;
        if !set {
            f |= ZF | PF;
        }
        if bit == 7 && set {
            f |= SF;
        }
        self.regs.f = f;
    }

    /// Execute a CB-prefixed instruction. The opcode byte encodes
    /// `oo bbb rrr`: operation group, bit/shift selector, target.
    pub(super) fn execute_cb<B: Bus>(&mut self, bus: &mut B, op: u8) {
        let target = op & 7;
        let selector = (op >> 3) & 7;

        match op >> 6 {
            // Rotate/shift
            0 => {
                let carry = self.regs.f & CF != 0;
                if target == 6 {
                    let addr = self.regs.hl();
                    let result = Self::rotate_shift(selector, bus.read(addr), carry);
                    bus.write(addr, result.value);
                    self.regs.f = result.flags;
                    self.cycles += 11;
                } else {
                    let result = Self::rotate_shift(selector, self.get_reg8(target), carry);
                    self.set_reg8(target, result.value);
                    self.regs.f = result.flags;
                    self.cycles += 4;
                }
            }

            // BIT b, target
            1 => {
                if target == 6 {
                    let value = bus.read(self.regs.hl());
                    self.bit_test(selector, value);
                    self.cycles += 8;
                } else {
                    let value = self.get_reg8(target);
                    self.bit_test(selector, value);
                    self.cycles += 4;
                }
            }

            // RES b, target / SET b, target: no flag change.
            group => {
                let mask = 1u8 << selector;
                if target == 6 {
                    let addr = self.regs.hl();
                    let value = bus.read(addr);
                    let value = if group == 2 { value & !mask } else { value | mask };
                    bus.write(addr, value);
                    self.cycles += 11;
                } else {
                    let value = self.get_reg8(target);
                    let value = if group == 2 { value & !mask } else { value | mask };
                    self.set_reg8(target, value);
                    self.cycles += 4;
                }
            }
        }
    }

    /// Execute a DD CB / FD CB instruction.
    ///
    /// The target is always the memory cell at IX+d / IY+d. For
    /// non-BIT operations with `rrr != 110`, the result is also copied
    /// into the encoded register — always the true register, never
    /// IXH/IXL.
    pub(super) fn execute_indexed_cb<B: Bus>(&mut self, bus: &mut B, displacement: i8, op: u8) {
        let addr = self.indexed_cb_addr(displacement);
        let target = op & 7;
        let selector = (op >> 3) & 7;

        match op >> 6 {
            1 => {
                let value = bus.read(addr);
                self.bit_test(selector, value);
                self.cycles += 12;
            }
            group => {
                let value = bus.read(addr);
                let result = match group {
                    0 => {
                        let carry = self.regs.f & CF != 0;
                        let result = Self::rotate_shift(selector, value, carry);
                        self.regs.f = result.flags;
                        result.value
                    }
                    2 => value & !(1 << selector),
                    _ => value | (1 << selector),
                };
                bus.write(addr, result);
                if target != 6 {
                    self.set_reg8(target, result);
                }
                self.cycles += 15;
            }
        }
    }

    // === ED space ===

    /// Execute an ED-prefixed instruction. Unmapped entries are no-ops.
    pub(super) fn execute_ed<B: IoBus>(&mut self, bus: &mut B, op: u8) {
        match op {
            // IN r, (C); r = 6 sets flags only (IN F, (C)).
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let value = bus.read_io(u16::from(self.regs.c));
                let code = (op >> 3) & 7;
                if code != 6 {
                    self.set_reg8(code, value);
                }
                self.regs.f = (self.regs.f & CF) | sz53p(value);
                self.cycles += 8;
            }

            // OUT (C), r; r = 6 writes a literal zero.
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let code = (op >> 3) & 7;
                let value = if code == 6 { 0 } else { self.get_reg8(code) };
                bus.write_io(u16::from(self.regs.c), value);
                self.cycles += 8;
            }

            // SBC HL, rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                let operand = self.get_reg16((op >> 4) & 3);
                let carry = self.regs.f & CF != 0;
                let (value, flags) = alu::sbc16(self.regs.hl(), operand, carry);
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.cycles += 11;
            }

            // ADC HL, rr
            0x4A | 0x5A | 0x6A | 0x7A => {
                let operand = self.get_reg16((op >> 4) & 3);
                let carry = self.regs.f & CF != 0;
                let (value, flags) = alu::adc16(self.regs.hl(), operand, carry);
                self.regs.set_hl(value);
                self.regs.f = flags;
                self.cycles += 11;
            }

            // LD (nn), rr
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                let value = self.get_reg16((op >> 4) & 3);
                self.write16(bus, addr, value);
                self.cycles += 16;
            }

            // LD rr, (nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.fetch16(bus);
                self.regs.wz = addr;
                let value = self.read16(bus, addr);
                self.set_reg16((op >> 4) & 3, value);
                self.cycles += 16;
            }

            // NEG (and its seven aliased encodings)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
                self.cycles += 4;
            }

            // RETN (and aliases): pop PC, restore IFF1 from IFF2.
            0x45 | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.pc = self.pop16(bus);
                self.regs.iff1 = self.regs.iff2;
                self.cycles += 10;
            }

            // RETI
            0x4D => {
                self.regs.pc = self.pop16(bus);
                self.cycles += 10;
            }

            // IM 0 (and aliases) / IM 1 / IM 2
            0x46 | 0x4E | 0x66 | 0x6E => {
                self.regs.im = 0;
                self.cycles += 4;
            }
            0x56 => {
                self.regs.im = 1;
                self.cycles += 4;
            }
            0x5E => {
                self.regs.im = 2;
                self.cycles += 4;
            }

            // LD I, A / LD R, A: no flags.
            0x47 => {
                self.regs.i = self.regs.a;
                self.cycles += 5;
            }
            0x4F => {
                self.regs.r = self.regs.a;
                self.cycles += 5;
            }

            // LD A, I / LD A, R: S/Z from the value, P/V from IFF2.
            0x57 | 0x5F => {
                let value = if op == 0x57 { self.regs.i } else { self.regs.r };
                self.regs.a = value;
                self.regs.f = (self.regs.f & CF)
                    | sz53(value)
                    | if self.regs.iff2 { PF } else { 0 };
                self.cycles += 5;
            }

            // RRD: low nibble of (HL) into A, A's low nibble into the
            // high nibble of (HL).
            0x67 => {
                let addr = self.regs.hl();
                let mem = bus.read(addr);
                let a_low = self.regs.a & 0x0F;
                self.regs.a = (self.regs.a & 0xF0) | (mem & 0x0F);
                bus.write(addr, (a_low << 4) | (mem >> 4));
                self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                self.cycles += 14;
            }

            // RLD: high nibble of (HL) into A, A's low nibble into the
            // low nibble of (HL).
            0x6F => {
                let addr = self.regs.hl();
                let mem = bus.read(addr);
                let a_low = self.regs.a & 0x0F;
                self.regs.a = (self.regs.a & 0xF0) | (mem >> 4);
                bus.write(addr, (mem << 4) | a_low);
                self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                self.cycles += 14;
            }

            // LDI / LDD
            0xA0 => {
                self.block_ld(bus, 1);
                self.cycles += 12;
            }
            0xA8 => {
                self.block_ld(bus, 0xFFFF);
                self.cycles += 12;
            }

            // CPI / CPD
            0xA1 => {
                self.block_cp(bus, 1);
                self.cycles += 12;
            }
            0xA9 => {
                self.block_cp(bus, 0xFFFF);
                self.cycles += 12;
            }

            // INI / IND
            0xA2 => {
                self.block_in(bus, 1);
                self.cycles += 12;
            }
            0xAA => {
                self.block_in(bus, 0xFFFF);
                self.cycles += 12;
            }

            // OUTI / OUTD
            0xA3 => {
                self.block_out(bus, 1);
                self.cycles += 12;
            }
            0xAB => {
                self.block_out(bus, 0xFFFF);
                self.cycles += 12;
            }

            // LDIR / LDDR: rewind PC while BC != 0 so the instruction
            // re-executes; 21 T-states per continuing iteration.
            0xB0 | 0xB8 => {
                self.block_ld(bus, if op == 0xB0 { 1 } else { 0xFFFF });
                self.repeat_while(self.regs.bc() != 0);
            }

            // CPIR / CPDR: continue while BC != 0 and the byte differed.
            0xB1 | 0xB9 => {
                self.block_cp(bus, if op == 0xB1 { 1 } else { 0xFFFF });
                let go = self.regs.bc() != 0 && self.regs.f & ZF == 0;
                self.repeat_while(go);
            }

            // INIR / INDR / OTIR / OTDR: continue while B != 0.
            0xB2 | 0xBA => {
                self.block_in(bus, if op == 0xB2 { 1 } else { 0xFFFF });
                self.repeat_while(self.regs.b != 0);
            }
            0xB3 | 0xBB => {
                self.block_out(bus, if op == 0xB3 { 1 } else { 0xFFFF });
                self.repeat_while(self.regs.b != 0);
            }

            // Unmapped ED opcodes are no-ops.
            _ => self.cycles += 4,
        }
    }

    /// Shared tail of the repeating block forms: rewind PC by two so
    /// the ED pair refetches, or fall through on the final iteration.
    fn repeat_while(&mut self, condition: bool) {
        if condition {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cycles += 17;
        } else {
            self.cycles += 12;
        }
    }

    /// One step of LDI/LDD: move a byte from (HL) to (DE), advance the
    /// pointers, decrement BC. P/V reports BC != 0; H and N clear.
    fn block_ld<B: Bus>(&mut self, bus: &mut B, delta: u16) {
        let byte = bus.read(self.regs.hl());
        bus.write(self.regs.de(), byte);
        self.regs.set_hl(self.regs.hl().wrapping_add(delta));
        self.regs.set_de(self.regs.de().wrapping_add(delta));
        self.regs.set_bc(self.regs.bc().wrapping_sub(1));

        let mut f = self.regs.f & (SF | ZF | CF);
        if self.regs.bc() != 0 {
            f |= PF;
        }
        self.regs.f = f;
    }

    /// One step of CPI/CPD: compare A with (HL), advance HL, decrement
    /// BC. Carry survives; S/Z/H from the comparison, P/V = BC != 0.
    fn block_cp<B: Bus>(&mut self, bus: &mut B, delta: u16) {
        let byte = bus.read(self.regs.hl());
        let result = self.regs.a.wrapping_sub(byte);
        self.regs.set_hl(self.regs.hl().wrapping_add(delta));
        self.regs.set_bc(self.regs.bc().wrapping_sub(1));

        let mut f = (self.regs.f & CF) | NF | (result & SF);
        if result == 0 {
            f |= ZF;
        }
        if (self.regs.a & 0x0F) < (byte & 0x0F) {
            f |= HF;
        }
        if self.regs.bc() != 0 {
            f |= PF;
        }
        self.regs.f = f;
    }

    /// One step of INI/IND: port C into (HL), advance HL, decrement B.
    /// Z and S track B; N set.
    fn block_in<B: IoBus>(&mut self, bus: &mut B, delta: u16) {
        let value = bus.read_io(u16::from(self.regs.c));
        bus.write(self.regs.hl(), value);
        self.regs.set_hl(self.regs.hl().wrapping_add(delta));
        self.regs.b = self.regs.b.wrapping_sub(1);
        self.regs.f = NF | self.block_io_flags();
    }

    /// One step of OUTI/OUTD: (HL) to port C, advance HL, decrement B.
    fn block_out<B: IoBus>(&mut self, bus: &mut B, delta: u16) {
        let byte = bus.read(self.regs.hl());
        bus.write_io(u16::from(self.regs.c), byte);
        self.regs.set_hl(self.regs.hl().wrapping_add(delta));
        self.regs.b = self.regs.b.wrapping_sub(1);
        self.regs.f = NF | self.block_io_flags();
    }

    /// Z and S from B after a block I/O step.
    fn block_io_flags(&self) -> u8 {
        let mut f = self.regs.b & SF;
        if self.regs.b == 0 {
            f |= ZF;
        }
        f
    }
}
