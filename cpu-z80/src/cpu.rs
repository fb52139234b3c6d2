//! Z80 CPU core with per-instruction execution.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.
#![allow(clippy::cast_possible_wrap)] // Intentional i8 casts for displacements.
#![allow(clippy::cast_sign_loss)] // Displacements are sign-extended then reinterpreted.

use emu_core::{Bus, Cpu, IoBus, Observable, Value};

use crate::flags::{CF, HF, NF, PF, SF, ZF};
use crate::registers::Registers;

/// Which register an `HL` reference resolves to for the current
/// instruction. Set by a DD or FD prefix, cleared when the instruction
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexMode {
    Hl,
    Ix,
    Iy,
}

/// Z80 CPU.
///
/// The CPU does not own the bus; memory and I/O are reached through the
/// bus passed to `step()`. One call to `step()` executes one complete
/// instruction — prefix bytes, displacement and operands included — and
/// bumps the T-state counter by the documented cost.
pub struct Z80 {
    /// The register file. Public so hosts can seed and inspect state
    /// directly (snapshot loaders, test harnesses).
    pub regs: Registers,

    /// Active HL rewrite for the instruction being executed.
    pub(crate) index: IndexMode,

    /// Total T-states executed.
    cycles: u64,
}

impl Z80 {
    /// Create a new Z80 in its power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            index: IndexMode::Hl,
            cycles: 0,
        }
    }

    /// Total T-states executed since creation or the last reset.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycles
    }

    /// Reset to the power-on state: registers cleared, SP at 0xFFFF,
    /// interrupts disabled, cycle counter zeroed. Memory is external
    /// and untouched.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.index = IndexMode::Hl;
        self.cycles = 0;
    }

    /// True if the CPU has executed HALT and not been reset since.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// The current program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// Overwrite the T-state counter.
    pub fn set_cycle_count(&mut self, cycles: u64) {
        self.cycles = cycles;
    }

    /// Run instructions until the T-state counter reaches `target` or
    /// the CPU halts.
    ///
    /// The check happens at instruction boundaries only, so the counter
    /// may overshoot by one instruction's cost. When the CPU halts, PC
    /// is left pointing at the HALT opcode.
    pub fn run_until_cycle<B: IoBus>(&mut self, bus: &mut B, target: u64) {
        while self.cycles < target && !self.regs.halted {
            self.step_instruction(bus);
        }
    }

    /// Execute one complete instruction. Returns the T-states consumed.
    ///
    /// While halted, each call burns a 4-T-state NOP without advancing
    /// PC.
    pub fn step_instruction<B: IoBus>(&mut self, bus: &mut B) -> u32 {
        let start = self.cycles;

        if self.regs.halted {
            self.cycles += 4;
            return 4;
        }

        self.index = IndexMode::Hl;
        loop {
            let opcode = self.fetch8(bus);
            self.inc_r();
            match opcode {
                // A DD/FD chain is equivalent to the last prefix seen.
                0xDD => {
                    self.cycles += 4;
                    self.index = IndexMode::Ix;
                }
                0xFD => {
                    self.cycles += 4;
                    self.index = IndexMode::Iy;
                }
                0xCB => {
                    self.cycles += 4;
                    if self.index == IndexMode::Hl {
                        let op = self.fetch8(bus);
                        self.inc_r();
                        self.execute_cb(bus, op);
                    } else {
                        // DD CB d op: the displacement sits between the
                        // prefix pair and the final opcode. Neither byte
                        // is an M1 fetch, so R stays put.
                        let displacement = self.fetch8(bus) as i8;
                        let op = self.fetch8(bus);
                        self.execute_indexed_cb(bus, displacement, op);
                    }
                    break;
                }
                // ED drops any index prefix: the ED table always works
                // on the true HL.
                0xED => {
                    self.cycles += 4;
                    self.index = IndexMode::Hl;
                    let op = self.fetch8(bus);
                    self.inc_r();
                    self.execute_ed(bus, op);
                    break;
                }
                _ => {
                    self.execute_main(bus, opcode);
                    break;
                }
            }
        }
        self.index = IndexMode::Hl;

        (self.cycles - start) as u32
    }

    // === Fetch and stack primitives ===

    /// Fetch one byte at PC and advance PC (modulo 2^16).
    pub(crate) fn fetch8<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    /// Fetch a little-endian word at PC and advance PC by two.
    pub(crate) fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus);
        let hi = self.fetch8(bus);
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Read a little-endian word, wrapping at the byte level.
    pub(crate) fn read16<B: Bus>(&mut self, bus: &mut B, address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read(address.wrapping_add(1));
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Write a little-endian word, wrapping at the byte level.
    pub(crate) fn write16<B: Bus>(&mut self, bus: &mut B, address: u16, value: u16) {
        bus.write(address, value as u8);
        bus.write(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Push a word: SP drops by two, high byte at SP+1, low at SP.
    pub(crate) fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write16(bus, self.regs.sp, value);
    }

    /// Pop a word and raise SP by two.
    pub(crate) fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let value = self.read16(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Increment R register (lower 7 bits only).
    fn inc_r(&mut self) {
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
    }

    // === Index rewrite helpers ===

    /// The pair an `HL` register reference resolves to.
    pub(crate) fn effective_hl(&self) -> u16 {
        match self.index {
            IndexMode::Hl => self.regs.hl(),
            IndexMode::Ix => self.regs.ix,
            IndexMode::Iy => self.regs.iy,
        }
    }

    /// Store to the pair an `HL` register reference resolves to.
    pub(crate) fn set_effective_hl(&mut self, value: u16) {
        match self.index {
            IndexMode::Hl => self.regs.set_hl(value),
            IndexMode::Ix => self.regs.ix = value,
            IndexMode::Iy => self.regs.iy = value,
        }
    }

    /// Resolve an `(HL)` memory operand.
    ///
    /// Under an index prefix this fetches the signed displacement from
    /// the instruction stream and charges the 8 extra T-states that put
    /// the indexed form 12 over the HL form in total. Call exactly once
    /// per instruction.
    pub(crate) fn mem_operand_addr<B: Bus>(&mut self, bus: &mut B) -> u16 {
        match self.index {
            IndexMode::Hl => self.regs.hl(),
            IndexMode::Ix | IndexMode::Iy => {
                let displacement = self.fetch8(bus) as i8;
                self.cycles += 8;
                let addr = self
                    .effective_hl()
                    .wrapping_add(displacement as i16 as u16);
                self.regs.wz = addr;
                addr
            }
        }
    }

    /// Effective address for a DD CB / FD CB instruction, from the
    /// displacement captured between the prefix and the opcode.
    pub(crate) fn indexed_cb_addr(&mut self, displacement: i8) -> u16 {
        let addr = self.effective_hl().wrapping_add(displacement as i16 as u16);
        self.regs.wz = addr;
        addr
    }

    // === Register decoding ===

    /// Get register by 3-bit encoding, true registers only (CB and ED
    /// space). Code 6 is the memory operand and is handled by callers.
    pub(crate) fn get_reg8(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => 0,
        }
    }

    /// Set register by 3-bit encoding, true registers only.
    pub(crate) fn set_reg8(&mut self, code: u8, value: u8) {
        match code & 7 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => {}
        }
    }

    /// Get register by 3-bit encoding with the index rewrite applied:
    /// under DD/FD, codes 4 and 5 are IXH/IXL (IYH/IYL).
    pub(crate) fn get_reg8_idx(&self, code: u8) -> u8 {
        match code & 7 {
            4 => (self.effective_hl() >> 8) as u8,
            5 => self.effective_hl() as u8,
            other => self.get_reg8(other),
        }
    }

    /// Set register by 3-bit encoding with the index rewrite applied.
    pub(crate) fn set_reg8_idx(&mut self, code: u8, value: u8) {
        match code & 7 {
            4 => {
                let pair = self.effective_hl();
                self.set_effective_hl((pair & 0x00FF) | (u16::from(value) << 8));
            }
            5 => {
                let pair = self.effective_hl();
                self.set_effective_hl((pair & 0xFF00) | u16::from(value));
            }
            other => self.set_reg8(other, value),
        }
    }

    /// Get register pair by 2-bit encoding (BC, DE, HL/IX/IY, SP).
    pub(crate) fn get_reg16(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.effective_hl(),
            _ => self.regs.sp,
        }
    }

    /// Set register pair by 2-bit encoding.
    pub(crate) fn set_reg16(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_effective_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// Get register pair for PUSH/POP (AF in place of SP).
    pub(crate) fn get_reg16_af(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.effective_hl(),
            _ => self.regs.af(),
        }
    }

    /// Set register pair for PUSH/POP.
    pub(crate) fn set_reg16_af(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_effective_hl(value),
            _ => self.regs.set_af(value),
        }
    }

    /// Evaluate a condition code (NZ, Z, NC, C, PO, PE, P, M).
    pub(crate) fn condition(&self, code: u8) -> bool {
        match code & 7 {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            _ => self.regs.f & SF != 0,
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

// Instruction execution split into a separate file for readability.
mod execute;

impl<B: IoBus> Cpu<B> for Z80 {
    fn step(&mut self, bus: &mut B) -> u32 {
        self.step_instruction(bus)
    }

    fn reset(&mut self) {
        Z80::reset(self);
    }

    fn pc(&self) -> u16 {
        Z80::pc(self)
    }

    fn is_halted(&self) -> bool {
        Z80::is_halted(self)
    }
}

/// All query paths supported by the Z80.
const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    // Register pairs
    "af", "bc", "de", "hl",
    // Alternate pairs
    "af'", "bc'", "de'", "hl'",
    // Index registers
    "ix", "iy", "ixh", "ixl", "iyh", "iyl",
    // Other registers
    "sp", "pc", "i", "r", "wz",
    // Flags (individual)
    "flags.s", "flags.z", "flags.h", "flags.p", "flags.n", "flags.c",
    // Interrupt state
    "iff1", "iff2", "im",
    // CPU state
    "halted", "ticks",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            // Main registers
            "a" => Some(self.regs.a.into()),
            "f" => Some(self.regs.f.into()),
            "b" => Some(self.regs.b.into()),
            "c" => Some(self.regs.c.into()),
            "d" => Some(self.regs.d.into()),
            "e" => Some(self.regs.e.into()),
            "h" => Some(self.regs.h.into()),
            "l" => Some(self.regs.l.into()),

            // Register pairs
            "af" => Some(self.regs.af().into()),
            "bc" => Some(self.regs.bc().into()),
            "de" => Some(self.regs.de().into()),
            "hl" => Some(self.regs.hl().into()),

            // Alternate pairs
            "af'" => Some(self.regs.af_alt().into()),
            "bc'" => Some(self.regs.bc_alt().into()),
            "de'" => Some(self.regs.de_alt().into()),
            "hl'" => Some(self.regs.hl_alt().into()),

            // Index registers
            "ix" => Some(self.regs.ix.into()),
            "iy" => Some(self.regs.iy.into()),
            "ixh" => Some(((self.regs.ix >> 8) as u8).into()),
            "ixl" => Some((self.regs.ix as u8).into()),
            "iyh" => Some(((self.regs.iy >> 8) as u8).into()),
            "iyl" => Some((self.regs.iy as u8).into()),

            // Other registers
            "sp" => Some(self.regs.sp.into()),
            "pc" => Some(self.regs.pc.into()),
            "i" => Some(self.regs.i.into()),
            "r" => Some(self.regs.r.into()),
            "wz" => Some(self.regs.wz.into()),

            // Individual flags
            "flags.s" => Some((self.regs.f & SF != 0).into()),
            "flags.z" => Some((self.regs.f & ZF != 0).into()),
            "flags.h" => Some((self.regs.f & HF != 0).into()),
            "flags.p" => Some((self.regs.f & PF != 0).into()),
            "flags.n" => Some((self.regs.f & NF != 0).into()),
            "flags.c" => Some((self.regs.f & CF != 0).into()),

            // Interrupt state
            "iff1" => Some(self.regs.iff1.into()),
            "iff2" => Some(self.regs.iff2.into()),
            "im" => Some(self.regs.im.into()),

            // CPU state
            "halted" => Some(self.regs.halted.into()),
            "ticks" => Some(self.cycles.into()),

            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
