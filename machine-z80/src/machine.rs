//! The machine facade: a Z80 on a flat bus.

use cpu_z80::Z80;
use emu_core::{Bus, Cpu, IoBus, SimpleBus};

/// A Z80 with 64 KiB of RAM and 256 byte-latch I/O ports.
///
/// The whole address space is RAM; ports read back whatever was last
/// written to them. Hosts that want real peripherals drive the CPU
/// against their own bus instead.
pub struct Z80Machine {
    cpu: Z80,
    bus: SimpleBus,
}

impl Z80Machine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cpu: Z80::new(),
            bus: SimpleBus::new(),
        }
    }

    /// Reset the CPU. Memory and ports survive, as on the real part.
    pub fn reset(&mut self) {
        log::debug!("machine reset");
        self.cpu.reset();
    }

    /// Copy a program image into memory at `start`. Bytes past 0xFFFF
    /// are discarded.
    pub fn load_program(&mut self, bytes: &[u8], start: u16) {
        log::debug!("loading {} bytes at {start:#06X}", bytes.len());
        self.bus.load(start, bytes);
    }

    /// Execute one instruction. Returns the T-states consumed.
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.bus)
    }

    /// Run until the cycle counter reaches `target` or the CPU halts.
    pub fn run_until_cycle(&mut self, target: u64) {
        self.cpu.run_until_cycle(&mut self.bus, target);
    }

    /// Total T-states executed.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cpu.cycle_count()
    }

    /// True if the CPU has executed HALT.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    #[must_use]
    pub fn read_memory(&mut self, address: u16) -> u8 {
        self.bus.read(address)
    }

    pub fn write_memory(&mut self, address: u16, value: u8) {
        self.bus.write(address, value);
    }

    #[must_use]
    pub fn read_port(&mut self, port: u8) -> u8 {
        self.bus.read_io(u16::from(port))
    }

    pub fn write_port(&mut self, port: u8, value: u8) {
        self.bus.write_io(u16::from(port), value);
    }

    /// Direct CPU access (registers, flags, observability).
    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    /// Direct bus access.
    #[must_use]
    pub fn bus(&self) -> &SimpleBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SimpleBus {
        &mut self.bus
    }
}

impl Default for Z80Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_run_to_halt() {
        let mut machine = Z80Machine::new();
        // LD A, 0x42; HALT
        machine.load_program(&[0x3E, 0x42, 0x76], 0x0000);
        machine.run_until_cycle(100);

        assert!(machine.is_halted());
        assert_eq!(machine.cpu().regs.a, 0x42);
        // PC parked on the HALT opcode.
        assert_eq!(machine.cpu().regs.pc, 0x0002);
    }

    #[test]
    fn reset_preserves_memory() {
        let mut machine = Z80Machine::new();
        machine.write_memory(0x8000, 0xAA);
        machine.load_program(&[0x76], 0x0000);
        machine.run_until_cycle(10);

        machine.reset();
        assert!(!machine.is_halted());
        assert_eq!(machine.cycle_count(), 0);
        assert_eq!(machine.cpu().regs.sp, 0xFFFF);
        assert_eq!(machine.read_memory(0x8000), 0xAA);
    }

    #[test]
    fn ports_are_byte_latches() {
        let mut machine = Z80Machine::new();
        machine.write_port(0xFE, 0x5A);
        assert_eq!(machine.read_port(0xFE), 0x5A);

        // OUT (0x10), A; IN A, (0x10) via the CPU.
        machine.load_program(&[0x3E, 0x99, 0xD3, 0x10, 0xDB, 0x10, 0x76], 0x0000);
        machine.run_until_cycle(1000);
        assert_eq!(machine.read_port(0x10), 0x99);
        assert_eq!(machine.cpu().regs.a, 0x99);
    }

    #[test]
    fn run_until_cycle_stops_at_boundary() {
        let mut machine = Z80Machine::new();
        // A NOP loop: run_until_cycle overshoots at most one instruction.
        machine.load_program(&[0x00; 16], 0x0000);
        machine.run_until_cycle(10);
        assert!(machine.cycle_count() >= 10);
        assert!(machine.cycle_count() < 10 + 4);
    }
}
