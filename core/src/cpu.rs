use crate::Bus;

/// A CPU that can execute instructions.
///
/// The type parameter `B` is the bus type this CPU operates on.
pub trait Cpu<B: Bus> {
    /// Execute one complete instruction. Returns T-states consumed.
    fn step(&mut self, bus: &mut B) -> u32;

    /// Reset the CPU to its initial state. The bus is untouched.
    fn reset(&mut self);

    /// Get the current program counter.
    fn pc(&self) -> u16;

    /// True if the CPU has executed HALT and not been reset since.
    fn is_halted(&self) -> bool;
}
