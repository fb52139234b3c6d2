//! Full machine state snapshots.
//!
//! Captures every register, the interrupt latches, the cycle counter,
//! and the complete memory and port images. Serialises to JSON with the
//! bulk data base64-encoded, for save states, regression fixtures and
//! reproducible bug reports.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Z80Machine;

/// Memory image size in bytes.
const MEMORY_SIZE: usize = 0x1_0000;

/// Port image size in bytes.
const PORT_COUNT: usize = 256;

/// Errors from snapshot restore or JSON decoding.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("memory image must be {MEMORY_SIZE} bytes, got {0}")]
    BadMemorySize(usize),

    #[error("port image must be {PORT_COUNT} bytes, got {0}")]
    BadPortSize(usize),
}

/// CPU register state, one field per architectural register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuState {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    pub r: u8,
    pub wz: u16,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
}

/// Complete machine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu: CpuState,
    pub cycles: u64,
    /// Base64 of the 64 KiB memory image.
    pub memory: String,
    /// Base64 of the 256-byte port image.
    pub ports: String,
}

impl Snapshot {
    /// Capture the current machine state.
    #[must_use]
    pub fn capture(machine: &mut Z80Machine) -> Self {
        let regs = &machine.cpu().regs;
        let cpu = CpuState {
            a: regs.a,
            f: regs.f,
            b: regs.b,
            c: regs.c,
            d: regs.d,
            e: regs.e,
            h: regs.h,
            l: regs.l,
            a_alt: regs.a_alt,
            f_alt: regs.f_alt,
            b_alt: regs.b_alt,
            c_alt: regs.c_alt,
            d_alt: regs.d_alt,
            e_alt: regs.e_alt,
            h_alt: regs.h_alt,
            l_alt: regs.l_alt,
            ix: regs.ix,
            iy: regs.iy,
            sp: regs.sp,
            pc: regs.pc,
            i: regs.i,
            r: regs.r,
            wz: regs.wz,
            iff1: regs.iff1,
            iff2: regs.iff2,
            im: regs.im,
            halted: regs.halted,
        };
        let cycles = machine.cycle_count();

        let mut memory = Vec::with_capacity(MEMORY_SIZE);
        for addr in 0..MEMORY_SIZE {
            memory.push(machine.read_memory(addr as u16));
        }
        let mut ports = Vec::with_capacity(PORT_COUNT);
        for port in 0..PORT_COUNT {
            ports.push(machine.read_port(port as u8));
        }

        Self {
            cpu,
            cycles,
            memory: BASE64.encode(&memory),
            ports: BASE64.encode(&ports),
        }
    }

    /// Restore this snapshot into the given machine.
    ///
    /// # Errors
    ///
    /// Fails if either image is not valid base64 or has the wrong size;
    /// the machine is left unchanged in that case.
    pub fn restore(&self, machine: &mut Z80Machine) -> Result<(), SnapshotError> {
        let memory = BASE64.decode(&self.memory)?;
        if memory.len() != MEMORY_SIZE {
            return Err(SnapshotError::BadMemorySize(memory.len()));
        }
        let ports = BASE64.decode(&self.ports)?;
        if ports.len() != PORT_COUNT {
            return Err(SnapshotError::BadPortSize(ports.len()));
        }

        log::debug!("restoring snapshot at cycle {}", self.cycles);

        for (addr, &byte) in memory.iter().enumerate() {
            machine.write_memory(addr as u16, byte);
        }
        for (port, &byte) in ports.iter().enumerate() {
            machine.write_port(port as u8, byte);
        }

        let cpu = machine.cpu_mut();
        let state = &self.cpu;
        let regs = &mut cpu.regs;
        regs.a = state.a;
        regs.f = state.f;
        regs.b = state.b;
        regs.c = state.c;
        regs.d = state.d;
        regs.e = state.e;
        regs.h = state.h;
        regs.l = state.l;
        regs.a_alt = state.a_alt;
        regs.f_alt = state.f_alt;
        regs.b_alt = state.b_alt;
        regs.c_alt = state.c_alt;
        regs.d_alt = state.d_alt;
        regs.e_alt = state.e_alt;
        regs.h_alt = state.h_alt;
        regs.l_alt = state.l_alt;
        regs.ix = state.ix;
        regs.iy = state.iy;
        regs.sp = state.sp;
        regs.pc = state.pc;
        regs.i = state.i;
        regs.r = state.r;
        regs.wz = state.wz;
        regs.iff1 = state.iff1;
        regs.iff2 = state.iff2;
        regs.im = state.im;
        regs.halted = state.halted;
        cpu.set_cycle_count(self.cycles);

        Ok(())
    }

    /// Serialise to a JSON string.
    ///
    /// # Errors
    ///
    /// Only on serialiser failure, which does not happen for this type.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Json` on malformed input.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}
