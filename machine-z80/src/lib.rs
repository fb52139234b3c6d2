//! A headless single-board Z80 machine.
//!
//! Wires the CPU to a flat 64 KiB RAM and 256 port latches, and carries
//! the host-facing conveniences: program loading, bounded runs, full
//! state snapshots, and a JSON-RPC control server for scripting.

mod machine;
pub mod mcp;
pub mod snapshot;

pub use machine::Z80Machine;
pub use snapshot::{Snapshot, SnapshotError};
