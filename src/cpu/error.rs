//! Error taxonomy for the small set of host-facing failures that are
//! actually possible at this layer.
//!
//! Per the design's error taxonomy, opcode traps and debug traps are
//! architectural states, not Rust errors — an unrecognized encoding sets
//! `IEF_wait` and execution continues; a breakpointed fetch calls into
//! [`crate::bus::Bus::enter_debugger`]. Register-index tables are
//! exhaustive by construction, so an out-of-range index is a programmer
//! bug and panics rather than returning a `Result`. The only real,
//! recoverable failure mode at this layer is a malformed snapshot buffer
//! handed to [`crate::cpu::Cpu::restore_bytes`].

use thiserror::Error;

/// Failures a host can actually observe from the CPU core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A snapshot buffer passed to `restore_bytes` was the wrong length.
    #[error("snapshot buffer has length {actual}, expected {expected}")]
    InvalidSnapshotLength {
        /// The length the buffer should have been.
        expected: usize,
        /// The length it actually was.
        actual: usize,
    },
}
