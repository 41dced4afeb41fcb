//! eZ80 CPU tests
//!
//! - invariants.rs: universal properties that hold across every opcode
//!   (prefetch cache, R increment, PREFIX/SUFFIX lifetime, undefined-flag
//!   propagation) and round-trip properties (EX/EXX, PUSH/POP, LDIR).
//! - snapshot.rs: `save_state`/`restore_state` and the `to_bytes`/
//!   `restore_bytes` flat-buffer mirror round-trip.
//!
//! The six literal worked examples live in `tests/scheduler.rs` instead,
//! driven through [`crate::Scheduler`] against [`FlatBus`] the way a real
//! host would run this core.
//!
//! # References
//! - Zilog eZ80 CPU User Manual (UM0077)
//! - CEmu (<https://github.com/CE-Programming/CEmu>)

use super::*;
use crate::bus::{Bus, FlatBus};

mod invariants;

/// A CPU flushed to ADL mode (`ADL=1`) at `pc=0` against a zeroed bus.
fn adl_cpu() -> (Cpu, FlatBus) {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.flush(&mut bus, 0, true);
    (cpu, bus)
}

/// A CPU reset to Z80 mode (`ADL=0`) at `pc=0` against a zeroed bus.
fn z80_cpu() -> (Cpu, FlatBus) {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    (cpu, bus)
}
