//! Cycle-budget driver.
//!
//! The CPU core is cooperative, not preemptive: a host hands [`Scheduler`]
//! a negative cycle budget and it calls [`crate::cpu::Cpu::step`] in a loop
//! until the budget is exhausted, `exiting` is set, HALT drains the whole
//! budget, or a single-step debug event fires. Everything the core reads
//! from the outside world — `exiting`, `cpu_events`, the interrupt
//! controller's status/enabled masks — is sampled only at the documented
//! points in [`Scheduler::run`], never mid-instruction (§4.6/§5).

use log::{debug, trace};

use crate::bus::{Bus, CpuEvents};
use crate::cpu::{Cpu, Prefix};

/// Drives a [`Cpu`] against a [`Bus`] for a caller-supplied cycle budget.
///
/// Holds no CPU/bus state of its own — both are borrowed for the duration
/// of [`Scheduler::run`] — so a host can keep one `Scheduler` around or
/// build one per call; either is fine.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    /// Cooperative cancellation, tested at both loop heads. Never flips
    /// mid-instruction.
    pub exiting: bool,
    /// Host-visible events (RESET, DEBUG_STEP, DEBUG_STEP_OVER, WAITING),
    /// read once per instruction.
    pub cpu_events: CpuEvents,
}

impl Scheduler {
    /// A fresh scheduler: not exiting, no pending events.
    pub fn new() -> Self {
        Self {
            exiting: false,
            cpu_events: CpuEvents::empty(),
        }
    }

    /// Run `cpu` against `bus` until `delta` (a negative cycle budget)
    /// reaches `>= 0`, `exiting` is set, or `DEBUG_STEP` fires. Returns the
    /// remaining `delta`.
    ///
    /// Outer loop: services EI latency and any pending interrupt once per
    /// pass, only between instructions. Inner loop: steps the CPU while a
    /// DD/FD prefix or SIS/LIS/SIL/LIL suffix is still chaining, or the
    /// budget is still negative.
    pub fn run(&mut self, cpu: &mut Cpu, bus: &mut dyn Bus, mut delta: i64) -> i64 {
        while !self.exiting && delta < 0 {
            let pending = bus.interrupt_status() & bus.interrupt_enabled() != 0;
            if cpu.service_interrupt(bus, pending) {
                debug!("interrupt acknowledged: im={} pc={:#08x}", cpu.im, cpu.pc);
                delta += cpu.cycles as i64;
            }

            while !self.exiting
                && (cpu.prefix != Prefix::None || cpu.suffix.is_some() || delta < 0)
            {
                if cpu.halted {
                    cpu.cycles = (-delta).max(0) as u32;
                    trace!("halted, draining remaining budget: cycles={}", cpu.cycles);
                } else {
                    let was_trap_candidate = cpu.prefix == Prefix::None && cpu.suffix.is_none();
                    cpu.step(bus);
                    if was_trap_candidate && cpu.ief_wait && cpu.cycles == 0 {
                        trace!("opcode trap at pc={:#08x}", cpu.pc);
                    }
                }

                if cpu.cycles == 0 {
                    cpu.cycles = 1;
                }
                delta += cpu.cycles as i64;

                if self.cpu_events.contains(CpuEvents::DEBUG_STEP) {
                    delta = 0;
                    break;
                }
            }
        }

        delta
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
