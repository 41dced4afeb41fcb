//! Memory/IO gateway between the CPU core and its host.
//!
//! The CPU never owns memory, ports, the debugger, or the interrupt
//! controller — it only consumes the narrow [`Bus`] trait. A host wires
//! up its own RAM/Flash/MMIO dispatch, breakpoint table, and interrupt
//! controller behind this trait; the CPU core has no opinion on how any
//! of that is implemented.

use std::collections::HashMap;

bitflags::bitflags! {
    /// Per-byte debug flags consulted on every instruction/operand fetch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u8 {
        /// Fetching this address should trap into the debugger.
        const EXEC_BREAKPOINT = 0b0000_0001;
        /// Fetching this address should trap only when single-stepping over a call.
        const STEP_OVER_BREAKPOINT = 0b0000_0010;
    }
}

bitflags::bitflags! {
    /// Host-visible scheduler events, read by [`crate::scheduler::Scheduler`]
    /// at well-defined instruction boundaries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuEvents: u8 {
        /// A reset has been requested.
        const RESET = 0b0000_0001;
        /// Single-step: return to the host after exactly one instruction.
        const DEBUG_STEP = 0b0000_0010;
        /// Single-step-over: like `DEBUG_STEP` but a `CALL` runs to completion.
        const DEBUG_STEP_OVER = 0b0000_0100;
        /// The core is waiting (HALTed) for an interrupt.
        const WAITING = 0b0000_1000;
    }
}

/// Why the debugger was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugReason {
    /// The fetched address has `EXEC_BREAKPOINT` set.
    ExecBreakpoint,
    /// The fetched address has `STEP_OVER_BREAKPOINT` set.
    StepOverBreakpoint,
}

/// The gateway the CPU core uses to reach everything outside itself.
///
/// Addresses passed to `mem_*` are already translated (§4.2: 24-bit linear
/// in ADL mode, `(MBASE << 16) | addr16` otherwise) — implementors do not
/// need to re-apply MBASE paging.
pub trait Bus {
    /// Read one byte from translated address `addr`.
    fn mem_read(&mut self, addr: u32) -> u8;
    /// Write one byte to translated address `addr`.
    fn mem_write(&mut self, addr: u32, value: u8);
    /// Read one byte from 16-bit I/O port `port`.
    fn port_read(&mut self, port: u16) -> u8;
    /// Write one byte to 16-bit I/O port `port`.
    fn port_write(&mut self, port: u16, value: u8);

    /// Debug flags for translated address `addr`. Default: none set, so a
    /// host that doesn't implement a debugger needs no overrides.
    fn debug_flags(&self, _addr: u32) -> DebugFlags {
        DebugFlags::empty()
    }

    /// True while a debugger trap is already being serviced, so nested
    /// breakpoint hits don't recurse.
    fn in_debugger(&self) -> bool {
        false
    }

    /// Enter the debugger for `reason` at program counter `pc`. Called
    /// before the breakpointed byte is consumed.
    fn enter_debugger(&mut self, _reason: DebugReason, _pc: u32) {}

    /// Pending interrupt request bits (`interrupt.status`).
    fn interrupt_status(&self) -> u32 {
        0
    }

    /// Enabled interrupt bits (`interrupt.enabled`).
    fn interrupt_enabled(&self) -> u32 {
        0
    }

    /// `ED C3 EE`: fill a 16 KiB flash page at `base & !0x3FFF` with `0xFF`
    /// (the erased-flash value). This is an emulator extension, not a real
    /// eZ80 instruction — see DESIGN.md.
    #[cfg(feature = "flash-erase-opcode")]
    fn flash_erase_page(&mut self, base_addr: u32) {
        let _ = base_addr;
    }
}

/// A minimal flat-memory [`Bus`] used by this crate's own tests.
///
/// This is deliberately not a real memory subsystem (RAM/Flash/MMIO
/// dispatch is out of scope for the core, per §1) — it exists only so the
/// CPU's decoder/executor tests have something to read and write.
pub struct FlatBus {
    /// Linear 24-bit address space, fully populated (16 MiB).
    pub mem: Vec<u8>,
    /// 16-bit I/O port space.
    pub ports: [u8; 65536],
    /// Sparse per-address debug flags.
    pub breakpoints: HashMap<u32, DebugFlags>,
    /// Raised interrupt request bits.
    pub interrupt_status: u32,
    /// Enabled interrupt bits.
    pub interrupt_enabled: u32,
    /// Recorded debugger entries, for assertions in tests.
    pub debugger_log: Vec<(DebugReason, u32)>,
    in_debugger: bool,
}

impl FlatBus {
    /// Construct a zeroed 16 MiB address space with no breakpoints set.
    pub fn new() -> Self {
        Self {
            mem: vec![0u8; 1 << 24],
            ports: [0u8; 65536],
            breakpoints: HashMap::new(),
            interrupt_status: 0,
            interrupt_enabled: 0,
            debugger_log: Vec::new(),
            in_debugger: false,
        }
    }

    /// Load `bytes` into memory starting at `addr`.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let start = addr as usize;
        self.mem[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl Default for FlatBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatBus {
    fn mem_read(&mut self, addr: u32) -> u8 {
        self.mem[(addr as usize) & 0x00FF_FFFF]
    }

    fn mem_write(&mut self, addr: u32, value: u8) {
        self.mem[(addr as usize) & 0x00FF_FFFF] = value;
    }

    fn port_read(&mut self, port: u16) -> u8 {
        self.ports[port as usize]
    }

    fn port_write(&mut self, port: u16, value: u8) {
        self.ports[port as usize] = value;
    }

    fn debug_flags(&self, addr: u32) -> DebugFlags {
        self.breakpoints.get(&addr).copied().unwrap_or(DebugFlags::empty())
    }

    fn in_debugger(&self) -> bool {
        self.in_debugger
    }

    fn enter_debugger(&mut self, reason: DebugReason, pc: u32) {
        self.in_debugger = true;
        self.debugger_log.push((reason, pc));
        self.in_debugger = false;
    }

    fn interrupt_status(&self) -> u32 {
        self.interrupt_status
    }

    fn interrupt_enabled(&self) -> u32 {
        self.interrupt_enabled
    }

    #[cfg(feature = "flash-erase-opcode")]
    fn flash_erase_page(&mut self, base_addr: u32) {
        let page_base = (base_addr & !0x3FFF) as usize;
        for b in &mut self.mem[page_base..page_base + 0x4000] {
            *b = 0xFF;
        }
    }
}
