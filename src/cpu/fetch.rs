//! Prefetch/fetch unit and stack primitives.
//!
//! Maintains the invariant that `prefetch == mem[PC]` at every instruction
//! boundary: each `fetch_byte` hands back the byte already sitting in the
//! cache, advances `PC`, and refills the cache from the new `PC` — so the
//! *next* instruction's opcode byte is always charged against the
//! *current* instruction's cycle count, matching the source's interleaved
//! prefetch behavior.

use super::Cpu;
use crate::bus::{Bus, DebugReason};

impl Cpu {
    /// Check `addr` (already translated) for a pending debug trap and, if
    /// one fires and we are not already inside the debugger, enter it
    /// before the byte at that address is consumed.
    fn check_breakpoint(&self, bus: &mut dyn Bus, translated: u32, pc: u32) {
        if bus.in_debugger() {
            return;
        }
        let flags = bus.debug_flags(translated);
        if flags.contains(crate::bus::DebugFlags::EXEC_BREAKPOINT) {
            bus.enter_debugger(DebugReason::ExecBreakpoint, pc);
        } else if flags.contains(crate::bus::DebugFlags::STEP_OVER_BREAKPOINT) {
            bus.enter_debugger(DebugReason::StepOverBreakpoint, pc);
        }
    }

    /// Return the prefetch byte, advance `PC` by one (wrapping at the
    /// current instruction-fetch width), and refill the cache. Traps into
    /// the debugger *before* the byte is handed back, per §4.2.
    pub(super) fn fetch_byte(&mut self, bus: &mut dyn Bus) -> u8 {
        let translated = self.translate_instr(self.pc);
        self.check_breakpoint(bus, translated, self.pc);
        let byte = self.prefetch;

        self.pc = self.pc.wrapping_add(1) & flags_width_mask(self.il);
        let next_translated = self.translate_instr(self.pc);
        self.prefetch = bus.mem_read(next_translated);

        byte
    }

    /// Two bytes, low then high, always; a third (upper) byte iff `IL=1`.
    pub(super) fn fetch_word(&mut self, bus: &mut dyn Bus) -> u32 {
        let lo = self.fetch_byte(bus) as u32;
        let hi = self.fetch_byte(bus) as u32;
        if self.il {
            let up = self.fetch_byte(bus) as u32;
            lo | (hi << 8) | (up << 16)
        } else {
            lo | (hi << 8)
        }
    }

    /// Like [`Self::fetch_word`], but for instructions (`JP nn`, `CALL
    /// nn`) that must not leave the ordinary post-fetch prefetch valid:
    /// the last byte is read through the already-held prefetch cache and
    /// `PC` is incremented without refilling. The executor is responsible
    /// for reloading the prefetch at the jump target via
    /// [`Cpu::prefetch_at`].
    pub(super) fn fetch_word_no_prefetch(&mut self, bus: &mut dyn Bus) -> u32 {
        let lo = self.fetch_byte(bus) as u32;
        if !self.il {
            let translated = self.translate_instr(self.pc);
            self.check_breakpoint(bus, translated, self.pc);
            let hi = self.prefetch as u32;
            self.pc = self.pc.wrapping_add(1) & flags_width_mask(self.il);
            return lo | (hi << 8);
        }
        let hi = self.fetch_byte(bus) as u32;
        let translated = self.translate_instr(self.pc);
        self.check_breakpoint(bus, translated, self.pc);
        let up = self.prefetch as u32;
        self.pc = self.pc.wrapping_add(1) & flags_width_mask(self.il);
        lo | (hi << 8) | (up << 16)
    }

    /// Signed 8-bit displacement, e.g. for `JR`/`DJNZ`/`(IX+d)`.
    pub(super) fn fetch_offset(&mut self, bus: &mut dyn Bus) -> i8 {
        self.fetch_byte(bus) as i8
    }

    /// Push one byte, pre-decrementing the logical stack pointer.
    pub(super) fn push_byte(&mut self, bus: &mut dyn Bus, val: u8) {
        self.set_sp(self.sp().wrapping_sub(1));
        let translated = self.translate_data(self.sp());
        bus.mem_write(translated, val);
    }

    /// Pop one byte, post-incrementing the logical stack pointer.
    pub(super) fn pop_byte(&mut self, bus: &mut dyn Bus) -> u8 {
        let translated = self.translate_data(self.sp());
        let val = bus.mem_read(translated);
        self.set_sp(self.sp().wrapping_add(1));
        val
    }

    /// Push a 16-bit word, high byte first (so it pops low-to-high).
    pub(super) fn push_word(&mut self, bus: &mut dyn Bus, val: u16) {
        self.push_byte(bus, (val >> 8) as u8);
        self.push_byte(bus, val as u8);
    }

    /// Pop a 16-bit word.
    pub(super) fn pop_word(&mut self, bus: &mut dyn Bus) -> u16 {
        let lo = self.pop_byte(bus) as u16;
        let hi = self.pop_byte(bus) as u16;
        lo | (hi << 8)
    }

    /// Push an address: 3 bytes when `l`, else 2.
    pub(super) fn push_addr(&mut self, bus: &mut dyn Bus, val: u32) {
        if self.l {
            self.push_byte(bus, (val >> 16) as u8);
            self.push_byte(bus, (val >> 8) as u8);
            self.push_byte(bus, val as u8);
        } else {
            self.push_word(bus, val as u16);
        }
    }

    /// Pop an address: 3 bytes when `l`, else 2.
    pub(super) fn pop_addr(&mut self, bus: &mut dyn Bus) -> u32 {
        if self.l {
            let lo = self.pop_byte(bus) as u32;
            let mid = self.pop_byte(bus) as u32;
            let hi = self.pop_byte(bus) as u32;
            lo | (mid << 8) | (hi << 16)
        } else {
            self.pop_word(bus) as u32
        }
    }
}

#[inline]
fn flags_width_mask(il: bool) -> u32 {
    super::flags::width_mask(il)
}
