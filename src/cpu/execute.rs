//! Primary-page decoder/executor, ALU core, CALL/RET framing, and the
//! x0..x3 opcode grid.
//!
//! The opcode byte is viewed as `xxyyyzzz` with `p = (y>>1)&3, q = y&1`,
//! exactly as the classic Z80 decode table (and as the source's decoder
//! does it). `CB`/`ED`/`DD`/`FD` and the SIS/LIS/SIL/LIL suffixes are
//! intercepted in [`Cpu::step`] before reaching [`Cpu::execute_primary`];
//! everything else falls through to the shared x0..x3 grid below, which
//! is prefix-aware through [`Cpu::get_reg8`]/[`Cpu::get_rp`] rather than
//! being duplicated per prefix.

use super::{flags, Cpu, Prefix, Suffix};
use crate::bus::Bus;

impl Cpu {
    /// Execute exactly one opcode fetch + dispatch, returning the cycles
    /// it consumed. A DD/FD prefix byte or a SIS/LIS/SIL/LIL suffix byte
    /// also counts as one call: the latch is set and `PREFIX`/`SUFFIX` are
    /// *not* cleared, so the scheduler's inner loop (`PREFIX ∨ SUFFIX ∨
    /// delta < 0`) naturally keeps calling `step` until a real instruction
    /// completes and calls [`Cpu::reset_cntrl_data_blocks_format`].
    pub fn step(&mut self, bus: &mut dyn Bus) -> u32 {
        self.cycles = 0;
        let opcode = self.fetch_byte(bus);
        self.bump_r();

        match opcode {
            0xCB => {
                self.execute_cb(bus);
                self.reset_cntrl_data_blocks_format();
            }
            0xED => {
                self.prefix = Prefix::None;
                self.execute_ed(bus);
                self.reset_cntrl_data_blocks_format();
            }
            0xDD => {
                self.prefix = Prefix::Dd;
                self.cycles += 1;
            }
            0xFD => {
                self.prefix = Prefix::Fd;
                self.cycles += 1;
            }
            _ => {
                let x = (opcode >> 6) & 0x03;
                let y = (opcode >> 3) & 0x07;
                let z = opcode & 0x07;
                let p = (y >> 1) & 0x03;
                let q = y & 0x01;

                if x == 1 && y == z && z < 4 {
                    let suffix = Suffix::from_z(z);
                    let (l, il) = suffix.widths();
                    self.suffix = Some(suffix);
                    self.l = l;
                    self.il = il;
                    self.cycles += 1;
                } else if self.prefix != Prefix::None
                    && self.execute_index_extension(bus, x, y, z, p, q)
                {
                    self.reset_cntrl_data_blocks_format();
                } else {
                    self.execute_primary(bus, x, y, z, p, q);
                    self.reset_cntrl_data_blocks_format();
                }
            }
        }

        self.cycles
    }

    /// The x=0..3 primary-page grid, shared between unprefixed and
    /// DD/FD-prefixed execution (prefix substitution happens inside the
    /// register accessors).
    fn execute_primary(&mut self, bus: &mut dyn Bus, x: u8, y: u8, z: u8, p: u8, q: u8) {
        match x {
            0 => self.execute_x0(bus, y, z, p, q),
            1 => {
                if y == 6 && z == 6 {
                    self.cycles += 1;
                    self.halted = true;
                } else {
                    let val = self.get_reg8(z, bus);
                    self.set_reg8(y, val, bus);
                    if z == 6 || y == 6 {
                        self.cycles += 1;
                    }
                }
            }
            2 => {
                let val = self.get_reg8(z, bus);
                self.execute_alu(y, val);
                if z == 6 {
                    self.cycles += 1;
                }
            }
            3 => self.execute_x3(bus, y, z, p, q),
            _ => unreachable!("x is always 0..=3"),
        }
    }

    fn execute_x0(&mut self, bus: &mut dyn Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => match y {
                0 => {}
                1 => self.ex_af(),
                2 => {
                    self.set_b(self.b().wrapping_sub(1));
                    let d = self.fetch_offset(bus);
                    if self.b() != 0 {
                        self.jr(bus, d);
                        self.cycles += 1;
                    }
                }
                3 => {
                    let d = self.fetch_offset(bus);
                    self.jr(bus, d);
                }
                _ => {
                    let d = self.fetch_offset(bus);
                    if self.check_cc(y - 4) {
                        self.jr(bus, d);
                        self.cycles += 1;
                    }
                }
            },
            1 => {
                if q == 0 {
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                } else {
                    let a = self.indexed_pair();
                    let b = self.get_rp(p);
                    let result = self.add16(a, b);
                    self.set_indexed_pair(result);
                }
            }
            2 => self.execute_ld_indirect(bus, p, q),
            3 => {
                let val = self.get_rp(p);
                if q == 0 {
                    self.set_rp(p, val.wrapping_add(1));
                } else {
                    self.set_rp(p, val.wrapping_sub(1));
                }
            }
            4 => {
                let v = self.get_reg8(y, bus);
                let r = self.alu_inc(v);
                self.set_reg8(y, r, bus);
                if y == 6 {
                    self.cycles += 1;
                }
            }
            5 => {
                let v = self.get_reg8(y, bus);
                let r = self.alu_dec(v);
                self.set_reg8(y, r, bus);
                if y == 6 {
                    self.cycles += 1;
                }
            }
            6 => {
                let n = self.fetch_byte(bus);
                self.set_reg8(y, n, bus);
                if y == 6 {
                    self.cycles += 1;
                }
            }
            7 => self.execute_x0_z7(y),
            _ => unreachable!("z is always 0..=7"),
        }
    }

    fn execute_ld_indirect(&mut self, bus: &mut dyn Bus, p: u8, q: u8) {
        match (p, q) {
            (0, 0) => {
                let translated = self.translate_data(self.bc);
                bus.mem_write(translated, self.a);
            }
            (0, 1) => {
                let translated = self.translate_data(self.bc);
                self.a = bus.mem_read(translated);
            }
            (1, 0) => {
                let translated = self.translate_data(self.de);
                bus.mem_write(translated, self.a);
            }
            (1, 1) => {
                let translated = self.translate_data(self.de);
                self.a = bus.mem_read(translated);
            }
            (2, 0) => {
                let nn = self.fetch_word(bus);
                let val = self.indexed_pair();
                self.write_word_at(bus, nn, val);
            }
            (2, 1) => {
                let nn = self.fetch_word(bus);
                let val = self.read_word_at(bus, nn);
                self.set_indexed_pair(val);
            }
            (3, 0) => {
                let nn = self.fetch_word(bus);
                let translated = self.translate_data(nn);
                bus.mem_write(translated, self.a);
            }
            (3, 1) => {
                let nn = self.fetch_word(bus);
                let translated = self.translate_data(nn);
                self.a = bus.mem_read(translated);
            }
            _ => unreachable!(),
        }
    }

    fn execute_x0_z7(&mut self, y: u8) {
        match y {
            0 => {
                let c = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.after_rotate_a(c);
            }
            1 => {
                let c = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.after_rotate_a(c);
            }
            2 => {
                let c = self.a & 0x80 != 0;
                self.a = (self.a << 1) | (self.flag_c() as u8);
                self.after_rotate_a(c);
            }
            3 => {
                let c = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | ((self.flag_c() as u8) << 7);
                self.after_rotate_a(c);
            }
            4 => self.daa(),
            5 => {
                self.a = !self.a;
                self.set_flag_h(true);
                self.set_flag_n(true);
                self.f = flags::copy_undef_from(self.f, self.a);
            }
            6 => {
                self.f = flags::copy_undef_from(self.f, self.a);
                self.set_flag_h(false);
                self.set_flag_n(false);
                self.set_flag_c(true);
            }
            7 => {
                let h = self.flag_c();
                self.f = flags::copy_undef_from(self.f, self.a);
                self.set_flag_h(h);
                self.set_flag_n(false);
                self.set_flag_c(!h);
            }
            _ => unreachable!(),
        }
    }

    fn after_rotate_a(&mut self, carry_out: bool) {
        self.f = flags::copy_undef_from(self.f, self.a);
        self.set_flag_h(false);
        self.set_flag_n(false);
        self.set_flag_c(carry_out);
    }

    /// `DAA`. Preserves the source's behavior of computing `H` from the
    /// pre-adjustment value rather than re-deriving it against the
    /// correction constant (see the Open Questions decision in
    /// DESIGN.md).
    fn daa(&mut self) {
        let a = self.a;
        let mut correction = 0u8;
        let mut carry = self.flag_c();
        let half = self.flag_h();
        let sub = self.flag_n();

        if half || (!sub && (a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if carry || (!sub && a > 0x99) {
            correction |= 0x60;
            carry = true;
        }

        let result = if sub {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };

        let new_half = if sub {
            half && (a & 0x0F) < 0x06
        } else {
            (a & 0x0F) + (correction & 0x0F) > 0x0F
        };

        self.a = result;
        self.set_sz_flags(result);
        self.set_flag_pv(flags::parity(result));
        self.set_flag_h(new_half);
        self.set_flag_c(carry);
    }

    fn jr(&mut self, bus: &mut dyn Bus, offset: i8) {
        let target = (self.pc as i64 + offset as i64) as u32;
        let masked = target & flags::width_mask(self.il);
        self.prefetch_at(bus, masked);
    }

    pub(super) fn jp_to(&mut self, bus: &mut dyn Bus, addr: u32) {
        self.prefetch_at(bus, addr);
    }

    pub(super) fn read_word_at(&mut self, bus: &mut dyn Bus, addr: u32) -> u32 {
        let t0 = self.translate_data(addr);
        let lo = bus.mem_read(t0) as u32;
        let t1 = self.translate_data(addr.wrapping_add(1));
        let hi = bus.mem_read(t1) as u32;
        if self.l {
            let t2 = self.translate_data(addr.wrapping_add(2));
            let up = bus.mem_read(t2) as u32;
            lo | (hi << 8) | (up << 16)
        } else {
            lo | (hi << 8)
        }
    }

    pub(super) fn write_word_at(&mut self, bus: &mut dyn Bus, addr: u32, val: u32) {
        let t0 = self.translate_data(addr);
        bus.mem_write(t0, val as u8);
        let t1 = self.translate_data(addr.wrapping_add(1));
        bus.mem_write(t1, (val >> 8) as u8);
        if self.l {
            let t2 = self.translate_data(addr.wrapping_add(2));
            bus.mem_write(t2, (val >> 16) as u8);
        }
    }

    fn execute_x3(&mut self, bus: &mut dyn Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                if self.check_cc(y) {
                    let addr = self.pop_addr(bus);
                    self.cycles += 1;
                    self.jp_to(bus, addr);
                }
            }
            1 => {
                if q == 0 {
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                } else {
                    match y {
                        1 => self.ret(bus),
                        3 => self.exx(),
                        5 => self.jp_to_hl(bus),
                        7 => {
                            let sp = self.indexed_pair();
                            self.set_sp(sp);
                        }
                        _ => unreachable!(),
                    }
                }
            }
            2 => {
                let nn = self.fetch_word_no_prefetch(bus);
                if self.check_cc(y) {
                    self.jp_to(bus, nn);
                } else {
                    self.prefetch_at_same_pc(bus);
                }
            }
            3 => match y {
                0 => {
                    let nn = self.fetch_word_no_prefetch(bus);
                    self.jp_to(bus, nn);
                }
                1 => self.execute_cb(bus),
                2 => {
                    let n = self.fetch_byte(bus);
                    bus.port_write(n as u16, self.a);
                }
                3 => {
                    let n = self.fetch_byte(bus);
                    self.a = bus.port_read(n as u16);
                }
                4 => {
                    let sp_addr = self.sp();
                    let lo = self.read_word_at(bus, sp_addr);
                    let hi = self.indexed_pair();
                    self.write_word_at(bus, sp_addr, hi);
                    self.set_indexed_pair(lo);
                    self.cycles += 2;
                }
                5 => self.ex_de_hl(),
                6 => {
                    self.iff1 = false;
                    self.iff2 = false;
                }
                7 => self.ief_wait = true,
                _ => unreachable!(),
            },
            4 => {
                let nn = self.fetch_word_no_prefetch(bus);
                if self.check_cc(y) {
                    self.call(bus, nn);
                } else {
                    self.prefetch_at_same_pc(bus);
                }
            }
            5 => {
                if q == 0 {
                    let val = self.get_rp2(p);
                    self.cycles += 1;
                    self.push_word(bus, val);
                } else if y == 1 {
                    let nn = self.fetch_word_no_prefetch(bus);
                    self.call(bus, nn);
                } else {
                    self.prefetch_at_same_pc(bus);
                }
            }
            6 => {
                let n = self.fetch_byte(bus);
                self.execute_alu(y, n);
            }
            7 => {
                let target = (y as u32) * 8;
                self.call(bus, target);
            }
            _ => unreachable!(),
        }
    }

    /// When a conditional CALL/JP is *not* taken after a
    /// `fetch_word_no_prefetch`, the executor still owns refilling
    /// prefetch at the (unchanged) `pc` — `fetch_word_no_prefetch` leaves
    /// the cache stale by design.
    fn prefetch_at_same_pc(&mut self, bus: &mut dyn Bus) {
        let pc = self.pc;
        self.prefetch_at(bus, pc);
    }

    fn jp_to_hl(&mut self, bus: &mut dyn Bus) {
        let target = self.indexed_pair() & flags::width_mask(self.il);
        self.prefetch_at(bus, target);
    }

    /// Plain (non mixed-mode) `CALL`: push the return address and jump.
    /// Mixed-mode framing (tag byte when a suffix is active) is applied
    /// automatically whenever `suffix` is set for this instruction.
    pub(super) fn call(&mut self, bus: &mut dyn Bus, target: u32) {
        if self.suffix.is_some() {
            self.call_mixed(bus, target);
            return;
        }
        let ret = self.pc;
        self.push_addr(bus, ret);
        self.jp_to(bus, target);
    }

    /// Mixed-mode `CALL` frame (§4.5 "Calls and returns"): used whenever a
    /// suffix changed this instruction's widths away from the ambient
    /// `ADL`.
    fn call_mixed(&mut self, bus: &mut dyn Bus, target: u32) {
        let ret = self.pc;
        if self.adl {
            self.spl_push_byte(bus, (ret >> 16) as u8);
        }
        let long_data = self.il || (self.l && !self.adl);
        if long_data {
            self.spl_push_word(bus, ret as u16);
        } else {
            self.sps_push_word(bus, ret as u16);
        }
        let tag = ((self.madl as u8) << 1) | (self.adl as u8);
        self.spl_push_byte(bus, tag);
        self.jp_to(bus, target);
    }

    fn spl_push_byte(&mut self, bus: &mut dyn Bus, val: u8) {
        self.spl = self.spl.wrapping_sub(1) & 0x00FF_FFFF;
        let translated = self.translate_data(self.spl);
        bus.mem_write(translated, val);
    }

    fn spl_push_word(&mut self, bus: &mut dyn Bus, val: u16) {
        self.spl_push_byte(bus, (val >> 8) as u8);
        self.spl_push_byte(bus, val as u8);
    }

    fn sps_push_word(&mut self, bus: &mut dyn Bus, val: u16) {
        self.sps = self.sps.wrapping_sub(1);
        let translated = self.translate_data(self.sps as u32);
        bus.mem_write(translated, (val >> 8) as u8);
        self.sps = self.sps.wrapping_sub(1);
        let translated = self.translate_data(self.sps as u32);
        bus.mem_write(translated, val as u8);
    }

    /// Plain `RET`. The mixed-mode pop (tag byte recovery) happens only
    /// when a suffix is active for this `RET`.
    pub(super) fn ret(&mut self, bus: &mut dyn Bus) {
        if self.suffix.is_some() {
            self.ret_mixed(bus);
            return;
        }
        let target = self.pop_addr(bus);
        self.jp_to(bus, target);
    }

    fn ret_mixed(&mut self, bus: &mut dyn Bus) {
        let tag = self.spl_pop_byte(bus);
        let popped_adl = tag & 0x01 != 0;
        let popped_madl = tag & 0x02 != 0;

        let long_data = self.il || (self.l && !self.adl);
        let (lo, hi) = if long_data {
            (self.spl_pop_byte(bus) as u32, self.spl_pop_byte(bus) as u32)
        } else {
            (self.sps_pop_byte(bus) as u32, self.sps_pop_byte(bus) as u32)
        };
        let mut target = lo | (hi << 8);
        if popped_adl {
            let up = self.spl_pop_byte(bus) as u32;
            target |= up << 16;
        }

        self.adl = popped_adl;
        self.madl = popped_madl;
        self.jp_to(bus, target);
    }

    fn spl_pop_byte(&mut self, bus: &mut dyn Bus) -> u8 {
        let translated = self.translate_data(self.spl);
        let val = bus.mem_read(translated);
        self.spl = self.spl.wrapping_add(1) & 0x00FF_FFFF;
        val
    }

    fn sps_pop_byte(&mut self, bus: &mut dyn Bus) -> u8 {
        let translated = self.translate_data(self.sps as u32);
        let val = bus.mem_read(translated);
        self.sps = self.sps.wrapping_add(1);
        val
    }

    /// `RETN`/`RETI`: restore `IFF1` from `IFF2` before the ordinary
    /// (possibly mixed-mode) return.
    pub(super) fn retn(&mut self, bus: &mut dyn Bus) {
        self.iff1 = self.iff2;
        self.ret(bus);
    }

    /// ADD (no carry) at the current data width, used by `ADD HL,rp` and
    /// its DD/FD-substituted forms.
    fn add16(&mut self, a: u32, b: u32) -> u32 {
        let long = self.l;
        let mask = flags::width_mask(long);
        let result = a.wrapping_add(b) & mask;
        self.set_flag_n(false);
        self.set_flag_h(flags::half_carry_add_w(a, b, 0));
        self.set_flag_c(flags::carry_add_w(a, b, 0, long));
        let undef_byte = if long {
            (result >> 16) as u8
        } else {
            (result >> 8) as u8
        };
        self.f = flags::copy_undef_from(self.f, undef_byte);
        result
    }

    /// The 8-bit ALU grid selected by `y`: `0=ADD 1=ADC 2=SUB 3=SBC 4=AND
    /// 5=XOR 6=OR 7=CP`.
    pub(super) fn execute_alu(&mut self, y: u8, val: u8) {
        match y {
            0 => {
                self.alu_add(val, false);
            }
            1 => {
                self.alu_add(val, true);
            }
            2 => {
                self.alu_sub(val, false);
            }
            3 => {
                self.alu_sub(val, true);
            }
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            7 => {
                let saved = self.a;
                self.alu_sub(val, false);
                self.a = saved;
            }
            _ => unreachable!("ALU y is always 0..=7"),
        }
    }

    fn alu_add(&mut self, val: u8, with_carry: bool) -> u8 {
        let carry_in = if with_carry && self.flag_c() { 1u8 } else { 0 };
        let a = self.a;
        let result = a.wrapping_add(val).wrapping_add(carry_in);
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_add(a, val, carry_in));
        self.set_flag_pv(flags::overflow_add8(a, val, result));
        self.set_flag_n(false);
        self.set_flag_c(flags::carry_add8(a, val, carry_in));
        self.a = result;
        result
    }

    fn alu_sub(&mut self, val: u8, with_carry: bool) -> u8 {
        let carry_in = if with_carry && self.flag_c() { 1u8 } else { 0 };
        let a = self.a;
        let result = a.wrapping_sub(val).wrapping_sub(carry_in);
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_sub(a, val, carry_in));
        self.set_flag_pv(flags::overflow_sub8(a, val, result));
        self.set_flag_n(true);
        self.set_flag_c(flags::carry_sub8(a, val, carry_in));
        self.a = result;
        result
    }

    fn alu_and(&mut self, val: u8) {
        self.a &= val;
        self.set_sz_flags(self.a);
        self.set_flag_h(true);
        self.set_flag_pv(flags::parity(self.a));
        self.set_flag_n(false);
        self.set_flag_c(false);
    }

    fn alu_or(&mut self, val: u8) {
        self.a |= val;
        self.set_sz_flags(self.a);
        self.set_flag_h(false);
        self.set_flag_pv(flags::parity(self.a));
        self.set_flag_n(false);
        self.set_flag_c(false);
    }

    fn alu_xor(&mut self, val: u8) {
        self.a ^= val;
        self.set_sz_flags(self.a);
        self.set_flag_h(false);
        self.set_flag_pv(flags::parity(self.a));
        self.set_flag_n(false);
        self.set_flag_c(false);
    }

    pub(super) fn alu_inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        let old_c = self.flag_c();
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_add(val, 1, 0));
        self.set_flag_pv(val == 0x7F);
        self.set_flag_n(false);
        self.set_flag_c(old_c);
        result
    }

    pub(super) fn alu_dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        let old_c = self.flag_c();
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_sub(val, 1, 0));
        self.set_flag_pv(val == 0x80);
        self.set_flag_n(true);
        self.set_flag_c(old_c);
        result
    }

    /// Service EI latency and a pending interrupt, called by the scheduler
    /// at the top of its outer loop (§4.5 "Interrupts"), never mid-
    /// instruction. Returns `true` if an interrupt was acknowledged, so the
    /// caller can log it and fold the extra cycle into its own budget.
    pub(crate) fn service_interrupt(&mut self, bus: &mut dyn Bus, pending: bool) -> bool {
        if self.ief_wait {
            self.ief_wait = false;
            self.iff1 = true;
            self.iff2 = true;
        }

        if !(self.iff1 && pending) {
            return false;
        }

        self.iff1 = false;
        self.iff2 = false;
        self.halted = false;
        self.cycles = 1;

        if self.im != 3 {
            self.call(bus, 0x38);
        } else {
            let vector_addr = ((self.i as u32) << 8) | (!self.r as u32 & 0xFF);
            let target = self.read_word_at(bus, vector_addr);
            self.call(bus, target);
            self.cycles += self.cycles;
        }

        true
    }
}
