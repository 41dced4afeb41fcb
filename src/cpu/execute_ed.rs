//! `ED`-prefixed instructions: the classic x=1 grid (I/O, ADC/SBC HL,
//! NEG, RETN/RETI, IM, LD I/R/A, RRD/RLD), the eZ80 single-opcode
//! extensions squeezed into the x=0 traps and the x=1 duplicate-NOP
//! slots (LEA, TST, MLT, PEA, STMIX/RSMIX, LD MB,A), the x=2
//! block-instruction grid (LDI/LDD/CPI/CPD/INI/IND/OUTI/OUTD + repeats
//! and the eZ80 "2" DE-routed variants), and the small x=3 set
//! (INIRX/OTIRX/INDRX/OTDRX, LD I,HL / LD HL,I, flash erase).
//!
//! Byte placements for the eZ80-only single-opcode extensions
//! (LEA/PEA/STMIX/RSMIX/LD MB,A) are a best-effort approximation where
//! the distilled spec names the operation but not its exact encoding —
//! see the grounding ledger for the reasoning. `TST A,r`/`TST A,n`/`MLT
//! rp` follow the well-documented real placement.

use super::{flags, Cpu, Prefix};
use crate::bus::Bus;

impl Cpu {
    pub(super) fn execute_ed(&mut self, bus: &mut dyn Bus) {
        let opcode = self.fetch_byte(bus);
        self.bump_r();

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => self.execute_ed_x0(bus, y, z, p, q),
            1 => self.execute_ed_x1(bus, y, z, p, q),
            2 => self.execute_ed_x2(bus, y, z),
            3 => self.execute_ed_x3(bus, opcode, y, z),
            _ => unreachable!("x is always 0..=3"),
        }
    }

    fn opcode_trap(&mut self) {
        self.ief_wait = true;
    }

    fn execute_ed_x0(&mut self, bus: &mut dyn Bus, y: u8, z: u8, p: u8, _q: u8) {
        match z {
            2 if p < 3 => {
                let source = if y & 1 == 0 { self.ix } else { self.iy };
                let d = self.fetch_offset(bus);
                let val = self.mask(source.wrapping_add(d as i32 as u32));
                self.set_rp3(p, val);
            }
            4 => {
                let val = self.get_reg8(y, bus);
                self.tst(val);
            }
            6 if y == 6 => self.mbase = self.a,
            6 if y == 7 => self.a = self.mbase,
            7 if y == 0 => {
                let d = self.fetch_offset(bus);
                let val = self.mask(self.ix.wrapping_add(d as i32 as u32));
                self.push_addr(bus, val);
            }
            7 if y == 1 => {
                let d = self.fetch_offset(bus);
                let val = self.mask(self.iy.wrapping_add(d as i32 as u32));
                self.push_addr(bus, val);
            }
            _ => self.opcode_trap(),
        }
    }

    fn execute_ed_x1(&mut self, bus: &mut dyn Bus, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                let val = bus.port_read(self.bc as u16);
                self.set_sz_flags(val);
                self.set_flag_h(false);
                self.set_flag_pv(flags::parity(val));
                self.set_flag_n(false);
                if y != 6 {
                    self.set_reg8(y, val, bus);
                }
            }
            1 => {
                let val = if y == 6 { 0 } else { self.get_reg8(y, bus) };
                bus.port_write(self.bc as u16, val);
            }
            2 => {
                let operand = self.get_rp(p);
                if q == 0 {
                    self.sbc_hl(operand);
                } else {
                    self.adc_hl(operand);
                }
            }
            3 => {
                let nn = self.fetch_word(bus);
                if q == 0 {
                    let val = self.get_rp(p);
                    self.write_word_at(bus, nn, val);
                } else {
                    let val = self.read_word_at(bus, nn);
                    self.set_rp(p, val);
                }
            }
            4 => {
                if y == 4 {
                    let n = self.fetch_byte(bus);
                    self.tst(n);
                } else if y % 2 == 1 {
                    self.mlt(p);
                } else {
                    self.neg();
                }
            }
            5 => self.retn(bus),
            6 => {
                self.im = [0u8, 0, 1, 2, 0, 0, 1, 2][y as usize];
            }
            7 => match y {
                0 => self.i = (self.i & 0xFF00) | self.a as u16,
                1 => self.r = self.a,
                2 => {
                    self.a = self.i as u8;
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(self.iff2);
                    self.set_flag_h(false);
                    self.set_flag_n(false);
                }
                3 => {
                    self.a = self.r;
                    self.set_sz_flags(self.a);
                    self.set_flag_pv(self.iff2);
                    self.set_flag_h(false);
                    self.set_flag_n(false);
                }
                4 => self.rrd(bus),
                5 => self.rld(bus),
                6 => self.madl = true,
                7 => self.madl = false,
                _ => unreachable!("y is always 0..=7"),
            },
            _ => unreachable!("z is always 0..=7"),
        }
    }

    fn neg(&mut self) {
        let a = self.a;
        let result = 0u8.wrapping_sub(a);
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_sub(0, a, 0));
        self.set_flag_pv(a == 0x80);
        self.set_flag_n(true);
        self.set_flag_c(a != 0);
        self.a = result;
    }

    fn tst(&mut self, val: u8) {
        let result = self.a & val;
        self.set_sz_flags(result);
        self.set_flag_h(true);
        self.set_flag_pv(flags::parity(result));
        self.set_flag_n(false);
        self.set_flag_c(false);
    }

    /// Unsigned 8x8 multiply, high byte times low byte, written back into
    /// the same 16-bit pair. Flags are left untouched, matching real
    /// eZ80 `MLT` behavior.
    fn mlt(&mut self, p: u8) {
        let pair = self.get_rp(p) as u16;
        let hi = (pair >> 8) as u16;
        let lo = pair as u8 as u16;
        let result = hi.wrapping_mul(lo);
        self.set_rp(p, result as u32);
    }

    fn sbc_hl(&mut self, operand: u32) {
        let hl = self.indexed_pair_for_16();
        let carry_in = self.flag_c() as u32;
        let long = self.l;
        let mask = flags::width_mask(long);
        let result = hl.wrapping_sub(operand).wrapping_sub(carry_in) & mask;
        self.set_flag_s(flags::sign_w(result, long));
        self.set_flag_z(flags::zero_w(result, long));
        self.set_flag_h(flags::half_carry_sub_w(hl, operand, carry_in));
        self.set_flag_pv(flags::overflow_sub_w(hl, operand, result, long));
        self.set_flag_n(true);
        self.set_flag_c(flags::carry_sub_w(hl, operand, carry_in, long));
        self.hl = result;
    }

    fn adc_hl(&mut self, operand: u32) {
        let hl = self.indexed_pair_for_16();
        let carry_in = self.flag_c() as u32;
        let long = self.l;
        let mask = flags::width_mask(long);
        let result = hl.wrapping_add(operand).wrapping_add(carry_in) & mask;
        self.set_flag_s(flags::sign_w(result, long));
        self.set_flag_z(flags::zero_w(result, long));
        self.set_flag_h(flags::half_carry_add_w(hl, operand, carry_in));
        self.set_flag_pv(flags::overflow_add_w(hl, operand, result, long));
        self.set_flag_n(false);
        self.set_flag_c(flags::carry_add_w(hl, operand, carry_in, long));
        self.hl = result;
    }

    /// ADC/SBC HL always operate on the literal `HL`, never a DD/FD
    /// substitute — PREFIX was already cancelled on ED entry.
    fn indexed_pair_for_16(&self) -> u32 {
        debug_assert_eq!(self.prefix, Prefix::None);
        self.hl
    }

    fn rrd(&mut self, bus: &mut dyn Bus) {
        let translated = self.translate_data(self.hl);
        let mem = bus.mem_read(translated);
        let a_lo = self.a & 0x0F;
        let new_a = (self.a & 0xF0) | (mem & 0x0F);
        let new_mem = (mem >> 4) | (a_lo << 4);
        self.a = new_a;
        bus.mem_write(translated, new_mem);
        self.set_sz_flags(self.a);
        self.set_flag_pv(flags::parity(self.a));
        self.set_flag_h(false);
        self.set_flag_n(false);
    }

    fn rld(&mut self, bus: &mut dyn Bus) {
        let translated = self.translate_data(self.hl);
        let mem = bus.mem_read(translated);
        let a_lo = self.a & 0x0F;
        let new_a = (self.a & 0xF0) | (mem >> 4);
        let new_mem = (mem << 4) | a_lo;
        self.a = new_a;
        bus.mem_write(translated, new_mem);
        self.set_sz_flags(self.a);
        self.set_flag_pv(flags::parity(self.a));
        self.set_flag_h(false);
        self.set_flag_n(false);
    }

    /// `BC := BC - 1`, masked by the current data width; if `L=0` only
    /// the low 16 bits are written back, preserving BC's upper byte.
    fn dec_bc_partial(&mut self) {
        if self.l {
            self.bc = self.bc.wrapping_sub(1) & 0x00FF_FFFF;
        } else {
            let new = (self.bc as u16).wrapping_sub(1);
            self.bc = (self.bc & 0xFF_0000) | new as u32;
        }
    }

    fn execute_ed_x2(&mut self, bus: &mut dyn Bus, y: u8, z: u8) {
        match y {
            4 => self.block_once(bus, z, 1),
            5 => self.block_once(bus, z, -1),
            6 => self.block_repeat(bus, z, 1),
            7 => self.block_repeat(bus, z, -1),
            0 => self.block_de_once(bus, z, 1),
            1 => self.block_de_once(bus, z, -1),
            2 => self.block_de_repeat(bus, z, 1),
            3 => self.block_de_repeat(bus, z, -1),
            _ => unreachable!("y is always 0..=7"),
        }
    }

    fn block_once(&mut self, bus: &mut dyn Bus, z: u8, dir: i32) {
        match z {
            0 => self.ldi_ldd(bus, dir),
            1 => self.cpi_cpd(bus, dir),
            2 => self.ini_ind(bus, dir),
            3 => self.outi_outd(bus, dir),
            _ => self.opcode_trap(),
        }
    }

    fn block_repeat(&mut self, bus: &mut dyn Bus, z: u8, dir: i32) {
        self.block_once(bus, z, dir);
        let keep_going = match z {
            0 => self.bc != 0,
            1 => self.bc != 0 && !self.flag_z(),
            2 | 3 => self.b() != 0,
            _ => false,
        };
        if keep_going {
            self.cycles += 1;
            let back = 2 + if self.suffix.is_some() { 1 } else { 0 };
            let target = self.pc.wrapping_sub(back) & flags::width_mask(self.il);
            self.prefetch_at(bus, target);
        }
    }

    fn ldi_ldd(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        let dst = self.translate_data(self.de);
        bus.mem_write(dst, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.de = self.mask(self.de.wrapping_add(dir as u32));
        self.dec_bc_partial();
        let prev_undef = self.f;
        self.set_flag_pv(self.bc != 0);
        self.set_flag_h(false);
        self.set_flag_n(false);
        self.f = flags::propagate_undef(self.f, prev_undef);
    }

    fn cpi_cpd(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        let a = self.a;
        let result = a.wrapping_sub(val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.dec_bc_partial();
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_sub(a, val, 0));
        self.set_flag_pv(self.bc != 0);
        self.set_flag_n(true);
    }

    fn ini_ind(&mut self, bus: &mut dyn Bus, dir: i32) {
        let val = bus.port_read(self.bc as u16);
        let dst = self.translate_data(self.hl);
        bus.mem_write(dst, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        self.set_flag_z(b == 0);
        self.set_flag_s(b & 0x80 != 0);
        self.set_flag_n(val & 0x80 != 0);
        self.f = flags::copy_undef_from(self.f, b);
    }

    fn outi_outd(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        bus.port_write(self.bc as u16, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        self.set_flag_z(b == 0);
        self.set_flag_s(b & 0x80 != 0);
        self.set_flag_n(val & 0x80 != 0);
        self.f = flags::copy_undef_from(self.f, b);
    }

    /// eZ80-only "2" family: identical to the BC/HL-routed block ops but
    /// the secondary pointer is `DE` instead of `BC`/port space, per
    /// §4.5's "2-variants transfer via DE port/address with HL± and DE±".
    fn block_de_once(&mut self, bus: &mut dyn Bus, z: u8, dir: i32) {
        match z {
            0 => self.ld2(bus, dir),
            1 => self.cp2(bus, dir),
            2 => self.in2(bus, dir),
            3 => self.out2(bus, dir),
            _ => self.opcode_trap(),
        }
    }

    fn block_de_repeat(&mut self, bus: &mut dyn Bus, z: u8, dir: i32) {
        self.block_de_once(bus, z, dir);
        if self.bc != 0 {
            self.cycles += 1;
            let back = 2 + if self.suffix.is_some() { 1 } else { 0 };
            let target = self.pc.wrapping_sub(back) & flags::width_mask(self.il);
            self.prefetch_at(bus, target);
        }
    }

    fn ld2(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        let dst = self.translate_data(self.de);
        bus.mem_write(dst, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.de = self.mask(self.de.wrapping_add(dir as u32));
        self.dec_bc_partial();
        self.set_flag_pv(self.bc != 0);
        self.set_flag_h(false);
        self.set_flag_n(false);
    }

    fn cp2(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        let a = self.a;
        let result = a.wrapping_sub(val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.de = self.mask(self.de.wrapping_add(dir as u32));
        self.dec_bc_partial();
        self.set_sz_flags(result);
        self.set_flag_h(flags::half_carry_sub(a, val, 0));
        self.set_flag_pv(self.bc != 0);
        self.set_flag_n(true);
    }

    fn in2(&mut self, bus: &mut dyn Bus, dir: i32) {
        let val = bus.port_read(self.de as u16);
        let dst = self.translate_data(self.hl);
        bus.mem_write(dst, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.de = self.mask(self.de.wrapping_add(dir as u32));
        self.dec_bc_partial();
        self.set_flag_z(self.bc == 0);
        self.set_flag_n(val & 0x80 != 0);
    }

    fn out2(&mut self, bus: &mut dyn Bus, dir: i32) {
        let src = self.translate_data(self.hl);
        let val = bus.mem_read(src);
        bus.port_write(self.de as u16, val);
        self.hl = self.mask(self.hl.wrapping_add(dir as u32));
        self.de = self.mask(self.de.wrapping_add(dir as u32));
        self.dec_bc_partial();
        self.set_flag_z(self.bc == 0);
        self.set_flag_n(val & 0x80 != 0);
    }

    fn execute_ed_x3(&mut self, bus: &mut dyn Bus, _opcode: u8, y: u8, z: u8) {
        match (y, z) {
            (0, 3) => self.flash_erase_opcode(bus),
            (1, 3) => {
                self.hl = self.i as u32;
            }
            (2, 3) => {
                self.i = self.hl as u16;
            }
            (4, 0) => self.block_repeat(bus, 2, 1),
            (4, 1) => self.block_repeat(bus, 3, 1),
            (5, 0) => self.block_repeat(bus, 2, -1),
            (5, 1) => self.block_repeat(bus, 3, -1),
            _ => self.opcode_trap(),
        }
    }

    /// Emulator extension `ED C3 EE` that fills a 16 KiB flash page at
    /// `HL & ~0x3FFF` with `0xFF`. Not an eZ80 instruction; gated behind
    /// `flash-erase-opcode` per §9's "flag the feature explicitly".
    #[cfg(feature = "flash-erase-opcode")]
    fn flash_erase_opcode(&mut self, bus: &mut dyn Bus) {
        let magic = self.fetch_byte(bus);
        if magic != 0xEE {
            self.opcode_trap();
            return;
        }
        let page_base = self.hl & !0x3FFF;
        bus.flash_erase_page(page_base);
    }

    #[cfg(not(feature = "flash-erase-opcode"))]
    fn flash_erase_opcode(&mut self, bus: &mut dyn Bus) {
        let _ = self.fetch_byte(bus);
        self.opcode_trap();
    }
}
