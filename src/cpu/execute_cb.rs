//! `CB`-prefixed bit operations: rotates/shifts, `BIT`, `RES`, `SET`.
//!
//! Under a pending DD/FD prefix the displacement is fetched *before* the
//! CB opcode byte (`cpu_index_address()` runs first), and the operand is
//! always the displaced memory byte rather than `r[z]` — per §4.5 "CB
//! prefix (bit ops)". No undocumented copy-to-register side effect is
//! modeled; it isn't in scope (§1 Non-goals: "undocumented flag behavior
//! beyond what this design lists").

use super::{flags, Cpu, Prefix};
use crate::bus::Bus;

impl Cpu {
    pub(super) fn execute_cb(&mut self, bus: &mut dyn Bus) {
        let indexed = self.prefix != Prefix::None;
        let addr = if indexed {
            Some(self.index_address(bus))
        } else {
            None
        };

        let opcode = self.fetch_byte(bus);
        self.bump_r();

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let val = self.cb_operand_read(bus, z, addr);

        match x {
            0 => {
                let result = self.cb_shift(y, val);
                self.cb_operand_write(bus, z, addr, result);
            }
            1 => self.cb_bit(y, val),
            2 => {
                let result = val & !(1 << y);
                self.cb_operand_write(bus, z, addr, result);
            }
            3 => {
                let result = val | (1 << y);
                self.cb_operand_write(bus, z, addr, result);
            }
            _ => unreachable!("x is always 0..=3"),
        }

        if z == 6 || indexed {
            self.cycles += 1;
        }
    }

    fn cb_operand_read(&mut self, bus: &mut dyn Bus, z: u8, addr: Option<u32>) -> u8 {
        match addr {
            Some(a) => bus.mem_read(self.translate_data(a)),
            None => self.get_reg8(z, bus),
        }
    }

    fn cb_operand_write(&mut self, bus: &mut dyn Bus, z: u8, addr: Option<u32>, val: u8) {
        match addr {
            Some(a) => {
                let translated = self.translate_data(a);
                bus.mem_write(translated, val);
            }
            None => self.set_reg8(z, val, bus),
        }
    }

    /// `rot[y]`: `0=RLC 1=RRC 2=RL 3=RR 4=SLA 5=SRA 6=SLL 7=SRL`.
    fn cb_shift(&mut self, y: u8, val: u8) -> u8 {
        let (result, carry_out) = match y {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => {
                let c = val & 0x80 != 0;
                ((val << 1) | (self.flag_c() as u8), c)
            }
            3 => {
                let c = val & 0x01 != 0;
                ((val >> 1) | ((self.flag_c() as u8) << 7), c)
            }
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => ((val << 1) | 1, val & 0x80 != 0),
            7 => (val >> 1, val & 0x01 != 0),
            _ => unreachable!("rot[y] is always 0..=7"),
        };

        self.set_sz_flags(result);
        self.set_flag_h(false);
        self.set_flag_pv(flags::parity(result));
        self.set_flag_n(false);
        self.set_flag_c(carry_out);
        result
    }

    /// `BIT y,operand`: `Z` from the tested bit, `S`/`PV` from the result
    /// byte (bit `y` isolated), `H=1`, `N=0`, `C` preserved.
    fn cb_bit(&mut self, y: u8, val: u8) {
        let bit_set = val & (1 << y) != 0;
        self.set_flag_z(!bit_set);
        self.set_flag_s(y == 7 && bit_set);
        self.set_flag_pv(!bit_set);
        self.set_flag_h(true);
        self.set_flag_n(false);
        self.f = flags::copy_undef_from(self.f, val);
    }
}
