//! DD/FD-only opcode slots that don't follow the ordinary primary-page
//! semantics: under an active PREFIX, `x=0,z=7` becomes a 24-bit
//! memory↔`rp3` transfer family instead of the rotate-A group, and two
//! specific slots (`x=0,z=1,p=3,q=0` and `x=0,z=6,y=7`) become
//! cross-index word transfers between `IX` and `IY` (§4.5 "DD/FD
//! prefixes"). [`Cpu::step`] only calls this when `prefix != Prefix::None`;
//! a `false` return falls through to the ordinary [`Cpu::execute_primary`]
//! grid for a slot this function doesn't special-case.

use super::Cpu;
use crate::bus::Bus;

impl Cpu {
    pub(super) fn execute_index_extension(
        &mut self,
        bus: &mut dyn Bus,
        x: u8,
        y: u8,
        z: u8,
        p: u8,
        q: u8,
    ) -> bool {
        if x != 0 {
            return false;
        }

        if z == 7 {
            let addr = self.index_address(bus);
            if q == 0 {
                let val = self.get_rp3(p);
                self.write_word_at(bus, addr, val);
            } else {
                let val = self.read_word_at(bus, addr);
                self.set_rp3(p, val);
            }
            return true;
        }

        if z == 1 && p == 3 && q == 0 {
            let addr = self.index_address(bus);
            let val = self.read_word_at(bus, addr);
            self.set_other_index(val);
            return true;
        }

        if z == 6 && y == 7 {
            let addr = self.index_address(bus);
            let val = self.other_index();
            self.write_word_at(bus, addr, val);
            return true;
        }

        false
    }
}
