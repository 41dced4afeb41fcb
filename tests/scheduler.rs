//! Integration tests driving the six literal worked examples through
//! [`Scheduler`] against [`FlatBus`], the way a real host runs this core.
//!
//! # References
//! - Zilog eZ80 CPU User Manual (UM0077)
//! - CEmu (<https://github.com/CE-Programming/CEmu>)

use ez80_core::bus::FlatBus;
use ez80_core::cpu::Prefix;
use ez80_core::{Cpu, Scheduler};

/// Scenario 1: `DJNZ` loop. `B=3`, `DJNZ -2` (jump back onto itself) should
/// run the loop body three times, leaving `B=0` and falling through.
#[test]
fn djnz_loop_runs_b_times_then_falls_through() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    cpu.set_b(3);
    bus.load(0, &[0x10, 0xFE]); // DJNZ $ (offset -2, jumps back to itself)
    bus.mem[2] = 0x00; // NOP, the fall-through instruction

    let mut sched = Scheduler::new();
    // 3 taken jumps then the not-taken fall-through: 4 instructions total.
    // Each `run(-1)` drains exactly one instruction's worth of budget.
    for _ in 0..4 {
        sched.run(&mut cpu, &mut bus, -1);
    }

    assert_eq!(cpu.b(), 0);
    assert_eq!(cpu.pc, 3, "falls through past the NOP at 2");
}

/// Scenario 2: `ADC HL,HL` with carry in. `HL=0x8000`, `C=1`, `ADL=0` ->
/// `HL=0x0001`, `C=1` (bit 16 carried out), `PV=1` (sign changed on an
/// add of two same-signed operands), `S=0`, `Z=0`.
#[test]
fn adc_hl_hl_with_carry_in() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    cpu.hl = 0x8000;
    cpu.set_flag_c(true);
    bus.mem[0] = 0xED;
    bus.mem[1] = 0x6A; // ADC HL,HL

    let mut sched = Scheduler::new();
    sched.run(&mut cpu, &mut bus, -1);

    assert_eq!(cpu.hl, 0x0001);
    assert!(cpu.flag_c());
    assert!(cpu.flag_pv(), "0x8000+0x8000+1 overflows a signed 16-bit add");
    assert!(!cpu.flag_s());
    assert!(!cpu.flag_z());
    assert!(!cpu.flag_h(), "no carry out of bit 11: (0x8000&0xFFF)*2+1 < 0x1000");
}

/// Scenario 3: `LD A,(mn)` in ADL mode reads a full 24-bit address and
/// advances `PC` by 4 (opcode + 3 address bytes).
#[test]
fn ld_a_indirect_reads_a_24_bit_address_in_adl_mode() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.flush(&mut bus, 0, true); // ADL=1
    bus.mem[0xAB1234] = 0x77;
    bus.load(0, &[0x3A, 0x34, 0x12, 0xAB]); // LD A,(0xAB1234)

    let mut sched = Scheduler::new();
    sched.run(&mut cpu, &mut bus, -1);

    assert_eq!(cpu.a, 0x77);
    assert_eq!(cpu.pc, 4);
}

/// Scenario 4: mixed-mode `CALL`/`RET`. `ADL=1`, a `.SIS`-prefixed `CALL`
/// frames its return address with a tag byte and pushes `PCL`/`PCH` onto
/// the short stack (because the suffix forces `L=0`); the callee returns
/// through a matching `.SIS`-prefixed `RET`, which pops the tag and
/// restores `ADL`.
#[test]
fn mixed_mode_call_and_matching_ret_round_trip() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.flush(&mut bus, 0x100, true); // ADL=1, running from 0x100
    cpu.spl = 0x00FF00;
    cpu.sps = 0x8000;
    // `.SIS` + `CALL 0x0000`
    bus.load(0x100, &[0x40, 0xCD, 0x00, 0x00]);
    // target: `.SIS` + `RET`, so the frame this CALL wrote is popped by a
    // RET under the same suffix-forced widths it was pushed under.
    bus.load(0x0000, &[0x40, 0xC9]);

    let mut sched = Scheduler::new();

    // SIS, then CALL (two step()s; SIS alone doesn't drain the budget).
    sched.run(&mut cpu, &mut bus, -1);
    assert_eq!(cpu.pc, 0x0000, "CALL jumped to the target");
    assert!(cpu.adl, "ambient ADL is untouched by a suffix");

    // The tag byte sits at the top of SPL; PCL/PCH sit on SPS, since the
    // suffix forced L=0 for the CALL itself.
    let tag = bus.mem[cpu.spl as usize];
    assert_eq!(tag & 0x01, 1, "tag records ADL=1 at call time");
    let ret_lo = bus.mem[cpu.sps as usize];
    let ret_hi = bus.mem[cpu.sps as usize + 1];
    assert_eq!(u16::from(ret_lo) | (u16::from(ret_hi) << 8), 0x0104);

    // SIS, then RET (pops the tag, restores ADL, jumps back).
    sched.run(&mut cpu, &mut bus, -1);
    assert_eq!(cpu.pc, 0x0104, "RET landed right after the CALL");
    assert!(cpu.adl, "the tag byte's ADL bit was 1, so it round-trips");
}

/// Scenario 5: a `DD`-prefixed `CB`-prefixed `BIT` tests a displaced
/// memory byte, not a register, and leaves `C` untouched.
#[test]
fn cb_prefixed_bit_under_a_dd_prefix_tests_the_displaced_byte() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    cpu.ix = 0x2000;
    cpu.set_flag_c(true);
    bus.mem[0x2005] = 0b1111_1110; // bit 0 clear, everything else set
    bus.load(0, &[0xDD, 0xCB, 0x05, 0x46]); // BIT 0,(IX+5)

    let mut sched = Scheduler::new();
    sched.run(&mut cpu, &mut bus, -1);

    assert!(cpu.flag_z(), "bit 0 was clear");
    assert!(cpu.flag_pv());
    assert!(cpu.flag_h());
    assert!(!cpu.flag_n());
    assert!(!cpu.flag_s(), "y != 7");
    assert!(cpu.flag_c(), "BIT never touches C");
    assert_eq!(cpu.prefix, Prefix::None, "cleared once the instruction completes");
}

/// Scenario 6: an interrupt arriving while halted wakes the CPU and
/// vectors through `CALL 0x38` (IM 1), pushing the HALT instruction's own
/// resume `PC` so execution can return to it once the handler `RETI`s.
#[test]
fn interrupt_wakes_a_halted_cpu_and_vectors_through_0x38() {
    let mut bus = FlatBus::new();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    bus.mem[0] = 0x76; // HALT
    cpu.iff1 = true;
    cpu.im = 1;

    let mut sched = Scheduler::new();
    sched.run(&mut cpu, &mut bus, -4);
    assert!(cpu.halted);
    let halt_resume_pc = cpu.pc;

    bus.interrupt_status = 1;
    bus.interrupt_enabled = 1;
    sched.run(&mut cpu, &mut bus, -1);

    assert!(!cpu.halted);
    assert!(!cpu.iff1);
    assert_eq!(cpu.pc, 0x38);
    let pushed = u32::from(bus.mem[cpu.sp() as usize])
        | (u32::from(bus.mem[cpu.sp() as usize + 1]) << 8);
    assert_eq!(pushed, halt_resume_pc);
}
