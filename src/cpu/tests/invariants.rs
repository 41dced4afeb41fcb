//! Universal properties that hold for every instruction, independent of
//! which opcode actually ran, plus round-trip properties of a few
//! self-inverse instruction families.

use super::*;

#[test]
fn prefetch_cache_matches_mem_at_pc_after_every_step() {
    let (mut cpu, mut bus) = z80_cpu();
    bus.mem[0] = 0x00; // NOP
    bus.mem[1] = 0x3E; // LD A,n
    bus.mem[2] = 0x42;
    bus.mem[3] = 0x00; // NOP

    for _ in 0..3 {
        cpu.step(&mut bus);
        cpu.reset_cntrl_data_blocks_format();
        let translated = cpu.translate_instr(cpu.pc);
        assert_eq!(cpu.prefetch, bus.mem[translated as usize]);
    }
}

#[test]
fn r_register_increments_over_seven_bits_and_preserves_bit_seven() {
    let (mut cpu, mut bus) = z80_cpu();
    bus.mem[0] = 0x00; // NOP
    cpu.r = 0x80 | 0x7F; // bit 7 set, low 7 bits saturated

    cpu.step(&mut bus);
    assert_eq!(cpu.r, 0x80, "7-bit counter wraps 0x7F -> 0x00, bit 7 stays set");
}

#[test]
fn r_register_bit_seven_clear_is_also_preserved() {
    let (mut cpu, mut bus) = z80_cpu();
    bus.mem[0] = 0x00;
    cpu.r = 0x05;

    cpu.step(&mut bus);
    assert_eq!(cpu.r, 0x06);
}

#[test]
fn prefix_and_suffix_latches_clear_after_the_instruction_they_modify_completes() {
    let (mut cpu, mut bus) = adl_cpu();
    bus.mem[0] = 0xDD; // prefix
    bus.mem[1] = 0x7E; // LD A,(IX+d)
    bus.mem[2] = 0x00; // d = 0

    cpu.step(&mut bus); // consumes the DD byte only
    assert_eq!(cpu.prefix, Prefix::Dd);

    cpu.step(&mut bus); // LD A,(IX+0)
    cpu.reset_cntrl_data_blocks_format();
    assert_eq!(cpu.prefix, Prefix::None);
    assert!(cpu.suffix.is_none());
}

#[test]
fn suffix_forces_widths_for_exactly_the_next_instruction_then_reverts() {
    let (mut cpu, mut bus) = adl_cpu();
    bus.mem[0] = 0x52; // .SIL: force L=1, IL=0
    bus.mem[1] = 0x00; // NOP
    bus.mem[2] = 0x00; // NOP

    cpu.step(&mut bus);
    assert_eq!(cpu.suffix, Some(Suffix::Sil));
    assert!(cpu.l);
    assert!(!cpu.il);

    cpu.step(&mut bus); // the NOP the suffix modifies
    cpu.reset_cntrl_data_blocks_format();
    assert!(cpu.suffix.is_none());
    assert_eq!(cpu.l, cpu.adl);
    assert_eq!(cpu.il, cpu.adl);
}

#[test]
fn undefined_flag_bits_are_copied_from_the_result_on_sz_updates() {
    let (mut cpu, _bus) = z80_cpu();
    cpu.set_sz_flags(0b0010_1000); // bits 3 and 5 set in the result byte
    assert_eq!(cpu.f & flags::UNDEF, flags::UNDEF);
}

#[test]
fn register_pairs_mask_to_sixteen_bits_when_l_is_clear() {
    let (mut cpu, _bus) = z80_cpu();
    assert!(!cpu.l);
    cpu.set_rp(0, 0x00FF_FFFF); // BC
    assert_eq!(cpu.bc, 0xFFFF, "masked to 16 bits outside ADL data width");
}

#[test]
fn register_pairs_keep_24_bits_when_l_is_set() {
    let (mut cpu, _bus) = adl_cpu();
    assert!(cpu.l);
    cpu.set_rp(0, 0x00AB_CDEF);
    assert_eq!(cpu.bc, 0x00AB_CDEF);
}

#[test]
fn ex_de_hl_is_its_own_inverse() {
    let (mut cpu, _bus) = z80_cpu();
    cpu.de = 0x1234;
    cpu.hl = 0x5678;
    cpu.ex_de_hl();
    assert_eq!((cpu.de, cpu.hl), (0x5678, 0x1234));
    cpu.ex_de_hl();
    assert_eq!((cpu.de, cpu.hl), (0x1234, 0x5678));
}

#[test]
fn exx_is_its_own_inverse() {
    let (mut cpu, _bus) = z80_cpu();
    cpu.bc = 0x1111;
    cpu.de = 0x2222;
    cpu.hl = 0x3333;
    cpu.bc_prime = 0xAAAA;
    cpu.de_prime = 0xBBBB;
    cpu.hl_prime = 0xCCCC;

    cpu.exx();
    assert_eq!((cpu.bc, cpu.de, cpu.hl), (0xAAAA, 0xBBBB, 0xCCCC));
    cpu.exx();
    assert_eq!((cpu.bc, cpu.de, cpu.hl), (0x1111, 0x2222, 0x3333));
}

#[test]
fn push_pop_round_trips_a_register_pair_and_the_stack_pointer() {
    let (mut cpu, mut bus) = z80_cpu();
    cpu.sps = 0x8000;
    cpu.set_rp2(0, 0xBEEF); // BC
    let sp_before = cpu.sp();

    cpu.push_word(&mut bus, cpu.get_rp2(0));
    assert_eq!(cpu.sp(), sp_before - 2);

    let restored = cpu.pop_word(&mut bus);
    assert_eq!(restored, 0xBEEF);
    assert_eq!(cpu.sp(), sp_before);
}

#[test]
fn ldir_copies_bc_bytes_and_leaves_bc_at_zero() {
    let (mut cpu, mut bus) = z80_cpu();
    bus.load(0x2000, &[0x11, 0x22, 0x33]);
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 3;
    bus.mem[0] = 0xED;
    bus.mem[1] = 0xB0; // LDIR

    // LDIR re-executes itself while BC != 0; PREFIX/SUFFIX stay clear, so
    // the scheduler's inner loop would keep calling step() on `delta<0`
    // alone. Here we just drive it directly until BC hits zero.
    let mut guard = 0;
    while cpu.bc != 0 {
        cpu.step(&mut bus);
        guard += 1;
        assert!(guard < 16, "LDIR should finish within a handful of steps");
    }

    assert_eq!(cpu.bc, 0);
    assert_eq!(cpu.hl, 0x2003);
    assert_eq!(cpu.de, 0x3003);
    assert_eq!(&bus.mem[0x3000..0x3003], &[0x11, 0x22, 0x33]);
}
