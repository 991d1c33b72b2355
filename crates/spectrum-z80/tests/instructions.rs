//! Architectural semantics: register traffic, flag bytes (documented and
//! undocumented bits), MEMPTR-visible behaviour and the block instructions.

mod common;

use common::{Machine, ORG};
use spectrum_core::{Bus, ContendedMemory, Memory, TState};
use spectrum_z80::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use spectrum_z80::Z80;

#[test]
fn add_a_to_itself_overflows() {
    let mut m = Machine::with_code(&[0x87]); // ADD A,A
    m.cpu.regs.a = 0x80;
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.a, 0x00);
    // $80 + $80: carry and signed overflow, no half-carry from nibble 0
    assert_eq!(m.cpu.regs.f, ZF | PF | CF);
    assert_eq!(m.t, 4);
    assert_eq!(m.cpu.regs.pc, ORG + 1);
    assert_eq!(m.cpu.regs.r, 1);
}

#[test]
fn ldir_copies_two_bytes() {
    let mut m = Machine::with_code(&[0xED, 0xB0]); // LDIR
    m.cpu.regs.set_hl(0x9000);
    m.cpu.regs.set_de(0xA000);
    m.cpu.regs.set_bc(0x0002);
    m.mem.load(0x9000, &[0xAA, 0xBB]);

    m.step();
    // Loop pass: PC is back on the opcode, 21 t-states
    assert_eq!(m.cpu.regs.pc, ORG);
    assert_eq!(m.cpu.regs.bc(), 1);
    assert_eq!(m.t, 21);
    assert_eq!(m.cpu.regs.wz, ORG + 1);

    m.step();
    assert_eq!(m.mem.read(0xA000), 0xAA);
    assert_eq!(m.mem.read(0xA001), 0xBB);
    assert_eq!(m.cpu.regs.bc(), 0);
    assert_eq!(m.cpu.regs.hl(), 0x9002);
    assert_eq!(m.cpu.regs.de(), 0xA002);
    assert!(m.cpu.regs.f & PF == 0);
    assert_eq!(m.cpu.regs.pc, ORG + 2);
    assert_eq!(m.t, 37);
}

#[test]
fn bit_seven_of_h() {
    let mut m = Machine::with_code(&[0xCB, 0x7C]); // BIT 7,H
    m.cpu.regs.h = 0x80;
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.f, SF | HF);
}

#[test]
fn bit_on_memory_takes_bits_35_from_memptr() {
    // LD A,(nn) latches nn+1 into MEMPTR; BIT 0,(HL) then exposes its
    // high byte through flag bits 3/5
    let mut m = Machine::with_code(&[0x3A, 0x00, 0x28, 0xCB, 0x46]);
    m.cpu.regs.set_hl(0x9000);
    m.mem.load(0x9000, &[0x01]);
    m.step();
    assert_eq!(m.cpu.regs.wz, 0x2801);
    m.step();
    assert_eq!(m.cpu.regs.f, HF | YF | XF);
}

#[test]
fn scf_and_ccf_copy_bits_35_from_a() {
    let mut m = Machine::with_code(&[0x37, 0x3F]); // SCF; CCF
    m.cpu.regs.a = 0x28;
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.f, YF | XF | CF);
    m.step();
    // CCF moves the old carry into H and clears C
    assert_eq!(m.cpu.regs.f, YF | XF | HF);
}

#[test]
fn daa_fixes_bcd_addition() {
    let mut m = Machine::with_code(&[0xC6, 0x27, 0x27]); // ADD A,$27; DAA
    m.cpu.regs.a = 0x15;
    m.step();
    assert_eq!(m.cpu.regs.a, 0x3C);
    m.step();
    assert_eq!(m.cpu.regs.a, 0x42);
    assert!(m.cpu.regs.f & CF == 0);
    assert!(m.cpu.regs.f & NF == 0);
    assert!(m.cpu.regs.f & PF != 0); // $42 has even parity
}

#[test]
fn cpl_sets_h_n_and_bits_35() {
    let mut m = Machine::with_code(&[0x2F]);
    m.cpu.regs.a = 0x55;
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.a, 0xAA);
    assert_eq!(m.cpu.regs.f, YF | HF | XF | NF);
}

#[test]
fn neg_negates_accumulator() {
    let mut m = Machine::with_code(&[0xED, 0x44]);
    m.cpu.regs.a = 0x01;
    m.step();
    assert_eq!(m.cpu.regs.a, 0xFF);
    assert_eq!(m.cpu.regs.f, SF | YF | HF | XF | NF | CF);
}

#[test]
fn ld_a_i_reflects_iff2() {
    let mut m = Machine::with_code(&[0xED, 0x57, 0xED, 0x57]); // LD A,I twice
    m.cpu.regs.i = 0x42;
    m.cpu.regs.iff2 = true;
    m.step();
    assert_eq!(m.cpu.regs.a, 0x42);
    assert!(m.cpu.regs.f & PF != 0);

    m.cpu.regs.iff2 = false;
    m.step();
    assert!(m.cpu.regs.f & PF == 0);
}

#[test]
fn in_a_n_latches_memptr() {
    let mut m = Machine::with_code(&[0xDB, 0x10]); // IN A,($10)
    m.cpu.regs.a = 0x20;
    m.step();
    assert_eq!(m.cpu.regs.a, 0xFF); // open bus
    assert_eq!(m.cpu.regs.wz, 0x2011);
}

#[test]
fn in_r_c_sets_logic_flags() {
    let mut m = Machine::with_code(&[0xED, 0x78]); // IN A,(C)
    m.cpu.regs.set_bc(0x10FE);
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.a, 0xFF);
    assert_eq!(m.cpu.regs.f, SF | YF | XF | PF);
    assert_eq!(m.cpu.regs.wz, 0x10FF);
}

/// Bus capturing port writes, for the undocumented OUT (C),0.
struct RecordBus {
    writes: Vec<(u16, u8)>,
}

impl Bus for RecordBus {
    fn port_in(&mut self, _port: u16, t: &mut TState) -> u8 {
        *t += 4;
        0xFF
    }

    fn port_out(&mut self, port: u16, value: u8, t: &mut TState) {
        self.writes.push((port, value));
        *t += 4;
    }
}

#[test]
fn out_c_writes_zero_for_the_missing_register() {
    let mut mem = ContendedMemory::new();
    mem.clear();
    mem.load(ORG, &[0xED, 0x71, 0xED, 0x41]); // OUT (C),0; OUT (C),B
    let mut bus = RecordBus { writes: Vec::new() };
    let mut cpu = Z80::new();
    cpu.regs.pc = ORG;
    cpu.regs.set_bc(0x11FE);
    let mut t: TState = 0;

    cpu.step(&mut mem, &mut bus, &mut t);
    cpu.step(&mut mem, &mut bus, &mut t);
    assert_eq!(bus.writes, vec![(0x11FE, 0x00), (0x11FE, 0x11)]);
}

#[test]
fn rld_and_rrd_rotate_nibbles_through_memory() {
    let mut m = Machine::with_code(&[0xED, 0x6F, 0xED, 0x67]); // RLD; RRD
    m.cpu.regs.a = 0x12;
    m.cpu.regs.set_hl(0x9000);
    m.mem.load(0x9000, &[0x34]);

    m.step();
    assert_eq!(m.cpu.regs.a, 0x13);
    assert_eq!(m.mem.read(0x9000), 0x42);
    assert_eq!(m.cpu.regs.wz, 0x9001);

    m.step();
    // RRD undoes the RLD: A=$13/(HL)=$42 -> A=$12/(HL)=$34
    assert_eq!(m.cpu.regs.a, 0x12);
    assert_eq!(m.mem.read(0x9000), 0x34);
}

#[test]
fn sll_shifts_one_in() {
    let mut m = Machine::with_code(&[0xCB, 0x30]); // SLL B
    m.cpu.regs.b = 0x80;
    m.step();
    assert_eq!(m.cpu.regs.b, 0x01);
    assert_eq!(m.cpu.regs.f, CF);
}

#[test]
fn ex_sp_hl_swaps_and_restores() {
    let mut m = Machine::with_code(&[0xE3, 0xE3]); // EX (SP),HL twice
    m.cpu.regs.sp = 0xC000;
    m.cpu.regs.set_hl(0xABCD);
    m.mem.load(0xC000, &[0x34, 0x12]);

    m.step();
    assert_eq!(m.cpu.regs.hl(), 0x1234);
    assert_eq!(m.mem.read(0xC000), 0xCD);
    assert_eq!(m.mem.read(0xC001), 0xAB);
    assert_eq!(m.cpu.regs.wz, 0x1234);

    m.step();
    assert_eq!(m.cpu.regs.hl(), 0xABCD);
    assert_eq!(m.mem.read(0xC000), 0x34);
    assert_eq!(m.mem.read(0xC001), 0x12);
}

#[test]
fn exchange_instructions_are_involutions() {
    let mut m = Machine::with_code(&[0x08, 0x08, 0xD9, 0xD9, 0xEB, 0xEB]);
    m.cpu.regs.set_af(0x1122);
    m.cpu.regs.set_bc(0x3344);
    m.cpu.regs.set_de(0x5566);
    m.cpu.regs.set_hl(0x7788);
    m.cpu.regs.a_alt = 0x99;
    let before = m.cpu.regs;
    m.step_n(6);
    let mut after = before;
    after.pc = before.pc.wrapping_add(6);
    after.r = 6;
    assert_eq!(m.cpu.regs, after);
}

#[test]
fn halt_parks_the_program_counter() {
    let mut m = Machine::with_code(&[0x76]);
    m.step();
    assert!(m.cpu.is_halted());
    assert_eq!(m.cpu.regs.pc, ORG);
    m.step();
    assert_eq!(m.cpu.regs.pc, ORG);
    assert_eq!(m.t, 8);
}

#[test]
fn fetch_wraps_the_program_counter() {
    let mut m = Machine::with_code(&[]);
    m.mem.load(0xFFFF, &[0x3E]); // LD A,n with the operand at $0000
    m.mem.load(0x0000, &[0x42]);
    m.cpu.regs.pc = 0xFFFF;
    m.step();
    assert_eq!(m.cpu.regs.a, 0x42);
    assert_eq!(m.cpu.regs.pc, 0x0001);
}

#[test]
fn jr_backwards_reaches_itself() {
    let mut m = Machine::with_code(&[0x18, 0xFE]); // JR -2
    m.step();
    assert_eq!(m.cpu.regs.pc, ORG);
    assert_eq!(m.cpu.regs.wz, ORG);
}

#[test]
fn refresh_counts_m1_fetches_per_prefix_family() {
    let mut m = Machine::with_code(&[
        0x00, // 1 fetch
        0xCB, 0x00, // 2 fetches
        0xED, 0x44, // 2 fetches
        0xDD, 0x04, // 2 fetches (prefix + fall-through)
        0xDD, 0xCB, 0x01, 0x7E, // 2 fetches: DDCB trailing bytes do not count
    ]);
    m.cpu.regs.r = 0x80;
    m.step();
    assert_eq!(m.cpu.regs.r, 0x81);
    m.step();
    assert_eq!(m.cpu.regs.r, 0x83);
    m.step();
    assert_eq!(m.cpu.regs.r, 0x85);
    m.step();
    assert_eq!(m.cpu.regs.r, 0x87);
    m.step();
    assert_eq!(m.cpu.regs.r, 0x89);
}

#[test]
fn index_register_halves_are_addressable() {
    let mut m = Machine::with_code(&[
        0xDD, 0x26, 0x12, // LD IXH,$12
        0xDD, 0x7C, // LD A,IXH
        0xDD, 0x85, // ADD A,IXL
    ]);
    m.cpu.regs.ix = 0x0034;
    m.step_n(3);
    assert_eq!(m.cpu.regs.ix, 0x1234);
    assert_eq!(m.cpu.regs.a, 0x46);
}

#[test]
fn indexed_loads_use_real_h_and_l() {
    // LD H,(IX+1) must load H, not IXH
    let mut m = Machine::with_code(&[0xDD, 0x66, 0x01]);
    m.cpu.regs.ix = 0x9000;
    m.cpu.regs.set_hl(0x0000);
    m.mem.load(0x9001, &[0x77]);
    m.step();
    assert_eq!(m.cpu.regs.h, 0x77);
    assert_eq!(m.cpu.regs.ix, 0x9000);
    assert_eq!(m.cpu.regs.wz, 0x9001);
}

#[test]
fn indexed_displacement_is_signed() {
    let mut m = Machine::with_code(&[0xDD, 0x7E, 0xFF]); // LD A,(IX-1)
    m.cpu.regs.ix = 0x9000;
    m.mem.load(0x8FFF, &[0x5A]);
    m.step();
    assert_eq!(m.cpu.regs.a, 0x5A);
    assert_eq!(m.cpu.regs.wz, 0x8FFF);
}

#[test]
fn indexed_bit_ops_copy_into_registers() {
    let mut m = Machine::with_code(&[0xDD, 0xCB, 0x01, 0x80]); // RES 0,(IX+1) -> B
    m.cpu.regs.ix = 0x9000;
    m.mem.load(0x9001, &[0xFF]);
    m.step();
    assert_eq!(m.mem.read(0x9001), 0xFE);
    assert_eq!(m.cpu.regs.b, 0xFE);
}

#[test]
fn indexed_bit_test_uses_effective_address_high_byte() {
    let mut m = Machine::with_code(&[0xDD, 0xCB, 0x00, 0x46]); // BIT 0,(IX+0)
    m.cpu.regs.ix = 0x2800;
    m.cpu.regs.f = 0x00;
    // ROM byte at $2800 is cleared memory: bit 0 is reset
    m.step();
    assert_eq!(m.cpu.regs.f, HF | YF | XF | PF | ZF);
}

#[test]
fn add_hl_preserves_s_z_p() {
    let mut m = Machine::with_code(&[0x09]); // ADD HL,BC
    m.cpu.regs.set_hl(0x0FFF);
    m.cpu.regs.set_bc(0x0001);
    m.cpu.regs.f = SF | ZF | PF;
    m.step();
    assert_eq!(m.cpu.regs.hl(), 0x1000);
    assert_eq!(m.cpu.regs.f, SF | ZF | PF | HF);
    assert_eq!(m.cpu.regs.wz, 0x1000); // HL before the add, plus one
}

#[test]
fn sbc_hl_full_flags() {
    let mut m = Machine::with_code(&[0xED, 0x52]); // SBC HL,DE
    m.cpu.regs.set_hl(0x4000);
    m.cpu.regs.set_de(0x4000);
    m.cpu.regs.f = 0x00;
    m.step();
    assert_eq!(m.cpu.regs.hl(), 0x0000);
    assert_eq!(m.cpu.regs.f, ZF | NF);
}

#[test]
fn cpir_stops_on_match() {
    let mut m = Machine::with_code(&[0xED, 0xB1]); // CPIR
    m.cpu.regs.a = 0xBB;
    m.cpu.regs.set_hl(0x9000);
    m.cpu.regs.set_bc(0x0010);
    m.mem.load(0x9000, &[0xAA, 0xBB, 0xCC]);

    m.step();
    assert_eq!(m.cpu.regs.pc, ORG); // no match yet, looping
    m.step();
    assert_eq!(m.cpu.regs.pc, ORG + 2);
    assert!(m.cpu.regs.f & ZF != 0);
    assert!(m.cpu.regs.f & PF != 0); // BC is not exhausted
    assert_eq!(m.cpu.regs.hl(), 0x9002);
    assert_eq!(m.cpu.regs.bc(), 0x000E);
}

#[test]
fn ini_transfers_from_port_to_memory() {
    let mut m = Machine::with_code(&[0xED, 0xA2]); // INI
    m.cpu.regs.set_hl(0x9000);
    m.cpu.regs.set_bc(0x02FE);
    m.step();
    assert_eq!(m.mem.read(0x9000), 0xFF); // open bus byte
    assert_eq!(m.cpu.regs.b, 0x01);
    assert_eq!(m.cpu.regs.hl(), 0x9001);
    assert_eq!(m.cpu.regs.wz, 0x02FF);
}

#[test]
fn ed_slot_beside_ldi_leaves_all_state_alone() {
    // ED A4 is the first unassigned slot after the LDI/CPI/INI/OUTI row;
    // it must behave as a NOP, not as a stray block transfer
    let mut m = Machine::with_code(&[0xED, 0xA4]);
    m.cpu.regs.set_hl(0x9000);
    m.cpu.regs.set_de(0xA000);
    m.cpu.regs.set_bc(0x0002);
    m.cpu.regs.f = 0xFF;
    m.mem.load(0x9000, &[0x55]);

    m.step();
    assert_eq!(m.cpu.regs.hl(), 0x9000);
    assert_eq!(m.cpu.regs.de(), 0xA000);
    assert_eq!(m.cpu.regs.bc(), 0x0002);
    assert_eq!(m.cpu.regs.f, 0xFF);
    assert_eq!(m.mem.read(0xA000), 0x00, "no byte may be transferred");
    assert_eq!(m.cpu.regs.pc, ORG + 2);
    assert_eq!(m.t, 8);

    // ED AC, one past OUTD, gets the same treatment
    let mut m = Machine::with_code(&[0xED, 0xAC]);
    m.cpu.regs.set_hl(0x9000);
    m.cpu.regs.set_bc(0x0002);
    m.step();
    assert_eq!(m.cpu.regs.hl(), 0x9000);
    assert_eq!(m.cpu.regs.bc(), 0x0002);
    assert_eq!(m.t, 8);
}

#[test]
fn push_pop_through_instructions() {
    let mut m = Machine::with_code(&[0xC5, 0xF1]); // PUSH BC; POP AF
    m.cpu.regs.sp = 0xC000;
    m.cpu.regs.set_bc(0x1234);
    m.step_n(2);
    assert_eq!(m.cpu.regs.af(), 0x1234);
    assert_eq!(m.cpu.regs.sp, 0xC000);
}

#[test]
fn rom_stays_clean_through_stores() {
    let mut m = Machine::with_code(&[0x32, 0x00, 0x10]); // LD ($1000),A
    m.cpu.regs.a = 0x99;
    let before = m.mem.read(0x1000);
    m.step();
    assert_eq!(m.mem.read(0x1000), before);
    assert_eq!(m.t, 13); // the write cycle still costs its t-states
}
