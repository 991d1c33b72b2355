//! Unprefixed, CB-prefixed and ED-prefixed instruction execution.
//!
//! Dispatch follows the octal decomposition of the opcode: `x` (bits 7-6)
//! picks the quadrant, `z` (bits 2-0) the column, `y` (bits 5-3, split into
//! `p`/`q`) the row. Internal cycles show the IR pair on the address bus
//! and are accounted with `contend(IR, 1, n)`.

#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_truncation)]

use spectrum_core::{Bus, Memory, TState};

use crate::alu;
use crate::cpu::sign_extend;
use crate::cpu::Index;
use crate::flags::{sz53, sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};

use super::Z80;

impl Z80 {
    /// Execute one unprefixed opcode (already fetched).
    pub(crate) fn execute_unprefixed<M: Memory, B: Bus>(
        &mut self,
        opcode: u8,
        mem: &mut M,
        bus: &mut B,
        t: &mut TState,
    ) {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            0 => match z {
                0 => match y {
                    // 00 - NOP
                    0 => {}

                    // 08 - EX AF,AF'
                    1 => self.regs.ex_af(),

                    // 10 - DJNZ d
                    2 => {
                        mem.contend(self.regs.ir(), 1, 1, t);
                        self.regs.b = self.regs.b.wrapping_sub(1);
                        if self.regs.b != 0 {
                            self.jr(mem, t);
                        } else {
                            mem.contend(self.regs.pc, 3, 1, t);
                            self.regs.pc = self.regs.pc.wrapping_add(1);
                        }
                    }

                    // 18 - JR d
                    3 => self.jr(mem, t),

                    // 20 28 30 38 - JR cc,d
                    _ => {
                        if self.condition(y - 4) {
                            self.jr(mem, t);
                        } else {
                            mem.contend(self.regs.pc, 3, 1, t);
                            self.regs.pc = self.regs.pc.wrapping_add(1);
                        }
                    }
                },

                1 => {
                    if q == 0 {
                        // 01 11 21 31 - LD rr,nn
                        let nn = mem.peek16(self.regs.pc, t);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                        self.set_rp(p, nn);
                    } else {
                        // 09 19 29 39 - ADD HL,rr
                        mem.contend(self.regs.ir(), 1, 7, t);
                        let hl = self.regs.hl();
                        self.regs.wz = hl.wrapping_add(1);
                        let (value, flags) = alu::add16(hl, self.rp(p));
                        self.regs.set_hl(value);
                        self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                    }
                }

                2 => match y {
                    // 02 - LD (BC),A
                    0 => {
                        let bc = self.regs.bc();
                        let a = self.regs.a;
                        mem.poke(bc, a, t);
                        self.regs.wz = u16::from(a) << 8 | (bc.wrapping_add(1) & 0xFF);
                    }

                    // 0A - LD A,(BC)
                    1 => {
                        let bc = self.regs.bc();
                        self.regs.a = mem.peek(bc, t);
                        self.regs.wz = bc.wrapping_add(1);
                    }

                    // 12 - LD (DE),A
                    2 => {
                        let de = self.regs.de();
                        let a = self.regs.a;
                        mem.poke(de, a, t);
                        self.regs.wz = u16::from(a) << 8 | (de.wrapping_add(1) & 0xFF);
                    }

                    // 1A - LD A,(DE)
                    3 => {
                        let de = self.regs.de();
                        self.regs.a = mem.peek(de, t);
                        self.regs.wz = de.wrapping_add(1);
                    }

                    // 22 - LD (nn),HL
                    4 => {
                        let addr = mem.peek16(self.regs.pc, t);
                        let hl = self.regs.hl();
                        mem.poke16(addr, hl, t);
                        self.regs.wz = addr.wrapping_add(1);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                    }

                    // 2A - LD HL,(nn)
                    5 => {
                        let addr = mem.peek16(self.regs.pc, t);
                        let value = mem.peek16(addr, t);
                        self.regs.set_hl(value);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                        self.regs.wz = addr.wrapping_add(1);
                    }

                    // 32 - LD (nn),A
                    6 => {
                        let addr = mem.peek16(self.regs.pc, t);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                        let a = self.regs.a;
                        mem.poke(addr, a, t);
                        self.regs.wz =
                            u16::from(a) << 8 | (addr.wrapping_add(1) & 0xFF);
                    }

                    // 3A - LD A,(nn)
                    _ => {
                        let addr = mem.peek16(self.regs.pc, t);
                        self.regs.wz = addr.wrapping_add(1);
                        self.regs.a = mem.peek(addr, t);
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                    }
                },

                3 => {
                    // 03 13 23 33 - INC rr / 0B 1B 2B 3B - DEC rr
                    mem.contend(self.regs.ir(), 1, 2, t);
                    let value = if q == 0 {
                        self.rp(p).wrapping_add(1)
                    } else {
                        self.rp(p).wrapping_sub(1)
                    };
                    self.set_rp(p, value);
                }

                4 => {
                    // 04 0C 14 1C 24 2C 34 3C - INC r/(HL)
                    if y == 6 {
                        let hl = self.regs.hl();
                        let value = mem.peek(hl, t);
                        mem.contend(hl, 1, 1, t);
                        let value = self.inc_op(value);
                        mem.poke(hl, value, t);
                    } else {
                        let value = self.inc_op(self.reg8(y));
                        self.set_reg8(y, value);
                    }
                }

                5 => {
                    // 05 0D 15 1D 25 2D 35 3D - DEC r/(HL)
                    if y == 6 {
                        let hl = self.regs.hl();
                        let value = mem.peek(hl, t);
                        mem.contend(hl, 1, 1, t);
                        let value = self.dec_op(value);
                        mem.poke(hl, value, t);
                    } else {
                        let value = self.dec_op(self.reg8(y));
                        self.set_reg8(y, value);
                    }
                }

                6 => {
                    // 06 0E 16 1E 26 2E 36 3E - LD r/(HL),n
                    let value = mem.peek(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    if y == 6 {
                        mem.poke(self.regs.hl(), value, t);
                    } else {
                        self.set_reg8(y, value);
                    }
                }

                _ => match y {
                    // 07 - RLCA
                    0 => {
                        self.regs.a = self.regs.a.rotate_left(1);
                        self.regs.f = (self.regs.f & (SF | ZF | PF))
                            | (self.regs.a & (CF | XF | YF));
                    }

                    // 0F - RRCA
                    1 => {
                        self.regs.f =
                            (self.regs.f & (SF | ZF | PF)) | (self.regs.a & CF);
                        self.regs.a = self.regs.a.rotate_right(1);
                        self.regs.f |= self.regs.a & (XF | YF);
                    }

                    // 17 - RLA
                    2 => {
                        let old = self.regs.a;
                        self.regs.a = (old << 1) | (self.regs.f & CF);
                        self.regs.f = (self.regs.f & (SF | ZF | PF))
                            | (self.regs.a & (XF | YF))
                            | (old >> 7);
                    }

                    // 1F - RRA
                    3 => {
                        let old = self.regs.a;
                        self.regs.a = (old >> 1) | (self.regs.f << 7);
                        self.regs.f = (self.regs.f & (SF | ZF | PF))
                            | (self.regs.a & (XF | YF))
                            | (old & CF);
                    }

                    // 27 - DAA
                    4 => {
                        let result = alu::daa(self.regs.a, self.regs.f);
                        self.regs.a = result.value;
                        self.regs.f = result.flags;
                    }

                    // 2F - CPL
                    5 => {
                        self.regs.a = !self.regs.a;
                        self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                            | (self.regs.a & (XF | YF))
                            | NF
                            | HF;
                    }

                    // 37 - SCF
                    6 => {
                        self.regs.f = (self.regs.f & (SF | ZF | PF))
                            | (self.regs.a & (XF | YF))
                            | CF;
                    }

                    // 3F - CCF
                    _ => {
                        let carry = self.regs.f & CF;
                        self.regs.f = (self.regs.f & (SF | ZF | PF))
                            | (self.regs.a & (XF | YF))
                            | if carry != 0 { HF } else { CF };
                    }
                },
            },

            1 => {
                if y == 6 && z == 6 {
                    // 76 - HALT: stay on this opcode until an interrupt
                    self.regs.halted = true;
                    self.regs.pc = self.regs.pc.wrapping_sub(1);
                } else if y == 6 {
                    // 70-77 - LD (HL),r
                    mem.poke(self.regs.hl(), self.reg8(z), t);
                } else if z == 6 {
                    // 46 4E ... 7E - LD r,(HL)
                    let value = mem.peek(self.regs.hl(), t);
                    self.set_reg8(y, value);
                } else {
                    // 40-7F - LD r,r'
                    let value = self.reg8(z);
                    self.set_reg8(y, value);
                }
            }

            2 => {
                // 80-BF - ALU A,r/(HL)
                let operand = if z == 6 {
                    mem.peek(self.regs.hl(), t)
                } else {
                    self.reg8(z)
                };
                self.alu_op(y, operand);
            }

            _ => match z {
                0 => {
                    // C0 C8 D0 D8 E0 E8 F0 F8 - RET cc
                    mem.contend(self.regs.ir(), 1, 1, t);
                    if self.condition(y) {
                        self.regs.pc = self.pop(mem, t);
                        self.regs.wz = self.regs.pc;
                    }
                }

                1 => {
                    if q == 0 {
                        // C1 D1 E1 F1 - POP rr
                        let value = self.pop(mem, t);
                        self.set_rp2(p, value);
                    } else {
                        match p {
                            // C9 - RET
                            0 => {
                                self.regs.pc = self.pop(mem, t);
                                self.regs.wz = self.regs.pc;
                            }

                            // D9 - EXX
                            1 => self.regs.exx(),

                            // E9 - JP (HL)
                            2 => self.regs.pc = self.regs.hl(),

                            // F9 - LD SP,HL
                            _ => {
                                mem.contend(self.regs.ir(), 1, 2, t);
                                self.regs.sp = self.regs.hl();
                            }
                        }
                    }
                }

                2 => {
                    // C2 CA D2 DA E2 EA F2 FA - JP cc,nn
                    let target = mem.peek16(self.regs.pc, t);
                    if self.condition(y) {
                        self.regs.pc = target;
                    } else {
                        self.regs.pc = self.regs.pc.wrapping_add(2);
                    }
                    self.regs.wz = target;
                }

                3 => match y {
                    // C3 - JP nn
                    0 => {
                        self.regs.pc = mem.peek16(self.regs.pc, t);
                        self.regs.wz = self.regs.pc;
                    }

                    // CB prefix
                    1 => self.execute_cb(mem, t),

                    // D3 - OUT (n),A
                    2 => {
                        let low = mem.peek(self.regs.pc, t);
                        let a = self.regs.a;
                        bus.port_out(u16::from(a) << 8 | u16::from(low), a, t);
                        self.regs.wz =
                            u16::from(a) << 8 | u16::from(low.wrapping_add(1));
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                    }

                    // DB - IN A,(n)
                    3 => {
                        let low = mem.peek(self.regs.pc, t);
                        let a = self.regs.a;
                        let port = u16::from(a) << 8 | u16::from(low);
                        self.regs.wz =
                            u16::from(a) << 8 | u16::from(low.wrapping_add(1));
                        self.regs.a = bus.port_in(port, t);
                        self.regs.pc = self.regs.pc.wrapping_add(1);
                    }

                    // E3 - EX (SP),HL
                    4 => {
                        let sp = self.regs.sp;
                        let value = mem.peek16(sp, t);
                        mem.contend(sp.wrapping_add(1), 1, 1, t);
                        mem.poke(sp.wrapping_add(1), self.regs.h, t);
                        mem.poke(sp, self.regs.l, t);
                        mem.contend(sp, 1, 2, t);
                        self.regs.set_hl(value);
                        self.regs.wz = value;
                    }

                    // EB - EX DE,HL
                    5 => self.regs.ex_de_hl(),

                    // F3 - DI
                    6 => {
                        self.regs.iff1 = false;
                        self.regs.iff2 = false;
                    }

                    // FB - EI: interrupts stay masked for one instruction
                    _ => {
                        self.regs.iff1 = true;
                        self.regs.iff2 = true;
                        self.ei_delay = true;
                    }
                },

                4 => {
                    // C4 CC D4 DC E4 EC F4 FC - CALL cc,nn
                    let take = self.condition(y);
                    self.call(take, mem, t);
                }

                5 => {
                    if q == 0 {
                        // C5 D5 E5 F5 - PUSH rr
                        mem.contend(self.regs.ir(), 1, 1, t);
                        let value = self.rp2(p);
                        self.push(value, mem, t);
                    } else {
                        match p {
                            // CD - CALL nn
                            0 => self.call(true, mem, t),

                            // DD prefix
                            1 => self.execute_indexed(Index::Ix, mem, bus, t),

                            // ED prefix
                            2 => self.execute_ed(mem, bus, t),

                            // FD prefix
                            _ => self.execute_indexed(Index::Iy, mem, bus, t),
                        }
                    }
                }

                6 => {
                    // C6 CE D6 DE E6 EE F6 FE - ALU A,n
                    let operand = mem.peek(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    self.alu_op(y, operand);
                }

                _ => {
                    // C7 CF D7 DF E7 EF F7 FF - RST y*8
                    mem.contend(self.regs.ir(), 1, 1, t);
                    let pc = self.regs.pc;
                    self.push(pc, mem, t);
                    self.regs.pc = u16::from(y) * 8;
                    self.regs.wz = self.regs.pc;
                }
            },
        }
    }

    /// Relative jump body shared by JR, JR cc and DJNZ once taken.
    fn jr<M: Memory>(&mut self, mem: &mut M, t: &mut TState) {
        let d = sign_extend(mem.peek(self.regs.pc, t));
        mem.contend(self.regs.pc, 1, 5, t);
        self.regs.pc = self.regs.pc.wrapping_add(d).wrapping_add(1);
        self.regs.wz = self.regs.pc;
    }

    /// CALL body: the target is always read (and latched into MEMPTR);
    /// only a taken call pays the internal cycle and the push.
    fn call<M: Memory>(&mut self, take: bool, mem: &mut M, t: &mut TState) {
        let target = mem.peek16(self.regs.pc, t);
        self.regs.wz = target;
        if take {
            mem.contend(self.regs.pc.wrapping_add(1), 1, 1, t);
            let ret = self.regs.pc.wrapping_add(2);
            self.push(ret, mem, t);
            self.regs.pc = target;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(2);
        }
    }

    /// Execute one CB-prefixed opcode (rotates/shifts, BIT, RES, SET).
    pub(crate) fn execute_cb<M: Memory>(&mut self, mem: &mut M, t: &mut TState) {
        let opcode = self.fetch(mem, t);
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;

        match x {
            // 00-3F: rotate/shift
            0 => {
                if z == 6 {
                    let hl = self.regs.hl();
                    let value = mem.peek(hl, t);
                    mem.contend(hl, 1, 1, t);
                    let value = self.shift_op(y, value);
                    mem.poke(hl, value, t);
                } else {
                    let value = self.shift_op(y, self.reg8(z));
                    self.set_reg8(z, value);
                }
            }

            // 40-7F: BIT
            1 => {
                if z == 6 {
                    let hl = self.regs.hl();
                    let value = mem.peek(hl, t);
                    mem.contend(hl, 1, 1, t);
                    self.regs.f = alu::bit8_wz(value, y, self.regs.f, self.regs.wz);
                } else {
                    self.regs.f = alu::bit8(self.reg8(z), y, self.regs.f);
                }
            }

            // 80-BF: RES
            2 => {
                if z == 6 {
                    let hl = self.regs.hl();
                    let value = mem.peek(hl, t) & !(1 << y);
                    mem.contend(hl, 1, 1, t);
                    mem.poke(hl, value, t);
                } else {
                    let value = self.reg8(z) & !(1 << y);
                    self.set_reg8(z, value);
                }
            }

            // C0-FF: SET
            _ => {
                if z == 6 {
                    let hl = self.regs.hl();
                    let value = mem.peek(hl, t) | (1 << y);
                    mem.contend(hl, 1, 1, t);
                    mem.poke(hl, value, t);
                } else {
                    let value = self.reg8(z) | (1 << y);
                    self.set_reg8(z, value);
                }
            }
        }
    }

    /// Execute one ED-prefixed opcode. Every slot the hardware leaves
    /// undefined is a NOP (the two fetches have already been paid for).
    pub(crate) fn execute_ed<M: Memory, B: Bus>(
        &mut self,
        mem: &mut M,
        bus: &mut B,
        t: &mut TState,
    ) {
        let opcode = self.fetch(mem, t);
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let p = y >> 1;
        let q = y & 1;

        match x {
            1 => match z {
                // 40 48 50 58 60 68 70 78 - IN r,(C); ED70 only sets flags
                0 => {
                    let bc = self.regs.bc();
                    self.regs.wz = bc.wrapping_add(1);
                    let value = bus.port_in(bc, t);
                    if y != 6 {
                        self.set_reg8(y, value);
                    }
                    self.regs.f = (self.regs.f & CF) | sz53p(value);
                }

                // 41 49 51 59 61 69 71 79 - OUT (C),r; ED71 writes 0
                1 => {
                    let value = if y == 6 { 0 } else { self.reg8(y) };
                    let bc = self.regs.bc();
                    bus.port_out(bc, value, t);
                    self.regs.wz = bc.wrapping_add(1);
                }

                // 42 52 62 72 - SBC HL,rr / 4A 5A 6A 7A - ADC HL,rr
                2 => {
                    mem.contend(self.regs.ir(), 1, 7, t);
                    let hl = self.regs.hl();
                    let carry = self.regs.f & CF != 0;
                    self.regs.wz = hl.wrapping_add(1);
                    let (value, flags) = if q == 0 {
                        alu::sbc16(hl, self.rp(p), carry)
                    } else {
                        alu::adc16(hl, self.rp(p), carry)
                    };
                    self.regs.set_hl(value);
                    self.regs.f = flags;
                }

                // 43 53 63 73 - LD (nn),rr / 4B 5B 6B 7B - LD rr,(nn)
                3 => {
                    let addr = mem.peek16(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    if q == 0 {
                        let value = self.rp(p);
                        mem.poke16(addr, value, t);
                    } else {
                        let value = mem.peek16(addr, t);
                        self.set_rp(p, value);
                    }
                    self.regs.wz = addr.wrapping_add(1);
                }

                // 44 4C 54 5C 64 6C 74 7C - NEG
                4 => {
                    let result = alu::sub8(0, self.regs.a, false);
                    self.regs.a = result.value;
                    self.regs.f = result.flags;
                }

                // 45 4D 55 5D 65 6D 75 7D - RETN/RETI
                5 => {
                    self.regs.iff1 = self.regs.iff2;
                    self.regs.pc = self.pop(mem, t);
                    self.regs.wz = self.regs.pc;
                }

                // 46 4E 56 5E 66 6E 76 7E - IM 0/0/1/2
                6 => {
                    self.regs.im = match y & 3 {
                        0 | 1 => 0,
                        2 => 1,
                        _ => 2,
                    };
                }

                _ => match y {
                    // 47 - LD I,A
                    0 => {
                        mem.contend(self.regs.ir(), 1, 1, t);
                        self.regs.i = self.regs.a;
                    }

                    // 4F - LD R,A
                    1 => {
                        mem.contend(self.regs.ir(), 1, 1, t);
                        self.regs.r = self.regs.a;
                    }

                    // 57 - LD A,I
                    2 => {
                        mem.contend(self.regs.ir(), 1, 1, t);
                        self.regs.a = self.regs.i;
                        self.regs.f = (self.regs.f & CF)
                            | sz53(self.regs.a)
                            | if self.regs.iff2 { PF } else { 0 };
                    }

                    // 5F - LD A,R
                    3 => {
                        mem.contend(self.regs.ir(), 1, 1, t);
                        self.regs.a = self.regs.r;
                        self.regs.f = (self.regs.f & CF)
                            | sz53(self.regs.a)
                            | if self.regs.iff2 { PF } else { 0 };
                    }

                    // 67 - RRD
                    4 => {
                        let hl = self.regs.hl();
                        let value = mem.peek(hl, t);
                        mem.contend(hl, 1, 4, t);
                        mem.poke(hl, (self.regs.a << 4) | (value >> 4), t);
                        self.regs.a = (self.regs.a & 0xF0) | (value & 0x0F);
                        self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                        self.regs.wz = hl.wrapping_add(1);
                    }

                    // 6F - RLD
                    5 => {
                        let hl = self.regs.hl();
                        let value = mem.peek(hl, t);
                        mem.contend(hl, 1, 4, t);
                        mem.poke(hl, (value << 4) | (self.regs.a & 0x0F), t);
                        self.regs.a = (self.regs.a & 0xF0) | (value >> 4);
                        self.regs.f = (self.regs.f & CF) | sz53p(self.regs.a);
                        self.regs.wz = hl.wrapping_add(1);
                    }

                    // 77 7F - NOP
                    _ => {}
                },
            },

            2 => self.execute_ed_block(opcode, mem, bus, t),

            // ED 00-3F and ED C0-FF are NOPs
            _ => {}
        }
    }

    /// The sixteen ED block transfer/search/I-O instructions.
    fn execute_ed_block<M: Memory, B: Bus>(
        &mut self,
        opcode: u8,
        mem: &mut M,
        bus: &mut B,
        t: &mut TState,
    ) {
        match opcode {
            // A0 - LDI
            0xA0 => {
                let hl = self.regs.hl();
                let de = self.regs.de();
                let value = mem.peek(hl, t);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                mem.poke(de, value, t);
                mem.contend(de, 1, 2, t);
                self.regs.set_de(de.wrapping_add(1));
                self.regs.set_hl(hl.wrapping_add(1));
                self.regs.f = ld_block_flags(self.regs.f, self.regs.a, value, bc);
            }

            // A8 - LDD
            0xA8 => {
                let hl = self.regs.hl();
                let de = self.regs.de();
                let value = mem.peek(hl, t);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                mem.poke(de, value, t);
                mem.contend(de, 1, 2, t);
                self.regs.set_de(de.wrapping_sub(1));
                self.regs.set_hl(hl.wrapping_sub(1));
                self.regs.f = ld_block_flags(self.regs.f, self.regs.a, value, bc);
            }

            // B0 - LDIR / B8 - LDDR
            0xB0 | 0xB8 => {
                let hl = self.regs.hl();
                let de = self.regs.de();
                let value = mem.peek(hl, t);
                mem.poke(de, value, t);
                mem.contend(de, 1, 2, t);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = ld_block_flags(self.regs.f, self.regs.a, value, bc);
                if bc != 0 {
                    mem.contend(de, 1, 5, t);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                }
                if opcode == 0xB0 {
                    self.regs.set_de(de.wrapping_add(1));
                    self.regs.set_hl(hl.wrapping_add(1));
                } else {
                    self.regs.set_de(de.wrapping_sub(1));
                    self.regs.set_hl(hl.wrapping_sub(1));
                }
            }

            // A1 - CPI / A9 - CPD
            0xA1 | 0xA9 => {
                let hl = self.regs.hl();
                let value = mem.peek(hl, t);
                mem.contend(hl, 1, 5, t);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = cp_block_flags(self.regs.a, value, self.regs.f, bc);
                if opcode == 0xA1 {
                    self.regs.set_hl(hl.wrapping_add(1));
                    self.regs.wz = self.regs.wz.wrapping_add(1);
                } else {
                    self.regs.set_hl(hl.wrapping_sub(1));
                    self.regs.wz = self.regs.wz.wrapping_sub(1);
                }
            }

            // B1 - CPIR / B9 - CPDR
            0xB1 | 0xB9 => {
                let hl = self.regs.hl();
                let value = mem.peek(hl, t);
                mem.contend(hl, 1, 5, t);
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = cp_block_flags(self.regs.a, value, self.regs.f, bc);
                // Repeat while BC != 0 and the bytes differed
                if self.regs.f & (PF | ZF) == PF {
                    mem.contend(hl, 1, 5, t);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                } else if opcode == 0xB1 {
                    self.regs.wz = self.regs.wz.wrapping_add(1);
                } else {
                    self.regs.wz = self.regs.wz.wrapping_sub(1);
                }
                if opcode == 0xB1 {
                    self.regs.set_hl(hl.wrapping_add(1));
                } else {
                    self.regs.set_hl(hl.wrapping_sub(1));
                }
            }

            // A2 - INI / AA - IND
            0xA2 | 0xAA => {
                mem.contend(self.regs.ir(), 1, 1, t);
                let bc = self.regs.bc();
                let value = bus.port_in(bc, t);
                mem.poke(self.regs.hl(), value, t);
                let hl = self.regs.hl();
                self.regs.b = self.regs.b.wrapping_sub(1);
                let k = if opcode == 0xA2 {
                    self.regs.wz = bc.wrapping_add(1);
                    self.regs.set_hl(hl.wrapping_add(1));
                    value.wrapping_add(self.regs.c).wrapping_add(1)
                } else {
                    self.regs.wz = bc.wrapping_sub(1);
                    self.regs.set_hl(hl.wrapping_sub(1));
                    value.wrapping_add(self.regs.c).wrapping_sub(1)
                };
                self.regs.f = alu::io_block_flags(value, k, self.regs.b);
            }

            // B2 - INIR / BA - INDR
            0xB2 | 0xBA => {
                mem.contend(self.regs.ir(), 1, 1, t);
                let bc = self.regs.bc();
                let hl = self.regs.hl();
                let value = bus.port_in(bc, t);
                mem.poke(hl, value, t);
                self.regs.b = self.regs.b.wrapping_sub(1);
                let k = if opcode == 0xB2 {
                    self.regs.wz = bc.wrapping_add(1);
                    value.wrapping_add(self.regs.c).wrapping_add(1)
                } else {
                    self.regs.wz = bc.wrapping_sub(1);
                    value.wrapping_add(self.regs.c).wrapping_sub(1)
                };
                self.regs.f = alu::io_block_flags(value, k, self.regs.b);
                if self.regs.b != 0 {
                    mem.contend(hl, 1, 5, t);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                }
                if opcode == 0xB2 {
                    self.regs.set_hl(hl.wrapping_add(1));
                } else {
                    self.regs.set_hl(hl.wrapping_sub(1));
                }
            }

            // A3 - OUTI / AB - OUTD
            0xA3 | 0xAB => {
                mem.contend(self.regs.ir(), 1, 1, t);
                let hl = self.regs.hl();
                let value = mem.peek(hl, t);
                self.regs.b = self.regs.b.wrapping_sub(1);
                let bc = self.regs.bc();
                if opcode == 0xA3 {
                    self.regs.wz = bc.wrapping_add(1);
                } else {
                    self.regs.wz = bc.wrapping_sub(1);
                }
                bus.port_out(bc, value, t);
                if opcode == 0xA3 {
                    self.regs.set_hl(hl.wrapping_add(1));
                } else {
                    self.regs.set_hl(hl.wrapping_sub(1));
                }
                let k = value.wrapping_add(self.regs.l);
                self.regs.f = alu::io_block_flags(value, k, self.regs.b);
            }

            // B3 - OTIR / BB - OTDR
            0xB3 | 0xBB => {
                mem.contend(self.regs.ir(), 1, 1, t);
                let hl = self.regs.hl();
                let value = mem.peek(hl, t);
                self.regs.b = self.regs.b.wrapping_sub(1);
                let bc = self.regs.bc();
                if opcode == 0xB3 {
                    self.regs.wz = bc.wrapping_add(1);
                } else {
                    self.regs.wz = bc.wrapping_sub(1);
                }
                bus.port_out(bc, value, t);
                if opcode == 0xB3 {
                    self.regs.set_hl(hl.wrapping_add(1));
                } else {
                    self.regs.set_hl(hl.wrapping_sub(1));
                }
                let k = value.wrapping_add(self.regs.l);
                self.regs.f = alu::io_block_flags(value, k, self.regs.b);
                if self.regs.b != 0 {
                    mem.contend(bc, 1, 5, t);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                }
            }

            // Remaining ED 80-BF slots are NOPs
            _ => {}
        }
    }
}

/// Flags for LDI/LDD/LDIR/LDDR: S/Z/C preserved, P/V tracks BC != 0, and
/// bits 3/5 come from `A + transferred byte` (bit 1 of the sum lands in
/// flag bit 5).
fn ld_block_flags(f: u8, a: u8, value: u8, bc: u16) -> u8 {
    let k = value.wrapping_add(a);
    (f & (CF | ZF | SF))
        | if bc != 0 { PF } else { 0 }
        | (k & XF)
        | if k & 0x02 != 0 { YF } else { 0 }
}

/// Flags for CPI/CPD/CPIR/CPDR: carry preserved, P/V tracks BC != 0, and
/// bits 3/5 come from `A - (HL) - H` (bit 1 of that difference lands in
/// flag bit 5).
fn cp_block_flags(a: u8, value: u8, f: u8, bc: u16) -> u8 {
    let mut diff = a.wrapping_sub(value);
    let mut flags = (f & CF) | NF | if bc != 0 { PF } else { 0 };
    if (a & 0x0F) < (value & 0x0F) {
        flags |= HF;
    }
    if diff == 0 {
        flags |= ZF;
    }
    flags |= diff & SF;
    if flags & HF != 0 {
        diff = diff.wrapping_sub(1);
    }
    flags | (diff & XF) | if diff & 0x02 != 0 { YF } else { 0 }
}
