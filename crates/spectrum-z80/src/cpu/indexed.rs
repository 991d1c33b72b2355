//! DD/FD-prefixed execution: IX/IY substitution and the DDCB/FDCB family.
//!
//! A DD or FD prefix swaps HL for the index register, H/L for its halves,
//! and `(HL)` for `(ii+d)` with a signed displacement. Opcodes the prefix
//! does not touch fall through to the unprefixed executor, having already
//! paid the prefix's fetch; chained prefixes therefore restart naturally
//! (`DD DD`, `DD FD`, `DD ED` all behave like the last prefix).

#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

use spectrum_core::{Bus, Memory, TState};

use crate::alu;
use crate::cpu::{sign_extend, Index};
use crate::flags::{PF, SF, ZF};

use super::Z80;

impl Z80 {
    /// Execute one DD/FD-prefixed opcode (prefix already fetched).
    pub(crate) fn execute_indexed<M: Memory, B: Bus>(
        &mut self,
        idx: Index,
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
            0 => match (z, y) {
                // 21 - LD ii,nn
                (1, 4) => {
                    let nn = mem.peek16(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    self.set_index(idx, nn);
                }

                // 09 19 29 39 - ADD ii,rr (HL slot is the index register)
                (1, _) if q == 1 => {
                    mem.contend(self.regs.ir(), 1, 7, t);
                    let ii = self.index(idx);
                    self.regs.wz = ii.wrapping_add(1);
                    let operand = if p == 2 { ii } else { self.rp(p) };
                    let (value, flags) = alu::add16(ii, operand);
                    self.set_index(idx, value);
                    self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                }

                // 22 - LD (nn),ii
                (2, 4) => {
                    let addr = mem.peek16(self.regs.pc, t);
                    let ii = self.index(idx);
                    mem.poke16(addr, ii, t);
                    self.regs.wz = addr.wrapping_add(1);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                }

                // 2A - LD ii,(nn)
                (2, 5) => {
                    let addr = mem.peek16(self.regs.pc, t);
                    let value = mem.peek16(addr, t);
                    self.set_index(idx, value);
                    self.regs.pc = self.regs.pc.wrapping_add(2);
                    self.regs.wz = addr.wrapping_add(1);
                }

                // 23 - INC ii / 2B - DEC ii
                (3, 4) | (3, 5) => {
                    mem.contend(self.regs.ir(), 1, 2, t);
                    let ii = if y == 4 {
                        self.index(idx).wrapping_add(1)
                    } else {
                        self.index(idx).wrapping_sub(1)
                    };
                    self.set_index(idx, ii);
                }

                // 24 - INC iih / 2C - INC iil
                (4, 4) | (4, 5) => {
                    let value = self.inc_op(self.index_reg8(idx, y));
                    self.set_index_reg8(idx, y, value);
                }

                // 34 - INC (ii+d)
                (4, 6) => {
                    let addr = self.index_addr(idx, mem, t);
                    let value = mem.peek(addr, t);
                    mem.contend(addr, 1, 1, t);
                    let value = self.inc_op(value);
                    mem.poke(addr, value, t);
                }

                // 25 - DEC iih / 2D - DEC iil
                (5, 4) | (5, 5) => {
                    let value = self.dec_op(self.index_reg8(idx, y));
                    self.set_index_reg8(idx, y, value);
                }

                // 35 - DEC (ii+d)
                (5, 6) => {
                    let addr = self.index_addr(idx, mem, t);
                    let value = mem.peek(addr, t);
                    mem.contend(addr, 1, 1, t);
                    let value = self.dec_op(value);
                    mem.poke(addr, value, t);
                }

                // 26 - LD iih,n / 2E - LD iil,n
                (6, 4) | (6, 5) => {
                    let value = mem.peek(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    self.set_index_reg8(idx, y, value);
                }

                // 36 - LD (ii+d),n
                (6, 6) => {
                    let d = mem.peek(self.regs.pc, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    let value = mem.peek(self.regs.pc, t);
                    mem.contend(self.regs.pc, 1, 2, t);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    self.regs.wz = self.index(idx).wrapping_add(sign_extend(d));
                    mem.poke(self.regs.wz, value, t);
                }

                // The prefix changes nothing else in this quadrant
                _ => self.execute_unprefixed(opcode, mem, bus, t),
            },

            1 => {
                if y == 6 && z == 6 {
                    // DD 76 is still HALT
                    self.execute_unprefixed(opcode, mem, bus, t);
                } else if y == 6 {
                    // 70-77 - LD (ii+d),r: the source is the real register
                    let addr = self.index_addr(idx, mem, t);
                    mem.poke(addr, self.reg8(z), t);
                } else if z == 6 {
                    // 46-7E - LD r,(ii+d): the target is the real register
                    let addr = self.index_addr(idx, mem, t);
                    let value = mem.peek(addr, t);
                    self.set_reg8(y, value);
                } else {
                    // LD r,r' with H/L replaced by the index halves
                    let value = self.index_reg8(idx, z);
                    self.set_index_reg8(idx, y, value);
                }
            }

            2 => {
                // 80-BF - ALU A,r with index substitution
                let operand = if z == 6 {
                    let addr = self.index_addr(idx, mem, t);
                    mem.peek(addr, t)
                } else {
                    self.index_reg8(idx, z)
                };
                self.alu_op(y, operand);
            }

            _ => match opcode {
                // DDCB / FDCB
                0xCB => self.execute_indexed_cb(idx, mem, t),

                // E1 - POP ii
                0xE1 => {
                    let value = self.pop(mem, t);
                    self.set_index(idx, value);
                }

                // E3 - EX (SP),ii
                0xE3 => {
                    let sp = self.regs.sp;
                    let value = mem.peek16(sp, t);
                    let ii = self.index(idx);
                    mem.contend(sp.wrapping_add(1), 1, 1, t);
                    mem.poke(sp.wrapping_add(1), (ii >> 8) as u8, t);
                    mem.poke(sp, ii as u8, t);
                    mem.contend(sp, 1, 2, t);
                    self.set_index(idx, value);
                    self.regs.wz = value;
                }

                // E5 - PUSH ii
                0xE5 => {
                    mem.contend(self.regs.ir(), 1, 1, t);
                    let ii = self.index(idx);
                    self.push(ii, mem, t);
                }

                // E9 - JP (ii)
                0xE9 => self.regs.pc = self.index(idx),

                // F9 - LD SP,ii
                0xF9 => {
                    mem.contend(self.regs.ir(), 1, 2, t);
                    self.regs.sp = self.index(idx);
                }

                _ => self.execute_unprefixed(opcode, mem, bus, t),
            },
        }
    }

    /// Execute one DDCB/FDCB opcode. Operand order is fixed: displacement
    /// byte, then opcode byte, both plain reads — R does not count them.
    fn execute_indexed_cb<M: Memory>(&mut self, idx: Index, mem: &mut M, t: &mut TState) {
        mem.contend(self.regs.pc, 3, 1, t);
        let d = mem.read(self.regs.pc);
        self.regs.wz = self.index(idx).wrapping_add(sign_extend(d));
        self.regs.pc = self.regs.pc.wrapping_add(1);

        mem.contend(self.regs.pc, 3, 1, t);
        let opcode = mem.read(self.regs.pc);
        mem.contend(self.regs.pc, 1, 2, t);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let addr = self.regs.wz;

        match x {
            // rot/shift (ii+d), copied into a register unless z == 6
            0 => {
                let value = mem.peek(addr, t);
                mem.contend(addr, 1, 1, t);
                let value = self.shift_op(y, value);
                if z != 6 {
                    self.set_reg8(z, value);
                }
                mem.poke(addr, value, t);
            }

            // BIT y,(ii+d): bits 3/5 from the effective address high byte
            1 => {
                let value = mem.peek(addr, t);
                mem.contend(addr, 1, 1, t);
                self.regs.f = alu::bit8_wz(value, y, self.regs.f, self.regs.wz);
            }

            // RES y,(ii+d) / SET y,(ii+d), copied into a register unless z == 6
            _ => {
                let value = mem.peek(addr, t);
                let value = if x == 2 {
                    value & !(1 << y)
                } else {
                    value | (1 << y)
                };
                if z != 6 {
                    self.set_reg8(z, value);
                }
                mem.contend(addr, 1, 1, t);
                mem.poke(addr, value, t);
            }
        }
    }

    /// H or L of the index register for decode indices 4/5, the real
    /// register otherwise.
    fn index_reg8(&self, idx: Index, i: u8) -> u8 {
        match i {
            4 => (self.index(idx) >> 8) as u8,
            5 => self.index(idx) as u8,
            _ => self.reg8(i),
        }
    }

    fn set_index_reg8(&mut self, idx: Index, i: u8, value: u8) {
        match i {
            4 => {
                let ii = self.index(idx);
                self.set_index(idx, (ii & 0x00FF) | u16::from(value) << 8);
            }
            5 => {
                let ii = self.index(idx);
                self.set_index(idx, (ii & 0xFF00) | u16::from(value));
            }
            _ => self.set_reg8(i, value),
        }
    }

    /// Fetch the displacement, pay its five internal cycles, and latch the
    /// effective address into MEMPTR.
    fn index_addr<M: Memory>(&mut self, idx: Index, mem: &mut M, t: &mut TState) -> u16 {
        let d = mem.peek(self.regs.pc, t);
        mem.contend(self.regs.pc, 1, 5, t);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.wz = self.index(idx).wrapping_add(sign_extend(d));
        self.regs.wz
    }
}
