//! The Z80 itself: machine state, M1 fetch, stepping and interrupts.
//!
//! The CPU owns nothing but its register file. Memory and bus are passed
//! into every operation together with the caller's t-state counter, so a
//! frame driver can interleave other hardware between instructions keyed on
//! the counter value.

use spectrum_core::{Bus, Memory, TState};

use crate::alu;
use crate::flags::{CF, PF, SF, ZF};
use crate::registers::Registers;

mod execute;
mod indexed;

/// Which index register a DD/FD prefix selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    Ix,
    Iy,
}

/// Z80 CPU state.
pub struct Z80 {
    /// The register file, public for snapshot loaders, debuggers and test
    /// harnesses.
    pub regs: Registers,
    /// Set while the instruction most recently executed was EI: a maskable
    /// interrupt arriving now is deferred by one instruction.
    pub ei_delay: bool,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            ei_delay: false,
        }
    }

    /// Reset the CPU. A soft reset zeroes PC, I and R, disables interrupts,
    /// selects IM 0 and leaves the halt state; other registers keep their
    /// (architecturally indeterminate) values. A hard reset zeroes the whole
    /// register file first.
    pub fn reset(&mut self, hard: bool) {
        if hard {
            self.regs = Registers::default();
        }
        self.regs.pc = 0;
        self.regs.i = 0;
        self.regs.r = 0;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.im = 0;
        self.regs.halted = false;
        self.ei_delay = false;
    }

    /// Decode and execute one instruction, advancing `t` by its exact cost.
    pub fn step<M: Memory, B: Bus>(&mut self, mem: &mut M, bus: &mut B, t: &mut TState) {
        self.ei_delay = false;
        let opcode = self.fetch(mem, t);
        self.execute_unprefixed(opcode, mem, bus, t);
    }

    /// Attempt to accept a maskable interrupt. Returns whether it was
    /// accepted; refusal means interrupts are disabled or the previous
    /// instruction was EI.
    pub fn interrupt<M: Memory>(&mut self, mem: &mut M, t: &mut TState) -> bool {
        if self.ei_delay {
            log::trace!("interrupt deferred by EI");
            return false;
        }
        if !self.regs.iff1 {
            return false;
        }

        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.inc_r();

        *t += 7;
        let pc = self.regs.pc;
        self.push(pc, mem, t);
        self.regs.pc = if self.regs.im == 2 {
            // The Spectrum's open data bus supplies $FF as the vector byte
            let vector = u16::from(self.regs.i) << 8 | 0x00FF;
            mem.peek16(vector, t)
        } else {
            // IM 0 is unused on the Spectrum; treat it as IM 1
            0x0038
        };
        self.regs.wz = self.regs.pc;
        log::trace!("interrupt accepted, im={} pc={:04X}", self.regs.im, self.regs.pc);
        true
    }

    /// Non-maskable interrupt: always accepted.
    pub fn nmi<M: Memory>(&mut self, mem: &mut M, t: &mut TState) {
        if self.regs.halted {
            self.regs.halted = false;
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.regs.iff1 = false;
        self.regs.inc_r();

        *t += 5;
        let pc = self.regs.pc;
        self.push(pc, mem, t);
        self.regs.pc = 0x0066;
        self.regs.wz = self.regs.pc;
        log::trace!("nmi accepted");
    }

    /// Is the CPU parked on a HALT?
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// M1 cycle: bump R, contend PC for 4 t-states, read the opcode.
    pub(crate) fn fetch<M: Memory>(&mut self, mem: &mut M, t: &mut TState) -> u8 {
        self.regs.inc_r();
        mem.contend(self.regs.pc, 4, 1, t);
        let opcode = mem.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        opcode
    }

    /// 8-bit register by decode index (B C D E H L _ A). Index 6 is the
    /// memory operand and is always handled by the caller.
    pub(crate) fn reg8(&self, index: u8) -> u8 {
        match index {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => panic!("(HL) is not a simple register"),
        }
    }

    pub(crate) fn set_reg8(&mut self, index: u8, value: u8) {
        match index {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => panic!("(HL) is not a simple register"),
        }
    }

    /// 16-bit pair, table 1: BC DE HL SP.
    pub(crate) fn rp(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.sp,
            _ => unreachable!(),
        }
    }

    pub(crate) fn set_rp(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.sp = value,
            _ => unreachable!(),
        }
    }

    /// 16-bit pair, table 2 (PUSH/POP): BC DE HL AF.
    pub(crate) fn rp2(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.af(),
            _ => unreachable!(),
        }
    }

    pub(crate) fn set_rp2(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.set_af(value),
            _ => unreachable!(),
        }
    }

    pub(crate) fn index(&self, idx: Index) -> u16 {
        match idx {
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    pub(crate) fn set_index(&mut self, idx: Index, value: u16) {
        match idx {
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    /// Condition by decode index: NZ Z NC C PO PE P M.
    pub(crate) fn condition(&self, y: u8) -> bool {
        let f = self.regs.f;
        match y {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            7 => f & SF != 0,
            _ => unreachable!(),
        }
    }

    pub(crate) fn push<M: Memory>(&mut self, value: u16, mem: &mut M, t: &mut TState) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.poke(self.regs.sp, hi, t);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.poke(self.regs.sp, lo, t);
    }

    pub(crate) fn pop<M: Memory>(&mut self, mem: &mut M, t: &mut TState) -> u16 {
        let value = mem.peek16(self.regs.sp, t);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Apply the ALU operation selected by `y` (ADD ADC SUB SBC AND XOR OR
    /// CP) to A and the operand.
    pub(crate) fn alu_op(&mut self, y: u8, operand: u8) {
        let a = self.regs.a;
        let carry = self.regs.f & CF != 0;
        let result = match y {
            0 => alu::add8(a, operand, false),
            1 => alu::add8(a, operand, carry),
            2 => alu::sub8(a, operand, false),
            3 => alu::sub8(a, operand, carry),
            4 => alu::and8(a, operand),
            5 => alu::xor8(a, operand),
            6 => alu::or8(a, operand),
            7 => alu::cp8(a, operand),
            _ => unreachable!(),
        };
        if y != 7 {
            self.regs.a = result.value;
        }
        self.regs.f = result.flags;
    }

    /// Apply the CB rotate/shift selected by `y` (RLC RRC RL RR SLA SRA SLL
    /// SRL), setting flags and returning the shifted value.
    pub(crate) fn shift_op(&mut self, y: u8, value: u8) -> u8 {
        let carry = self.regs.f & CF != 0;
        let result = match y {
            0 => alu::rlc8(value),
            1 => alu::rrc8(value),
            2 => alu::rl8(value, carry),
            3 => alu::rr8(value, carry),
            4 => alu::sla8(value),
            5 => alu::sra8(value),
            6 => alu::sll8(value),
            7 => alu::srl8(value),
            _ => unreachable!(),
        };
        self.regs.f = result.flags;
        result.value
    }

    /// INC with carry preserved.
    pub(crate) fn inc_op(&mut self, value: u8) -> u8 {
        let result = alu::inc8(value);
        self.regs.f = (self.regs.f & CF) | result.flags;
        result.value
    }

    /// DEC with carry preserved.
    pub(crate) fn dec_op(&mut self, value: u8) -> u8 {
        let result = alu::dec8(value);
        self.regs.f = (self.regs.f & CF) | result.flags;
        result.value
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign-extend a displacement byte to a 16-bit offset.
pub(crate) fn sign_extend(d: u8) -> u16 {
    d as i8 as i16 as u16
}
