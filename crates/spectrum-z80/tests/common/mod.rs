//! Shared harness for the integration suites: a cleared 48K memory, an
//! open bus, and code assembled at an uncontended address.

#![allow(dead_code)] // Each suite uses a different slice of the harness.

use spectrum_core::{ContendedMemory, Memory, OpenBus, TState};
use spectrum_z80::Z80;

/// Where test code is assembled: uncontended RAM.
pub const ORG: u16 = 0x8000;

pub struct Machine {
    pub cpu: Z80,
    pub mem: ContendedMemory,
    pub bus: OpenBus,
    pub t: TState,
}

impl Machine {
    /// Build a machine with `code` at [`ORG`] and PC pointing at it.
    /// Memory is cleared first so leftover power-on noise cannot leak into
    /// assertions.
    pub fn with_code(code: &[u8]) -> Self {
        let mut mem = ContendedMemory::new();
        mem.clear();
        mem.load(ORG, code);
        let mut cpu = Z80::new();
        cpu.regs.pc = ORG;
        Self {
            cpu,
            mem,
            bus: OpenBus,
            t: 0,
        }
    }

    pub fn step(&mut self) {
        self.cpu.step(&mut self.mem, &mut self.bus, &mut self.t);
    }

    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}
