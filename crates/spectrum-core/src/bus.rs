//! Port I/O seam.
//!
//! The CPU issues one [`Bus::port_in`] or [`Bus::port_out`] per I/O machine
//! cycle; the implementation routes the access to the ULA and peripherals
//! and accounts for the cycle's 4 t-states plus any I/O contention. The
//! contention cases depend on two bits of the port address:
//!
//! - whether the high byte selects the contended page (`$40xx-$7Fxx`), and
//! - whether bit 0 is low (the ULA responds to every even port).
//!
//! [`contend_port`] implements the resulting four patterns so that bus
//! implementations only deal with routing.

use crate::memory::Memory;
use crate::TState;

/// Port input/output as seen by the CPU core.
pub trait Bus {
    /// Read a byte from a 16-bit port. Adds the 4 t-state I/O cycle plus
    /// contention to `t`.
    fn port_in(&mut self, port: u16, t: &mut TState) -> u8;

    /// Write a byte to a 16-bit port. Timing as for [`Bus::port_in`].
    fn port_out(&mut self, port: u16, value: u8, t: &mut TState);
}

/// Apply I/O contention and the 4 t-state I/O cycle for an access to
/// `port`, using `mem`'s contention table.
///
/// Patterns (C = contended cycle, N = plain cycle):
///
/// - contended page, ULA port:     C:1, C:3
/// - contended page, non-ULA port: C:1, C:1, C:1, C:1
/// - uncontended,    ULA port:     N:1, C:3
/// - uncontended,    non-ULA port: N:4
pub fn contend_port<M: Memory>(mem: &mut M, port: u16, t: &mut TState) {
    let ula_port = port & 0x01 == 0;
    if mem.contended(port) {
        if ula_port {
            mem.contend(port, 1, 1, t);
            mem.contend(port, 3, 1, t);
        } else {
            mem.contend(port, 1, 4, t);
        }
    } else if ula_port {
        *t += 1;
        mem.contend(port, 3, 1, t);
    } else {
        *t += 4;
    }
}

/// A bus with nothing attached: reads float to `$FF`, writes disappear,
/// every access costs the flat 4 t-states.
pub struct OpenBus;

impl Bus for OpenBus {
    fn port_in(&mut self, _port: u16, t: &mut TState) -> u8 {
        *t += 4;
        0xFF
    }

    fn port_out(&mut self, _port: u16, _value: u8, t: &mut TState) {
        *t += 4;
    }
}
