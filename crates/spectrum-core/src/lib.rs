//! Memory and port I/O plumbing for a cycle-accurate ZX Spectrum core.
//!
//! The CPU crate drives these two seams:
//!
//! - [`Memory`]: a 64 KiB address space with ROM protection and ULA
//!   contention. Every timed access takes the caller-owned t-state counter
//!   by mutable reference and advances it by the documented Z80 cost plus
//!   any contention delay.
//! - [`Bus`]: 16-bit port input/output. Implementations route to the ULA,
//!   AY, joystick and friends; [`OpenBus`] is the trivial floating-bus
//!   implementation for hosts without peripherals.
//!
//! The counter itself belongs to the host's frame loop, which typically runs
//! the CPU for [`TSTATES_PER_FRAME`] t-states and then raises an interrupt.

mod bus;
mod memory;

pub use bus::{contend_port, Bus, OpenBus};
pub use memory::{ContendedMemory, Memory, MemoryError};

/// One Z80 clock cycle (~286 ns at 3.5 MHz). Owned by the caller and passed
/// by mutable reference into every operation that advances time.
pub type TState = i64;

/// T-states per PAL 48K frame.
pub const TSTATES_PER_FRAME: TState = 69_888;

/// T-states per scan line.
pub const TSTATES_PER_LINE: TState = 224;

/// Display lines subject to contention.
pub const DISPLAY_LINES: TState = 192;

/// First t-state of the contended display window.
pub const CONTENTION_START: TState = 14_335;

/// Length of the precomputed contention table.
pub const CONTENTION_TABLE_LEN: usize = 70_930;
