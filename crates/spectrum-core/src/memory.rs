//! 64 KiB memory with ROM protection and ULA contention.
//!
//! The ULA steals the bus from the CPU while it fetches display data, so
//! accesses to `$4000-$7FFF` during the active display window stall by an
//! amount that depends only on the current t-state. The delays are
//! precomputed into a table indexed by absolute t-state; the timed access
//! methods consult it on every contended cycle.

#![allow(clippy::cast_possible_truncation)] // Intentional: u16 addresses index the 64 KiB store.

use crate::{CONTENTION_START, CONTENTION_TABLE_LEN, DISPLAY_LINES, TState, TSTATES_PER_LINE};

/// Size of the address space.
const MEMORY_SIZE: usize = 0x1_0000;

/// Size of the ROM region at `$0000`.
const ROM_SIZE: usize = 0x4000;

/// Per-line contention pattern, repeated 16 times over the 128 display
/// t-states of each line.
const LINE_PATTERN: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];

/// Default seed for power-on RAM scrambling.
const POWER_ON_SEED: u64 = 0x5DEE_CE66_D1CE_BEEF;

/// Memory as seen by the CPU core.
///
/// The required methods are untimed primitives; the provided methods layer
/// the Z80 access timing on top and are the only ones the interpreter calls
/// mid-instruction. Implementations other than [`ContendedMemory`] (flat
/// test memories, banked 128K models) supply their own primitives and
/// inherit the same timing algebra.
pub trait Memory {
    /// Read a byte without advancing time.
    fn read(&self, addr: u16) -> u8;

    /// Write a byte without advancing time. Writes to read-only addresses
    /// are silently dropped.
    fn write(&mut self, addr: u16, value: u8);

    /// Is this address (or port, when the high byte selects the contended
    /// page) subject to ULA contention?
    fn contended(&self, addr: u16) -> bool;

    /// Contention delay for `addr` at t-state `t`; zero when the address is
    /// uncontended or `t` falls outside the display window.
    fn contention_delay(&self, addr: u16, t: TState) -> u8;

    /// Bulk-load bytes, bypassing read-only protection. Clamped to the
    /// 64 KiB bound.
    fn load(&mut self, addr: u16, data: &[u8]);

    /// Zero the full 64 KiB, including the ROM region.
    fn clear(&mut self);

    /// Apply `count` cycles of `delay` t-states each on `addr`, adding the
    /// contention in force at the start of each cycle. This models the
    /// Z80's repeated M-cycle pattern on a single address.
    fn contend(&mut self, addr: u16, delay: TState, count: u32, t: &mut TState) {
        for _ in 0..count {
            *t += TState::from(self.contention_delay(addr, *t)) + delay;
        }
    }

    /// Timed byte read: 3 t-states plus contention.
    fn peek(&mut self, addr: u16, t: &mut TState) -> u8 {
        self.contend(addr, 3, 1, t);
        self.read(addr)
    }

    /// Timed byte write: 3 t-states plus contention. ROM writes still pay
    /// the cycle cost.
    fn poke(&mut self, addr: u16, value: u8, t: &mut TState) {
        self.contend(addr, 3, 1, t);
        self.write(addr, value);
    }

    /// Timed little-endian word read; the high byte comes from
    /// `addr + 1 mod 65536`.
    fn peek16(&mut self, addr: u16, t: &mut TState) -> u16 {
        let lo = self.peek(addr, t);
        let hi = self.peek(addr.wrapping_add(1), t);
        u16::from_le_bytes([lo, hi])
    }

    /// Timed little-endian word write, low byte first.
    fn poke16(&mut self, addr: u16, value: u16, t: &mut TState) {
        let [lo, hi] = value.to_le_bytes();
        self.poke(addr, lo, t);
        self.poke(addr.wrapping_add(1), hi, t);
    }
}

/// Memory construction/loading errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A ROM image must fill the ROM region exactly.
    #[error("ROM image must be {ROM_SIZE} bytes, got {0}")]
    RomSize(usize),
}

/// The 48K Spectrum memory map: 16 KiB ROM, 48 KiB RAM, with `$4000-$7FFF`
/// shared with the ULA and therefore contended.
///
/// Power-on state scrambles all 65,536 bytes from a deterministic stream so
/// that runs are reproducible; [`ContendedMemory::with_seed`] picks the
/// stream explicitly for tests that care.
pub struct ContendedMemory {
    bytes: Box<[u8]>,
    read_only: Box<[bool]>,
    contention: Box<[u8]>,
}

impl ContendedMemory {
    /// Create a memory with the default power-on scramble and the ROM
    /// region marked read-only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(POWER_ON_SEED)
    }

    /// Create a memory scrambled from the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let mut bytes = vec![0u8; MEMORY_SIZE].into_boxed_slice();
        let mut stream = XorShift::new(seed);
        for b in bytes.iter_mut() {
            *b = stream.next_byte();
        }

        let mut read_only = vec![false; MEMORY_SIZE].into_boxed_slice();
        read_only[..ROM_SIZE].fill(true);

        Self {
            bytes,
            read_only,
            contention: build_contention_table(),
        }
    }

    /// Load a 16 KiB ROM image at `$0000`, bypassing write protection.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::RomSize`] if `rom` is not exactly 16,384
    /// bytes.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), MemoryError> {
        if rom.len() != ROM_SIZE {
            return Err(MemoryError::RomSize(rom.len()));
        }
        self.bytes[..ROM_SIZE].copy_from_slice(rom);
        log::debug!("loaded {ROM_SIZE} byte ROM image");
        Ok(())
    }

    /// Toggle write protection for the whole ROM region. Snapshot loaders
    /// lift it temporarily; normal operation keeps it on.
    pub fn set_rom_writable(&mut self, writable: bool) {
        self.read_only[..ROM_SIZE].fill(!writable);
    }
}

impl Default for ContendedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for ContendedMemory {
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if !self.read_only[addr as usize] {
            self.bytes[addr as usize] = value;
        }
    }

    fn contended(&self, addr: u16) -> bool {
        // Slot 1: address = SS__ ____ ____ ____ with SS = 01
        addr & 0xC000 == 0x4000
    }

    fn contention_delay(&self, addr: u16, t: TState) -> u8 {
        if !self.contended(addr) {
            return 0;
        }
        debug_assert!(
            (0..self.contention.len() as TState).contains(&t),
            "t-state {t} outside the contention table"
        );
        usize::try_from(t)
            .ok()
            .and_then(|i| self.contention.get(i))
            .copied()
            .unwrap_or(0)
    }

    fn load(&mut self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        let len = data.len().min(MEMORY_SIZE - start);
        self.bytes[start..start + len].copy_from_slice(&data[..len]);
    }

    fn clear(&mut self) {
        self.bytes.fill(0);
        log::debug!("memory cleared");
    }
}

/// Build the absolute-t-state contention table: zero outside the display
/// window, and for each of the 192 display lines the per-octet pattern over
/// the first 128 t-states of the 224-t-state line.
fn build_contention_table() -> Box<[u8]> {
    let mut table = vec![0u8; CONTENTION_TABLE_LEN].into_boxed_slice();
    let mut t = CONTENTION_START as usize;
    for _line in 0..DISPLAY_LINES {
        for _octet in 0..16 {
            table[t..t + 8].copy_from_slice(&LINE_PATTERN);
            t += 8;
        }
        // Border and retrace: 96 uncontended t-states
        t += (TSTATES_PER_LINE - 128) as usize;
    }
    table
}

/// xorshift64* stream for power-on RAM scrambling.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { POWER_ON_SEED } else { seed })
    }

    fn next_byte(&mut self) -> u8 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        (self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_marked_read_only() {
        let mut mem = ContendedMemory::new();
        mem.load(0x0000, &[0xF3]);
        mem.load(0x3FFF, &[0xC9]);
        mem.write(0x0000, 0x00);
        mem.write(0x3FFF, 0x00);
        assert_eq!(mem.read(0x0000), 0xF3);
        assert_eq!(mem.read(0x3FFF), 0xC9);
    }

    #[test]
    fn ram_read_write() {
        let mut mem = ContendedMemory::new();
        mem.write(0x4000, 0xAB);
        assert_eq!(mem.read(0x4000), 0xAB);
        mem.write(0xFFFF, 0xCD);
        assert_eq!(mem.read(0xFFFF), 0xCD);
    }

    #[test]
    fn rom_writable_toggle() {
        let mut mem = ContendedMemory::new();
        mem.set_rom_writable(true);
        mem.write(0x0000, 0x42);
        assert_eq!(mem.read(0x0000), 0x42);
        mem.set_rom_writable(false);
        mem.write(0x0000, 0x43);
        assert_eq!(mem.read(0x0000), 0x42);
    }

    #[test]
    fn load_bypasses_rom_protection() {
        let mut mem = ContendedMemory::new();
        mem.load(0x0000, &[0x11, 0x22, 0x33]);
        assert_eq!(mem.read(0x0000), 0x11);
        assert_eq!(mem.read(0x0002), 0x33);
    }

    #[test]
    fn load_clamped_at_top_of_memory() {
        let mut mem = ContendedMemory::new();
        mem.load(0x0000, &[0xAA]);
        mem.load(0xFFFE, &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.read(0xFFFE), 0x11);
        assert_eq!(mem.read(0xFFFF), 0x22);
        // The overflow bytes are dropped, not wrapped to $0000
        assert_eq!(mem.read(0x0000), 0xAA);
    }

    #[test]
    fn load_rom_size_checked() {
        let mut mem = ContendedMemory::new();
        assert!(matches!(
            mem.load_rom(&[0u8; 100]),
            Err(MemoryError::RomSize(100))
        ));
        assert!(mem.load_rom(&vec![0xC9; 0x4000]).is_ok());
        assert_eq!(mem.read(0x0000), 0xC9);
    }

    #[test]
    fn power_on_state_deterministic() {
        let a = ContendedMemory::new();
        let b = ContendedMemory::new();
        for addr in [0x0000u16, 0x3FFF, 0x4000, 0x8001, 0xFFFF] {
            assert_eq!(a.read(addr), b.read(addr));
        }
        // All 65,536 bytes are scrambled, the last one included
        let c = ContendedMemory::with_seed(1);
        let d = ContendedMemory::with_seed(2);
        assert!((0..=0xFFFFu16).any(|addr| c.read(addr) != d.read(addr)));
    }

    #[test]
    fn clear_zeroes_everything() {
        let mut mem = ContendedMemory::new();
        mem.clear();
        assert!((0..=0xFFFFu16).all(|addr| mem.read(addr) == 0));
    }

    #[test]
    fn contended_addresses() {
        let mem = ContendedMemory::new();
        assert!(!mem.contended(0x0000));
        assert!(!mem.contended(0x3FFF));
        assert!(mem.contended(0x4000));
        assert!(mem.contended(0x7FFF));
        assert!(!mem.contended(0x8000));
        assert!(!mem.contended(0xFFFF));
    }

    #[test]
    fn contention_table_pattern() {
        let mem = ContendedMemory::new();
        // Start of the display window
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START), 6);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 1), 5);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 5), 1);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 6), 0);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 7), 0);
        // Pattern repeats every 8 t-states across the 128-t-state burst
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 8), 6);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 120), 6);
        // Right border of the line
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 128), 0);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START + 223), 0);
        // Next line starts the pattern again
        assert_eq!(
            mem.contention_delay(0x4000, CONTENTION_START + TSTATES_PER_LINE),
            6
        );
        // Before the window
        assert_eq!(mem.contention_delay(0x4000, 0), 0);
        assert_eq!(mem.contention_delay(0x4000, CONTENTION_START - 1), 0);
        // After the last display line
        let end = CONTENTION_START + DISPLAY_LINES * TSTATES_PER_LINE;
        assert_eq!(mem.contention_delay(0x4000, end), 0);
    }

    #[test]
    fn contention_only_in_slot_one() {
        let mem = ContendedMemory::new();
        assert_eq!(mem.contention_delay(0x8000, CONTENTION_START), 0);
        assert_eq!(mem.contention_delay(0x0000, CONTENTION_START), 0);
    }

    #[test]
    fn contend_uncontended_is_flat() {
        let mut mem = ContendedMemory::new();
        let mut t: TState = 0;
        mem.contend(0x8000, 3, 4, &mut t);
        assert_eq!(t, 12);
    }

    #[test]
    fn contend_applies_table_per_cycle() {
        let mut mem = ContendedMemory::new();
        // At pattern position 0 the delays walk the table:
        // 6+1 -> pos 7 (0), 0+1 -> pos 0 (6), 6+1 -> pos 7, 0+1
        let mut t = CONTENTION_START;
        mem.contend(0x4000, 1, 4, &mut t);
        assert_eq!(t, CONTENTION_START + 16);
    }

    #[test]
    fn peek_costs_three_plus_contention() {
        let mut mem = ContendedMemory::new();
        let mut t: TState = 0;
        mem.peek(0x8000, &mut t);
        assert_eq!(t, 3);

        let mut t = CONTENTION_START;
        mem.peek(0x4000, &mut t);
        assert_eq!(t, CONTENTION_START + 9); // 6 stalled + 3
    }

    #[test]
    fn poke_pays_cycle_even_into_rom() {
        let mut mem = ContendedMemory::new();
        let before = mem.read(0x1000);
        let mut t: TState = 0;
        mem.poke(0x1000, before.wrapping_add(1), &mut t);
        assert_eq!(t, 3);
        assert_eq!(mem.read(0x1000), before);
    }

    #[test]
    fn word_access_wraps_and_is_little_endian() {
        let mut mem = ContendedMemory::new();
        mem.load(0x0000, &[0x55]);
        let mut t: TState = 0;
        mem.poke16(0xFFFF, 0xBEEF, &mut t);
        assert_eq!(t, 6);
        assert_eq!(mem.read(0xFFFF), 0xEF);
        // High byte wrapped to $0000, which is ROM, so the write was dropped
        assert_eq!(mem.read(0x0000), 0x55);

        mem.load(0xFFFF, &[0x34]);
        mem.load(0x0000, &[0x12]);
        let mut t: TState = 0;
        assert_eq!(mem.peek16(0xFFFF, &mut t), 0x1234);
        assert_eq!(t, 6);
    }
}
