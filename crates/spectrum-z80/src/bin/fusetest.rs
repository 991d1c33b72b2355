//! FUSE Z80 test suite runner.
//!
//! Replays the FUSE emulator's `tests.in` / `tests.expected` pair against
//! the interpreter: each test sets up registers and memory, runs until a
//! t-state threshold, and compares the final register file, memory and
//! t-state count.
//!
//! Usage: `fusetest [tests.in] [tests.expected]`

use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use spectrum_core::{Bus, Memory, TState};
use spectrum_z80::Z80;

/// Flat 64 KiB memory: no ROM, no contention, so every access costs its
/// documented count exactly as the FUSE harness assumes.
struct TestMemory {
    ram: Box<[u8]>,
}

impl TestMemory {
    fn new() -> Self {
        Self {
            ram: vec![0u8; 0x1_0000].into_boxed_slice(),
        }
    }
}

impl Memory for TestMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }

    fn contended(&self, _addr: u16) -> bool {
        false
    }

    fn contention_delay(&self, _addr: u16, _t: TState) -> u8 {
        0
    }

    fn load(&mut self, addr: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.ram[addr.wrapping_add(i as u16) as usize] = byte;
        }
    }

    fn clear(&mut self) {
        self.ram.fill(0);
    }
}

/// FUSE's port model: IN returns the high byte of the port address.
struct TestBus;

impl Bus for TestBus {
    fn port_in(&mut self, port: u16, t: &mut TState) -> u8 {
        *t += 4;
        (port >> 8) as u8
    }

    fn port_out(&mut self, _port: u16, _value: u8, t: &mut TState) {
        *t += 4;
    }
}

/// One parsed `tests.in` entry.
struct TestInput {
    name: String,
    regs: [u16; 12],
    i: u8,
    r: u8,
    iff1: bool,
    iff2: bool,
    im: u8,
    halted: bool,
    /// Minimum t-states to run before stopping.
    ticks: TState,
    memory: Vec<(u16, Vec<u8>)>,
}

/// One parsed `tests.expected` entry.
struct TestExpected {
    regs: [u16; 12],
    i: u8,
    r: u8,
    halted: bool,
    t_states: TState,
    memory: Vec<(u16, Vec<u8>)>,
}

fn parse_hex_u16(s: &str) -> u16 {
    u16::from_str_radix(s, 16).unwrap_or(0)
}

fn parse_hex_u8(s: &str) -> u8 {
    u8::from_str_radix(s, 16).unwrap_or(0)
}

/// Parse the two register lines shared by both file formats. Line one is
/// `AF BC DE HL AF' BC' DE' HL' IX IY SP PC`; line two is
/// `I R IFF1 IFF2 IM HALTED TICKS`.
fn parse_reg_lines(reg_line: &str, state_line: &str) -> Option<TestInput> {
    let regs: Vec<&str> = reg_line.split_whitespace().collect();
    if regs.len() < 12 {
        return None;
    }
    let state: Vec<&str> = state_line.split_whitespace().collect();
    if state.len() < 7 {
        return None;
    }

    let mut reg_words = [0u16; 12];
    for (slot, text) in reg_words.iter_mut().zip(&regs) {
        *slot = parse_hex_u16(text);
    }

    Some(TestInput {
        name: String::new(),
        regs: reg_words,
        i: parse_hex_u8(state[0]),
        r: parse_hex_u8(state[1]),
        iff1: state[2] != "0",
        iff2: state[3] != "0",
        im: state[4].parse().unwrap_or(0),
        halted: state[5] != "0",
        ticks: state[6].parse().unwrap_or(1),
        memory: Vec::new(),
    })
}

/// Parse a memory line: `addr b0 b1 ... -1`. Returns None for the block
/// terminator line `-1`.
fn parse_memory_line(line: &str) -> Option<(u16, Vec<u8>)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() || parts[0] == "-1" {
        return None;
    }
    let addr = u16::from_str_radix(parts[0], 16).ok()?;
    let mut bytes = Vec::new();
    for &part in &parts[1..] {
        if part == "-1" {
            break;
        }
        bytes.push(parse_hex_u8(part));
    }
    if bytes.is_empty() {
        None
    } else {
        Some((addr, bytes))
    }
}

fn parse_tests_in(content: &str) -> Vec<TestInput> {
    let mut tests = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(name_line) = lines.next() {
        let name = name_line.trim();
        if name.is_empty() {
            continue;
        }

        let Some(reg_line) = lines.next() else { break };
        let Some(state_line) = lines.next() else { break };
        let Some(mut input) = parse_reg_lines(reg_line, state_line) else {
            continue;
        };
        input.name = name.to_string();

        // Memory chunks until the -1 terminator
        for mem_line in lines.by_ref() {
            match parse_memory_line(mem_line) {
                Some(chunk) => input.memory.push(chunk),
                None => break,
            }
        }

        tests.push(input);
    }

    tests
}

fn parse_tests_expected(content: &str) -> HashMap<String, TestExpected> {
    let mut tests = HashMap::new();
    let mut lines = content.lines().peekable();

    while let Some(name_line) = lines.next() {
        let name = name_line.trim();
        if name.is_empty() {
            continue;
        }

        // Bus event lines (indented) record the access trace; the final
        // state is what we compare, so skip them.
        while let Some(&line) = lines.peek() {
            if !line.starts_with(' ') && !line.starts_with('\t') {
                break;
            }
            lines.next();
        }

        let Some(reg_line) = lines.next() else { break };
        let Some(state_line) = lines.next() else { break };
        let Some(parsed) = parse_reg_lines(reg_line, state_line) else {
            continue;
        };

        let mut expected = TestExpected {
            regs: parsed.regs,
            i: parsed.i,
            r: parsed.r,
            halted: parsed.halted,
            t_states: parsed.ticks,
            memory: Vec::new(),
        };

        // Optional memory chunks, terminated by a blank line or the next
        // test name
        while let Some(&line) = lines.peek() {
            if line.trim().is_empty() {
                lines.next();
                break;
            }
            if !line.chars().next().is_some_and(|c| c.is_ascii_hexdigit()) {
                break;
            }
            let line = lines.next().expect("peeked line");
            if let Some(chunk) = parse_memory_line(line) {
                expected.memory.push(chunk);
            }
        }

        tests.insert(name.to_string(), expected);
    }

    tests
}

fn setup(cpu: &mut Z80, input: &TestInput) {
    let [af, bc, de, hl, af_alt, bc_alt, de_alt, hl_alt, ix, iy, sp, pc] = input.regs;
    cpu.regs.set_af(af);
    cpu.regs.set_bc(bc);
    cpu.regs.set_de(de);
    cpu.regs.set_hl(hl);
    cpu.regs.a_alt = (af_alt >> 8) as u8;
    cpu.regs.f_alt = af_alt as u8;
    cpu.regs.b_alt = (bc_alt >> 8) as u8;
    cpu.regs.c_alt = bc_alt as u8;
    cpu.regs.d_alt = (de_alt >> 8) as u8;
    cpu.regs.e_alt = de_alt as u8;
    cpu.regs.h_alt = (hl_alt >> 8) as u8;
    cpu.regs.l_alt = hl_alt as u8;
    cpu.regs.ix = ix;
    cpu.regs.iy = iy;
    cpu.regs.sp = sp;
    cpu.regs.pc = pc;
    cpu.regs.i = input.i;
    cpu.regs.r = input.r;
    cpu.regs.iff1 = input.iff1;
    cpu.regs.iff2 = input.iff2;
    cpu.regs.im = input.im;
    cpu.regs.halted = input.halted;
}

fn check_u16(errors: &mut Vec<String>, name: &str, actual: u16, expected: u16) {
    if actual != expected {
        errors.push(format!("{name}: got {actual:04X}, expected {expected:04X}"));
    }
}

fn run_test(input: &TestInput, expected: &TestExpected) -> Result<(), String> {
    let mut mem = TestMemory::new();
    let mut bus = TestBus;
    let mut cpu = Z80::new();
    let mut t: TState = 0;

    for (addr, bytes) in &input.memory {
        mem.load(*addr, bytes);
    }
    setup(&mut cpu, input);

    // Execute every instruction that starts before the tick threshold,
    // trapping panics so one broken opcode doesn't end the whole run
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        while t < input.ticks {
            cpu.step(&mut mem, &mut bus, &mut t);
        }
    }));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        return Err(format!("PANIC: {message}"));
    }

    let mut errors = Vec::new();
    let actual = [
        cpu.regs.af(),
        cpu.regs.bc(),
        cpu.regs.de(),
        cpu.regs.hl(),
        u16::from(cpu.regs.a_alt) << 8 | u16::from(cpu.regs.f_alt),
        u16::from(cpu.regs.b_alt) << 8 | u16::from(cpu.regs.c_alt),
        u16::from(cpu.regs.d_alt) << 8 | u16::from(cpu.regs.e_alt),
        u16::from(cpu.regs.h_alt) << 8 | u16::from(cpu.regs.l_alt),
        cpu.regs.ix,
        cpu.regs.iy,
        cpu.regs.sp,
        cpu.regs.pc,
    ];
    let names = [
        "AF", "BC", "DE", "HL", "AF'", "BC'", "DE'", "HL'", "IX", "IY", "SP", "PC",
    ];
    for ((name, actual), expected) in names.iter().zip(actual).zip(expected.regs) {
        check_u16(&mut errors, name, actual, expected);
    }

    if cpu.regs.i != expected.i {
        errors.push(format!("I: got {:02X}, expected {:02X}", cpu.regs.i, expected.i));
    }
    if cpu.regs.r & 0x7F != expected.r & 0x7F {
        errors.push(format!("R: got {:02X}, expected {:02X}", cpu.regs.r, expected.r));
    }
    if cpu.regs.halted != expected.halted {
        errors.push(format!(
            "HALT: got {}, expected {}",
            cpu.regs.halted, expected.halted
        ));
    }
    if t != expected.t_states {
        errors.push(format!("T-states: got {t}, expected {}", expected.t_states));
    }

    for (addr, bytes) in &expected.memory {
        for (i, &byte) in bytes.iter().enumerate() {
            let at = addr.wrapping_add(i as u16);
            let got = mem.read(at);
            if got != byte {
                errors.push(format!("Memory[{at:04X}]: got {got:02X}, expected {byte:02X}"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn main() -> ExitCode {
    let tests_in_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "fuse-tests/tests.in".to_string());
    let tests_expected_path = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "fuse-tests/tests.expected".to_string());

    let tests_in = match fs::read_to_string(&tests_in_path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("cannot read {tests_in_path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let tests_expected = match fs::read_to_string(&tests_expected_path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("cannot read {tests_expected_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let inputs = parse_tests_in(&tests_in);
    let expected = parse_tests_expected(&tests_expected);
    println!("parsed {} inputs, {} expected results", inputs.len(), expected.len());

    let mut passed = 0u32;
    let mut failed = 0u32;
    let mut skipped = 0u32;
    let mut failures = Vec::new();

    for input in &inputs {
        match expected.get(&input.name) {
            Some(exp) => match run_test(input, exp) {
                Ok(()) => passed += 1,
                Err(err) => {
                    failed += 1;
                    if failures.len() < 20 {
                        failures.push(format!("{}: {err}", input.name));
                    }
                }
            },
            None => skipped += 1,
        }
    }

    println!("\nresults: {passed} passed, {failed} failed, {skipped} skipped");
    if !failures.is_empty() {
        println!("\nfirst {} failures:", failures.len());
        for failure in &failures {
            println!("  {failure}");
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
