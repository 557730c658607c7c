//! Z80 CPU tests
//!
//! Test suite for the Z80 interpreter, organized into:
//! - instructions.rs: documented instructions and instruction families
//! - undocumented.rs: undocumented opcodes and the X/Y flag copies
//! - interrupts.rs: interrupt modes, IFF handling, DI/EI delay, R register
//! - properties.rs: property tests over random programs and operands

use super::*;
use crate::bus::Bus;


// ========== Test Helpers ==========

/// CPU + bus with `code` loaded at address 0 and PC pointing at it
fn setup(code: &[u8]) -> (Cpu, Bus) {
    let mut bus = Bus::new();
    bus.load(code, 0);
    (Cpu::new(), bus)
}

/// Assert F matches, with all eight bits spelled out on mismatch
#[track_caller]
fn assert_flags(cpu: &Cpu, expected: u8, context: &str) {
    assert_eq!(
        cpu.f, expected,
        "{}: flags mismatch. Expected {:08b}, got {:08b} (S={} Z={} Y={} H={} X={} PV={} N={} C={})",
        context,
        expected,
        cpu.f,
        if cpu.flag_s() { 1 } else { 0 },
        if cpu.flag_z() { 1 } else { 0 },
        if cpu.f & flags::Y != 0 { 1 } else { 0 },
        if cpu.flag_h() { 1 } else { 0 },
        if cpu.f & flags::X != 0 { 1 } else { 0 },
        if cpu.flag_pv() { 1 } else { 0 },
        if cpu.flag_n() { 1 } else { 0 },
        if cpu.flag_c() { 1 } else { 0 },
    );
}
