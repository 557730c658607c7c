//! End-to-end harness scenarios
//!
//! Drives the full stack the way a consumer test suite does: programs
//! loaded as raw bytes or through the assembler-collaborator interface,
//! runs with breakpoints and call-return stops, scripted port traffic via
//! the I/O spy, and fake-call mocks.

use std::cell::RefCell;
use std::rc::Rc;

use crate::harness::{Harness, RunOptions, StopCause};
use crate::program::{AssembleError, Assembler, Program};
use crate::spy::IoSpy;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The demo program shared by the first two scenarios:
///
/// ```text
/// start:     ld a,0
///            halt
///            org 20
/// newstart:  or a
///            ld a,$12
///            nop
///            nop
///            nop
/// breakhere: ld a,$13
///            nop
///            jp newstart
/// ```
const DEMO_BYTES: [u8; 32] = [
    0x3E, 0x00, 0x76, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0xB7, 0x3E, 0x12, 0x00, 0x00, 0x00, 0x3E, 0x13, 0x00, 0xC3,
    0x14, 0x00,
];

fn demo_program() -> Program {
    Program {
        data: DEMO_BYTES.to_vec(),
        symbols: [
            ("START".to_string(), 0u16),
            ("NEWSTART".to_string(), 20),
            ("BREAKHERE".to_string(), 26),
        ]
        .into_iter()
        .collect(),
    }
}

/// Stand-in for the external assembler: source goes in, the pre-assembled
/// demo program comes out.
struct DemoAssembler;

impl Assembler for DemoAssembler {
    fn assemble(&self, source: &str, _org: u16) -> Result<Program, AssembleError> {
        if source.trim().is_empty() {
            return Err(AssembleError::new("empty source"));
        }
        Ok(demo_program())
    }
}

const DEMO_SOURCE: &str = "\
start: ld a,0
       halt
       org 20
newstart: or a
          ld a,$12
          nop
          nop
          nop
breakhere: ld a,$13
           nop
           jp newstart
";

#[test]
fn test_compile_and_break_at_symbol() {
    init_logging();
    let mut harness = Harness::new();
    harness.set_assembler(Box::new(DemoAssembler));
    harness.compile(DEMO_SOURCE, None).unwrap();

    harness.set_breakpoint("breakhere").unwrap();
    harness
        .run(Some("newstart".into()), RunOptions::default())
        .unwrap();

    assert_eq!(harness.cpu.a, 0x12);
    assert!(harness.cpu.flag_z());
    assert_eq!(harness.cpu.pc, 26);
    assert_eq!(harness.last_stop_cause(), StopCause::Breakpoint);
}

#[test]
fn test_compile_propagates_assembler_failure() {
    let mut harness = Harness::new();
    harness.set_assembler(Box::new(DemoAssembler));
    assert!(harness.compile("   ", None).is_err());
}

#[test]
fn test_compile_without_assembler_fails() {
    let mut harness = Harness::new();
    assert!(harness.compile(DEMO_SOURCE, None).is_err());
}

#[test]
fn test_raw_bytes_and_numeric_breakpoint() {
    init_logging();
    let mut harness = Harness::new();
    harness.load(&DEMO_BYTES, 0u16).unwrap();

    harness.set_breakpoint(26u16).unwrap();
    harness
        .run(Some(20u16.into()), RunOptions::default())
        .unwrap();

    assert_eq!(harness.cpu.a, 0x12);
    assert!(harness.cpu.flag_z());
}

/// ```text
/// write_line: ld a,(hl)      ; next byte of the message
///             or a
///             ret z          ; NUL terminates
/// wl_wait:    in a,(9)       ; status port, 0 means ready
///             or a
///             jr nz,wl_wait
///             ld a,(hl)
///             out (8),a      ; data port
///             inc hl
///             jr write_line
/// ```
const WRITE_LINE: [u8; 14] = [
    0x7E, 0xB7, 0xC8, 0xDB, 0x09, 0xB7, 0x20, 0xFB, 0x7E, 0xD3, 0x08, 0x23, 0x18, 0xF2,
];

#[test]
fn test_write_line_with_scripted_out() {
    init_logging();
    let mut harness = Harness::new();
    harness.load_program(
        &Program::new()
            .org(0x0100)
            .label("write_line")
            .append(&WRITE_LINE),
    );
    harness.load(b"Hello\0", 0x5000u16).unwrap();
    harness.cpu.hl = 0x5000;

    let spy = Rc::new(RefCell::new(
        IoSpy::new().expect_write(8u16, "Hello").ignore_reads(),
    ));
    harness.attach_spy(&spy).unwrap();

    harness
        .call(
            Some("write_line".into()),
            RunOptions {
                sp: Some(0xFF00u16.into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(harness.last_stop_cause(), StopCause::CallReturn);
    spy.borrow().assert_complete();
}

/// ```text
/// read_char: in a,(9)        ; status port, 0 means ready
///            or a
///            jr nz,read_char
///            in a,(8)        ; data port
///            ret
/// ```
const READ_CHAR: [u8; 8] = [0xDB, 0x09, 0xB7, 0x20, 0xFC, 0xDB, 0x08, 0xC9];

#[test]
fn test_read_char_waits_for_ready() {
    init_logging();
    let mut harness = Harness::new();
    harness.load_program(&Program::new().org(0x0100).label("read_char").append(&READ_CHAR));

    // Busy three times, then ready; then the data port delivers 'A'
    let spy = Rc::new(RefCell::new(
        IoSpy::new()
            .expect_read(9u16, [0xFF, 0xFF, 0xFF, 0x00])
            .expect_read(8u16, 65u8),
    ));
    harness.attach_spy(&spy).unwrap();

    harness
        .call(
            Some("read_char".into()),
            RunOptions {
                sp: Some(0xFF00u16.into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(harness.cpu.a, 65);
    spy.borrow().assert_complete();
}

/// ```text
/// sound_bell:  ld a,$ff
///              out (6),a     ; bell on
///              ld b,$ff
///              ld c,$10
/// sound_bell1: djnz sound_bell1
///              dec c
///              jr nz,sound_bell1
///              xor a
///              out (6),a     ; bell off
///              ret
/// ```
const SOUND_BELL: [u8; 17] = [
    0x3E, 0xFF, 0xD3, 0x06, 0x06, 0xFF, 0x0E, 0x10, 0x10, 0xFE, 0x0D, 0x20, 0xFB, 0xAF, 0xD3,
    0x06, 0xC9,
];

#[test]
fn test_sound_bell_delay_loop() {
    init_logging();
    let mut harness = Harness::new();
    harness.load_program(
        &Program::new()
            .org(0x0100)
            .label("sound_bell")
            .append(&SOUND_BELL)
            .symbol("sound_bell1", 0x0108),
    );

    // Exactly two writes on the bell port: on, then off
    let spy = Rc::new(RefCell::new(
        IoSpy::new().expect_write(6u16, [0xFF, 0x00]),
    ));
    harness.attach_spy(&spy).unwrap();

    // Count instruction fetches of the inner loop head
    let loop_head = harness.get_address("sound_bell1").unwrap();
    let fetches = Rc::new(RefCell::new(0u32));
    let counter = fetches.clone();
    harness.bus.on_mem_read = Some(Box::new(move |addr| {
        if addr == loop_head {
            *counter.borrow_mut() += 1;
        }
        None
    }));

    harness
        .call(
            Some("sound_bell".into()),
            RunOptions {
                sp: Some(0xFF00u16.into()),
                ..Default::default()
            },
        )
        .unwrap();

    spy.borrow().assert_complete();
    // B counts 0xFF down once, then 0x100 per remaining outer pass
    assert_eq!(*fetches.borrow(), 0x100 * 0x10 - 1);
}

/// ```text
/// start: ld a,5
///        call sub
///        add a,1
///        halt
/// sub:   ret
/// ```
const FAKE_CALL_DEMO: [u8; 9] = [0x3E, 0x05, 0xCD, 0x08, 0x00, 0xC6, 0x01, 0x76, 0xC9];

#[test]
fn test_fake_call_replaces_subroutine() {
    init_logging();
    let mut harness = Harness::new();
    harness.load_program(
        &Program {
            data: FAKE_CALL_DEMO.to_vec(),
            symbols: [("START".to_string(), 0u16), ("SUB".to_string(), 8)]
                .into_iter()
                .collect(),
        },
    );
    harness.cpu.sp = 0xFF00;

    // Without mocks the real subroutine runs
    harness
        .run(Some("start".into()), RunOptions::default())
        .unwrap();
    assert_eq!(harness.cpu.a, 6);

    // With a fake call the body is replaced but the caller still resumes
    let mut harness = Harness::new();
    harness.load(&FAKE_CALL_DEMO, 0u16).unwrap();
    harness.load_program(&Program::new().symbol("sub", 8));
    harness.cpu.sp = 0xFF00;
    harness
        .mock_call("sub", |cpu, _| cpu.a = cpu.a.wrapping_add(10))
        .unwrap();

    harness
        .run(Some(0u16.into()), RunOptions::default())
        .unwrap();
    assert_eq!(harness.cpu.a, 16);
}

#[test]
fn test_coverage_spans_a_run() {
    init_logging();
    let mut harness = Harness::new();
    harness.load(&DEMO_BYTES, 0u16).unwrap();
    harness.set_breakpoint(26u16).unwrap();

    let result = harness
        .run(
            Some(20u16.into()),
            RunOptions {
                coverage: true,
                ..Default::default()
            },
        )
        .unwrap();

    // or a / ld a,$12 / three nops
    assert_eq!(result.instructions, 5);
    assert_eq!(result.coverage[&20], 1);
    assert_eq!(result.coverage[&21], 1);
    assert_eq!(result.coverage[&23], 1);
    assert_eq!(result.coverage.get(&26), None);
}
