//! Z80 test harness
//!
//! An in-process Z80 interpreter paired with a harness that lets unit
//! tests load assembled code, drive execution with breakpoints and step
//! hooks, and assert over register state, memory contents and I/O port
//! traffic.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//! - `bus`: byte-oriented memory and port access with test-installable hooks
//! - `cpu`: the Z80 interpreter (documented and undocumented opcodes,
//!   X/Y flag copies, interrupt modes 0/1/2, T-state accounting)
//! - `program`: the compiled-program shape and the assembler collaborator
//!   trait
//! - `harness`: load/run/call/step primitives, breakpoints, step mocks,
//!   coverage and diagnostics
//! - `spy`: scripted I/O port expectations for asserting bus traffic
//!
//! # Example
//!
//! ```
//! use z80_harness::{Harness, RunOptions};
//!
//! let mut harness = Harness::new();
//! // LD A,0x12 ; HALT
//! harness.load(&[0x3E, 0x12, 0x76], 0u16).unwrap();
//! let result = harness.run(Some(0u16.into()), RunOptions::default()).unwrap();
//! assert_eq!(harness.cpu.a, 0x12);
//! assert_eq!(result.instructions, 2);
//! ```

pub mod bus;
pub mod cpu;
pub mod harness;
pub mod program;
pub mod spy;

#[cfg(test)]
mod harness_integration_test;

pub use bus::Bus;
pub use cpu::{Cpu, InterruptMode, LastOp};
pub use harness::{
    Harness, HarnessError, MemorySnapshot, RunOptions, RunResult, StepAction, StopCause,
};
pub use program::{Addr, AssembleError, Assembler, Program};
pub use spy::{IoSpy, SpyPort, SpyValues};
