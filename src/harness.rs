//! Execution harness
//!
//! Owns a CPU and its bus, a symbol table accumulated across loaded
//! programs, a breakpoint set and an ordered chain of step mocks. Exposes
//! the load/run/call/step primitives tests drive the interpreter with.
//!
//! The run loop never fails; symbol-resolution problems surface from the
//! entry points before any instruction executes.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;

use crate::bus::Bus;
use crate::cpu::{Cpu, LastOp};
use crate::program::{Addr, AssembleError, Assembler, Program};
use crate::spy::IoSpy;

/// Errors surfaced by harness entry points
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Symbol {0} not found")]
    SymbolNotFound(String),
    #[error("no assembler attached to this harness")]
    NoAssembler,
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Verdict of a step observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepAction {
    /// Execute the instruction normally
    #[default]
    Run,
    /// Stop the run loop before executing the instruction
    Break,
    /// Skip the instruction: no execution, no T-states charged
    Skip,
}

/// Side-effect callback of a fake-call mock
pub type CallMockFn = Box<dyn FnMut(&mut Cpu, &mut Bus)>;
/// Decision callback of a step mock
pub type StepMockFn = Box<dyn FnMut(&mut Cpu, &mut Bus) -> StepAction>;

/// One observer in the step-mock chain
enum StepMock {
    /// Intercepts CALL/RST/interrupt transfers landing at `addr`: runs the
    /// side effect, then simulates the RET so the caller resumes with an
    /// intact stack. Plain jumps or fallthrough to `addr` are untouched.
    FakeCall { addr: u16, callback: CallMockFn },
    /// Fires only when PC matches `addr`
    OnStep { addr: u16, callback: StepMockFn },
    /// Fires on every step
    OnEveryStep { callback: StepMockFn },
    /// Emits a one-line register dump; always lets the step run
    Logger,
}

impl StepMock {
    /// Chain priority: fake-call, then targeted mocks, then unconditional
    /// mocks, then loggers.
    fn priority(&self) -> u8 {
        match self {
            StepMock::FakeCall { .. } => 0,
            StepMock::OnStep { .. } => 1,
            StepMock::OnEveryStep { .. } => 2,
            StepMock::Logger => 3,
        }
    }
}

/// Why the run loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopCause {
    /// CPU executed HALT
    Halted,
    /// Instruction budget exhausted
    #[default]
    StepLimit,
    /// PC reached an address in the breakpoint set
    Breakpoint,
    /// A step mock returned Break
    MockBreak,
    /// The routine entered via `call` executed its matching RET
    CallReturn,
}

/// Options accepted by [`Harness::run`] and [`Harness::call`]
pub struct RunOptions {
    /// Maximum instruction count before the loop stops normally
    pub steps: u64,
    /// Stop when the entry routine returns (SP back above the entry frame
    /// and the last executed instruction was a RET)
    pub call: bool,
    /// Initial SP for `call`; falls back to the harness default
    pub sp: Option<Addr>,
    /// Count executed instructions per address
    pub coverage: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            steps: 10_000_000,
            call: false,
            sp: None,
            coverage: false,
        }
    }
}

/// What a run produced: instruction count, T-states, and (when requested)
/// a per-address execution counter.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub instructions: u64,
    pub t_states: u64,
    pub coverage: HashMap<u16, u64>,
}

/// In-memory capture of backing memory plus the symbol table
#[derive(Clone)]
pub struct MemorySnapshot {
    mem: Vec<u8>,
    symbols: HashMap<String, u16>,
}

/// How many executed steps the trace keeps for post-mortem output
const STEP_TRACE_DEPTH: usize = 32;

/// One executed instruction, captured by the run loop's tracing path.
///
/// Only the first opcode byte and the byte after it are kept: enough to
/// name any instruction group, since every prefixed form is selected by
/// its second byte. Operand bytes are not interesting after the fact -
/// the registers already show their effect.
#[derive(Clone, Copy)]
struct StepRecord {
    /// PC the instruction was fetched from
    pc: u16,
    /// First opcode byte
    op: u8,
    /// Following byte (the selecting byte of a prefixed instruction)
    sub: u8,
    /// T-states the step consumed
    t_states: u32,
}

/// Default SP installed by [`Harness::call`] when none is configured
pub const DEFAULT_CALL_SP: u16 = 0xFF00;

/// Test harness: a CPU, its bus, and the scaffolding tests hang off them.
pub struct Harness {
    pub cpu: Cpu,
    pub bus: Bus,
    symbols: HashMap<String, u16>,
    breakpoints: HashSet<u16>,
    mocks: Vec<StepMock>,
    assembler: Option<Box<dyn Assembler>>,
    /// SP installed by `call` when the options carry none
    pub default_call_sp: u16,
    trace_steps: bool,
    trace: VecDeque<StepRecord>,
    last_stop: StopCause,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            symbols: HashMap::new(),
            breakpoints: HashSet::new(),
            mocks: Vec::new(),
            assembler: None,
            default_call_sp: DEFAULT_CALL_SP,
            trace_steps: false,
            trace: VecDeque::new(),
            last_stop: StopCause::default(),
        }
    }

    /// Attach the assembler collaborator used by `compile`/`compile_file`
    pub fn set_assembler(&mut self, assembler: Box<dyn Assembler>) {
        self.assembler = Some(assembler);
    }

    /// Log a brief register line before every executed instruction
    pub fn set_step_trace(&mut self, enabled: bool) {
        self.trace_steps = enabled;
    }

    // ========== Symbols and memory ==========

    /// Resolve a numeric or symbolic address. Symbols match
    /// case-insensitively against the accumulated table.
    pub fn get_address(&self, addr: impl Into<Addr>) -> Result<u16, HarnessError> {
        match addr.into() {
            Addr::Num(addr) => Ok(addr),
            Addr::Sym(name) => self
                .symbols
                .get(&name.to_uppercase())
                .copied()
                .ok_or(HarnessError::SymbolNotFound(name)),
        }
    }

    /// Write bytes into backing memory starting at the resolved address
    pub fn load(&mut self, bytes: &[u8], start: impl Into<Addr>) -> Result<(), HarnessError> {
        let start = self.get_address(start)?;
        self.bus.load(bytes, start);
        Ok(())
    }

    /// Merge a compiled program's symbols into the harness table and load
    /// its bytes (origined at 0)
    pub fn load_program(&mut self, program: &Program) {
        for (name, addr) in &program.symbols {
            self.symbols.insert(name.to_uppercase(), *addr);
        }
        self.bus.load(&program.data, 0);
    }

    /// Assemble source via the attached collaborator and load the result
    pub fn compile(&mut self, source: &str, start: Option<u16>) -> Result<(), HarnessError> {
        let assembler = self.assembler.as_ref().ok_or(HarnessError::NoAssembler)?;
        let program = assembler.assemble(source, start.unwrap_or(0))?;
        self.load_program(&program);
        Ok(())
    }

    /// Read assembler source from disk, then `compile`
    pub fn compile_file(
        &mut self,
        path: impl AsRef<Path>,
        start: Option<u16>,
    ) -> Result<(), HarnessError> {
        let source = std::fs::read_to_string(path)?;
        self.compile(&source, start)
    }

    /// Copy of a memory slice, read straight from backing memory
    pub fn get_memory(
        &self,
        start: impl Into<Addr>,
        length: usize,
    ) -> Result<Vec<u8>, HarnessError> {
        let start = self.get_address(start)?;
        let mut out = Vec::with_capacity(length);
        for offset in 0..length {
            out.push(self.bus.peek_byte(start.wrapping_add(offset as u16)));
        }
        Ok(out)
    }

    /// Capture backing memory and the symbol table
    pub fn save_memory(&self) -> MemorySnapshot {
        MemorySnapshot {
            mem: self.bus.mem().to_vec(),
            symbols: self.symbols.clone(),
        }
    }

    /// Restore a snapshot taken with `save_memory`
    pub fn load_memory(&mut self, snapshot: &MemorySnapshot) {
        self.bus.mem_mut().copy_from_slice(&snapshot.mem);
        self.symbols = snapshot.symbols.clone();
    }

    // ========== Breakpoints and step mocks ==========

    /// Add an address to the breakpoint set
    pub fn set_breakpoint(&mut self, addr: impl Into<Addr>) -> Result<(), HarnessError> {
        let addr = self.get_address(addr)?;
        self.breakpoints.insert(addr);
        Ok(())
    }

    /// Remove an address from the breakpoint set
    pub fn clear_breakpoint(&mut self, addr: impl Into<Addr>) -> Result<(), HarnessError> {
        let addr = self.get_address(addr)?;
        self.breakpoints.remove(&addr);
        Ok(())
    }

    /// Replace the subroutine at `addr` with a callback. The mock fires
    /// only when control arrived via CALL, RST or an interrupt; it runs the
    /// side effect, pops the return address and resumes the caller.
    pub fn mock_call(
        &mut self,
        addr: impl Into<Addr>,
        callback: impl FnMut(&mut Cpu, &mut Bus) + 'static,
    ) -> Result<(), HarnessError> {
        let addr = self.get_address(addr)?;
        self.push_mock(StepMock::FakeCall {
            addr,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Install a step mock firing only at `addr`
    pub fn mock_step(
        &mut self,
        addr: impl Into<Addr>,
        callback: impl FnMut(&mut Cpu, &mut Bus) -> StepAction + 'static,
    ) -> Result<(), HarnessError> {
        let addr = self.get_address(addr)?;
        self.push_mock(StepMock::OnStep {
            addr,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Install a step mock firing on every step
    pub fn mock_all_steps(
        &mut self,
        callback: impl FnMut(&mut Cpu, &mut Bus) -> StepAction + 'static,
    ) {
        self.push_mock(StepMock::OnEveryStep {
            callback: Box::new(callback),
        });
    }

    /// Install a logger observer that dumps registers on every step
    pub fn mock_step_log(&mut self) {
        self.push_mock(StepMock::Logger);
    }

    /// Remove all installed step mocks
    pub fn clear_mocks(&mut self) {
        self.mocks.clear();
    }

    fn push_mock(&mut self, mock: StepMock) {
        self.mocks.push(mock);
        // Stable sort keeps installation order within a priority class
        self.mocks.sort_by_key(|m| m.priority());
    }

    /// Script the harness's I/O traffic with an [`IoSpy`]: resolves any
    /// symbolic ports, then installs the spy as both I/O hooks.
    pub fn attach_spy(&mut self, spy: &Rc<RefCell<IoSpy>>) -> Result<(), HarnessError> {
        let names = spy.borrow().symbol_ports();
        let mut resolved = HashMap::new();
        for name in names {
            let addr = self.get_address(name.as_str())?;
            resolved.insert(name, (addr & 0xFF) as u8);
        }
        spy.borrow_mut().resolve_ports(&resolved);

        let reader = spy.clone();
        self.bus.on_io_read = Some(Box::new(move |port| reader.borrow_mut().io_read(port)));
        let writer = spy.clone();
        self.bus.on_io_write = Some(Box::new(move |port, value| {
            writer.borrow_mut().io_write(port, value)
        }));
        Ok(())
    }

    // ========== Run loop ==========

    /// Run from `start` (or the current PC) until a stop condition fires.
    ///
    /// Stop conditions, checked in order on every iteration: HALT, the
    /// `steps` budget, the breakpoint set, a mock returning Break, and the
    /// call-return predicate when `options.call` is set. Exhausting the
    /// step budget is a normal stop, not an error.
    pub fn run(
        &mut self,
        start: Option<Addr>,
        options: RunOptions,
    ) -> Result<RunResult, HarnessError> {
        if let Some(start) = start {
            self.cpu.pc = self.get_address(start)?;
        }

        let entry_sp = self.cpu.sp;
        let mut result = RunResult::default();

        loop {
            if self.cpu.halted {
                self.last_stop = StopCause::Halted;
                break;
            }
            if result.instructions >= options.steps {
                self.last_stop = StopCause::StepLimit;
                break;
            }
            if self.breakpoints.contains(&self.cpu.pc) {
                self.last_stop = StopCause::Breakpoint;
                break;
            }
            match Self::run_mocks(&mut self.mocks, &mut self.cpu, &mut self.bus) {
                StepAction::Break => {
                    self.last_stop = StopCause::MockBreak;
                    break;
                }
                StepAction::Skip => continue,
                StepAction::Run => {}
            }
            if options.call
                && self.cpu.last_op == LastOp::Ret
                && self.cpu.sp == entry_sp.wrapping_add(2)
            {
                self.last_stop = StopCause::CallReturn;
                break;
            }

            if self.trace_steps {
                log::trace!("{}", self.format_brief_registers());
            }
            if options.coverage {
                *result.coverage.entry(self.cpu.pc).or_insert(0) += 1;
            }

            // Snapshot the opcode bytes before execution; self-modifying
            // code would invalidate a later read
            let pc = self.cpu.pc;
            let op = self.bus.peek_byte(pc);
            let sub = self.bus.peek_byte(pc.wrapping_add(1));

            let t_states = self.cpu.step(&mut self.bus);
            self.push_trace(StepRecord {
                pc,
                op,
                sub,
                t_states,
            });

            result.t_states += t_states as u64;
            result.instructions += 1;
        }

        log::debug!(
            "run stopped: {:?} after {} instructions / {} T-states at PC={:04X}",
            self.last_stop,
            result.instructions,
            result.t_states,
            self.cpu.pc,
        );

        Ok(result)
    }

    /// Invoke a routine: install the call SP, then run with the
    /// call-return stop enabled.
    pub fn call(
        &mut self,
        start: Option<Addr>,
        options: RunOptions,
    ) -> Result<RunResult, HarnessError> {
        let sp = match &options.sp {
            Some(addr) => self.get_address(addr.clone())?,
            None => self.default_call_sp,
        };
        self.cpu.sp = sp;
        self.cpu.last_op = LastOp::None;
        self.run(
            start,
            RunOptions {
                call: true,
                ..options
            },
        )
    }

    /// Why the most recent run stopped
    pub fn last_stop_cause(&self) -> StopCause {
        self.last_stop
    }

    /// Run the mock chain in priority order; the first non-Run verdict
    /// decides the step's fate.
    fn run_mocks(mocks: &mut [StepMock], cpu: &mut Cpu, bus: &mut Bus) -> StepAction {
        for mock in mocks.iter_mut() {
            match mock {
                StepMock::FakeCall { addr, callback } => {
                    let called = matches!(cpu.last_op, LastOp::Call | LastOp::Rst | LastOp::Int);
                    if cpu.pc == *addr && called {
                        callback(cpu, bus);
                        let ret = cpu.pop_word(bus);
                        cpu.pc = ret;
                        cpu.last_op = LastOp::Ret;
                        return StepAction::Skip;
                    }
                }
                StepMock::OnStep { addr, callback } => {
                    if cpu.pc == *addr {
                        match callback(cpu, bus) {
                            StepAction::Run => {}
                            verdict => return verdict,
                        }
                    }
                }
                StepMock::OnEveryStep { callback } => match callback(cpu, bus) {
                    StepAction::Run => {}
                    verdict => return verdict,
                },
                StepMock::Logger => {
                    log::debug!(
                        "A={:02X} F={:02X} BC={:04X} DE={:04X} HL={:04X} SP={:04X} PC={:04X}",
                        cpu.a,
                        cpu.f,
                        cpu.bc,
                        cpu.de,
                        cpu.hl,
                        cpu.sp,
                        cpu.pc,
                    );
                }
            }
        }
        StepAction::Run
    }

    /// Append a step record, dropping the oldest once the trace is full
    fn push_trace(&mut self, record: StepRecord) {
        if self.trace.len() == STEP_TRACE_DEPTH {
            self.trace.pop_front();
        }
        self.trace.push_back(record);
    }

    // ========== Diagnostics ==========

    /// One-line register summary used by step tracing and the logger mock
    pub fn format_brief_registers(&self) -> String {
        let f = self.cpu.f;
        let flag = |bit: u8, ch: char| if f & bit != 0 { ch } else { '-' };
        format!(
            "A={:02X} BC={:04X} DE={:04X} HL={:04X} IX={:04X} IY={:04X} SP={:04X} PC={:04X} {}{}{}{}{}{}{}{}",
            self.cpu.a,
            self.cpu.bc,
            self.cpu.de,
            self.cpu.hl,
            self.cpu.ix,
            self.cpu.iy,
            self.cpu.sp,
            self.cpu.pc,
            flag(crate::cpu::flags::S, 'S'),
            flag(crate::cpu::flags::Z, 'Z'),
            flag(crate::cpu::flags::Y, '5'),
            flag(crate::cpu::flags::H, 'H'),
            flag(crate::cpu::flags::X, '3'),
            flag(crate::cpu::flags::PV, 'P'),
            flag(crate::cpu::flags::N, 'N'),
            flag(crate::cpu::flags::C, 'C'),
        )
    }

    /// Multi-line register dump
    pub fn show_registers(&self) -> String {
        format!(
            "AF={:02X}{:02X} BC={:04X} DE={:04X} HL={:04X}\n\
             AF'={:02X}{:02X} BC'={:04X} DE'={:04X} HL'={:04X}\n\
             IX={:04X} IY={:04X} SP={:04X} PC={:04X} I={:02X} R={:02X}\n\
             Flags: S={} Z={} H={} PV={} N={} C={}\n\
             IFF1={} IFF2={} IM={:?} halted={}",
            self.cpu.a,
            self.cpu.f,
            self.cpu.bc,
            self.cpu.de,
            self.cpu.hl,
            self.cpu.a_prime,
            self.cpu.f_prime,
            self.cpu.bc_prime,
            self.cpu.de_prime,
            self.cpu.hl_prime,
            self.cpu.ix,
            self.cpu.iy,
            self.cpu.sp,
            self.cpu.pc,
            self.cpu.i,
            self.cpu.r,
            (self.cpu.f >> 7) & 1,
            (self.cpu.f >> 6) & 1,
            (self.cpu.f >> 4) & 1,
            (self.cpu.f >> 2) & 1,
            (self.cpu.f >> 1) & 1,
            self.cpu.f & 1,
            self.cpu.iff1,
            self.cpu.iff2,
            self.cpu.im,
            self.cpu.halted,
        )
    }

    /// Hex dump of a memory range, 16 bytes per row with an ASCII gutter
    pub fn dump_memory(
        &self,
        start: impl Into<Addr>,
        length: usize,
    ) -> Result<String, HarnessError> {
        let start = self.get_address(start)?;
        let mut out = String::new();
        let mut offset = 0;
        while offset < length {
            let row_len = (length - offset).min(16);
            let base = start.wrapping_add(offset as u16);
            out.push_str(&format!("{:04X}:", base));
            for i in 0..row_len {
                let byte = self.bus.peek_byte(base.wrapping_add(i as u16));
                out.push_str(&format!(" {:02X}", byte));
            }
            for _ in row_len..16 {
                out.push_str("   ");
            }
            out.push_str("  |");
            for i in 0..row_len {
                let byte = self.bus.peek_byte(base.wrapping_add(i as u16));
                out.push(if (0x20..0x7F).contains(&byte) {
                    byte as char
                } else {
                    '.'
                });
            }
            out.push_str("|\n");
            offset += row_len;
        }
        Ok(out)
    }

    /// Last executed steps, oldest to newest, with decoded names
    pub fn dump_trace(&self) -> String {
        let mut out = String::from("Recent steps (oldest first):\n");
        for record in &self.trace {
            out.push_str(&format!(
                "  {:04X}  {:<16} {:>2}T\n",
                record.pc,
                describe_opcode(record.op, record.sub),
                record.t_states,
            ));
        }
        out.push_str(&format!("\nCurrent PC: {:04X}\n", self.cpu.pc));
        out.push_str(&format!("Stop cause: {:?}\n", self.last_stop));
        out
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Trace mnemonics ==========
//
// Names are derived from the same x/y/z field decomposition the
// interpreter dispatches on, so every opcode gets a name without a
// per-byte table. Operands stay symbolic (n, nn, d); used only by
// `dump_trace`.

/// Registers by the decoder's r-field index
const REG8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
/// Register pairs by the rp-field index
const REG16: [&str; 4] = ["BC", "DE", "HL", "SP"];
/// Register pairs as PUSH/POP sees them
const REG16_AF: [&str; 4] = ["BC", "DE", "HL", "AF"];
/// ALU operations by the y field (spelled with their A operand)
const ALU_NAME: [&str; 8] = [
    "ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP ",
];
/// Rotate/shift operations by the y field
const ROT_NAME: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];
/// Condition codes by the y field
const CC_NAME: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];

/// Name an instruction from its first byte, consulting `sub` for the
/// prefixed groups
fn describe_opcode(op: u8, sub: u8) -> String {
    match op {
        0xCB => describe_cb(sub),
        0xED => describe_ed(sub),
        0xDD => describe_index(sub, "IX"),
        0xFD => describe_index(sub, "IY"),
        _ => describe_main(op),
    }
}

/// Name an unprefixed opcode
fn describe_main(op: u8) -> String {
    let x = (op >> 6) & 0x03;
    let y = ((op >> 3) & 0x07) as usize;
    let z = (op & 0x07) as usize;
    let p = y >> 1;
    let q = y & 1;

    match x {
        1 if op == 0x76 => "HALT".into(),
        1 => format!("LD {},{}", REG8[y], REG8[z]),
        2 => format!("{}{}", ALU_NAME[y], REG8[z]),
        0 => match z {
            0 => match y {
                0 => "NOP".into(),
                1 => "EX AF,AF'".into(),
                2 => "DJNZ d".into(),
                3 => "JR d".into(),
                _ => format!("JR {},d", CC_NAME[y - 4]),
            },
            1 if q == 0 => format!("LD {},nn", REG16[p]),
            1 => format!("ADD HL,{}", REG16[p]),
            2 => match (p, q) {
                (0, 0) => "LD (BC),A".into(),
                (1, 0) => "LD (DE),A".into(),
                (2, 0) => "LD (nn),HL".into(),
                (3, 0) => "LD (nn),A".into(),
                (0, 1) => "LD A,(BC)".into(),
                (1, 1) => "LD A,(DE)".into(),
                (2, 1) => "LD HL,(nn)".into(),
                _ => "LD A,(nn)".into(),
            },
            3 if q == 0 => format!("INC {}", REG16[p]),
            3 => format!("DEC {}", REG16[p]),
            4 => format!("INC {}", REG8[y]),
            5 => format!("DEC {}", REG8[y]),
            6 => format!("LD {},n", REG8[y]),
            _ => ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"][y].into(),
        },
        _ => match z {
            0 => format!("RET {}", CC_NAME[y]),
            1 if q == 0 => format!("POP {}", REG16_AF[p]),
            1 => ["RET", "EXX", "JP (HL)", "LD SP,HL"][p].into(),
            2 => format!("JP {},nn", CC_NAME[y]),
            3 => match y {
                0 => "JP nn".into(),
                1 => "CB prefix".into(),
                2 => "OUT (n),A".into(),
                3 => "IN A,(n)".into(),
                4 => "EX (SP),HL".into(),
                5 => "EX DE,HL".into(),
                6 => "DI".into(),
                _ => "EI".into(),
            },
            4 => format!("CALL {},nn", CC_NAME[y]),
            5 if q == 0 => format!("PUSH {}", REG16_AF[p]),
            5 => ["CALL nn", "DD prefix", "ED prefix", "FD prefix"][p].into(),
            6 => format!("{}n", ALU_NAME[y]),
            _ => format!("RST {:02X}H", y * 8),
        },
    }
}

/// Name a CB-prefixed opcode
fn describe_cb(sub: u8) -> String {
    let x = (sub >> 6) & 0x03;
    let y = ((sub >> 3) & 0x07) as usize;
    let z = (sub & 0x07) as usize;

    match x {
        0 => format!("{} {}", ROT_NAME[y], REG8[z]),
        1 => format!("BIT {},{}", y, REG8[z]),
        2 => format!("RES {},{}", y, REG8[z]),
        _ => format!("SET {},{}", y, REG8[z]),
    }
}

/// Name an ED-prefixed opcode
fn describe_ed(sub: u8) -> String {
    let x = (sub >> 6) & 0x03;
    let y = ((sub >> 3) & 0x07) as usize;
    let z = (sub & 0x07) as usize;
    let p = y >> 1;
    let q = y & 1;

    match x {
        1 => match z {
            0 if y == 6 => "IN (C)".into(),
            0 => format!("IN {},(C)", REG8[y]),
            1 if y == 6 => "OUT (C),0".into(),
            1 => format!("OUT (C),{}", REG8[y]),
            2 if q == 0 => format!("SBC HL,{}", REG16[p]),
            2 => format!("ADC HL,{}", REG16[p]),
            3 if q == 0 => format!("LD (nn),{}", REG16[p]),
            3 => format!("LD {},(nn)", REG16[p]),
            4 => "NEG".into(),
            5 if y == 1 => "RETI".into(),
            5 => "RETN".into(),
            6 => format!("IM {}", [0, 0, 1, 2, 0, 0, 1, 2][y]),
            _ => match y {
                0 => "LD I,A".into(),
                1 => "LD R,A".into(),
                2 => "LD A,I".into(),
                3 => "LD A,R".into(),
                4 => "RRD".into(),
                5 => "RLD".into(),
                _ => "ED NOP".into(),
            },
        },
        2 if z <= 3 && y >= 4 => {
            const BLOCK: [[&str; 4]; 4] = [
                ["LDI", "CPI", "INI", "OUTI"],
                ["LDD", "CPD", "IND", "OUTD"],
                ["LDIR", "CPIR", "INIR", "OTIR"],
                ["LDDR", "CPDR", "INDR", "OTDR"],
            ];
            BLOCK[y - 4][z].into()
        }
        _ => "ED NOP".into(),
    }
}

/// Name a DD/FD-prefixed opcode by renaming HL in the unprefixed form
fn describe_index(sub: u8, index: &str) -> String {
    if sub == 0xCB {
        return format!("{index} bit op");
    }
    describe_main(sub)
        .replace("(HL)", &format!("({index}+d)"))
        .replace("HL", index)
}


#[cfg(test)]
impl Harness {
    /// Test-only access to the symbol table
    fn symbols_mut_for_tests(&mut self) -> &mut HashMap<String, u16> {
        &mut self.symbols
    }
}
