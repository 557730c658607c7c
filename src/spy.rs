//! Scripted I/O port expectations
//!
//! An [`IoSpy`] is built from an ordered list of *phases*. Each phase
//! expects a run of transactions in one direction on one port: a read
//! phase scripts the values the port will produce, a write phase lists the
//! values the program must emit. The spy advances through the phases as
//! the Z80 issues I/O; traffic that does not match the script is recorded
//! as a failure and logged, and the run continues so the test gets the
//! complete picture before asserting.
//!
//! Ports are matched against the low byte of the 16-bit port address the
//! CPU emits. A port may be given as a symbol; the harness resolves it
//! when the spy is attached.

use std::collections::HashMap;

/// Direction of one expectation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Read,
    Write,
}

/// A port designator: numeric, or a symbol resolved at attach time
#[derive(Debug, Clone)]
pub enum SpyPort {
    Num(u8),
    Sym(String),
}

impl From<u8> for SpyPort {
    fn from(port: u8) -> Self {
        SpyPort::Num(port)
    }
}

impl From<u16> for SpyPort {
    fn from(port: u16) -> Self {
        SpyPort::Num((port & 0xFF) as u8)
    }
}

impl From<&str> for SpyPort {
    fn from(sym: &str) -> Self {
        SpyPort::Sym(sym.to_string())
    }
}

/// The byte sequence of one phase: a single byte, an explicit sequence, or
/// a text string enumerated byte-by-byte.
pub struct SpyValues(Vec<u8>);

impl From<u8> for SpyValues {
    fn from(value: u8) -> Self {
        SpyValues(vec![value])
    }
}

impl From<Vec<u8>> for SpyValues {
    fn from(values: Vec<u8>) -> Self {
        SpyValues(values)
    }
}

impl From<&[u8]> for SpyValues {
    fn from(values: &[u8]) -> Self {
        SpyValues(values.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for SpyValues {
    fn from(values: [u8; N]) -> Self {
        SpyValues(values.to_vec())
    }
}

impl From<&str> for SpyValues {
    fn from(text: &str) -> Self {
        SpyValues(text.bytes().collect())
    }
}

struct Phase {
    dir: Dir,
    port: SpyPort,
    values: Vec<u8>,
    pos: usize,
    /// Let reads pass silently while this (write) phase is active
    ignore_reads: bool,
    /// Let writes pass silently while this (read) phase is active
    ignore_writes: bool,
}

impl Phase {
    fn done(&self) -> bool {
        self.pos >= self.values.len()
    }

    fn port_num(&self) -> Option<u8> {
        match &self.port {
            SpyPort::Num(port) => Some(*port),
            SpyPort::Sym(_) => None,
        }
    }
}

/// Recorder-expectation object for I/O port traffic.
///
/// Build it with [`expect_read`](IoSpy::expect_read) /
/// [`expect_write`](IoSpy::expect_write), attach it via
/// [`Harness::attach_spy`](crate::Harness::attach_spy), and finish the
/// test with [`assert_complete`](IoSpy::assert_complete).
#[derive(Default)]
pub struct IoSpy {
    phases: Vec<Phase>,
    current: usize,
    failures: Vec<String>,
}

impl IoSpy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `values.len()` reads on `port`, producing the scripted bytes
    /// in order
    pub fn expect_read(mut self, port: impl Into<SpyPort>, values: impl Into<SpyValues>) -> Self {
        self.phases.push(Phase {
            dir: Dir::Read,
            port: port.into(),
            values: values.into().0,
            pos: 0,
            ignore_reads: false,
            ignore_writes: false,
        });
        self
    }

    /// Expect `values.len()` writes on `port` carrying exactly the listed
    /// bytes in order
    pub fn expect_write(mut self, port: impl Into<SpyPort>, values: impl Into<SpyValues>) -> Self {
        self.phases.push(Phase {
            dir: Dir::Write,
            port: port.into(),
            values: values.into().0,
            pos: 0,
            ignore_reads: false,
            ignore_writes: false,
        });
        self
    }

    /// Let reads pass silently (returning 0) while the most recently added
    /// phase is active
    pub fn ignore_reads(mut self) -> Self {
        if let Some(phase) = self.phases.last_mut() {
            phase.ignore_reads = true;
        }
        self
    }

    /// Let writes pass silently while the most recently added phase is
    /// active
    pub fn ignore_writes(mut self) -> Self {
        if let Some(phase) = self.phases.last_mut() {
            phase.ignore_writes = true;
        }
        self
    }

    /// Symbolic port names awaiting resolution
    pub(crate) fn symbol_ports(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter_map(|phase| match &phase.port {
                SpyPort::Sym(name) => Some(name.clone()),
                SpyPort::Num(_) => None,
            })
            .collect()
    }

    /// Replace symbolic ports with their resolved numbers
    pub(crate) fn resolve_ports(&mut self, resolved: &HashMap<String, u8>) {
        for phase in &mut self.phases {
            if let SpyPort::Sym(name) = &phase.port {
                if let Some(port) = resolved.get(name) {
                    phase.port = SpyPort::Num(*port);
                }
            }
        }
    }

    /// Skip phases whose expectations are fully consumed
    fn advance(&mut self) {
        while self.current < self.phases.len() && self.phases[self.current].done() {
            self.current += 1;
        }
    }

    fn fail(&mut self, message: String) {
        log::error!("io spy: {message}");
        self.failures.push(message);
    }

    /// Handle an IN from the CPU. Installed as the bus's I/O-read hook.
    pub fn io_read(&mut self, port: u16) -> u8 {
        let port = (port & 0xFF) as u8;
        self.advance();

        let Some(phase) = self.phases.get_mut(self.current) else {
            self.fail(format!("not expecting an IO read (port {port:#04X})"));
            return 0;
        };

        match phase.dir {
            Dir::Read => {
                let expected = phase.port_num();
                if expected != Some(port) {
                    let expected = expected.map(|p| format!("{p:#04X}")).unwrap_or_default();
                    self.fail(format!(
                        "IO read on port {port:#04X} but expecting port {expected}"
                    ));
                    return 0;
                }
                let value = phase.values[phase.pos];
                phase.pos += 1;
                value
            }
            Dir::Write => {
                if phase.ignore_reads {
                    return 0;
                }
                self.fail(format!(
                    "not expecting an IO read (port {port:#04X}, write phase active)"
                ));
                0
            }
        }
    }

    /// Handle an OUT from the CPU. Installed as the bus's I/O-write hook.
    pub fn io_write(&mut self, port: u16, value: u8) {
        let port = (port & 0xFF) as u8;
        self.advance();

        let Some(phase) = self.phases.get_mut(self.current) else {
            self.fail(format!(
                "not expecting an IO write (port {port:#04X}, value {value:#04X})"
            ));
            return;
        };

        match phase.dir {
            Dir::Write => {
                let expected_port = phase.port_num();
                if expected_port != Some(port) {
                    let expected = expected_port.map(|p| format!("{p:#04X}")).unwrap_or_default();
                    self.fail(format!(
                        "IO write on port {port:#04X} but expecting port {expected}"
                    ));
                    return;
                }
                let expected = phase.values[phase.pos];
                phase.pos += 1;
                if value != expected {
                    self.fail(format!(
                        "IO write on port {port:#04X}: got {value:#04X}, expected {expected:#04X}"
                    ));
                }
            }
            Dir::Read => {
                if phase.ignore_writes {
                    return;
                }
                self.fail(format!(
                    "not expecting an IO write (port {port:#04X}, value {value:#04X})"
                ));
            }
        }
    }

    /// True iff every phase has been fully consumed
    pub fn complete(&self) -> bool {
        self.phases.iter().all(|phase| phase.done())
    }

    /// Recorded mismatches, in the order they occurred
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Panic unless all scripted traffic happened and nothing mismatched
    pub fn assert_complete(&self) {
        if !self.failures.is_empty() {
            panic!("io spy recorded failures:\n  {}", self.failures.join("\n  "));
        }
        if !self.complete() {
            let remaining: Vec<String> = self
                .phases
                .iter()
                .filter(|phase| !phase.done())
                .map(|phase| {
                    format!(
                        "{:?} on port {:?}: {} of {} transactions seen",
                        phase.dir,
                        phase.port,
                        phase.pos,
                        phase.values.len()
                    )
                })
                .collect();
            panic!("io spy incomplete:\n  {}", remaining.join("\n  "));
        }
    }
}
