//! Z80 CPU instruction execution
//!
//! This module contains the opcode dispatch for the Z80 CPU:
//! - execute_opcode: top-level x/y/z/p/q decode of one opcode byte
//! - execute_x0: base instructions (x=0 category)
//! - execute_alu: ALU operations on A (ADD, ADC, SUB, SBC, AND, XOR, OR, CP)
//! - execute_x3: control flow, stack, I/O and prefix entry (x=3 category)
//! - execute_cb: CB prefix (rotate, shift, bit operations)
//! - execute_ed: ED prefix (extended operations and block instructions)
//! - execute_index: DD/FD prefix (IX/IY operations, parameterised over the
//!   index register)
//! - execute_index_cb: DDCB/FDCB prefix (bit operations on indexed memory)
//!
//! Prefixes with no table entry follow hardware semantics: an unknown ED
//! opcode is a two-byte NOP; a DD/FD with an unrecognised continuation
//! backs PC up one byte and charges a NOP so the continuation is re-decoded
//! unprefixed on the next step.
//!
//! # References
//! - Z80 CPU User Manual (Zilog UM0080)
//! - The Undocumented Z80 Documented (Sean Young)

use super::flags;
use super::Cpu;
use super::InterruptMode;
use super::LastOp;
use crate::bus::Bus;

impl Cpu {
    /// Decode and execute one opcode byte, returning T-states. Operand and
    /// prefix bytes are fetched from PC as the handlers need them.
    pub(super) fn execute_opcode(&mut self, bus: &mut Bus, opcode: u8) -> u32 {
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => self.execute_x0(bus, y, z, p, q),
            1 => {
                if y == 6 && z == 6 {
                    // HALT: execution suspends until an interrupt arrives
                    self.halted = true;
                    self.iff1 = true;
                    self.iff2 = true;
                    4
                } else {
                    // LD r,r'
                    let val = self.get_reg8(z, bus);
                    self.set_reg8(y, val, bus);
                    if z == 6 || y == 6 {
                        7
                    } else {
                        4
                    }
                }
            }
            2 => {
                // ALU A,r
                let val = self.get_reg8(z, bus);
                self.execute_alu(y, val);
                if z == 6 {
                    7
                } else {
                    4
                }
            }
            _ => self.execute_x3(bus, y, z, p, q),
        }
    }

    /// Execute x=0 opcodes
    fn execute_x0(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                match y {
                    0 => 4, // NOP
                    1 => {
                        // EX AF,AF'
                        self.ex_af();
                        4
                    }
                    2 => {
                        // DJNZ d
                        let d = self.fetch_byte(bus) as i8;
                        self.set_b(self.b().wrapping_sub(1));
                        if self.b() != 0 {
                            self.pc = self.pc.wrapping_add(d as u16);
                            13
                        } else {
                            8
                        }
                    }
                    3 => {
                        // JR d (unconditional)
                        let d = self.fetch_byte(bus) as i8;
                        self.pc = self.pc.wrapping_add(d as u16);
                        12
                    }
                    _ => {
                        // JR cc,d
                        let d = self.fetch_byte(bus) as i8;
                        if self.check_cc(y - 4) {
                            self.pc = self.pc.wrapping_add(d as u16);
                            12
                        } else {
                            7
                        }
                    }
                }
            }
            1 => {
                if q == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                    10
                } else {
                    // ADD HL,rp
                    let rp = self.get_rp(p);
                    self.hl = self.add16(self.hl, rp);
                    11
                }
            }
            2 => {
                match (p, q) {
                    (0, 0) => {
                        // LD (BC),A
                        bus.write_byte(self.bc, self.a);
                        7
                    }
                    (1, 0) => {
                        // LD (DE),A
                        bus.write_byte(self.de, self.a);
                        7
                    }
                    (2, 0) => {
                        // LD (nn),HL
                        let nn = self.fetch_word(bus);
                        bus.write_word(nn, self.hl);
                        16
                    }
                    (3, 0) => {
                        // LD (nn),A
                        let nn = self.fetch_word(bus);
                        bus.write_byte(nn, self.a);
                        13
                    }
                    (0, 1) => {
                        // LD A,(BC)
                        self.a = bus.read_byte(self.bc);
                        7
                    }
                    (1, 1) => {
                        // LD A,(DE)
                        self.a = bus.read_byte(self.de);
                        7
                    }
                    (2, 1) => {
                        // LD HL,(nn)
                        let nn = self.fetch_word(bus);
                        self.hl = bus.read_word(nn);
                        16
                    }
                    _ => {
                        // LD A,(nn)
                        let nn = self.fetch_word(bus);
                        self.a = bus.read_byte(nn);
                        13
                    }
                }
            }
            3 => {
                // INC rp / DEC rp (no flags)
                let rp = self.get_rp(p);
                let rp = if q == 0 {
                    rp.wrapping_add(1)
                } else {
                    rp.wrapping_sub(1)
                };
                self.set_rp(p, rp);
                6
            }
            4 => {
                // INC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_inc(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            5 => {
                // DEC r
                let val = self.get_reg8(y, bus);
                let result = self.alu_dec(val);
                self.set_reg8(y, result, bus);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            6 => {
                // LD r,n
                let n = self.fetch_byte(bus);
                self.set_reg8(y, n, bus);
                if y == 6 {
                    10
                } else {
                    7
                }
            }
            _ => {
                match y {
                    0..=3 => {
                        // RLCA / RRCA / RLA / RRA
                        self.rot_a(y);
                        4
                    }
                    4 => {
                        // DAA
                        self.daa();
                        4
                    }
                    5 => {
                        // CPL
                        self.a = !self.a;
                        self.f = (self.f & (flags::S | flags::Z | flags::PV | flags::C))
                            | flags::H
                            | flags::N
                            | (self.a & (flags::Y | flags::X));
                        4
                    }
                    6 => {
                        // SCF
                        self.f = (self.f & (flags::S | flags::Z | flags::PV))
                            | flags::C
                            | (self.a & (flags::Y | flags::X));
                        4
                    }
                    _ => {
                        // CCF: half-carry receives the previous carry
                        let old_c = self.flag_c();
                        self.f = (self.f & (flags::S | flags::Z | flags::PV))
                            | (self.a & (flags::Y | flags::X));
                        self.set_flag_h(old_c);
                        self.set_flag_c(!old_c);
                        4
                    }
                }
            }
        }
    }

    /// Execute ALU operation on A (x=2 and the immediate forms)
    fn execute_alu(&mut self, y: u8, val: u8) {
        match y {
            0 => self.a = self.alu_add(val, false),
            1 => self.a = self.alu_add(val, true),
            2 => self.a = self.alu_sub(val, false),
            3 => self.a = self.alu_sub(val, true),
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            _ => self.alu_cp(val),
        }
    }

    /// Execute x=3 opcodes
    fn execute_x3(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                // RET cc
                if self.check_cc(y) {
                    self.pc = self.pop_word(bus);
                    self.last_op = LastOp::Ret;
                    11
                } else {
                    5
                }
            }
            1 => {
                if q == 0 {
                    // POP rp2
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                    10
                } else {
                    match p {
                        0 => {
                            // RET
                            self.pc = self.pop_word(bus);
                            self.last_op = LastOp::Ret;
                            10
                        }
                        1 => {
                            // EXX
                            self.exx();
                            4
                        }
                        2 => {
                            // JP (HL)
                            self.pc = self.hl;
                            4
                        }
                        _ => {
                            // LD SP,HL
                            self.sp = self.hl;
                            6
                        }
                    }
                }
            }
            2 => {
                // JP cc,nn
                let nn = self.fetch_word(bus);
                if self.check_cc(y) {
                    self.pc = nn;
                }
                10
            }
            3 => {
                match y {
                    0 => {
                        // JP nn
                        self.pc = self.fetch_word(bus);
                        10
                    }
                    1 => self.execute_cb(bus),
                    2 => {
                        // OUT (n),A - A rides the high byte of the port address
                        let n = self.fetch_byte(bus);
                        let port = ((self.a as u16) << 8) | n as u16;
                        bus.port_write(port, self.a);
                        11
                    }
                    3 => {
                        // IN A,(n) - no flags on this form
                        let n = self.fetch_byte(bus);
                        let port = ((self.a as u16) << 8) | n as u16;
                        self.a = bus.port_read(port);
                        11
                    }
                    4 => {
                        // EX (SP),HL
                        let val = bus.read_word(self.sp);
                        bus.write_word(self.sp, self.hl);
                        self.hl = val;
                        19
                    }
                    5 => {
                        // EX DE,HL
                        self.ex_de_hl();
                        4
                    }
                    6 => {
                        // DI - commits after the next instruction
                        self.schedule_di();
                        4
                    }
                    _ => {
                        // EI - commits after the next instruction
                        self.schedule_ei();
                        4
                    }
                }
            }
            4 => {
                // CALL cc,nn
                let nn = self.fetch_word(bus);
                if self.check_cc(y) {
                    self.push_word(bus, self.pc);
                    self.pc = nn;
                    self.last_op = LastOp::Call;
                    17
                } else {
                    10
                }
            }
            5 => {
                if q == 0 {
                    // PUSH rp2
                    let val = self.get_rp2(p);
                    self.push_word(bus, val);
                    11
                } else {
                    match p {
                        0 => {
                            // CALL nn
                            let nn = self.fetch_word(bus);
                            self.push_word(bus, self.pc);
                            self.pc = nn;
                            self.last_op = LastOp::Call;
                            17
                        }
                        1 => self.execute_index(bus, true),
                        2 => self.execute_ed(bus),
                        _ => self.execute_index(bus, false),
                    }
                }
            }
            6 => {
                // ALU A,n
                let n = self.fetch_byte(bus);
                self.execute_alu(y, n);
                7
            }
            _ => {
                // RST y*8
                self.push_word(bus, self.pc);
                self.pc = (y as u16) * 8;
                self.last_op = LastOp::Rst;
                11
            }
        }
    }

    // ========== CB Prefix (Bit Operations) ==========

    /// Execute CB-prefixed instruction (rotate/shift/bit/res/set)
    fn execute_cb(&mut self, bus: &mut Bus) -> u32 {
        self.bump_r();
        let opcode = self.fetch_byte(bus);
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let val = self.get_reg8(z, bus);

        match x {
            0 => {
                // Rotate/shift
                let result = self.rot(y, val);
                self.set_reg8(z, result, bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            1 => {
                // BIT y,r
                self.bit_flags(y, val);
                if z == 6 {
                    12
                } else {
                    8
                }
            }
            2 => {
                // RES y,r
                self.set_reg8(z, val & !(1 << y), bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            _ => {
                // SET y,r
                self.set_reg8(z, val | (1 << y), bus);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
        }
    }

    // ========== ED Prefix (Extended Instructions) ==========

    /// Execute ED-prefixed instruction. Opcodes with no table entry behave
    /// as a two-byte NOP.
    fn execute_ed(&mut self, bus: &mut Bus) -> u32 {
        self.bump_r();
        let opcode = self.fetch_byte(bus);
        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            1 => self.execute_ed_x1(bus, y, z, p, q),
            2 if z <= 3 && y >= 4 => self.execute_bli(bus, y, z),
            _ => 8,
        }
    }

    /// Execute ED prefix x=1 opcodes
    fn execute_ed_x1(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                // IN r,(C); y=6 is the undocumented IN (C) which only sets flags
                let val = bus.port_read(self.bc);
                if y != 6 {
                    self.set_reg8(y, val, bus);
                }
                self.in_flags(val);
                12
            }
            1 => {
                // OUT (C),r; y=6 is the undocumented OUT (C),0
                let val = if y == 6 { 0 } else { self.get_reg8(y, bus) };
                bus.port_write(self.bc, val);
                12
            }
            2 => {
                if q == 0 {
                    // SBC HL,rp
                    let rp = self.get_rp(p);
                    self.hl = self.sbc16(rp);
                } else {
                    // ADC HL,rp
                    let rp = self.get_rp(p);
                    self.hl = self.adc16(rp);
                }
                15
            }
            3 => {
                // LD (nn),rp / LD rp,(nn)
                let nn = self.fetch_word(bus);
                if q == 0 {
                    bus.write_word(nn, self.get_rp(p));
                } else {
                    let val = bus.read_word(nn);
                    self.set_rp(p, val);
                }
                20
            }
            4 => {
                // NEG (repeated through the whole column)
                self.neg();
                8
            }
            5 => {
                // RETN / RETI; RETN restores IFF1 from IFF2
                if y != 1 {
                    self.iff1 = self.iff2;
                }
                self.pc = self.pop_word(bus);
                self.last_op = LastOp::Ret;
                14
            }
            6 => {
                // IM 0/1/2
                self.im = match y & 0x03 {
                    2 => InterruptMode::Mode1,
                    3 => InterruptMode::Mode2,
                    _ => InterruptMode::Mode0,
                };
                8
            }
            _ => {
                match y {
                    0 => {
                        // LD I,A
                        self.i = self.a;
                        9
                    }
                    1 => {
                        // LD R,A - the only way to touch R's bit 7
                        self.r = self.a;
                        9
                    }
                    2 => {
                        // LD A,I; P reflects IFF2
                        self.a = self.i;
                        self.f &= flags::C;
                        self.set_sz_flags(self.a);
                        self.set_flag_pv(self.iff2);
                        9
                    }
                    3 => {
                        // LD A,R; P reflects IFF2
                        self.a = self.r;
                        self.f &= flags::C;
                        self.set_sz_flags(self.a);
                        self.set_flag_pv(self.iff2);
                        9
                    }
                    4 => {
                        // RRD: rotate the three nibbles A-low, (HL)-high, (HL)-low right
                        let mem = bus.read_byte(self.hl);
                        let new_mem = (self.a << 4) | (mem >> 4);
                        self.a = (self.a & 0xF0) | (mem & 0x0F);
                        bus.write_byte(self.hl, new_mem);
                        self.f &= flags::C;
                        self.set_sz_flags(self.a);
                        self.set_flag_pv(Self::parity(self.a));
                        18
                    }
                    5 => {
                        // RLD: rotate the three nibbles left
                        let mem = bus.read_byte(self.hl);
                        let new_mem = (mem << 4) | (self.a & 0x0F);
                        self.a = (self.a & 0xF0) | (mem >> 4);
                        bus.write_byte(self.hl, new_mem);
                        self.f &= flags::C;
                        self.set_sz_flags(self.a);
                        self.set_flag_pv(Self::parity(self.a));
                        18
                    }
                    _ => 8,
                }
            }
        }
    }

    /// Execute block instructions (ED prefix, x=2). The repeating variants
    /// rewind PC by 2 while the continuation condition holds, so every
    /// iteration is observed as one instruction by the run loop.
    fn execute_bli(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let delta: i16 = if y & 1 == 0 { 1 } else { -1 };
        let repeat = y >= 6;

        match z {
            0 => {
                // LDI / LDD / LDIR / LDDR
                self.block_ld(bus, delta);
                if repeat && self.bc != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
            1 => {
                // CPI / CPD / CPIR / CPDR - repeats stop early on a match
                let matched = self.block_cp(bus, delta);
                if repeat && self.bc != 0 && !matched {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
            2 => {
                // INI / IND / INIR / INDR
                self.block_in(bus, delta);
                if repeat && self.b() != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
            _ => {
                // OUTI / OUTD / OTIR / OTDR
                self.block_out(bus, delta);
                if repeat && self.b() != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
        }
    }

    // ========== DD/FD Prefix (IX/IY Instructions) ==========

    /// Current index register (IX for DD, IY for FD)
    #[inline]
    fn index(&self, use_ix: bool) -> u16 {
        if use_ix {
            self.ix
        } else {
            self.iy
        }
    }

    /// Set the current index register
    #[inline]
    fn set_index(&mut self, use_ix: bool, val: u16) {
        if use_ix {
            self.ix = val;
        } else {
            self.iy = val;
        }
    }

    /// Effective address IX/IY + signed displacement, mod 65536
    #[inline]
    fn index_addr(&self, use_ix: bool, d: i8) -> u16 {
        self.index(use_ix).wrapping_add(d as u16)
    }

    /// Get 8-bit register with H/L substituted by IXH/IXL (or IYH/IYL)
    fn get_index_reg8(&self, idx: u8, use_ix: bool) -> u8 {
        match idx {
            0 => self.b(),
            1 => self.c(),
            2 => self.d(),
            3 => self.e(),
            4 => {
                if use_ix {
                    self.ixh()
                } else {
                    self.iyh()
                }
            }
            5 => {
                if use_ix {
                    self.ixl()
                } else {
                    self.iyl()
                }
            }
            7 => self.a,
            _ => 0,
        }
    }

    /// Set 8-bit register with H/L substituted by IXH/IXL (or IYH/IYL)
    fn set_index_reg8(&mut self, idx: u8, val: u8, use_ix: bool) {
        match idx {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            4 => {
                if use_ix {
                    self.set_ixh(val)
                } else {
                    self.set_iyh(val)
                }
            }
            5 => {
                if use_ix {
                    self.set_ixl(val)
                } else {
                    self.set_iyl(val)
                }
            }
            7 => self.a = val,
            _ => {}
        }
    }

    /// Register pair operand for ADD IX,rp (the HL slot becomes the index
    /// register itself)
    fn get_index_rp(&self, p: u8, use_ix: bool) -> u16 {
        match p {
            0 => self.bc,
            1 => self.de,
            2 => self.index(use_ix),
            _ => self.sp,
        }
    }

    /// Execute a DD/FD prefixed instruction. `use_ix` selects IX (DD) or
    /// IY (FD); both prefixes share one set of handlers.
    ///
    /// When the continuation byte is not in the index table, PC backs up
    /// one byte and a NOP is charged, so the next step re-decodes the byte
    /// unprefixed. Chained DD/FD/ED prefixes resolve the same way.
    fn execute_index(&mut self, bus: &mut Bus, use_ix: bool) -> u32 {
        self.bump_r();
        let opcode = self.fetch_byte(bus);

        if opcode == 0xCB {
            return self.execute_index_cb(bus, use_ix);
        }

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => match z {
                1 if q == 0 && p == 2 => {
                    // LD IX,nn
                    let nn = self.fetch_word(bus);
                    self.set_index(use_ix, nn);
                    14
                }
                1 if q == 1 => {
                    // ADD IX,rp
                    let rp = self.get_index_rp(p, use_ix);
                    let result = self.add16(self.index(use_ix), rp);
                    self.set_index(use_ix, result);
                    15
                }
                2 if p == 2 && q == 0 => {
                    // LD (nn),IX
                    let nn = self.fetch_word(bus);
                    bus.write_word(nn, self.index(use_ix));
                    20
                }
                2 if p == 2 && q == 1 => {
                    // LD IX,(nn)
                    let nn = self.fetch_word(bus);
                    let val = bus.read_word(nn);
                    self.set_index(use_ix, val);
                    20
                }
                3 if p == 2 => {
                    // INC IX / DEC IX
                    let val = if q == 0 {
                        self.index(use_ix).wrapping_add(1)
                    } else {
                        self.index(use_ix).wrapping_sub(1)
                    };
                    self.set_index(use_ix, val);
                    10
                }
                4 | 5 if y == 6 => {
                    // INC (IX+d) / DEC (IX+d)
                    let d = self.fetch_byte(bus) as i8;
                    let addr = self.index_addr(use_ix, d);
                    let val = bus.read_byte(addr);
                    let result = if z == 4 {
                        self.alu_inc(val)
                    } else {
                        self.alu_dec(val)
                    };
                    bus.write_byte(addr, result);
                    23
                }
                4 | 5 if y == 4 || y == 5 => {
                    // INC/DEC IXH / IXL (undocumented)
                    let val = self.get_index_reg8(y, use_ix);
                    let result = if z == 4 {
                        self.alu_inc(val)
                    } else {
                        self.alu_dec(val)
                    };
                    self.set_index_reg8(y, result, use_ix);
                    8
                }
                6 if y == 6 => {
                    // LD (IX+d),n - displacement precedes the immediate
                    let d = self.fetch_byte(bus) as i8;
                    let n = self.fetch_byte(bus);
                    let addr = self.index_addr(use_ix, d);
                    bus.write_byte(addr, n);
                    19
                }
                6 if y == 4 || y == 5 => {
                    // LD IXH,n / LD IXL,n (undocumented)
                    let n = self.fetch_byte(bus);
                    self.set_index_reg8(y, n, use_ix);
                    11
                }
                _ => self.index_fallback(),
            },
            1 => {
                if y == 6 && z == 6 {
                    // DD HALT has no indexed form
                    self.index_fallback()
                } else if y == 6 {
                    // LD (IX+d),r - the source register is NOT substituted
                    let d = self.fetch_byte(bus) as i8;
                    let src = self.get_reg8(z, bus);
                    let addr = self.index_addr(use_ix, d);
                    bus.write_byte(addr, src);
                    19
                } else if z == 6 {
                    // LD r,(IX+d) - the destination register is NOT substituted
                    let d = self.fetch_byte(bus) as i8;
                    let addr = self.index_addr(use_ix, d);
                    let val = bus.read_byte(addr);
                    self.set_reg8(y, val, bus);
                    19
                } else if y == 4 || y == 5 || z == 4 || z == 5 {
                    // LD r,r' with H/L -> IXH/IXL substitution (undocumented)
                    let val = self.get_index_reg8(z, use_ix);
                    self.set_index_reg8(y, val, use_ix);
                    8
                } else {
                    self.index_fallback()
                }
            }
            2 => {
                if z == 6 {
                    // ALU A,(IX+d)
                    let d = self.fetch_byte(bus) as i8;
                    let addr = self.index_addr(use_ix, d);
                    let val = bus.read_byte(addr);
                    self.execute_alu(y, val);
                    19
                } else if z == 4 || z == 5 {
                    // ALU A,IXH / IXL (undocumented)
                    let val = self.get_index_reg8(z, use_ix);
                    self.execute_alu(y, val);
                    8
                } else {
                    self.index_fallback()
                }
            }
            _ => match (z, q, p) {
                (1, 0, 2) => {
                    // POP IX
                    let val = self.pop_word(bus);
                    self.set_index(use_ix, val);
                    14
                }
                (1, 1, 2) => {
                    // JP (IX)
                    self.pc = self.index(use_ix);
                    8
                }
                (1, 1, 3) => {
                    // LD SP,IX
                    self.sp = self.index(use_ix);
                    10
                }
                (3, _, 2) if y == 4 => {
                    // EX (SP),IX
                    let val = bus.read_word(self.sp);
                    bus.write_word(self.sp, self.index(use_ix));
                    self.set_index(use_ix, val);
                    23
                }
                (5, 0, 2) => {
                    // PUSH IX
                    self.push_word(bus, self.index(use_ix));
                    15
                }
                _ => self.index_fallback(),
            },
        }
    }

    /// Unrecognised DD/FD continuation: rewind so the byte is re-decoded
    /// unprefixed, charging the prefix a NOP.
    fn index_fallback(&mut self) -> u32 {
        self.pc = self.pc.wrapping_sub(1);
        4
    }

    /// Execute DDCB/FDCB prefixed instruction. The layout is
    /// `DD CB d op`: the signed displacement comes before the sub-opcode.
    ///
    /// Shift/rotate and RES/SET operate on (IX+d) and, when the sub-opcode
    /// names a register slot other than (HL), also mirror the written byte
    /// into that register (the undocumented copy side-effect). BIT only
    /// reads and sets flags.
    fn execute_index_cb(&mut self, bus: &mut Bus, use_ix: bool) -> u32 {
        self.bump_r();
        let d = self.fetch_byte(bus) as i8;
        let opcode = self.fetch_byte(bus);

        let x = (opcode >> 6) & 0x03;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;

        let addr = self.index_addr(use_ix, d);
        let val = bus.read_byte(addr);

        match x {
            0 => {
                let result = self.rot(y, val);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
            1 => {
                // BIT y,(IX+d)
                self.bit_flags(y, val);
                20
            }
            2 => {
                let result = val & !(1 << y);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
            _ => {
                let result = val | (1 << y);
                bus.write_byte(addr, result);
                if z != 6 {
                    self.set_reg8(z, result, bus);
                }
                23
            }
        }
    }
}
