//! The 6502 core: per-cycle instruction execution, interrupts, and OAM DMA.
//!
//! [`Cpu::clock`] is called once per CPU cycle by [`crate::clock::Clock`]
//! (every third master cycle on NTSC). It never blocks and never runs more
//! than one cycle's worth of state transition, so the PPU/APU can be
//! interleaved at exact master-cycle granularity.

pub mod addressing;
mod mnemonic;
mod opcode;
mod status;

use addressing::AddressingMode as Mode;
use opcode::{decode, Mnemonic, OpInfo};
pub use status::Status;

use crate::bus::CpuBus;
use crate::memory::cpu as cpu_mem;
use crate::reset_kind::ResetKind;

/// Which (if any) hardware entry sequence is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Reset,
    Nmi,
    Irq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct OamDma {
    active: bool,
    page: u8,
    /// 0-based cycle index within the DMA transfer (0..=513/514).
    step: u16,
    total_steps: u16,
    latched: u8,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: Status,
    pub pc: u16,

    opcode: Option<OpInfo>,
    step: u8,
    addr_lo: u8,
    addr_hi: u8,
    ptr: u8,
    effective_addr: u16,
    operand: u8,
    page_crossed: bool,
    branch_taken: bool,

    sequence: Option<Sequence>,
    seq_step: u8,

    nmi_pending: bool,
    irq_line: bool,
    halted: bool,

    dma: OamDma,
    total_cycles: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFD,
            p: Status::power_on(),
            pc: 0,
            opcode: None,
            step: 0,
            addr_lo: 0,
            addr_hi: 0,
            ptr: 0,
            effective_addr: 0,
            operand: 0,
            page_crossed: false,
            branch_taken: false,
            sequence: Some(Sequence::Reset),
            seq_step: 0,
            nmi_pending: false,
            irq_line: false,
            halted: false,
            dma: OamDma::default(),
            total_cycles: 0,
        }
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether the CPU is mid-instruction/mid-sequence/mid-DMA (used by
    /// `step(Granularity::CpuInstruction)` to find an instruction boundary).
    pub fn at_instruction_boundary(&self) -> bool {
        self.step == 0 && self.sequence.is_none() && !self.dma.active
    }

    pub fn reset(&mut self, kind: ResetKind) {
        self.sequence = Some(Sequence::Reset);
        self.seq_step = 0;
        self.step = 0;
        self.opcode = None;
        self.dma = OamDma::default();
        self.halted = false;
        if kind == ResetKind::PowerOn {
            self.a = 0;
            self.x = 0;
            self.y = 0;
            self.s = 0xFD;
            self.p = Status::power_on();
        } else {
            self.s = self.s.wrapping_sub(3);
            self.p.insert(Status::IRQ_DISABLE);
        }
    }

    /// Edge-triggered: called by the PPU when it enters VBlank with NMI
    /// generation enabled. Cleared once the CPU begins servicing it.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Level-triggered IRQ line, re-evaluated by the host every cycle from
    /// `apu.irq_asserted() || cartridge.irq_pending()`.
    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn start_oam_dma(&mut self, page: u8) {
        let odd_cycle = self.total_cycles % 2 == 1;
        self.dma = OamDma {
            active: true,
            page,
            step: 0,
            total_steps: if odd_cycle { 514 } else { 513 },
            latched: 0,
        };
    }

    pub fn oam_dma_active(&self) -> bool {
        self.dma.active
    }

    /// Advances exactly one CPU cycle.
    pub fn clock(&mut self, bus: &mut impl CpuBus) {
        self.total_cycles = self.total_cycles.wrapping_add(1);

        if self.dma.active {
            self.step_oam_dma(bus);
            return;
        }

        if self.halted {
            return;
        }

        if let Some(seq) = self.sequence {
            self.step_sequence(seq, bus);
            return;
        }

        if self.step == 0 {
            if self.nmi_pending {
                self.nmi_pending = false;
                self.sequence = Some(Sequence::Nmi);
                self.seq_step = 0;
                self.step_sequence(Sequence::Nmi, bus);
                return;
            }
            if self.irq_line && !self.p.contains(Status::IRQ_DISABLE) {
                self.sequence = Some(Sequence::Irq);
                self.seq_step = 0;
                self.step_sequence(Sequence::Irq, bus);
                return;
            }
            let opcode_byte = bus.cpu_read(self.pc);
            self.pc = self.pc.wrapping_add(1);
            self.opcode = Some(decode(opcode_byte));
            self.step = 1;
            return;
        }

        self.step_instruction(bus);
    }

    fn push(&mut self, bus: &mut impl CpuBus, value: u8) {
        bus.cpu_write(cpu_mem::STACK_BASE.wrapping_add(self.s as u16), value);
        self.s = self.s.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.cpu_read(cpu_mem::STACK_BASE.wrapping_add(self.s as u16))
    }

    fn step_sequence(&mut self, seq: Sequence, bus: &mut impl CpuBus) {
        self.seq_step += 1;
        match (seq, self.seq_step) {
            (Sequence::Reset, 1) => {
                let _ = bus.cpu_read(self.pc);
            }
            (Sequence::Reset, 2) => {
                let _ = bus.cpu_read(self.pc);
            }
            (Sequence::Reset, 3..=5) => {
                // Three observable stack "pushes" that do not actually write:
                // S decrements but the bus is not driven.
                self.s = self.s.wrapping_sub(1);
            }
            (Sequence::Reset, 6) => {
                self.addr_lo = bus.cpu_read(cpu_mem::RESET_VECTOR);
            }
            (Sequence::Reset, 7) => {
                self.addr_hi = bus.cpu_read(cpu_mem::RESET_VECTOR + 1);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.p.insert(Status::IRQ_DISABLE);
                self.finish_sequence();
            }
            (Sequence::Nmi | Sequence::Irq, 1) => {
                let _ = bus.cpu_read(self.pc);
            }
            (Sequence::Nmi | Sequence::Irq, 2) => {
                let _ = bus.cpu_read(self.pc);
            }
            (Sequence::Nmi | Sequence::Irq, 3) => {
                self.push(bus, (self.pc >> 8) as u8);
            }
            (Sequence::Nmi | Sequence::Irq, 4) => {
                self.push(bus, (self.pc & 0xFF) as u8);
            }
            (Sequence::Nmi | Sequence::Irq, 5) => {
                let byte = self.p.to_pushed_byte(false);
                self.push(bus, byte);
                self.p.insert(Status::IRQ_DISABLE);
            }
            (Sequence::Nmi, 6) => {
                self.addr_lo = bus.cpu_read(cpu_mem::NMI_VECTOR);
            }
            (Sequence::Irq, 6) => {
                self.addr_lo = bus.cpu_read(cpu_mem::IRQ_VECTOR);
            }
            (Sequence::Nmi, 7) => {
                self.addr_hi = bus.cpu_read(cpu_mem::NMI_VECTOR + 1);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish_sequence();
            }
            (Sequence::Irq, 7) => {
                self.addr_hi = bus.cpu_read(cpu_mem::IRQ_VECTOR + 1);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish_sequence();
            }
            _ => unreachable!("interrupt sequences are exactly 7 cycles"),
        }
    }

    fn finish_sequence(&mut self) {
        self.sequence = None;
        self.seq_step = 0;
        self.step = 0;
    }

    fn step_oam_dma(&mut self, bus: &mut impl CpuBus) {
        let offset = if self.dma.total_steps == 514 { 2 } else { 1 };
        if self.dma.step < offset {
            self.dma.step += 1;
            if self.dma.step == self.dma.total_steps {
                self.dma.active = false;
            }
            return;
        }
        let transfer_cycle = self.dma.step - offset;
        let index = transfer_cycle / 2;
        if transfer_cycle % 2 == 0 {
            let addr = (u16::from(self.dma.page) << 8) + index;
            self.dma.latched = bus.cpu_read(addr);
        } else {
            bus.cpu_write(0x2004, self.dma.latched);
        }
        self.dma.step += 1;
        if self.dma.step >= self.dma.total_steps {
            self.dma.active = false;
        }
    }

    fn step_instruction(&mut self, bus: &mut impl CpuBus) {
        let op = self.opcode.expect("step_instruction requires a decoded opcode");
        use Mnemonic::*;
        match op.mnemonic {
            Jam => {
                self.halted = true;
                self.step = 0;
                self.opcode = None;
            }
            Brk => self.step_brk(bus),
            Jmp => match op.mode {
                Mode::Absolute => self.step_jmp_absolute(bus),
                Mode::Indirect => self.step_jmp_indirect(bus),
                _ => unreachable!("JMP only has absolute/indirect forms"),
            },
            Jsr => self.step_jsr(bus),
            Rts => self.step_rts(bus),
            Rti => self.step_rti(bus),
            Pha | Php => self.step_push(op.mnemonic, bus),
            Pla | Plp => self.step_pull(op.mnemonic, bus),
            Bcc | Bcs | Beq | Bmi | Bne | Bpl | Bvc | Bvs => self.step_branch(op.mnemonic, bus),
            Clc | Cld | Cli | Clv | Sec | Sed | Sei | Nop | Dex | Dey | Inx | Iny | Tax | Tay
            | Tsx | Txa | Txs | Tya => self.step_implied(op.mnemonic, bus),
            Asl | Lsr | Rol | Ror if op.mode == Mode::Accumulator => {
                self.step_accumulator(op.mnemonic, bus)
            }
            Asl | Lsr | Rol | Ror | Inc | Dec => self.step_rmw(op.mnemonic, op.mode, bus),
            Sta | Stx | Sty => self.step_store(op.mnemonic, op.mode, bus),
            _ => self.step_read(op.mnemonic, op.mode, bus),
        }
    }

    fn finish(&mut self) {
        self.step = 0;
        self.opcode = None;
        self.page_crossed = false;
    }

    // --- Single-cycle-body shapes -----------------------------------------

    fn step_implied(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        let _ = bus.cpu_read(self.pc);
        self.execute_implied(m);
        self.finish();
    }

    fn step_accumulator(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        let _ = bus.cpu_read(self.pc);
        self.a = self.rmw_op(m, self.a);
        self.finish();
    }

    fn execute_implied(&mut self, m: Mnemonic) {
        use Mnemonic::*;
        match m {
            Clc => self.p.remove(Status::CARRY),
            Cld => self.p.remove(Status::DECIMAL),
            Cli => self.p.remove(Status::IRQ_DISABLE),
            Clv => self.p.remove(Status::OVERFLOW),
            Sec => self.p.insert(Status::CARRY),
            Sed => self.p.insert(Status::DECIMAL),
            Sei => self.p.insert(Status::IRQ_DISABLE),
            Nop => {}
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.p.set_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.p.set_zn(self.y);
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.p.set_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.p.set_zn(self.y);
            }
            Tax => {
                self.x = self.a;
                self.p.set_zn(self.x);
            }
            Tay => {
                self.y = self.a;
                self.p.set_zn(self.y);
            }
            Tsx => {
                self.x = self.s;
                self.p.set_zn(self.x);
            }
            Txa => {
                self.a = self.x;
                self.p.set_zn(self.a);
            }
            Txs => self.s = self.x,
            Tya => {
                self.a = self.y;
                self.p.set_zn(self.a);
            }
            _ => unreachable!("non-implied mnemonic routed to execute_implied"),
        }
    }

    // --- Stack ---------------------------------------------------------

    fn step_push(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                let _ = bus.cpu_read(self.pc);
                self.step += 1;
            }
            2 => {
                let value = match m {
                    Mnemonic::Pha => self.a,
                    Mnemonic::Php => self.p.to_pushed_byte(true),
                    _ => unreachable!(),
                };
                self.push(bus, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_pull(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                let _ = bus.cpu_read(self.pc);
                self.step += 1;
            }
            2 => {
                // Internal: stack pointer pre-increment cycle.
                let _ = bus.cpu_read(cpu_mem::STACK_BASE.wrapping_add(self.s as u16));
                self.step += 1;
            }
            3 => {
                let value = self.pull(bus);
                match m {
                    Mnemonic::Pla => {
                        self.a = value;
                        self.p.set_zn(self.a);
                    }
                    Mnemonic::Plp => self.p = Status::from_pulled_byte(value),
                    _ => unreachable!(),
                }
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // --- Control flow ----------------------------------------------------

    fn step_branch(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        use Mnemonic::*;
        match self.step {
            1 => {
                self.operand = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.branch_taken = match m {
                    Bcc => !self.p.contains(Status::CARRY),
                    Bcs => self.p.contains(Status::CARRY),
                    Beq => self.p.contains(Status::ZERO),
                    Bmi => self.p.contains(Status::NEGATIVE),
                    Bne => !self.p.contains(Status::ZERO),
                    Bpl => !self.p.contains(Status::NEGATIVE),
                    Bvc => !self.p.contains(Status::OVERFLOW),
                    Bvs => self.p.contains(Status::OVERFLOW),
                    _ => unreachable!(),
                };
                if !self.branch_taken {
                    self.finish();
                } else {
                    self.step += 1;
                }
            }
            2 => {
                let _ = bus.cpu_read(self.pc);
                let offset = self.operand as i8 as i16;
                let base = self.pc;
                let target = (base as i16).wrapping_add(offset) as u16;
                self.page_crossed = (base & 0xFF00) != (target & 0xFF00);
                self.effective_addr = target;
                if self.page_crossed {
                    self.step += 1;
                } else {
                    self.pc = target;
                    self.finish();
                }
            }
            3 => {
                let _ = bus.cpu_read(self.pc);
                self.pc = self.effective_addr;
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_jmp_absolute(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
            }
            2 => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_jmp_indirect(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
            }
            2 => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
            }
            3 => {
                let ptr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.operand = bus.cpu_read(ptr);
                self.step += 1;
            }
            4 => {
                // Famous page-wrap bug: the high byte is fetched from the
                // same page as the low byte, wrapping instead of carrying.
                let hi_ptr = (self.addr_hi as u16) << 8 | self.addr_lo.wrapping_add(1) as u16;
                let hi = bus.cpu_read(hi_ptr);
                self.pc = u16::from_le_bytes([self.operand, hi]);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_jsr(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
            }
            2 => {
                // Internal cycle (real hardware peeks the stack here).
                let _ = bus.cpu_read(cpu_mem::STACK_BASE.wrapping_add(self.s as u16));
                self.step += 1;
            }
            3 => {
                self.push(bus, (self.pc >> 8) as u8);
                self.step += 1;
            }
            4 => {
                self.push(bus, (self.pc & 0xFF) as u8);
                self.step += 1;
            }
            5 => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_rts(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                let _ = bus.cpu_read(self.pc);
                self.step += 1;
            }
            2 => {
                let _ = bus.cpu_read(cpu_mem::STACK_BASE.wrapping_add(self.s as u16));
                self.step += 1;
            }
            3 => {
                self.addr_lo = self.pull(bus);
                self.step += 1;
            }
            4 => {
                self.addr_hi = self.pull(bus);
                self.step += 1;
            }
            5 => {
                let ret = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                let _ = bus.cpu_read(ret);
                self.pc = ret.wrapping_add(1);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_rti(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                let _ = bus.cpu_read(self.pc);
                self.step += 1;
            }
            2 => {
                let _ = bus.cpu_read(cpu_mem::STACK_BASE.wrapping_add(self.s as u16));
                self.step += 1;
            }
            3 => {
                let value = self.pull(bus);
                self.p = Status::from_pulled_byte(value);
                self.step += 1;
            }
            4 => {
                self.addr_lo = self.pull(bus);
                self.step += 1;
            }
            5 => {
                self.addr_hi = self.pull(bus);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn step_brk(&mut self, bus: &mut impl CpuBus) {
        match self.step {
            1 => {
                let _ = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
            }
            2 => {
                self.push(bus, (self.pc >> 8) as u8);
                self.step += 1;
            }
            3 => {
                self.push(bus, (self.pc & 0xFF) as u8);
                self.step += 1;
            }
            4 => {
                let byte = self.p.to_pushed_byte(true);
                self.push(bus, byte);
                self.p.insert(Status::IRQ_DISABLE);
                self.step += 1;
            }
            5 => {
                self.addr_lo = bus.cpu_read(cpu_mem::IRQ_VECTOR);
                self.step += 1;
            }
            6 => {
                self.addr_hi = bus.cpu_read(cpu_mem::IRQ_VECTOR + 1);
                self.pc = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // --- Read / RMW / Store addressing -----------------------------------

    /// Resolves the effective address for a *read* instruction, loading the
    /// operand byte as its final sub-step. Page-cross penalties are
    /// conditional here: an indexed mode only pays the extra cycle when the
    /// index actually carries into the high byte.
    ///
    /// Returns `true` once `self.operand` holds the value to operate on.
    fn step_resolve_address(&mut self, mode: Mode, bus: &mut impl CpuBus) -> bool {
        match (mode, self.step) {
            (Mode::Immediate, 1) => {
                self.operand = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                true
            }
            (Mode::ZeroPage, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = self.addr_lo as u16;
                self.step += 1;
                false
            }
            (Mode::ZeroPage, 2) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            (Mode::ZeroPageX, 1) | (Mode::ZeroPageY, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
                false
            }
            (Mode::ZeroPageX, 2) => {
                let _ = bus.cpu_read(self.addr_lo as u16);
                self.addr_lo = self.addr_lo.wrapping_add(self.x);
                self.effective_addr = self.addr_lo as u16;
                self.step += 1;
                false
            }
            (Mode::ZeroPageY, 2) => {
                let _ = bus.cpu_read(self.addr_lo as u16);
                self.addr_lo = self.addr_lo.wrapping_add(self.y);
                self.effective_addr = self.addr_lo as u16;
                self.step += 1;
                false
            }
            (Mode::ZeroPageX, 3) | (Mode::ZeroPageY, 3) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            (Mode::Absolute, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
                false
            }
            (Mode::Absolute, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.step += 1;
                false
            }
            (Mode::Absolute, 3) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            (Mode::AbsoluteX, 1) | (Mode::AbsoluteY, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
                false
            }
            (Mode::AbsoluteX, 2) | (Mode::AbsoluteY, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                let index = if mode == Mode::AbsoluteX { self.x } else { self.y };
                let target = base.wrapping_add(index as u16);
                self.page_crossed = (base & 0xFF00) != (target & 0xFF00);
                self.effective_addr = target;
                self.step += 1;
                false
            }
            (Mode::AbsoluteX, 3) | (Mode::AbsoluteY, 3) => {
                if self.page_crossed {
                    let wrong_page_addr =
                        (self.effective_addr & 0x00FF) | (self.effective_addr.wrapping_sub(0x100) & 0xFF00);
                    let _ = bus.cpu_read(wrong_page_addr);
                    self.step += 1;
                    false
                } else {
                    self.operand = bus.cpu_read(self.effective_addr);
                    true
                }
            }
            (Mode::AbsoluteX, 4) | (Mode::AbsoluteY, 4) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            (Mode::IndirectX, 1) => {
                self.ptr = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
                false
            }
            (Mode::IndirectX, 2) => {
                let _ = bus.cpu_read(self.ptr as u16);
                self.ptr = self.ptr.wrapping_add(self.x);
                self.step += 1;
                false
            }
            (Mode::IndirectX, 3) => {
                self.addr_lo = bus.cpu_read(self.ptr as u16);
                self.step += 1;
                false
            }
            (Mode::IndirectX, 4) => {
                self.addr_hi = bus.cpu_read(self.ptr.wrapping_add(1) as u16);
                self.effective_addr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.step += 1;
                false
            }
            (Mode::IndirectX, 5) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            (Mode::IndirectY, 1) => {
                self.ptr = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step += 1;
                false
            }
            (Mode::IndirectY, 2) => {
                self.addr_lo = bus.cpu_read(self.ptr as u16);
                self.step += 1;
                false
            }
            (Mode::IndirectY, 3) => {
                self.addr_hi = bus.cpu_read(self.ptr.wrapping_add(1) as u16);
                let base = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                let target = base.wrapping_add(self.y as u16);
                self.page_crossed = (base & 0xFF00) != (target & 0xFF00);
                self.effective_addr = target;
                self.step += 1;
                false
            }
            (Mode::IndirectY, 4) => {
                if self.page_crossed {
                    let wrong_page_addr =
                        (self.effective_addr & 0x00FF) | (self.effective_addr.wrapping_sub(0x100) & 0xFF00);
                    let _ = bus.cpu_read(wrong_page_addr);
                    self.step += 1;
                    false
                } else {
                    self.operand = bus.cpu_read(self.effective_addr);
                    true
                }
            }
            (Mode::IndirectY, 5) => {
                self.operand = bus.cpu_read(self.effective_addr);
                true
            }
            _ => unreachable!("unhandled addressing step {:?}/{}", mode, self.step),
        }
    }

    fn step_read(&mut self, m: Mnemonic, mode: Mode, bus: &mut impl CpuBus) {
        if self.step_resolve_address(mode, bus) {
            self.execute_read(m, self.operand);
            self.finish();
        }
    }

    fn execute_read(&mut self, m: Mnemonic, value: u8) {
        use Mnemonic::*;
        match m {
            Adc => self.a = mnemonic::adc(self.a, value, &mut self.p),
            Sbc => self.a = mnemonic::sbc(self.a, value, &mut self.p),
            And => self.a = mnemonic::and(self.a, value, &mut self.p),
            Ora => self.a = mnemonic::ora(self.a, value, &mut self.p),
            Eor => self.a = mnemonic::eor(self.a, value, &mut self.p),
            Lda => self.a = mnemonic::load(value, &mut self.p),
            Ldx => self.x = mnemonic::load(value, &mut self.p),
            Ldy => self.y = mnemonic::load(value, &mut self.p),
            Cmp => mnemonic::compare(self.a, value, &mut self.p),
            Cpx => mnemonic::compare(self.x, value, &mut self.p),
            Cpy => mnemonic::compare(self.y, value, &mut self.p),
            Bit => mnemonic::bit(self.a, value, &mut self.p),
            _ => unreachable!("non-read mnemonic routed to execute_read"),
        }
    }

    fn rmw_op(&mut self, m: Mnemonic, value: u8) -> u8 {
        use Mnemonic::*;
        match m {
            Asl => mnemonic::asl(value, &mut self.p),
            Lsr => mnemonic::lsr(value, &mut self.p),
            Rol => mnemonic::rol(value, &mut self.p),
            Ror => mnemonic::ror(value, &mut self.p),
            Inc => mnemonic::inc(value, &mut self.p),
            Dec => mnemonic::dec(value, &mut self.p),
            _ => unreachable!("non-RMW mnemonic routed to rmw_op"),
        }
    }

    /// Read-modify-write: unlike a plain read, the indexed forms always pay
    /// the extra cycle (no conditional skip), and there is one more cycle at
    /// the end to write the unmodified byte back before the real result.
    fn step_rmw(&mut self, m: Mnemonic, mode: Mode, bus: &mut impl CpuBus) {
        match (mode, self.step) {
            (Mode::ZeroPage, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = self.addr_lo as u16;
                self.step = 2;
            }
            (Mode::ZeroPage, 2) => {
                self.operand = bus.cpu_read(self.effective_addr);
                self.step = 3;
            }
            (Mode::ZeroPage, 3) => {
                bus.cpu_write(self.effective_addr, self.operand);
                self.step = 4;
            }
            (Mode::ZeroPage, 4) => self.finish_rmw(m, bus),

            (Mode::ZeroPageX, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::ZeroPageX, 2) => {
                let _ = bus.cpu_read(self.addr_lo as u16);
                self.addr_lo = self.addr_lo.wrapping_add(self.x);
                self.effective_addr = self.addr_lo as u16;
                self.step = 3;
            }
            (Mode::ZeroPageX, 3) => {
                self.operand = bus.cpu_read(self.effective_addr);
                self.step = 4;
            }
            (Mode::ZeroPageX, 4) => {
                bus.cpu_write(self.effective_addr, self.operand);
                self.step = 5;
            }
            (Mode::ZeroPageX, 5) => self.finish_rmw(m, bus),

            (Mode::Absolute, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::Absolute, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.step = 3;
            }
            (Mode::Absolute, 3) => {
                self.operand = bus.cpu_read(self.effective_addr);
                self.step = 4;
            }
            (Mode::Absolute, 4) => {
                bus.cpu_write(self.effective_addr, self.operand);
                self.step = 5;
            }
            (Mode::Absolute, 5) => self.finish_rmw(m, bus),

            (Mode::AbsoluteX, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::AbsoluteX, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.effective_addr = base.wrapping_add(self.x as u16);
                self.step = 3;
            }
            (Mode::AbsoluteX, 3) => {
                let _ = bus.cpu_read(self.effective_addr);
                self.step = 4;
            }
            (Mode::AbsoluteX, 4) => {
                self.operand = bus.cpu_read(self.effective_addr);
                self.step = 5;
            }
            (Mode::AbsoluteX, 5) => {
                bus.cpu_write(self.effective_addr, self.operand);
                self.step = 6;
            }
            (Mode::AbsoluteX, 6) => self.finish_rmw(m, bus),

            _ => unreachable!("unhandled RMW addressing step {:?}/{}", mode, self.step),
        }
    }

    fn finish_rmw(&mut self, m: Mnemonic, bus: &mut impl CpuBus) {
        let result = self.rmw_op(m, self.operand);
        bus.cpu_write(self.effective_addr, result);
        self.finish();
    }

    fn store_value(&self, m: Mnemonic) -> u8 {
        match m {
            Mnemonic::Sta => self.a,
            Mnemonic::Stx => self.x,
            Mnemonic::Sty => self.y,
            _ => unreachable!("non-store mnemonic routed to store_value"),
        }
    }

    fn step_store(&mut self, m: Mnemonic, mode: Mode, bus: &mut impl CpuBus) {
        match (mode, self.step) {
            (Mode::ZeroPage, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = self.addr_lo as u16;
                self.step = 2;
            }
            (Mode::ZeroPage, 2) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            (Mode::ZeroPageX, 1) | (Mode::ZeroPageY, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::ZeroPageX, 2) => {
                let _ = bus.cpu_read(self.addr_lo as u16);
                self.addr_lo = self.addr_lo.wrapping_add(self.x);
                self.effective_addr = self.addr_lo as u16;
                self.step = 3;
            }
            (Mode::ZeroPageY, 2) => {
                let _ = bus.cpu_read(self.addr_lo as u16);
                self.addr_lo = self.addr_lo.wrapping_add(self.y);
                self.effective_addr = self.addr_lo as u16;
                self.step = 3;
            }
            (Mode::ZeroPageX, 3) | (Mode::ZeroPageY, 3) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            (Mode::Absolute, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::Absolute, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.effective_addr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.step = 3;
            }
            (Mode::Absolute, 3) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            (Mode::AbsoluteX, 1) | (Mode::AbsoluteY, 1) => {
                self.addr_lo = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::AbsoluteX, 2) | (Mode::AbsoluteY, 2) => {
                self.addr_hi = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                let index = if mode == Mode::AbsoluteX { self.x } else { self.y };
                self.effective_addr = base.wrapping_add(index as u16);
                self.step = 3;
            }
            (Mode::AbsoluteX, 3) | (Mode::AbsoluteY, 3) => {
                let _ = bus.cpu_read(self.effective_addr);
                self.step = 4;
            }
            (Mode::AbsoluteX, 4) | (Mode::AbsoluteY, 4) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            (Mode::IndirectX, 1) => {
                self.ptr = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::IndirectX, 2) => {
                let _ = bus.cpu_read(self.ptr as u16);
                self.ptr = self.ptr.wrapping_add(self.x);
                self.step = 3;
            }
            (Mode::IndirectX, 3) => {
                self.addr_lo = bus.cpu_read(self.ptr as u16);
                self.step = 4;
            }
            (Mode::IndirectX, 4) => {
                self.addr_hi = bus.cpu_read(self.ptr.wrapping_add(1) as u16);
                self.effective_addr = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.step = 5;
            }
            (Mode::IndirectX, 5) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            (Mode::IndirectY, 1) => {
                self.ptr = bus.cpu_read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.step = 2;
            }
            (Mode::IndirectY, 2) => {
                self.addr_lo = bus.cpu_read(self.ptr as u16);
                self.step = 3;
            }
            (Mode::IndirectY, 3) => {
                self.addr_hi = bus.cpu_read(self.ptr.wrapping_add(1) as u16);
                let base = u16::from_le_bytes([self.addr_lo, self.addr_hi]);
                self.effective_addr = base.wrapping_add(self.y as u16);
                self.step = 4;
            }
            (Mode::IndirectY, 4) => {
                let _ = bus.cpu_read(self.effective_addr);
                self.step = 5;
            }
            (Mode::IndirectY, 5) => {
                let value = self.store_value(m);
                bus.cpu_write(self.effective_addr, value);
                self.finish();
            }

            _ => unreachable!("unhandled store addressing step {:?}/{}", mode, self.step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_block::MemBlock;

    /// A flat 64 KiB RAM bus used only to exercise CPU timing/semantics in
    /// isolation from the rest of the system.
    struct FlatBus {
        mem: MemBlock<65536>,
    }

    impl FlatBus {
        fn new() -> Self {
            Self { mem: MemBlock::new() }
        }
    }

    impl CpuBus for FlatBus {
        fn cpu_read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn cpu_peek(&self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn cpu_write(&mut self, addr: u16, value: u8) {
            self.mem[addr as usize] = value;
        }
    }

    fn run_one_instruction(cpu: &mut Cpu, bus: &mut FlatBus) -> u64 {
        let start = cpu.total_cycles();
        cpu.clock(bus);
        while !cpu.at_instruction_boundary() {
            cpu.clock(bus);
        }
        cpu.total_cycles() - start
    }

    #[test]
    fn reset_takes_seven_cycles_and_loads_vector() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.total_cycles(), 7);
    }

    #[test]
    fn lda_immediate_takes_two_cycles_and_sets_flags() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        bus.mem[0x8000] = 0xA9; // LDA #$00
        bus.mem[0x8001] = 0x00;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        let cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cycles, 2);
        assert!(cpu.p.contains(Status::ZERO));
    }

    #[test]
    fn absolute_x_read_adds_one_cycle_on_page_cross() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        // LDA $80FF,X with X=1 crosses into $8100.
        bus.mem[0x8000] = 0xBD;
        bus.mem[0x8001] = 0xFF;
        bus.mem[0x8002] = 0x80;
        bus.mem[0x8100] = 0x42;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        cpu.x = 1;
        let cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cycles, 5);
        assert_eq!(cpu.a, 0x42);
    }

    #[test]
    fn absolute_x_read_stays_four_cycles_without_crossing() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        // LDA $8000,X with X=4 stays on the same page.
        bus.mem[0x8000] = 0xBD;
        bus.mem[0x8001] = 0x00;
        bus.mem[0x8002] = 0x80;
        bus.mem[0x8004] = 0x99;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        cpu.x = 4;
        let cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cycles, 4);
        assert_eq!(cpu.a, 0x99);
    }

    #[test]
    fn branch_taken_same_page_costs_three_cycles() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        bus.mem[0x8000] = 0xF0; // BEQ +2
        bus.mem[0x8001] = 0x02;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        cpu.p.insert(Status::ZERO);
        let cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cycles, 3);
        assert_eq!(cpu.pc, 0x8004);
    }

    #[test]
    fn branch_not_taken_costs_two_cycles() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        bus.mem[0x8000] = 0xF0; // BEQ, Z clear
        bus.mem[0x8001] = 0x02;
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        let cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn jsr_then_rts_round_trips_pc() {
        let mut bus = FlatBus::new();
        bus.mem[0xFFFC] = 0x00;
        bus.mem[0xFFFD] = 0x80;
        bus.mem[0x8000] = 0x20; // JSR $8010
        bus.mem[0x8001] = 0x10;
        bus.mem[0x8002] = 0x80;
        bus.mem[0x8010] = 0x60; // RTS
        let mut cpu = Cpu::new();
        for _ in 0..7 {
            cpu.clock(&mut bus);
        }
        let jsr_cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(jsr_cycles, 6);
        assert_eq!(cpu.pc, 0x8010);
        let rts_cycles = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(rts_cycles, 6);
        assert_eq!(cpu.pc, 0x8003);
    }

    #[test]
    fn oam_dma_stalls_for_513_or_514_cycles() {
        let mut bus = FlatBus::new();
        let mut cpu = Cpu::new();
        cpu.total_cycles = 0;
        cpu.start_oam_dma(0x40);
        let mut cycles = 0;
        while cpu.oam_dma_active() {
            cpu.clock(&mut bus);
            cycles += 1;
        }
        assert_eq!(cycles, 513);

        cpu.total_cycles = 1;
        cpu.start_oam_dma(0x40);
        cycles = 0;
        while cpu.oam_dma_active() {
            cpu.clock(&mut bus);
            cycles += 1;
        }
        assert_eq!(cycles, 514);
    }
}
