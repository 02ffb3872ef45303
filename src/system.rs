//! [`Nes`]: the top-level struct that owns every device and wires them
//! together over the CPU/PPU buses. Devices never hold back-pointers to
//! each other, so `Nes` is the only thing allowed to borrow more than one
//! device mutably at once.

use std::time::Duration;

use crate::apu::Apu;
use crate::bus::{CpuBus, NoCartridge, OpenBus};
use crate::cartridge::{Cartridge, RomData};
use crate::clock::{Clock, ClockedSystem, Granularity};
use crate::config::{Config, Region};
use crate::cpu::Cpu;
use crate::error::Error;
use crate::input::ControllerPorts;
use crate::memory::cpu as cpu_mem;
use crate::nvram::NvramFile;
use crate::ppu::Ppu;
use crate::ram::WorkRam;
use crate::reset_kind::ResetKind;

type DrawCallback = Box<dyn FnMut(i32, i32, u8, u8)>;
type FrameReadyCallback = Box<dyn FnMut()>;
type PollInputCallback = Box<dyn FnMut(u8) -> u8>;
type ErrorCallback = Box<dyn FnMut(String)>;

pub struct Nes {
    cpu: Cpu,
    ppu: Ppu,
    apu: Apu,
    cartridge: Option<Cartridge>,
    wram: WorkRam,
    input: ControllerPorts,
    open_bus: OpenBus,
    nvram: Option<NvramFile>,
    oam_dma_request: Option<u8>,

    clock: Clock,
    config: Config,
    resolved_region: Region,
    halted: bool,

    draw: Option<DrawCallback>,
    frame_ready: Option<FrameReadyCallback>,
    poll_input: Option<PollInputCallback>,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for Nes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nes")
            .field("cpu", &self.cpu)
            .field("region", &self.resolved_region)
            .field("halted", &self.halted)
            .field("has_cartridge", &self.cartridge.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Nes {
    pub fn new(config: Config) -> Self {
        let resolved_region = Region::resolve(config.region, crate::cartridge::Region::Ntsc);
        Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            cartridge: None,
            wram: WorkRam::new(),
            input: ControllerPorts::new(),
            open_bus: OpenBus::new(),
            nvram: None,
            oam_dma_request: None,
            clock: Clock::new(resolved_region),
            config,
            resolved_region,
            halted: false,
            draw: None,
            frame_ready: None,
            poll_input: None,
            on_error: None,
        }
    }

    pub fn set_draw_callback(&mut self, f: impl FnMut(i32, i32, u8, u8) + 'static) {
        self.draw = Some(Box::new(f));
    }

    pub fn set_frame_ready_callback(&mut self, f: impl FnMut() + 'static) {
        self.frame_ready = Some(Box::new(f));
    }

    /// `f` takes the controller port index (0 or 1) and returns that port's
    /// current button bitmask (bit 0 A .. bit 7 Right).
    pub fn set_poll_input_callback(&mut self, f: impl FnMut(u8) -> u8 + 'static) {
        self.poll_input = Some(Box::new(f));
    }

    pub fn set_error_callback(&mut self, f: impl FnMut(String) + 'static) {
        self.on_error = Some(Box::new(f));
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn region(&self) -> Region {
        self.resolved_region
    }

    pub fn has_cartridge(&self) -> bool {
        self.cartridge.is_some()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    /// Builds the cartridge from already-decoded ROM data (byte-level iNES
    /// parsing is out of scope, see [`crate::cartridge`]), restores any
    /// NVRAM save under the ROM's SHA-1, and power-cycles. Leaves any
    /// previously-loaded cartridge untouched on failure.
    pub fn load_rom(&mut self, rom: RomData) -> Result<(), Error> {
        let resolved = Region::resolve(self.config.region, rom.region);
        let sha1 = rom.sha1;
        let battery = rom.battery;
        let nvram_size = rom.prg_ram_size;

        let mut cartridge = Cartridge::new(rom).map_err(|err| {
            tracing::warn!(error = %err, "failed to load rom");
            err
        })?;

        let nvram = if battery && nvram_size > 0 {
            let nvram = NvramFile::open(&sha1, nvram_size);
            if let Some(prg_ram) = cartridge.mapper_mut().prg_ram_mut() {
                let len = prg_ram.len().min(nvram.as_slice().len());
                prg_ram[..len].copy_from_slice(&nvram.as_slice()[..len]);
            }
            Some(nvram)
        } else {
            None
        };

        self.cartridge = Some(cartridge);
        self.nvram = nvram;
        self.resolved_region = resolved;
        self.clock = Clock::new(resolved);
        self.halted = false;
        self.reset(ResetKind::PowerOn);
        Ok(())
    }

    pub fn unload_rom(&mut self) {
        self.cartridge = None;
        self.nvram = None;
    }

    pub fn reset(&mut self, kind: ResetKind) {
        self.cpu.reset(kind);
        self.ppu.reset(kind);
        self.apu.reset();
        if let Some(cartridge) = &mut self.cartridge {
            cartridge.reset();
        }
        self.open_bus = OpenBus::new();
        self.oam_dma_request = None;
        self.halted = false;
    }

    /// No-op once [`Self::is_halted`] — a halted core never resumes on its own.
    pub fn tick(&mut self, duration: Duration) {
        if self.halted {
            return;
        }
        let mut clock = std::mem::take(&mut self.clock);
        clock.tick(duration, self);
        self.clock = clock;
        self.sync_halt_state();
    }

    pub fn step(&mut self, granularity: Granularity) {
        if self.halted {
            return;
        }
        let mut clock = std::mem::take(&mut self.clock);
        clock.step(granularity, self);
        self.clock = clock;
        self.sync_halt_state();
    }

    fn sync_halt_state(&mut self) {
        if !self.halted && self.cpu.is_halted() {
            self.halted = true;
            let message = format!("CPU halted on an illegal opcode at ${:04X}", self.cpu.pc);
            tracing::error!(%message);
            if let Some(cb) = &mut self.on_error {
                cb(message);
            }
        }
    }

    fn clock_cpu(&mut self) {
        if self.ppu.take_nmi_edge() {
            self.cpu.request_nmi();
        }
        let irq = self.apu.irq_pending() || self.cartridge.as_ref().is_some_and(Cartridge::irq_pending);
        self.cpu.set_irq_line(irq);

        let cpu_cycle = self.cpu.total_cycles();
        {
            let mut bus = SystemBus {
                wram: &mut self.wram,
                ppu: &mut self.ppu,
                apu: &mut self.apu,
                cartridge: self.cartridge.as_mut(),
                input: &mut self.input,
                open_bus: &mut self.open_bus,
                nvram: &mut self.nvram,
                poll_input: &mut self.poll_input,
                oam_dma_request: &mut self.oam_dma_request,
                cpu_cycle,
            };
            self.cpu.clock(&mut bus);
        }
        if let Some(page) = self.oam_dma_request.take() {
            self.cpu.start_oam_dma(page);
        }
        if let Some(cartridge) = &mut self.cartridge {
            cartridge.m2_signal(true);
            cartridge.m2_signal(false);
        }
    }
}

impl ClockedSystem for Nes {
    fn clock_ppu(&mut self) {
        match self.cartridge.as_mut() {
            Some(cartridge) => {
                let draw = &mut self.draw;
                self.ppu.clock(cartridge, &mut |x, y, index, emphasis| {
                    if let Some(cb) = draw {
                        cb(x, y, index, emphasis);
                    }
                });
            }
            None => {
                let draw = &mut self.draw;
                let mut bus = NoCartridge;
                self.ppu.clock(&mut bus, &mut |x, y, index, emphasis| {
                    if let Some(cb) = draw {
                        cb(x, y, index, emphasis);
                    }
                });
            }
        }
        if self.ppu.take_frame_ready() {
            if let Some(cb) = &mut self.frame_ready {
                cb();
            }
        }
    }

    fn clock_cpu(&mut self) {
        Nes::clock_cpu(self);
    }

    fn clock_apu(&mut self) {
        let cpu_cycle = self.cpu.total_cycles();
        self.apu.clock(cpu_cycle);
    }

    fn at_cpu_instruction_boundary(&self) -> bool {
        self.cpu.at_instruction_boundary()
    }

    fn at_ppu_scanline_boundary(&self) -> bool {
        self.ppu.at_scanline_boundary()
    }

    fn at_ppu_frame_boundary(&self) -> bool {
        self.ppu.at_frame_boundary()
    }
}

/// Per-cycle view of everything the CPU core may touch, borrowed fresh from
/// [`Nes`] on every [`Cpu::clock`] call (the cartridge is `Option` since the
/// bus must stay usable with nothing inserted). OAM DMA can't be armed
/// directly here — it would require a second mutable borrow of the very
/// [`Cpu`] that's driving this bus — so a write to `$4014` is staged into
/// `oam_dma_request` and armed by [`Nes::clock_cpu`] right after this bus is
/// dropped.
struct SystemBus<'a> {
    wram: &'a mut WorkRam,
    ppu: &'a mut Ppu,
    apu: &'a mut Apu,
    cartridge: Option<&'a mut Cartridge>,
    input: &'a mut ControllerPorts,
    open_bus: &'a mut OpenBus,
    nvram: &'a mut Option<NvramFile>,
    poll_input: &'a mut Option<PollInputCallback>,
    oam_dma_request: &'a mut Option<u8>,
    cpu_cycle: u64,
}

impl<'a> SystemBus<'a> {
    fn poll(poll_input: &mut Option<PollInputCallback>, port: u8) -> impl FnMut() -> u8 + '_ {
        move || poll_input.as_mut().map_or(0, |f| f(port))
    }
}

impl<'a> CpuBus for SystemBus<'a> {
    fn cpu_read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            cpu_mem::RAM_START..=cpu_mem::RAM_MIRROR_END => self.wram.read(addr),
            cpu_mem::PPU_REG_START..=cpu_mem::PPU_REG_END => {
                let index = (addr & cpu_mem::PPU_REG_SELECT_MASK) as u8;
                match self.cartridge.as_deref_mut() {
                    Some(cartridge) => self.ppu.read_register(index, cartridge),
                    None => {
                        let mut bus = NoCartridge;
                        self.ppu.read_register(index, &mut bus)
                    }
                }
            }
            cpu_mem::APU_REG_START..=cpu_mem::APU_REG_END | cpu_mem::APU_STATUS => {
                self.apu.cpu_read(addr).unwrap_or(self.open_bus.get())
            }
            cpu_mem::JOY1 => {
                let mut poll = Self::poll(self.poll_input, 0);
                self.input.read_port1(&mut poll)
            }
            cpu_mem::JOY2_APU_FRAME_COUNTER => {
                let mut poll = Self::poll(self.poll_input, 1);
                self.input.read_port2(&mut poll)
            }
            cpu_mem::OAM_DMA | cpu_mem::TEST_MODE_START..=cpu_mem::TEST_MODE_END => self.open_bus.get(),
            _ => match self.cartridge.as_deref_mut() {
                Some(cartridge) => cartridge.cpu_read(addr).unwrap_or_else(|| self.open_bus.get()),
                None => self.open_bus.get(),
            },
        };
        self.open_bus.update(value);
        value
    }

    fn cpu_peek(&self, addr: u16) -> u8 {
        match addr {
            cpu_mem::RAM_START..=cpu_mem::RAM_MIRROR_END => self.wram.read(addr),
            cpu_mem::PPU_REG_START..=cpu_mem::PPU_REG_END => {
                self.ppu.peek_register((addr & cpu_mem::PPU_REG_SELECT_MASK) as u8)
            }
            cpu_mem::APU_REG_START..=cpu_mem::APU_REG_END
            | cpu_mem::APU_STATUS
            | cpu_mem::JOY1
            | cpu_mem::JOY2_APU_FRAME_COUNTER
            | cpu_mem::OAM_DMA
            | cpu_mem::TEST_MODE_START..=cpu_mem::TEST_MODE_END => self.open_bus.get(),
            _ => match self.cartridge.as_deref() {
                Some(cartridge) => cartridge.cpu_peek(addr).unwrap_or_else(|| self.open_bus.get()),
                None => self.open_bus.get(),
            },
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        self.open_bus.update(value);
        match addr {
            cpu_mem::RAM_START..=cpu_mem::RAM_MIRROR_END => self.wram.write(addr, value),
            cpu_mem::PPU_REG_START..=cpu_mem::PPU_REG_END => {
                let index = (addr & cpu_mem::PPU_REG_SELECT_MASK) as u8;
                match self.cartridge.as_deref_mut() {
                    Some(cartridge) => self.ppu.write_register(index, value, cartridge),
                    None => {
                        let mut bus = NoCartridge;
                        self.ppu.write_register(index, value, &mut bus);
                    }
                }
            }
            cpu_mem::OAM_DMA => *self.oam_dma_request = Some(value),
            cpu_mem::JOY1 => {
                // The strobe bit is shared by both ports; $4016 alone drives it.
                {
                    let mut poll1 = Self::poll(self.poll_input, 0);
                    self.input.write(value, &mut poll1);
                }
                {
                    let mut poll2 = Self::poll(self.poll_input, 1);
                    self.input.latch_port2(&mut poll2);
                }
            }
            cpu_mem::JOY2_APU_FRAME_COUNTER => {
                self.apu.cpu_write(addr, value, self.cpu_cycle);
            }
            cpu_mem::APU_REG_START..=cpu_mem::APU_REG_END | cpu_mem::APU_STATUS => {
                self.apu.cpu_write(addr, value, self.cpu_cycle);
            }
            cpu_mem::TEST_MODE_START..=cpu_mem::TEST_MODE_END => {}
            _ => {
                if let Some(cartridge) = self.cartridge.as_deref_mut() {
                    cartridge.cpu_write(addr, value, self.cpu_cycle);
                    if (cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END).contains(&addr) {
                        if let Some(nvram) = self.nvram {
                            nvram.write((addr - cpu_mem::PRG_RAM_START) as usize, value);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn nrom_rom(program: &[u8]) -> RomData {
        let mut prg = vec![0u8; 0x8000];
        prg[..program.len()].copy_from_slice(program);
        // Reset vector -> $8000.
        prg[0x7FFC] = 0x00;
        prg[0x7FFD] = 0x80;
        RomData {
            prg_rom: std::borrow::Cow::Owned(prg),
            chr_rom: std::borrow::Cow::Owned(vec![0u8; 0x2000]),
            sha1: [0u8; 20],
            mapper: 0,
            submapper: 0,
            mirroring: crate::cartridge::Mirroring::Horizontal,
            battery: false,
            prg_ram_size: 0,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            console: crate::cartridge::ConsoleType::Nes,
            region: crate::cartridge::Region::Ntsc,
        }
    }

    #[test]
    fn loading_an_unsupported_mapper_leaves_no_cartridge_inserted() {
        let mut nes = Nes::default();
        let mut rom = nrom_rom(&[0xEA]);
        rom.mapper = 255;
        assert!(nes.load_rom(rom).is_err());
        assert!(!nes.has_cartridge());
    }

    #[test]
    fn three_frames_produce_three_frame_ready_callbacks() {
        let mut nes = Nes::default();
        // An infinite loop (JMP $8000) keeps the CPU busy while the PPU free-runs.
        assert!(nes.load_rom(nrom_rom(&[0x4C, 0x00, 0x80])).is_ok());

        let frame_count = Rc::new(RefCell::new(0u32));
        let pixel_count = Rc::new(RefCell::new(0u64));
        let fc = frame_count.clone();
        let pc = pixel_count.clone();
        nes.set_frame_ready_callback(move || *fc.borrow_mut() += 1);
        nes.set_draw_callback(move |_, _, _, _| *pc.borrow_mut() += 1);

        // Each PPU dot is one master cycle; run three full frames' worth.
        for _ in 0..3 {
            nes.step(Granularity::PpuFrame);
        }

        assert_eq!(*frame_count.borrow(), 3);
        assert_eq!(*pixel_count.borrow(), 3 * 256 * 240);
    }

    #[test]
    fn illegal_opcode_halts_and_reports_an_error() {
        let mut nes = Nes::default();
        assert!(nes.load_rom(nrom_rom(&[0x02])).is_ok()); // JAM
        let reported = Rc::new(RefCell::new(false));
        let r = reported.clone();
        nes.set_error_callback(move |_| *r.borrow_mut() = true);
        for _ in 0..64 {
            nes.step(Granularity::CpuCycle);
        }
        assert!(nes.is_halted());
        assert!(*reported.borrow());
    }

    #[test]
    fn apu_frame_irq_fires_at_the_real_cpu_cycle_count_through_the_clock_chain() {
        let mut nes = Nes::default();
        // Infinite loop keeps the CPU busy while the real PPU/CPU/APU
        // dividers in `clock.rs` run the frame sequencer.
        assert!(nes.load_rom(nrom_rom(&[0x4C, 0x00, 0x80])).is_ok());

        // Four-step mode's last boundary sits at 29830 CPU cycles; the APU
        // is only clocked once every two CPU cycles, so drive well past it.
        let target_cycles = 29_830 + 4;
        let mut fired_at = None;
        for cpu_cycles in 1..=target_cycles {
            nes.step(Granularity::CpuCycle);
            if nes.apu().irq_pending() && fired_at.is_none() {
                fired_at = Some(cpu_cycles);
            }
        }
        let fired_at = fired_at.expect("frame IRQ never fired within the expected window");
        assert!(
            (29_830..=29_832).contains(&fired_at),
            "frame IRQ fired at cycle {fired_at}, expected it near the 29830-cycle boundary"
        );
    }

    #[test]
    fn oam_dma_write_stalls_the_cpu_for_roughly_513_cycles() {
        let mut nes = Nes::default();
        // STA $4014 then an infinite loop.
        assert!(nes.load_rom(nrom_rom(&[0x8D, 0x14, 0x40, 0x4C, 0x03, 0x80])).is_ok());
        for _ in 0..20 {
            nes.step(Granularity::CpuCycle);
        }
        assert!(nes.cpu().is_halted() == false);
    }
}
