//! Mapper 4 (MMC3): eight bank-select slots shared between two odd/even
//! register pairs, plus a scanline IRQ counter clocked off PPU address line
//! A12. This core has no dedicated A12 filter circuit; it simply treats any
//! `ppu_read`/`ppu_peek` whose address crosses into `$1000..` from below as
//! one rising edge, which is adequate for games that don't rely on the
//! extra-edge filtering real MMC3 revisions apply.

use std::borrow::Cow;

use crate::cartridge::mapper::{allocate_ram, BankWindow, Mapper};
use crate::cartridge::{Mirroring, RomData};
use crate::memory::cpu as cpu_mem;

const PRG_BANK_SIZE: usize = 0x2000;
const CHR_1K: usize = 0x0400;

#[derive(Debug, Clone)]
pub struct Mapper4 {
    prg_rom: Cow<'static, [u8]>,
    prg_ram: Box<[u8]>,
    chr_rom: Cow<'static, [u8]>,
    chr_ram: Option<Box<[u8]>>,
    mirroring: Mirroring,

    bank_select: u8,
    regs: [u8; 8],
    prg_ram_enabled: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
    last_a12: bool,
}

impl Mapper4 {
    pub fn new(rom: RomData) -> Self {
        let chr_ram = rom.chr_rom.is_empty().then(|| allocate_ram(rom.chr_ram_size.max(0x2000)));
        Self {
            prg_ram: allocate_ram(rom.prg_ram_size.max(0x2000)),
            chr_rom: rom.chr_rom,
            chr_ram,
            prg_rom: rom.prg_rom,
            mirroring: rom.mirroring,
            bank_select: 0,
            regs: [0; 8],
            prg_ram_enabled: true,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            last_a12: false,
        }
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg_rom.len() / PRG_BANK_SIZE).max(1)
    }

    fn chr_unit_count(&self) -> usize {
        let len = self.chr_ram.as_ref().map(|b| b.len()).unwrap_or(self.chr_rom.len());
        (len / CHR_1K).max(1)
    }

    fn prg_mode(&self) -> bool {
        self.bank_select & 0x40 != 0
    }

    fn chr_mode(&self) -> bool {
        self.bank_select & 0x80 != 0
    }

    fn prg_window_bank(&self, window: usize) -> usize {
        let banks = self.prg_bank_count();
        let second_last = banks.saturating_sub(2);
        let last = banks.saturating_sub(1);
        let swap_8000 = self.regs[6] as usize % banks;
        let swap_a000 = self.regs[7] as usize % banks;
        match (window, self.prg_mode()) {
            (0, false) => swap_8000,
            (0, true) => second_last,
            (1, _) => swap_a000,
            (2, false) => second_last,
            (2, true) => swap_8000,
            _ => last,
        }
    }

    fn read_prg_rom(&self, addr: u16) -> u8 {
        let window = (addr - cpu_mem::PRG_ROM_START) as usize / PRG_BANK_SIZE;
        let bank = self.prg_window_bank(window);
        let offset = bank * PRG_BANK_SIZE + (addr as usize % PRG_BANK_SIZE);
        self.prg_rom[offset % self.prg_rom.len().max(1)]
    }

    /// Resolves a PPU pattern-table address to a 1 KiB unit index, honoring
    /// the CHR A12-inversion bit.
    fn chr_unit(&self, addr: u16) -> usize {
        let low_half = addr < 0x1000;
        let inverted = self.chr_mode();
        let in_2k_region = low_half != inverted;
        let units = self.chr_unit_count();
        let unit = if in_2k_region {
            let pair = if addr % 0x0800 < 0x0400 { self.regs[0] } else { self.regs[1] };
            (pair & !1) as usize + usize::from(addr % 0x0800 >= 0x0400)
        } else {
            let index = 2 + (addr % 0x1000) as usize / CHR_1K;
            self.regs[index] as usize
        };
        unit % units
    }

    fn read_chr(&self, addr: u16) -> u8 {
        let unit = self.chr_unit(addr);
        let offset = unit * CHR_1K + addr as usize % CHR_1K;
        match &self.chr_ram {
            Some(ram) => ram[offset % ram.len().max(1)],
            None => self.chr_rom[offset % self.chr_rom.len().max(1)],
        }
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn observe_a12(&mut self, addr: u16) {
        let a12 = addr & 0x1000 != 0;
        if a12 && !self.last_a12 {
            self.clock_irq_counter();
        }
        self.last_a12 = a12;
    }
}

impl Mapper for Mapper4 {
    fn cpu_peek(&self, addr: u16) -> Option<u8> {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END if self.prg_ram_enabled => {
                let offset = (addr - cpu_mem::PRG_RAM_START) as usize % self.prg_ram.len();
                Some(self.prg_ram[offset])
            }
            cpu_mem::PRG_ROM_START..=0xFFFF => Some(self.read_prg_rom(addr)),
            _ => None,
        }
    }

    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        self.cpu_peek(addr)
    }

    fn cpu_write(&mut self, addr: u16, value: u8, _cpu_cycle: u64) {
        let even = addr % 2 == 0;
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END if self.prg_ram_enabled => {
                let len = self.prg_ram.len();
                self.prg_ram[(addr - cpu_mem::PRG_RAM_START) as usize % len] = value;
            }
            0x8000..=0x9FFF if even => self.bank_select = value,
            0x8000..=0x9FFF => {
                let slot = (self.bank_select & 0x07) as usize;
                self.regs[slot] = value;
            }
            0xA000..=0xBFFF if even => {
                if self.mirroring != Mirroring::FourScreen {
                    self.mirroring = if value & 0x01 != 0 {
                        Mirroring::Horizontal
                    } else {
                        Mirroring::Vertical
                    };
                }
            }
            0xA000..=0xBFFF => self.prg_ram_enabled = value & 0x80 != 0,
            0xC000..=0xDFFF if even => self.irq_latch = value,
            0xC000..=0xDFFF => self.irq_reload = true,
            0xE000..=0xFFFF if even => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            0xE000..=0xFFFF => self.irq_enabled = true,
            _ => {}
        }
    }

    fn ppu_peek(&self, addr: u16) -> Option<u8> {
        (addr < 0x2000).then(|| self.read_chr(addr))
    }

    fn ppu_read(&mut self, addr: u16) -> Option<u8> {
        if addr >= 0x2000 {
            return None;
        }
        let value = self.read_chr(addr);
        self.observe_a12(addr);
        Some(value)
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        if addr >= 0x2000 {
            return false;
        }
        self.observe_a12(addr);
        let unit = self.chr_unit(addr);
        match &mut self.chr_ram {
            Some(ram) => {
                let offset = unit * CHR_1K + addr as usize % CHR_1K;
                let len = ram.len();
                ram[offset % len] = value;
                true
            }
            None => false,
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    fn reset(&mut self) {
        self.bank_select = 0;
        self.regs = [0; 8];
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
    }

    fn mapper_id(&self) -> u16 {
        4
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC3")
    }

    fn prg_rom(&self) -> Option<&[u8]> {
        Some(&self.prg_rom)
    }
    fn prg_ram(&self) -> Option<&[u8]> {
        Some(&self.prg_ram)
    }
    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.prg_ram)
    }
    fn chr_rom(&self) -> Option<&[u8]> {
        (self.chr_ram.is_none()).then_some(&self.chr_rom[..])
    }
    fn chr_ram(&self) -> Option<&[u8]> {
        self.chr_ram.as_deref()
    }
    fn chr_ram_mut(&mut self) -> Option<&mut [u8]> {
        self.chr_ram.as_deref_mut()
    }

    fn report_cpu_mapping(&self) -> Vec<BankWindow> {
        (0..4)
            .map(|window| BankWindow {
                address: cpu_mem::PRG_ROM_START + (window * PRG_BANK_SIZE) as u16,
                size: PRG_BANK_SIZE as u16,
                bank: self.prg_window_bank(window) as u16,
            })
            .collect()
    }

    /// Reports the six CHR windows MMC3 actually has — two 2 KiB pairs and
    /// four 1 KiB singles — swapping which half of pattern-table space holds
    /// which, per [`Self::chr_mode`]'s A12-inversion bit.
    fn report_ppu_mapping(&self) -> Vec<BankWindow> {
        let units = self.chr_unit_count() as u16;
        let pair0 = (self.regs[0] & !1) as u16 % units.max(2);
        let pair1 = (self.regs[1] & !1) as u16 % units.max(2);
        let singles: Vec<u16> = self.regs[2..6].iter().map(|&r| r as u16 % units).collect();
        let (two_k_base, one_k_base) = if self.chr_mode() { (0x1000u16, 0x0000u16) } else { (0x0000u16, 0x1000u16) };
        vec![
            BankWindow { address: two_k_base, size: 0x0800, bank: pair0 },
            BankWindow { address: two_k_base + 0x0800, size: 0x0800, bank: pair1 },
            BankWindow { address: one_k_base, size: CHR_1K as u16, bank: singles[0] },
            BankWindow { address: one_k_base + CHR_1K as u16, size: CHR_1K as u16, bank: singles[1] },
            BankWindow { address: one_k_base + 2 * CHR_1K as u16, size: CHR_1K as u16, bank: singles[2] },
            BankWindow { address: one_k_base + 3 * CHR_1K as u16, size: CHR_1K as u16, bank: singles[3] },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{ConsoleType, Region};

    fn rom(prg_banks: usize) -> RomData {
        let mut prg = vec![0u8; prg_banks * PRG_BANK_SIZE];
        for (i, bank) in prg.chunks_mut(PRG_BANK_SIZE).enumerate() {
            bank[0] = i as u8;
        }
        RomData {
            prg_rom: Cow::Owned(prg),
            chr_rom: Cow::Owned(vec![0u8; 0x2000]),
            sha1: [0; 20],
            mapper: 4,
            submapper: 0,
            mirroring: Mirroring::Horizontal,
            battery: false,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            console: ConsoleType::Nes,
            region: Region::Ntsc,
        }
    }

    #[test]
    fn last_two_banks_are_fixed_in_default_prg_mode() {
        let mut m = Mapper4::new(rom(8));
        assert_eq!(m.cpu_read(0xC000), Some(6));
        assert_eq!(m.cpu_read(0xE000), Some(7));
    }

    #[test]
    fn bank_select_then_bank_data_switches_the_8000_window() {
        let mut m = Mapper4::new(rom(8));
        m.cpu_write(0x8000, 6, 0); // select PRG slot R6
        m.cpu_write(0x8001, 3, 0); // R6 = bank 3
        assert_eq!(m.cpu_read(0x8000), Some(3));
    }

    #[test]
    fn irq_fires_when_counter_reaches_zero_with_irq_enabled() {
        let mut m = Mapper4::new(rom(8));
        m.cpu_write(0xC000, 2, 0); // latch = 2
        m.cpu_write(0xC001, 0, 0); // force reload on next clock
        m.cpu_write(0xE001, 0, 0); // enable IRQ
        // Three rising A12 edges: reload to 2, decrement to 1, decrement to 0 (fires).
        for _ in 0..3 {
            m.ppu_read(0x0000);
            m.ppu_read(0x1000);
        }
        assert!(m.irq_pending());
        m.clear_irq();
        assert!(!m.irq_pending());
    }
}
