//! Cartridges: the ROM-supplied data plus whichever [`mapper::Mapper`] that
//! data's header selects.
//!
//! The byte-level iNES/NES 2.0 header parse is out of scope here —
//! [`RomData`] is the boundary. Whatever loads a ROM file is expected to
//! hand this module an already-decoded `RomData`; this module only ever
//! turns one of those into a running [`Cartridge`].

pub mod mapper;
mod mapper0;
mod mapper1;
mod mapper2;
mod mapper3;
mod mapper4;
mod mapper7;
mod mapper9;
mod mapper66;

use std::borrow::Cow;

use crate::error::Error;
use crate::memory::ppu as ppu_mem;
use mapper::Mapper;

/// Current nametable mirroring policy, queried fresh every PPU nametable
/// access since several mappers (7/9's control bit, MMC1's control register)
/// can change it mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    SingleScreen(Nametable),
    FourScreen,
}

/// Which of the console's two physical 1 KiB nametable pages a single-screen
/// mapper has pinned both logical tables onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nametable {
    Lower,
    Upper,
}

/// Rewrites a PPU address in `$2000-$3EFF` onto one of the console's two
/// physical 1 KiB nametable pages. Four-screen carts are expected to supply
/// their own extra RAM; since this core has no such slot, four-screen
/// addresses land on the second physical page as a fallback (see DESIGN.md).
pub fn physical_nametable_addr(addr: u16, mirroring: Mirroring) -> u16 {
    let offset_in_4k = (addr - ppu_mem::NAMETABLE_START) % 0x1000;
    let logical_table = offset_in_4k / ppu_mem::NAMETABLE_SIZE;
    let offset = offset_in_4k % ppu_mem::NAMETABLE_SIZE;
    let physical_page: u16 = match mirroring {
        // Tables 0,1 (the top row) share a page; tables 2,3 (bottom row)
        // share the other.
        Mirroring::Horizontal => logical_table / 2,
        // Tables 0,2 (left column) share a page; tables 1,3 (right column)
        // share the other.
        Mirroring::Vertical => logical_table % 2,
        Mirroring::SingleScreen(Nametable::Lower) => 0,
        Mirroring::SingleScreen(Nametable::Upper) => 1,
        Mirroring::FourScreen => 1,
    };
    ppu_mem::NAMETABLE_START + physical_page * ppu_mem::NAMETABLE_SIZE + offset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleType {
    Nes,
    VsSystem,
    Playchoice10,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Ntsc,
    Pal,
    Dual,
    Dendy,
}

/// Everything a loaded ROM contributes, already decoded from its iNES/NES 2.0
/// header by whatever sits above this crate.
#[derive(Debug, Clone)]
pub struct RomData {
    pub prg_rom: Cow<'static, [u8]>,
    /// Empty means the cartridge uses CHR-RAM instead of CHR-ROM.
    pub chr_rom: Cow<'static, [u8]>,
    pub sha1: [u8; 20],
    pub mapper: u16,
    pub submapper: u8,
    pub mirroring: Mirroring,
    pub battery: bool,
    pub prg_ram_size: usize,
    pub prg_nvram_size: usize,
    pub chr_ram_size: usize,
    pub chr_nvram_size: usize,
    pub console: ConsoleType,
    pub region: Region,
}

/// The live cartridge: ROM identity plus whichever mapper its header picked.
#[derive(Debug, Clone)]
pub struct Cartridge {
    mapper: Box<dyn Mapper>,
    sha1: [u8; 20],
}

impl Cartridge {
    /// Builds the cartridge's mapper from decoded ROM data. An unimplemented
    /// mapper id aborts the load without touching any existing cartridge
    /// state — this never panics.
    pub fn new(rom: RomData) -> Result<Self, Error> {
        let sha1 = rom.sha1;
        let mapper: Box<dyn Mapper> = match rom.mapper {
            0 => Box::new(mapper0::Mapper0::new(rom)),
            1 => Box::new(mapper1::Mapper1::new(rom)),
            2 => Box::new(mapper2::Mapper2::new(rom)),
            3 => Box::new(mapper3::Mapper3::new(rom)),
            4 => Box::new(mapper4::Mapper4::new(rom)),
            7 => Box::new(mapper7::Mapper7::new(rom)),
            9 => Box::new(mapper9::Mapper9::new(rom)),
            66 => Box::new(mapper66::Mapper66::new(rom)),
            other => return Err(Error::UnsupportedMapper(other)),
        };
        Ok(Self { mapper, sha1 })
    }

    pub fn sha1(&self) -> &[u8; 20] {
        &self.sha1
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    pub fn mapper_mut(&mut self) -> &mut dyn Mapper {
        self.mapper.as_mut()
    }

    pub fn cpu_peek(&self, addr: u16) -> Option<u8> {
        self.mapper.cpu_peek(addr)
    }

    pub fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        self.mapper.cpu_read(addr)
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8, cpu_cycle: u64) {
        self.mapper.cpu_write(addr, value, cpu_cycle);
    }

    pub fn ppu_peek(&self, addr: u16) -> Option<u8> {
        self.mapper.ppu_peek(addr)
    }

    pub fn ppu_read(&mut self, addr: u16) -> Option<u8> {
        self.mapper.ppu_read(addr)
    }

    pub fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        self.mapper.ppu_write(addr, value)
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring()
    }

    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }

    pub fn clear_irq(&mut self) {
        self.mapper.clear_irq();
    }

    /// Tick hook for mappers (MMC3) that clock an internal counter off the
    /// CPU M2 line rather than off PPU address activity.
    pub fn m2_signal(&mut self, rising: bool) {
        self.mapper.m2_signal(rising);
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(mapper: u16, prg_len: usize, chr_len: usize) -> RomData {
        RomData {
            prg_rom: Cow::Owned(vec![0u8; prg_len]),
            chr_rom: Cow::Owned(vec![0u8; chr_len]),
            sha1: [0u8; 20],
            mapper,
            submapper: 0,
            mirroring: Mirroring::Horizontal,
            battery: false,
            prg_ram_size: 0,
            prg_nvram_size: 0,
            chr_ram_size: if chr_len == 0 { 0x2000 } else { 0 },
            chr_nvram_size: 0,
            console: ConsoleType::Nes,
            region: Region::Ntsc,
        }
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        let err = Cartridge::new(rom(255, 0x4000, 0x2000)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMapper(255)));
    }

    #[test]
    fn horizontal_mirroring_pairs_top_and_bottom_rows() {
        let a = physical_nametable_addr(0x2000, Mirroring::Horizontal);
        let b = physical_nametable_addr(0x2400, Mirroring::Horizontal);
        let c = physical_nametable_addr(0x2800, Mirroring::Horizontal);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn vertical_mirroring_pairs_left_and_right_columns() {
        let a = physical_nametable_addr(0x2000, Mirroring::Vertical);
        let b = physical_nametable_addr(0x2800, Mirroring::Vertical);
        let c = physical_nametable_addr(0x2400, Mirroring::Vertical);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn single_screen_collapses_all_four_tables() {
        for offset in [0x2000, 0x2400, 0x2800, 0x2C00] {
            assert_eq!(
                physical_nametable_addr(offset, Mirroring::SingleScreen(Nametable::Lower)),
                ppu_mem::NAMETABLE_START + (offset - ppu_mem::NAMETABLE_START) % ppu_mem::NAMETABLE_SIZE
            );
        }
    }
}
