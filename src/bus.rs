//! CPU bus contract and the open-bus latch it relies on.
//!
//! The actual address decoding lives on [`crate::Nes`] (see `system.rs`)
//! which owns every device and is the only thing allowed to borrow more
//! than one of them mutably at once — no device holds a back-pointer to its
//! siblings, so every cross-device interaction routes through `Nes`.

use crate::cartridge::Mirroring;

/// Everything the CPU core needs from its host system each cycle.
pub trait CpuBus {
    /// A read that may have side effects (PPU register latch shift, mapper
    /// CHR latch flips, OAM DMA trigger, controller shift).
    fn cpu_read(&mut self, addr: u16) -> u8;

    /// A side-effect-free read for debuggers/disassemblers.
    fn cpu_peek(&self, addr: u16) -> u8;

    fn cpu_write(&mut self, addr: u16, value: u8);
}

/// What the PPU needs from the cartridge: pattern-table (CHR) access plus
/// the current mirroring policy. Nametable RAM itself is owned by the PPU,
/// not the cartridge, so it is never routed through this trait — the PPU
/// falls back to its own CIRAM via [`crate::cartridge::physical_nametable_addr`]
/// whenever these methods report the address isn't theirs.
pub trait PpuBus {
    fn ppu_peek(&self, addr: u16) -> Option<u8>;
    fn ppu_read(&mut self, addr: u16) -> Option<u8>;
    fn ppu_write(&mut self, addr: u16, value: u8) -> bool;
    fn mirroring(&self) -> Mirroring;
}

impl PpuBus for crate::cartridge::Cartridge {
    fn ppu_peek(&self, addr: u16) -> Option<u8> {
        crate::cartridge::Cartridge::ppu_peek(self, addr)
    }

    fn ppu_read(&mut self, addr: u16) -> Option<u8> {
        crate::cartridge::Cartridge::ppu_read(self, addr)
    }

    fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        crate::cartridge::Cartridge::ppu_write(self, addr, value)
    }

    fn mirroring(&self) -> Mirroring {
        crate::cartridge::Cartridge::mirroring(self)
    }
}

/// Stand-in [`PpuBus`] used whenever no cartridge is inserted, so the PPU can
/// always be clocked uniformly instead of special-casing the `None` case at
/// every call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCartridge;

impl PpuBus for NoCartridge {
    fn ppu_peek(&self, _addr: u16) -> Option<u8> {
        None
    }
    fn ppu_read(&mut self, _addr: u16) -> Option<u8> {
        None
    }
    fn ppu_write(&mut self, _addr: u16, _value: u8) -> bool {
        false
    }
    fn mirroring(&self) -> Mirroring {
        Mirroring::Horizontal
    }
}

/// Tracks the last byte that actually crossed the bus, for open-bus reads of
/// unmapped or write-only regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenBus {
    latch: u8,
}

impl OpenBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u8 {
        self.latch
    }

    pub fn update(&mut self, value: u8) {
        self.latch = value;
    }
}
