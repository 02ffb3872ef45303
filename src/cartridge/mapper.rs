//! The capability set every mapper implements.
//!
//! Trait objects rather than an enum of variants: this keeps each mapper's
//! private state local to its own struct instead of flattened into one
//! giant enum, at the cost of one vtable indirection per bus access.

use std::any::Any;
use std::borrow::Cow;

use dyn_clone::DynClone;

use super::Mirroring;

/// A cartridge's bank-switching and IRQ logic, addressed in two independent
/// spaces: CPU (`$4020-$FFFF`, PRG-ROM/RAM/NVRAM) and PPU (`$0000-$1FFF`,
/// CHR-ROM/RAM). Nametable RAM is not part of this trait: it is owned by the
/// PPU itself, which only consults [`Mapper::mirroring`] to route accesses.
pub trait Mapper: std::fmt::Debug + DynClone + Any {
    /// Side-effect-free read, for debuggers/disassemblers. `None` means the
    /// address is unmapped (e.g. a PRG-RAM window the cartridge lacks).
    fn cpu_peek(&self, addr: u16) -> Option<u8>;

    /// May mutate mapper state (MMC2-style latches, bus-conflict bookkeeping)
    /// and always signals an M2 rising edge to mappers that key off it.
    fn cpu_read(&mut self, addr: u16) -> Option<u8>;

    /// `cpu_cycle` is the CPU's total-cycles-since-reset counter, needed by
    /// MMC1's write-ignore-window quirk: two writes landing on the same or
    /// an adjacent CPU cycle collapse into one shift-register update, since
    /// real MMC1 hardware ignores a second consecutive write.
    fn cpu_write(&mut self, addr: u16, value: u8, cpu_cycle: u64);

    fn ppu_peek(&self, addr: u16) -> Option<u8>;

    /// May mutate mapper state (MMC2 CHR-latch flips, MMC3 A12 edge
    /// detection via repeated reads in the same pattern-table half).
    fn ppu_read(&mut self, addr: u16) -> Option<u8>;

    /// Returns `true` if the cartridge absorbed the write (CHR-RAM); `false`
    /// if the address isn't cartridge-owned CHR space.
    fn ppu_write(&mut self, addr: u16, value: u8) -> bool;

    fn mirroring(&self) -> Mirroring;

    fn irq_pending(&self) -> bool {
        false
    }

    fn clear_irq(&mut self) {}

    /// Tick hook for mappers (MMC3) whose IRQ counter is driven by the CPU
    /// M2 clock line rather than by PPU address activity.
    fn m2_signal(&mut self, _rising: bool) {}

    /// Restores mapper registers to power-on defaults.
    fn reset(&mut self) {}

    fn mapper_id(&self) -> u16;

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Mapper {}", self.mapper_id()))
    }

    fn prg_rom(&self) -> Option<&[u8]> {
        None
    }
    fn prg_ram(&self) -> Option<&[u8]> {
        None
    }
    fn prg_ram_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
    fn prg_nvram(&self) -> Option<&[u8]> {
        None
    }
    fn prg_nvram_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
    fn chr_rom(&self) -> Option<&[u8]> {
        None
    }
    fn chr_ram(&self) -> Option<&[u8]> {
        None
    }
    fn chr_ram_mut(&mut self) -> Option<&mut [u8]> {
        None
    }

    /// Active PRG banking windows, for debug visualizers. The default
    /// reports the whole of [`Mapper::prg_rom`] as a single unbanked window
    /// (correct for NROM-style mappers with no real PRG banking); mappers
    /// with switchable windows override this with their actual bank state.
    fn report_cpu_mapping(&self) -> Vec<BankWindow> {
        match self.prg_rom() {
            Some(rom) if !rom.is_empty() => {
                vec![BankWindow { address: 0x8000, size: rom.len().min(0x8000) as u16, bank: 0 }]
            }
            _ => Vec::new(),
        }
    }

    /// Active CHR banking windows, for debug visualizers. The default
    /// reports the whole of [`Mapper::chr_rom`]/[`Mapper::chr_ram`] as a
    /// single unbanked window.
    fn report_ppu_mapping(&self) -> Vec<BankWindow> {
        let len = self.chr_rom().or_else(|| self.chr_ram()).map(<[u8]>::len);
        match len {
            Some(len) if len > 0 => vec![BankWindow { address: 0x0000, size: len.min(0x2000) as u16, bank: 0 }],
            _ => Vec::new(),
        }
    }
}

/// One active bank window reported for debug visualizers: the CPU/PPU
/// address range it occupies and the index of the physical bank currently
/// mapped there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankWindow {
    pub address: u16,
    pub size: u16,
    pub bank: u16,
}

dyn_clone::clone_trait_object!(Mapper);

pub fn mapper_downcast_ref<T: Any>(mapper: &dyn Mapper) -> Option<&T> {
    (mapper as &dyn Any).downcast_ref::<T>()
}

pub fn mapper_downcast_mut<T: Any>(mapper: &mut dyn Mapper) -> Option<&mut T> {
    (mapper as &mut dyn Any).downcast_mut::<T>()
}

/// Allocates a PRG-RAM buffer per the header's declared size (0 if none).
pub(crate) fn allocate_ram(size: usize) -> Box<[u8]> {
    vec![0u8; size].into_boxed_slice()
}

/// CHR storage is either fixed ROM or writable RAM, picked once at load time
/// from whether the header shipped any CHR-ROM bytes at all. Shared by every
/// mapper below instead of re-deriving the rom-vs-ram branch per mapper.
#[derive(Debug, Clone)]
pub(crate) enum ChrStorage {
    Rom(Cow<'static, [u8]>),
    Ram(Box<[u8]>),
}

impl ChrStorage {
    pub(crate) fn new(chr_rom: Cow<'static, [u8]>, chr_ram_size: usize) -> Self {
        if chr_rom.is_empty() {
            Self::Ram(allocate_ram(chr_ram_size.max(0x2000)))
        } else {
            Self::Rom(chr_rom)
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Rom(b) => b.len(),
            Self::Ram(b) => b.len(),
        }
    }

    pub(crate) fn read(&self, index: usize) -> u8 {
        match self {
            Self::Rom(b) => b[index % b.len().max(1)],
            Self::Ram(b) => b[index % b.len().max(1)],
        }
    }

    /// Writes are silently ignored on ROM (real hardware can't write CHR-ROM
    /// either); returns whether the write landed somewhere.
    pub(crate) fn write(&mut self, index: usize, value: u8) -> bool {
        match self {
            Self::Rom(_) => false,
            Self::Ram(b) => {
                let len = b.len();
                b[index % len.max(1)] = value;
                true
            }
        }
    }

    pub(crate) fn as_rom_slice(&self) -> Option<&[u8]> {
        match self {
            Self::Rom(b) => Some(b),
            Self::Ram(_) => None,
        }
    }

    pub(crate) fn as_ram_slice(&self) -> Option<&[u8]> {
        match self {
            Self::Rom(_) => None,
            Self::Ram(b) => Some(b),
        }
    }

    pub(crate) fn as_ram_slice_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Rom(_) => None,
            Self::Ram(b) => Some(b),
        }
    }
}
