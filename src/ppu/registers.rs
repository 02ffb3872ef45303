//! CPU-visible PPU registers (`$2000-$2007`) plus the internal `v`/`t`
//! scroll address pair, adapted from the nesdev "loopy" register scheme.

use bitflags::bitflags;

use crate::memory::ppu as ppu_mem;

bitflags! {
    /// PPU control register (`$2000`, write-only).
    ///
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// N M S B s I n n
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control: u8 {
        const NAMETABLE         = 0b0000_0011;
        const INCREMENT_32      = 0b0000_0100;
        const SPRITE_TABLE      = 0b0000_1000;
        const BACKGROUND_TABLE  = 0b0001_0000;
        const SPRITE_SIZE_16    = 0b0010_0000;
        const MASTER_SLAVE      = 0b0100_0000;
        const GENERATE_NMI      = 0b1000_0000;
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::empty()
    }
}

impl Control {
    pub fn vram_increment(self) -> u16 {
        if self.contains(Control::INCREMENT_32) { 32 } else { 1 }
    }

    pub fn sprite_pattern_table(self) -> u16 {
        if self.contains(Control::SPRITE_TABLE) { ppu_mem::PATTERN_TABLE_1 } else { ppu_mem::PATTERN_TABLE_0 }
    }

    pub fn background_pattern_table(self) -> u16 {
        if self.contains(Control::BACKGROUND_TABLE) { ppu_mem::PATTERN_TABLE_1 } else { ppu_mem::PATTERN_TABLE_0 }
    }

    pub fn sprite_height(self) -> u8 {
        if self.contains(Control::SPRITE_SIZE_16) { 16 } else { 8 }
    }

    pub fn nmi_enabled(self) -> bool {
        self.contains(Control::GENERATE_NMI)
    }
}

bitflags! {
    /// PPU mask register (`$2001`, write-only).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mask: u8 {
        const GRAYSCALE            = 0b0000_0001;
        const SHOW_BACKGROUND_LEFT = 0b0000_0010;
        const SHOW_SPRITES_LEFT    = 0b0000_0100;
        const SHOW_BACKGROUND      = 0b0000_1000;
        const SHOW_SPRITES         = 0b0001_0000;
        const EMPHASIZE_RED        = 0b0010_0000;
        const EMPHASIZE_GREEN      = 0b0100_0000;
        const EMPHASIZE_BLUE       = 0b1000_0000;
    }
}

impl Default for Mask {
    fn default() -> Self {
        Self::empty()
    }
}

impl Mask {
    pub fn rendering_enabled(self) -> bool {
        self.intersects(Mask::SHOW_BACKGROUND | Mask::SHOW_SPRITES)
    }

    /// The 3-bit emphasis field handed to the host's draw callback.
    pub fn emphasis_bits(self) -> u8 {
        (self.bits() & 0b1110_0000) >> 5
    }
}

bitflags! {
    /// PPU status register (`$2002`, read-only; reading clears VBlank and the
    /// write toggle).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const SPRITE_OVERFLOW = 0b0010_0000;
        const SPRITE_ZERO_HIT = 0b0100_0000;
        const VERTICAL_BLANK  = 0b1000_0000;
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::empty()
    }
}

// Layout of the 15-bit v/t scroll address:
//  14 13 12 11 10 9 8 7 6 5 4 3 2 1 0
//  [fine_y][nt][coarse_y   ][coarse_x   ]
const COARSE_X_MASK: u16 = 0x001F;
const COARSE_Y_MASK: u16 = 0x03E0;
const NAMETABLE_MASK: u16 = 0x0C00;
const FINE_Y_MASK: u16 = 0x7000;
const ALL_MASK: u16 = COARSE_X_MASK | COARSE_Y_MASK | NAMETABLE_MASK | FINE_Y_MASK;

const COARSE_Y_SHIFT: u16 = 5;
const NAMETABLE_SHIFT: u16 = 10;
const FINE_Y_SHIFT: u16 = 12;

/// The internal 15-bit VRAM address used by both `v` (current) and `t`
/// (temporary) scroll registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VramAddr(u16);

impl VramAddr {
    pub fn coarse_x(self) -> u8 {
        (self.0 & COARSE_X_MASK) as u8
    }

    pub fn set_coarse_x(&mut self, cx: u8) {
        self.0 = (self.0 & !COARSE_X_MASK) | u16::from(cx & 0x1F);
    }

    pub fn coarse_y(self) -> u8 {
        ((self.0 & COARSE_Y_MASK) >> COARSE_Y_SHIFT) as u8
    }

    pub fn set_coarse_y(&mut self, cy: u8) {
        self.0 = (self.0 & !COARSE_Y_MASK) | (u16::from(cy & 0x1F) << COARSE_Y_SHIFT);
    }

    pub fn nametable(self) -> u8 {
        ((self.0 & NAMETABLE_MASK) >> NAMETABLE_SHIFT) as u8
    }

    pub fn set_nametable(&mut self, nt: u8) {
        self.0 = (self.0 & !NAMETABLE_MASK) | (u16::from(nt & 0b11) << NAMETABLE_SHIFT);
    }

    pub fn fine_y(self) -> u8 {
        ((self.0 & FINE_Y_MASK) >> FINE_Y_SHIFT) as u8
    }

    pub fn set_fine_y(&mut self, fy: u8) {
        self.0 = (self.0 & !FINE_Y_MASK) | (u16::from(fy & 0b111) << FINE_Y_SHIFT);
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn set_raw(&mut self, v: u16) {
        self.0 = v & ALL_MASK;
    }

    /// `$2007`-access address increment (by 1 or 32 per [`Control::vram_increment`]),
    /// distinct from the fetch pipeline's `increment_coarse_x`/`increment_fine_y`.
    pub fn increment(&mut self, step: u16) {
        self.0 = self.0.wrapping_add(step) & ALL_MASK;
    }

    /// Nametable-relative address this `v` currently points at ($2000-base,
    /// before cartridge mirroring is applied).
    pub fn nametable_addr(self) -> u16 {
        ppu_mem::NAMETABLE_START + (self.0 & 0x0FFF)
    }

    /// Attribute-table address for the tile `v` currently points at.
    pub fn attribute_addr(self) -> u16 {
        ppu_mem::NAMETABLE_START
            | 0x03C0
            | (self.0 & 0x0C00)
            | ((self.0 >> 4) & 0x38)
            | ((self.0 >> 2) & 0x07)
    }

    /// Coarse-X increment with nametable-bit wraparound (cycle%8==0 during
    /// the background fetch burst).
    pub fn increment_coarse_x(&mut self) {
        if self.coarse_x() == 31 {
            self.set_coarse_x(0);
            self.0 ^= 0x0400;
        } else {
            self.set_coarse_x(self.coarse_x() + 1);
        }
    }

    /// Fine-Y increment with coarse-Y wraparound at 29 (cycle 256 of each
    /// rendering scanline).
    pub fn increment_fine_y(&mut self) {
        if self.fine_y() < 7 {
            self.set_fine_y(self.fine_y() + 1);
        } else {
            self.set_fine_y(0);
            let cy = self.coarse_y();
            if cy == 29 {
                self.set_coarse_y(0);
                self.0 ^= 0x0800;
            } else if cy == 31 {
                self.set_coarse_y(0);
            } else {
                self.set_coarse_y(cy + 1);
            }
        }
    }

    /// Copies the X-scroll portion of `other` (coarse-X + X nametable bit).
    pub fn copy_x_from(&mut self, other: VramAddr) {
        self.0 = (self.0 & !(COARSE_X_MASK | 0x0400)) | (other.0 & (COARSE_X_MASK | 0x0400));
    }

    /// Copies the Y-scroll portion of `other` (fine-Y + coarse-Y + Y nametable bit).
    pub fn copy_y_from(&mut self, other: VramAddr) {
        self.0 = (self.0 & !(FINE_Y_MASK | COARSE_Y_MASK | 0x0800)) | (other.0 & (FINE_Y_MASK | COARSE_Y_MASK | 0x0800));
    }
}
