use std::fmt;

use crate::cartridge::Region as RomRegion;

/// Runtime timing selection used by the clock/CPU/PPU/APU.
///
/// Distinct from [`crate::cartridge::Region`] (the ROM header's declared
/// region hint): this is what the clock actually divides by, resolved from
/// a user choice plus that hint. Only NTSC timing is implemented; the other
/// variants round-trip through [`Region::resolve`] but the clock's divider
/// table (`crate::clock::Dividers`) only has an NTSC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    Auto,
    Ntsc,
    Pal,
    Dendy,
}

impl Region {
    /// Resolves an explicit user choice (anything but `Auto`) or falls back
    /// to what the ROM header declared.
    pub fn resolve(selected: Region, rom_hint: RomRegion) -> Region {
        match selected {
            Region::Auto => match rom_hint {
                RomRegion::Ntsc => Region::Ntsc,
                RomRegion::Pal => Region::Pal,
                RomRegion::Dual => Region::Ntsc,
                RomRegion::Dendy => Region::Dendy,
            },
            other => other,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Region::Auto => "auto",
            Region::Ntsc => "ntsc",
            Region::Pal => "pal",
            Region::Dendy => "dendy",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_falls_back_to_the_rom_hint() {
        assert_eq!(Region::resolve(Region::Auto, RomRegion::Pal), Region::Pal);
    }

    #[test]
    fn explicit_choice_overrides_the_rom_hint() {
        assert_eq!(Region::resolve(Region::Pal, RomRegion::Ntsc), Region::Pal);
    }
}
