//! Error kinds surfaced while loading ROMs or mapping persistent storage.
//!
//! Per-cycle runtime faults (invalid opcode, out-of-range bus access) are
//! *not* represented here: they never unwind across the core boundary. They
//! are reported through the host `on_error` callback and a `halted` flag on
//! [`crate::Nes`] instead.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Buffer shorter than the 16-byte iNES header.
    HeaderTooShort { actual: usize },
    /// Missing `NES<EOF>` magic.
    InvalidMagic,
    /// A PRG/CHR/trainer section is shorter than the header promises.
    SectionTooShort {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The header names a mapper this core does not implement.
    UnsupportedMapper(u16),
    /// Wraps I/O failures encountered while reading a ROM or mapping NVRAM.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTooShort { actual } => {
                write!(f, "iNES header expected 16 bytes, got {actual}")
            }
            Self::InvalidMagic => write!(f, "missing 'NES\\x1A' magic"),
            Self::SectionTooShort {
                section,
                expected,
                actual,
            } => write!(
                f,
                "{section} section expected {expected} bytes, got {actual}"
            ),
            Self::UnsupportedMapper(id) => write!(f, "mapper {id} is not implemented"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
