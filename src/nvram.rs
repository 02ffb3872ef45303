//! Battery-backed PRG-NVRAM, memory-mapped onto a file named by ROM SHA-1.
//!
//! A fixed-size byte buffer mapped onto a file named by ROM SHA-1 under a
//! user data directory. Writes are immediately visible to the file; reads
//! come from memory. Mapping failures (no data directory, permission error,
//! read-only filesystem) are recoverable: the cartridge keeps running on a
//! volatile buffer instead of losing the save.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use memmap2::MmapMut;

/// Either a live memory-mapped file or a volatile fallback buffer of the
/// same declared size.
pub struct NvramFile {
    backing: Backing,
}

enum Backing {
    Mapped(MmapMut),
    Volatile(Vec<u8>),
}

impl std::fmt::Debug for NvramFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvramFile")
            .field("len", &self.as_slice().len())
            .field(
                "mode",
                &match self.backing {
                    Backing::Mapped(_) => "mapped",
                    Backing::Volatile(_) => "volatile",
                },
            )
            .finish()
    }
}

fn nvram_path(sha1: &[u8; 20]) -> Option<PathBuf> {
    let mut dir = dirs::data_dir()?;
    dir.push("nes-core");
    dir.push("nvram");
    let hex: String = sha1.iter().map(|b| format!("{b:02x}")).collect();
    dir.push(format!("{hex}.sav"));
    Some(dir)
}

fn try_map(sha1: &[u8; 20], size: usize) -> io::Result<MmapMut> {
    let path = nvram_path(sha1).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no platform data directory available")
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
    file.set_len(size as u64)?;
    // SAFETY: the file is exclusively ours for the cartridge's lifetime; no
    // other process is expected to mutate it concurrently.
    unsafe { MmapMut::map_mut(&file) }
}

impl NvramFile {
    /// Opens (or creates) the mapped file for `sha1`, falling back to a
    /// volatile buffer on any I/O failure. `size` is the header's declared
    /// PRG-NVRAM size; zero is a valid "no battery" cartridge and always
    /// produces an empty buffer without touching the filesystem.
    pub fn open(sha1: &[u8; 20], size: usize) -> Self {
        if size == 0 {
            return Self { backing: Backing::Volatile(Vec::new()) };
        }
        match try_map(sha1, size) {
            Ok(mmap) => Self { backing: Backing::Mapped(mmap) },
            Err(err) => {
                tracing::warn!(error = %err, "nvram mmap failed, falling back to volatile storage");
                Self { backing: Backing::Volatile(vec![0u8; size]) }
            }
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(m) => &m[..],
            Backing::Volatile(v) => &v[..],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Mapped(m) => &mut m[..],
            Backing::Volatile(v) => &mut v[..],
        }
    }

    pub fn read(&self, offset: usize) -> u8 {
        let slice = self.as_slice();
        if slice.is_empty() {
            0
        } else {
            slice[offset % slice.len()]
        }
    }

    pub fn write(&mut self, offset: usize, value: u8) {
        let slice = self.as_mut_slice();
        if !slice.is_empty() {
            let len = slice.len();
            slice[offset % len] = value;
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }
}

impl Drop for NvramFile {
    fn drop(&mut self) {
        if let Backing::Mapped(m) = &self.backing {
            // Best-effort: the OS will flush dirty pages regardless of
            // whether this succeeds, so errors here aren't surfaced.
            let _ = m.flush_async();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_never_touches_the_filesystem() {
        let nvram = NvramFile::open(&[0u8; 20], 0);
        assert!(!nvram.is_mapped());
        assert_eq!(nvram.as_slice().len(), 0);
        assert_eq!(nvram.read(5), 0);
    }

    #[test]
    fn writes_round_trip_through_whichever_backing_was_chosen() {
        let mut nvram = NvramFile::open(&[0xAB; 20], 0x2000);
        nvram.write(10, 0x42);
        assert_eq!(nvram.read(10), 0x42);
    }
}
