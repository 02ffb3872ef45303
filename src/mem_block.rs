//! Fixed-size byte block used for work RAM, OAM, and palette memory.
//!
//! A thin wrapper around `[u8; N]` (or `Box<[u8; N]>` under `boxed-memblock`,
//! for targets where a multi-kilobyte stack frame is unwelcome) so the
//! various fixed-size memories in the core share one indexing/debug impl
//! instead of re-deriving `Deref`/`Index` everywhere.

use core::ops::{Deref, DerefMut};

#[cfg(feature = "boxed-memblock")]
type Storage<const N: usize> = Box<[u8; N]>;
#[cfg(not(feature = "boxed-memblock"))]
type Storage<const N: usize> = [u8; N];

#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemBlock<const N: usize>(Storage<N>);

impl<const N: usize> MemBlock<N> {
    pub fn new() -> Self {
        #[cfg(feature = "boxed-memblock")]
        {
            Self(Box::new([0u8; N]))
        }
        #[cfg(not(feature = "boxed-memblock"))]
        {
            Self([0u8; N])
        }
    }

    pub fn fill(&mut self, value: u8) {
        self.0.fill(value);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}

impl<const N: usize> Default for MemBlock<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for MemBlock<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl<const N: usize> DerefMut for MemBlock<N> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}
