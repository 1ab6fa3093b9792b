use serde::Serialize;

use crate::error::{EmuError, Result};

/// A flat little-endian byte store: SDRAM, IRAM or the boot image.
///
/// Accesses are bounds checked; reads past the end return 0 and writes past
/// the end are dropped, so a region may be registered larger than its
/// backing allocation.
#[derive(Clone, Debug, Serialize)]
pub struct MemoryBlock {
    name: &'static str,
    data: Vec<u8>,
    read_only: bool,
}

impl MemoryBlock {
    #[must_use]
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            data: vec![0; size],
            read_only: false,
        }
    }

    /// Wraps an image that firmware cannot overwrite.
    #[must_use]
    pub const fn read_only(name: &'static str, data: Vec<u8>) -> Self {
        Self {
            name,
            data,
            read_only: true,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn read_byte(&self, offset: u32) -> u8 {
        self.data.get(offset as usize).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn read_half_word(&self, offset: u32) -> u16 {
        let offset = offset as usize;
        self.data
            .get(offset..offset + 2)
            .map_or(0, |b| u16::from_le_bytes([b[0], b[1]]))
    }

    #[must_use]
    pub fn read_word(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        self.data
            .get(offset..offset + 4)
            .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_byte(&mut self, offset: u32, value: u8) {
        self.write_bytes(offset, &[value]);
    }

    pub fn write_half_word(&mut self, offset: u32, value: u16) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn write_word(&mut self, offset: u32, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    fn write_bytes(&mut self, offset: u32, bytes: &[u8]) {
        if self.read_only {
            tracing::trace!("dropped write to read-only {} at {offset:#x}", self.name);
            return;
        }
        let offset = offset as usize;
        if let Some(dest) = self.data.get_mut(offset..offset + bytes.len()) {
            dest.copy_from_slice(bytes);
        }
    }

    /// Copies `bytes` in at `offset`, bypassing the read-only flag.
    ///
    /// # Errors
    ///
    /// Fails if the data does not fit.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.data.len())
            .ok_or(EmuError::LoadOutOfBounds {
                region: self.name,
                offset,
                len: bytes.len(),
                size: self.data.len(),
            })?;

        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}
