//! Block storage behind the ATA controller.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{EmuError, Result};

pub const SECTOR_SIZE: usize = 512;

/// Sector-addressed storage. LBAs past `sector_count()` are never passed in;
/// the controller reports IDNF before reaching the backend.
pub trait DiskBackend {
    fn sector_count(&self) -> u64;

    /// # Errors
    ///
    /// Backend I/O failures, reported to firmware as an uncorrectable error.
    fn read_sector(&mut self, lba: u64, buffer: &mut [u8; SECTOR_SIZE]) -> io::Result<()>;

    /// # Errors
    ///
    /// Backend I/O failures, reported to firmware as an uncorrectable error.
    fn write_sector(&mut self, lba: u64, buffer: &[u8; SECTOR_SIZE]) -> io::Result<()>;

    /// # Errors
    ///
    /// Backend I/O failures.
    fn flush(&mut self) -> io::Result<()>;
}

/// Disk held entirely in memory, zero filled.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    data: Vec<u8>,
}

impl MemoryDisk {
    #[must_use]
    pub fn new(sectors: u64) -> Self {
        Self {
            data: vec![0; sectors as usize * SECTOR_SIZE],
        }
    }

    /// Wraps an image, padding a trailing partial sector with zeros.
    #[must_use]
    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        let rem = data.len() % SECTOR_SIZE;
        if rem != 0 {
            data.resize(data.len() + SECTOR_SIZE - rem, 0);
        }
        Self { data }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, lba: u64) -> io::Result<std::ops::Range<usize>> {
        let start = usize::try_from(lba)
            .ok()
            .and_then(|lba| lba.checked_mul(SECTOR_SIZE))
            .filter(|start| start + SECTOR_SIZE <= self.data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "sector out of range"))?;

        Ok(start..start + SECTOR_SIZE)
    }
}

impl DiskBackend for MemoryDisk {
    fn sector_count(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }

    fn read_sector(&mut self, lba: u64, buffer: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        let range = self.range(lba)?;
        buffer.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sector(&mut self, lba: u64, buffer: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        let range = self.range(lba)?;
        self.data[range].copy_from_slice(buffer);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Disk backed by an image file opened read/write.
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    sectors: u64,
}

impl FileDisk {
    /// # Errors
    ///
    /// Fails if the file cannot be opened or its length is not a whole
    /// number of sectors.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % SECTOR_SIZE as u64 != 0 {
            return Err(EmuError::TruncatedDiskImage(len));
        }

        tracing::info!("opened disk image {} ({} sectors)", path.display(), len / 512);

        Ok(Self {
            file,
            sectors: len / SECTOR_SIZE as u64,
        })
    }

    fn seek_to(&mut self, lba: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))?;
        Ok(())
    }
}

impl DiskBackend for FileDisk {
    fn sector_count(&self) -> u64 {
        self.sectors
    }

    fn read_sector(&mut self, lba: u64, buffer: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        self.seek_to(lba)?;
        self.file.read_exact(buffer)
    }

    fn write_sector(&mut self, lba: u64, buffer: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        self.seek_to(lba)?;
        self.file.write_all(buffer)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}
