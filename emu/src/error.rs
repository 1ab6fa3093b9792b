//! Setup-time errors.
//!
//! Architectural faults become processor exceptions and peripheral protocol
//! errors become status bits; only host and configuration problems surface
//! as [`EmuError`].

/// Error type for emulator construction, loading and host I/O.
#[derive(thiserror::Error, Debug)]
pub enum EmuError {
    /// SDRAM size is zero, not word aligned or larger than the 256 MiB window.
    #[error("invalid RAM size {0:#x}")]
    InvalidRamSize(usize),

    /// Core clock of zero Hz.
    #[error("invalid clock frequency {0} Hz")]
    InvalidClock(u32),

    /// Frame rate of zero or above the core clock.
    #[error("invalid frame rate {0}")]
    InvalidFrameRate(u32),

    /// Boot image does not fit in the low vector window.
    #[error("boot image is {size} bytes, limit is {limit}")]
    BootImageTooLarge { size: usize, limit: usize },

    /// A load would write past the end of the target region.
    #[error("loading {len} bytes at offset {offset:#x} overflows {region} ({size:#x} bytes)")]
    LoadOutOfBounds {
        region: &'static str,
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Disk image length is not a multiple of the sector size.
    #[error("disk image length {0} is not a multiple of 512")]
    TruncatedDiskImage(u64),

    /// The debug listener could not be bound.
    #[error("debug port {port} unavailable: {source}")]
    DebugPortUnavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Two peripherals or memories claim the same address.
    #[error("region {new_start:#010x}..={new_end:#010x} overlaps {start:#010x}..={end:#010x}")]
    OverlappingRegions {
        start: u32,
        end: u32,
        new_start: u32,
        new_end: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for setup operations.
pub type Result<T> = std::result::Result<T, EmuError>;
