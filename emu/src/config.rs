//! Emulator configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! changes:
//!
//! ```json
//! {
//!     "ram_size": 67108864,
//!     "boot_image_path": "boot.bin",
//!     "cop_enabled": false
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::bus::{LOW_VECTOR_SIZE, SDRAM_BASE, SDRAM_MAX_SIZE};
use crate::error::{EmuError, Result};

/// Default SDRAM size, 32 MiB.
pub const DEFAULT_RAM_SIZE: usize = 32 * 1024 * 1024;

/// Default core clock, 80 MHz.
pub const DEFAULT_CLOCK_HZ: u32 = 80_000_000;

pub const DEFAULT_FRAME_RATE: u32 = 60;

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// SDRAM size in bytes, mapped at `0x1000_0000`.
    pub ram_size: usize,

    /// Core clock used to convert cycles into timer microseconds.
    pub clock_hz: u32,

    /// Frames per second; `run_frame` executes `clock_hz / frame_rate` cycles.
    pub frame_rate: u32,

    /// Optional image mapped read-only over the low vector window.
    pub boot_image_path: Option<PathBuf>,

    /// When false the companion core never leaves Sleeping.
    pub cop_enabled: bool,

    /// Primary core PC after reset.
    pub entry_point: u32,

    /// Companion core PC; when unset the COP is left for firmware to start.
    pub cop_entry_point: Option<u32>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            clock_hz: DEFAULT_CLOCK_HZ,
            frame_rate: DEFAULT_FRAME_RATE,
            boot_image_path: None,
            cop_enabled: true,
            entry_point: SDRAM_BASE,
            cop_entry_point: None,
        }
    }
}

impl EmulatorConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails [`validate`](Self::validate).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the text does not parse or the result is invalid.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the setup-time rules: word aligned non-empty RAM no larger than
    /// its window, a running clock and a frame rate the clock can serve.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.ram_size == 0 || self.ram_size % 4 != 0 || self.ram_size > SDRAM_MAX_SIZE {
            return Err(EmuError::InvalidRamSize(self.ram_size));
        }
        if self.clock_hz == 0 {
            return Err(EmuError::InvalidClock(self.clock_hz));
        }
        if self.frame_rate == 0 || self.frame_rate > self.clock_hz {
            return Err(EmuError::InvalidFrameRate(self.frame_rate));
        }

        Ok(())
    }

    /// Reads the boot image named by the configuration, if any.
    ///
    /// # Errors
    ///
    /// I/O failures, or an image larger than the low vector window.
    pub fn load_boot_image(&self) -> Result<Option<Vec<u8>>> {
        let Some(path) = &self.boot_image_path else {
            return Ok(None);
        };

        let image = std::fs::read(path)?;
        if image.len() > LOW_VECTOR_SIZE {
            return Err(EmuError::BootImageTooLarge {
                size: image.len(),
                limit: LOW_VECTOR_SIZE,
            });
        }

        Ok(Some(image))
    }

    /// Cycles in one frame at the configured clock.
    #[must_use]
    pub const fn cycles_per_frame(&self) -> u64 {
        self.clock_hz as u64 / self.frame_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = EmulatorConfig::default();

        assert_eq!(config.ram_size, 32 * 1024 * 1024);
        assert_eq!(config.clock_hz, 80_000_000);
        assert_eq!(config.entry_point, 0x1000_0000);
        assert!(config.cop_enabled);
        assert_eq!(config.cycles_per_frame(), 1_333_333);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EmulatorConfig::from_json_str(r#"{ "cop_enabled": false, "frame_rate": 30 }"#).unwrap();

        assert!(!config.cop_enabled);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.ram_size, DEFAULT_RAM_SIZE);
        assert_eq!(config.cop_entry_point, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = EmulatorConfig {
            ram_size: 0,
            ..EmulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmuError::InvalidRamSize(0))));

        let config = EmulatorConfig {
            ram_size: SDRAM_MAX_SIZE + 4,
            ..EmulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmuError::InvalidRamSize(_))));

        let config = EmulatorConfig {
            clock_hz: 0,
            ..EmulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmuError::InvalidClock(0))));

        let config = EmulatorConfig {
            frame_rate: 0,
            ..EmulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmuError::InvalidFrameRate(0))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = EmulatorConfig::from_json_str("{ ram_size: ").unwrap_err();

        assert!(matches!(err, EmuError::ConfigParse(_)));
    }

    #[test]
    fn unset_options_are_not_serialized() {
        let text = serde_json::to_string(&EmulatorConfig::default()).unwrap();

        assert!(!text.contains("boot_image_path"));
        assert!(!text.contains("cop_entry_point"));
    }
}
