//! Region descriptions in RON
//!
//! Host-side tools and tests can describe a flash region in a RON file
//! instead of code. A description either starts from a built-in device
//! preset or spells out the geometry, and may narrow the accessible area
//! with a window:
//!
//! ```ron
//! (
//!     device: Some("STM32G474xE"),
//!     window: Some((base: 0x0807F000, size: KiB(4))),
//! )
//! ```
//!
//! ```ron
//! (
//!     page_size: Some(KiB(2)),
//!     pages_per_bank: Some(128),
//!     program_width: Some(DoubleWord),
//!     banks: Some(Dual(bank1_start: 0x08000000, bank2_start: 0x08040000)),
//! )
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::string::String;

use thiserror::Error as ThisError;

use crate::devices;
use crate::error::Error;
use crate::region::{BankLayout, FlashRegion, ProgramWidth};

/// Error type for region configuration loading
#[derive(Debug, ThisError)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// `device` names no known preset
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    /// A geometry field is required when no device preset is given
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// The resulting region failed validation
    #[error("invalid region: {0}")]
    Invalid(#[from] Error),
}

/// Size specification with human-readable units (for RON parsing)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
    /// Size in mebibytes (1024 * 1024 bytes)
    MiB(u32),
}

impl Size {
    /// Convert to bytes, or `None` if the size does not fit in 32 bits
    pub fn to_bytes(self) -> Option<u32> {
        match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
            Size::MiB(n) => n.checked_mul(1024 * 1024),
        }
    }
}

fn overflow(what: &'static str) -> ConfigError {
    ConfigError::Invalid(Error::InvalidConfig(what))
}

#[derive(Debug, serde::Deserialize)]
struct WindowDef {
    base: u32,
    size: Size,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RegionDef {
    device: Option<String>,
    page_size: Option<Size>,
    pages_per_bank: Option<u32>,
    program_width: Option<ProgramWidth>,
    banks: Option<BankLayout>,
    window: Option<WindowDef>,
}

impl RegionDef {
    fn into_region(self) -> Result<FlashRegion, ConfigError> {
        let mut region = match &self.device {
            Some(name) => {
                devices::find(name).ok_or_else(|| ConfigError::UnknownDevice(name.clone()))?
            }
            None => {
                let page_size = self
                    .page_size
                    .ok_or(ConfigError::MissingField("page_size"))?
                    .to_bytes()
                    .ok_or_else(|| overflow("page size overflows 32 bits"))?;
                let pages_per_bank = self
                    .pages_per_bank
                    .ok_or(ConfigError::MissingField("pages_per_bank"))?;
                let banks = self.banks.ok_or(ConfigError::MissingField("banks"))?;
                let width = self.program_width.unwrap_or_default();
                let bank_size = page_size
                    .checked_mul(pages_per_bank)
                    .ok_or_else(|| overflow("bank size overflows 32 bits"))?;
                match banks {
                    BankLayout::Single { start } => {
                        FlashRegion::single_bank(start, page_size, pages_per_bank, width)
                    }
                    BankLayout::Dual {
                        bank1_start,
                        bank2_start,
                    } => {
                        if bank2_start <= bank1_start {
                            // dual_bank() would underflow computing the size
                            return Err(
                                Error::InvalidConfig("bank 2 must start after bank 1").into()
                            );
                        }
                        (bank2_start - bank1_start)
                            .checked_add(bank_size)
                            .ok_or_else(|| overflow("dual-bank region overflows 32 bits"))?;
                        FlashRegion::dual_bank(
                            bank1_start,
                            bank2_start,
                            page_size,
                            pages_per_bank,
                            width,
                        )
                    }
                }
            }
        };

        // Explicit geometry fields override a preset
        if self.device.is_some() {
            if let Some(width) = self.program_width {
                region.program_width = width;
            }
        }

        if let Some(window) = self.window {
            let size = window
                .size
                .to_bytes()
                .ok_or_else(|| overflow("window size overflows 32 bits"))?;
            region = region.with_window(window.base, size);
        }

        region.validate()?;
        Ok(region)
    }
}

/// Parse a region description from a RON string
pub fn load_region_ron(content: &str) -> Result<FlashRegion, ConfigError> {
    let def: RegionDef = ron::from_str(content)?;
    let region = def.into_region()?;
    log::debug!(
        "loaded region 0x{:08X}+0x{:X} ({} banks)",
        region.base,
        region.size,
        if region.is_dual_bank() { 2 } else { 1 }
    );
    Ok(region)
}

/// Load a region description from a RON file
pub fn load_region_file(path: &Path) -> Result<FlashRegion, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_region_ron(&content)
}
