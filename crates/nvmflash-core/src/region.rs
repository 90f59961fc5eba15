//! Flash region descriptor
//!
//! A [`FlashRegion`] describes the part of the on-chip flash this crate is
//! allowed to touch, together with the physical geometry it lives in: page
//! size, pages per bank, program unit width and where each bank starts.
//! It is configured once and never mutated.

use core::fmt;

use crate::error::{Error, Result};

/// Independently erasable flash bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Bank {
    /// First bank (the only one on single-bank devices)
    Bank1,
    /// Second bank of a dual-bank device
    Bank2,
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bank1 => write!(f, "bank 1"),
            Self::Bank2 => write!(f, "bank 2"),
        }
    }
}

/// Width of one atomically programmable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum ProgramWidth {
    /// 16-bit unit
    HalfWord,
    /// 32-bit unit
    Word,
    /// 64-bit unit
    #[default]
    DoubleWord,
}

impl ProgramWidth {
    /// Width in bytes
    pub const fn bytes(self) -> u32 {
        match self {
            Self::HalfWord => 2,
            Self::Word => 4,
            Self::DoubleWord => 8,
        }
    }

    /// Build a unit from exactly `self.bytes()` little-endian bytes
    ///
    /// Returns `None` if `bytes` has the wrong length.
    pub fn unit_from_le_bytes(self, bytes: &[u8]) -> Option<ProgramUnit> {
        match self {
            Self::HalfWord => bytes
                .try_into()
                .ok()
                .map(|b| ProgramUnit::HalfWord(u16::from_le_bytes(b))),
            Self::Word => bytes
                .try_into()
                .ok()
                .map(|b| ProgramUnit::Word(u32::from_le_bytes(b))),
            Self::DoubleWord => bytes
                .try_into()
                .ok()
                .map(|b| ProgramUnit::DoubleWord(u64::from_le_bytes(b))),
        }
    }
}

/// Value written by one program operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramUnit {
    /// 16-bit value
    HalfWord(u16),
    /// 32-bit value
    Word(u32),
    /// 64-bit value
    DoubleWord(u64),
}

impl ProgramUnit {
    /// Width of this unit
    pub const fn width(&self) -> ProgramWidth {
        match self {
            Self::HalfWord(_) => ProgramWidth::HalfWord,
            Self::Word(_) => ProgramWidth::Word,
            Self::DoubleWord(_) => ProgramWidth::DoubleWord,
        }
    }

    /// Little-endian byte image, padded to 8 bytes; only the first
    /// `width().bytes()` bytes are meaningful
    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        match *self {
            Self::HalfWord(v) => out[..2].copy_from_slice(&v.to_le_bytes()),
            Self::Word(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Self::DoubleWord(v) => out.copy_from_slice(&v.to_le_bytes()),
        }
        out
    }
}

/// How the flash array is split into independently erasable banks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum BankLayout {
    /// One bank starting at `start`
    Single {
        /// Bank start address
        start: u32,
    },
    /// Two banks
    Dual {
        /// Bank 1 start address
        bank1_start: u32,
        /// Bank 2 start address
        bank2_start: u32,
    },
}

/// Immutable description of the managed flash area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRegion {
    /// First address callers may access
    pub base: u32,
    /// Size of the accessible area in bytes
    pub size: u32,
    /// Erase page size in bytes
    pub page_size: u32,
    /// Number of pages in each bank
    pub pages_per_bank: u32,
    /// Program unit width
    pub program_width: ProgramWidth,
    /// Bank arrangement
    pub banks: BankLayout,
}

impl FlashRegion {
    /// Region covering a whole single-bank device
    pub const fn single_bank(
        start: u32,
        page_size: u32,
        page_count: u32,
        program_width: ProgramWidth,
    ) -> Self {
        Self {
            base: start,
            size: page_size * page_count,
            page_size,
            pages_per_bank: page_count,
            program_width,
            banks: BankLayout::Single { start },
        }
    }

    /// Region covering both banks of a dual-bank device
    pub const fn dual_bank(
        bank1_start: u32,
        bank2_start: u32,
        page_size: u32,
        pages_per_bank: u32,
        program_width: ProgramWidth,
    ) -> Self {
        Self {
            base: bank1_start,
            size: (bank2_start - bank1_start) + page_size * pages_per_bank,
            page_size,
            pages_per_bank,
            program_width,
            banks: BankLayout::Dual {
                bank1_start,
                bank2_start,
            },
        }
    }

    /// Restrict the accessible area to `[base, base + size)` on the same banks
    ///
    /// The result still has to pass [`validate`](Self::validate).
    pub const fn with_window(self, base: u32, size: u32) -> Self {
        Self { base, size, ..self }
    }

    /// Whether this region lives on a dual-bank device
    pub const fn is_dual_bank(&self) -> bool {
        matches!(self.banks, BankLayout::Dual { .. })
    }

    /// Size of one bank in bytes
    pub const fn bank_size(&self) -> u64 {
        self.page_size as u64 * self.pages_per_bank as u64
    }

    /// Start address of `bank`, or `None` if the device does not have it
    pub const fn bank_start(&self, bank: Bank) -> Option<u32> {
        match (self.banks, bank) {
            (BankLayout::Single { start }, Bank::Bank1) => Some(start),
            (BankLayout::Single { .. }, Bank::Bank2) => None,
            (BankLayout::Dual { bank1_start, .. }, Bank::Bank1) => Some(bank1_start),
            (BankLayout::Dual { bank2_start, .. }, Bank::Bank2) => Some(bank2_start),
        }
    }

    /// Exclusive end of the accessible area
    pub const fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Check if an address range is inside the accessible area
    pub fn contains_range(&self, addr: u32, len: u32) -> bool {
        if addr < self.base {
            return false;
        }
        let end = addr as u64 + len as u64;
        end <= self.end()
    }

    /// Check the descriptor invariants
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.pages_per_bank == 0 {
            return Err(Error::InvalidConfig("page size and page count must be non-zero"));
        }
        if self.page_size % self.program_width.bytes() != 0 {
            return Err(Error::InvalidConfig(
                "page size must be a multiple of the program width",
            ));
        }
        if self.size == 0 {
            return Err(Error::InvalidConfig("region size must be non-zero"));
        }
        if self.base % self.page_size != 0 || self.size % self.page_size != 0 {
            return Err(Error::InvalidConfig("region base and size must be page aligned"));
        }
        if self.end() > u32::MAX as u64 + 1 {
            return Err(Error::InvalidConfig("region exceeds the 32-bit address space"));
        }

        let bank_size = self.bank_size();
        if bank_size > u32::MAX as u64 {
            return Err(Error::InvalidConfig("bank size exceeds the 32-bit address space"));
        }
        for bank in [Bank::Bank1, Bank::Bank2] {
            if let Some(start) = self.bank_start(bank) {
                if start as u64 + bank_size > u32::MAX as u64 + 1 {
                    return Err(Error::InvalidConfig("bank exceeds the 32-bit address space"));
                }
            }
        }
        match self.banks {
            BankLayout::Single { start } => {
                if start % self.page_size != 0 {
                    return Err(Error::InvalidConfig("bank start must be page aligned"));
                }
                if (self.base as u64) < start as u64 || self.end() > start as u64 + bank_size {
                    return Err(Error::InvalidConfig("region lies outside the bank"));
                }
            }
            BankLayout::Dual {
                bank1_start,
                bank2_start,
            } => {
                if bank1_start % self.page_size != 0 || bank2_start % self.page_size != 0 {
                    return Err(Error::InvalidConfig("bank start must be page aligned"));
                }
                if bank2_start <= bank1_start {
                    return Err(Error::InvalidConfig("bank 2 must start after bank 1"));
                }
                let bank1_end = bank1_start as u64 + bank_size;
                let bank2_end = bank2_start as u64 + bank_size;
                if (bank2_start as u64) < bank1_end {
                    return Err(Error::InvalidConfig("banks overlap"));
                }
                if (self.base as u64) < bank1_start as u64 || self.end() > bank2_end {
                    return Err(Error::InvalidConfig("region lies outside the banks"));
                }
                // A hole between the banks is not addressable flash
                if (self.base as u64) < bank2_start as u64 && self.end() > bank1_end {
                    let hole_start = bank1_end.max(self.base as u64);
                    let hole_end = (bank2_start as u64).min(self.end());
                    if hole_start < hole_end {
                        return Err(Error::InvalidConfig("region covers the gap between banks"));
                    }
                }
            }
        }

        Ok(())
    }
}
