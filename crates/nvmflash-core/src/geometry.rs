//! Address to page/bank translation
//!
//! Pure integer arithmetic turning a caller's byte range into physical page
//! indices, and splitting a range at the bank 2 boundary on dual-bank
//! devices.

use crate::region::Bank;

/// A caller-supplied byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    /// Start address
    pub addr: u32,
    /// Length in bytes
    pub size: u32,
}

impl ByteRange {
    /// Create a new range
    pub const fn new(addr: u32, size: u32) -> Self {
        Self { addr, size }
    }

    /// Exclusive end address
    pub const fn end(&self) -> u64 {
        self.addr as u64 + self.size as u64
    }

    /// Check if this range is empty
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.addr as u64) < other.end()
            && (other.addr as u64) < self.end()
    }
}

/// Bank-local run of pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// First page, counted from the bank start
    pub start_page: u32,
    /// Number of pages
    pub page_count: u32,
}

/// A request split across the two banks of a dual-bank device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankAllocation {
    /// Portion inside bank 1 (empty if untouched)
    pub bank1: ByteRange,
    /// Portion inside bank 2 (empty if untouched)
    pub bank2: ByteRange,
}

impl BankAllocation {
    /// Sub-range for `bank`
    pub fn get(&self, bank: Bank) -> ByteRange {
        match bank {
            Bank::Bank1 => self.bank1,
            Bank::Bank2 => self.bank2,
        }
    }

    /// Non-empty sub-ranges in bank order
    pub fn iter(&self) -> impl Iterator<Item = (Bank, ByteRange)> {
        [(Bank::Bank1, self.bank1), (Bank::Bank2, self.bank2)]
            .into_iter()
            .filter(|(_, range)| !range.is_empty())
    }
}

/// Number of pages touched by `size` bytes starting at `addr`
///
/// A page counts as soon as a single byte of it is in the range. `size` must
/// be at least 1, and `addr + size - 1` must not overflow.
pub const fn count_pages(addr: u32, size: u32, page_size: u32) -> u32 {
    debug_assert!(size > 0);
    let start = addr / page_size;
    let end = (addr + (size - 1)) / page_size;
    end - start + 1
}

/// Page index of `addr` relative to `bank_base`
pub const fn start_page(addr: u32, bank_base: u32, page_size: u32) -> u32 {
    debug_assert!(addr >= bank_base);
    (addr - bank_base) / page_size
}

/// Bank-local page span of `range`
pub const fn page_span(range: ByteRange, bank_base: u32, page_size: u32) -> PageSpan {
    PageSpan {
        start_page: start_page(range.addr, bank_base, page_size),
        page_count: count_pages(range.addr - bank_base, range.size, page_size),
    }
}

/// Split `range` at `bank2_start`
///
/// Everything below `bank2_start` goes to bank 1, the rest to bank 2. The two
/// parts never overlap and their sizes add up to `range.size`.
pub fn partition(range: ByteRange, bank2_start: u32) -> BankAllocation {
    if range.addr >= bank2_start {
        return BankAllocation {
            bank1: ByteRange::new(range.addr, 0),
            bank2: range,
        };
    }

    let bank1_size = range.size.min(bank2_start - range.addr);
    let bank2_size = range.size - bank1_size;
    BankAllocation {
        bank1: ByteRange::new(range.addr, bank1_size),
        bank2: ByteRange::new(bank2_start, bank2_size),
    }
}
