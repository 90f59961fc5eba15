//! Erase planning
//!
//! Turns a byte range into the page-range or mass-erase commands the flash
//! controller understands, then dispatches them.
//!
//! Single-bank devices always get one page-range command. On dual-bank
//! devices the range is split at the bank 2 boundary and each touched bank
//! gets its own command; a bank that is covered completely is mass-erased
//! instead of erased page by page.

use heapless::Vec;

use crate::controller::FlashController;
use crate::error::{Error, Result};
use crate::geometry::{self, ByteRange, PageSpan};
use crate::region::{Bank, BankLayout, FlashRegion};

/// Maximum number of commands a single erase request can produce
pub const MAX_ERASE_COMMANDS: usize = 2;

/// One command for the controller's erase primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseCommand {
    /// Erase `page_count` pages of `bank`, starting at bank-local `start_page`
    PageRange {
        /// Target bank
        bank: Bank,
        /// First page, bank-local
        start_page: u32,
        /// Number of pages
        page_count: u32,
    },
    /// Erase the whole bank
    MassErase(Bank),
}

impl EraseCommand {
    /// Bank this command operates on
    pub fn bank(&self) -> Bank {
        match *self {
            Self::PageRange { bank, .. } => bank,
            Self::MassErase(bank) => bank,
        }
    }
}

/// Commands for one erase request, in dispatch order
pub type ErasePlan = Vec<EraseCommand, MAX_ERASE_COMMANDS>;

/// Plan the erase of `range` inside `region`
///
/// The range must be non-empty and inside the region. Pages touched by even
/// one byte of the range are included.
pub fn plan_erase(region: &FlashRegion, range: ByteRange) -> Result<ErasePlan> {
    if range.is_empty() {
        return Err(Error::InvalidSize);
    }
    if !region.contains_range(range.addr, range.size) {
        return Err(Error::AddressOutOfBounds);
    }

    let plan = match region.banks {
        BankLayout::Single { start } => plan_single_bank(region, start, range)?,
        BankLayout::Dual {
            bank1_start,
            bank2_start,
        } => plan_dual_bank(region, bank1_start, bank2_start, range)?,
    };

    log::debug!(
        "erase 0x{:08X}+0x{:X}: {:?}",
        range.addr,
        range.size,
        plan.as_slice()
    );
    Ok(plan)
}

fn plan_single_bank(region: &FlashRegion, bank_start: u32, range: ByteRange) -> Result<ErasePlan> {
    let span = checked_span(region, Bank::Bank1, bank_start, range)?;

    let mut plan = ErasePlan::new();
    push(
        &mut plan,
        EraseCommand::PageRange {
            bank: Bank::Bank1,
            start_page: span.start_page,
            page_count: span.page_count,
        },
    );
    Ok(plan)
}

fn plan_dual_bank(
    region: &FlashRegion,
    bank1_start: u32,
    bank2_start: u32,
    range: ByteRange,
) -> Result<ErasePlan> {
    let allocation = geometry::partition(range, bank2_start);

    let mut plan = ErasePlan::new();
    for (bank, sub_range) in allocation.iter() {
        let bank_start = match bank {
            Bank::Bank1 => bank1_start,
            Bank::Bank2 => bank2_start,
        };
        let span = checked_span(region, bank, bank_start, sub_range)?;

        let command = if span.page_count == region.pages_per_bank {
            EraseCommand::MassErase(bank)
        } else {
            EraseCommand::PageRange {
                bank,
                start_page: span.start_page,
                page_count: span.page_count,
            }
        };
        push(&mut plan, command);
    }
    Ok(plan)
}

/// Bank-local span of `range`, refusing spans that run past the bank
fn checked_span(
    region: &FlashRegion,
    bank: Bank,
    bank_start: u32,
    range: ByteRange,
) -> Result<PageSpan> {
    if range.addr < bank_start {
        return Err(Error::AddressOutOfBounds);
    }
    let span = geometry::page_span(range, bank_start, region.page_size);
    let last_page = span.start_page as u64 + span.page_count as u64;

    debug_assert!(
        last_page <= region.pages_per_bank as u64,
        "{} pages starting at {} exceed {}",
        span.page_count,
        span.start_page,
        bank
    );
    if last_page > region.pages_per_bank as u64 {
        log::error!(
            "erase span of {} pages at page {} does not fit in {} ({} pages)",
            span.page_count,
            span.start_page,
            bank,
            region.pages_per_bank
        );
        return Err(Error::GeometryViolation {
            bank,
            page_count: span.page_count,
        });
    }
    Ok(span)
}

fn push(plan: &mut ErasePlan, command: EraseCommand) {
    // One command per bank, and there are at most two banks
    let pushed = plan.push(command);
    debug_assert!(pushed.is_ok());
}

/// Dispatch every command in `plan`
///
/// All commands are attempted even if an earlier one fails. The first
/// failure is returned, so a failed call may still have erased part of the
/// range.
pub fn execute_plan<C: FlashController + ?Sized>(
    controller: &mut C,
    plan: &ErasePlan,
) -> Result<()> {
    let mut first_error = None;

    for command in plan {
        let result = match *command {
            EraseCommand::PageRange {
                bank,
                start_page,
                page_count,
            } => controller.erase_pages(bank, start_page, page_count),
            EraseCommand::MassErase(bank) => controller.mass_erase(bank),
        };

        if let Err(e) = result {
            log::error!("{:?} failed: {}", command, e);
            first_error.get_or_insert(Error::Controller(e));
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
