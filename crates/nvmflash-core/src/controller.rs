//! Flash controller driver trait
//!
//! The page/bank logic in this crate never touches registers itself. It
//! drives a [`FlashController`], which a hardware driver implements with
//! real register accesses and the simulator implements with an in-memory
//! array.

use crate::error::ControllerError;
use crate::region::{Bank, ProgramUnit};

/// Result of a single controller primitive
pub type ControllerResult<T> = core::result::Result<T, ControllerError>;

/// Low-level flash controller primitives
///
/// Implementations serialize their own register accesses. All methods block
/// until the hardware has finished or reported a failure.
///
/// ## Example: register-backed driver
///
/// ```ignore
/// impl FlashController for Stm32Flash {
///     fn is_busy(&self) -> bool {
///         self.regs.sr.read().bsy().bit_is_set()
///     }
///
///     fn read_byte(&self, addr: u32) -> u8 {
///         unsafe { core::ptr::read_volatile(addr as *const u8) }
///     }
///     // ...
/// }
/// ```
pub trait FlashController {
    /// Whether the controller is still executing a previous command
    fn is_busy(&self) -> bool;

    /// Unlock the controller for program and erase
    fn unlock(&mut self) -> ControllerResult<()>;

    /// Lock the controller again
    fn lock(&mut self) -> ControllerResult<()>;

    /// Program exactly one unit at `addr`
    ///
    /// `addr` is aligned to the unit width.
    fn program_unit(&mut self, addr: u32, unit: ProgramUnit) -> ControllerResult<()>;

    /// Erase `page_count` pages of `bank` starting at bank-local page
    /// `start_page`
    fn erase_pages(&mut self, bank: Bank, start_page: u32, page_count: u32)
        -> ControllerResult<()>;

    /// Erase a whole bank in one command
    fn mass_erase(&mut self, bank: Bank) -> ControllerResult<()>;

    /// Load one 32-bit word from the memory-mapped array
    ///
    /// This is a plain (volatile) memory access and cannot fail. `addr` is
    /// not necessarily word aligned; bytes are in little-endian order.
    fn read_word(&self, addr: u32) -> u32;

    /// Load one byte from the memory-mapped array
    fn read_byte(&self, addr: u32) -> u8;
}

impl<C: FlashController + ?Sized> FlashController for &mut C {
    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn unlock(&mut self) -> ControllerResult<()> {
        (**self).unlock()
    }

    fn lock(&mut self) -> ControllerResult<()> {
        (**self).lock()
    }

    fn program_unit(&mut self, addr: u32, unit: ProgramUnit) -> ControllerResult<()> {
        (**self).program_unit(addr, unit)
    }

    fn erase_pages(
        &mut self,
        bank: Bank,
        start_page: u32,
        page_count: u32,
    ) -> ControllerResult<()> {
        (**self).erase_pages(bank, start_page, page_count)
    }

    fn mass_erase(&mut self, bank: Bank) -> ControllerResult<()> {
        (**self).mass_erase(bank)
    }

    fn read_word(&self, addr: u32) -> u32 {
        (**self).read_word(addr)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }
}

// Blanket impl for boxed controllers to allow trait objects
#[cfg(feature = "alloc")]
impl FlashController for alloc::boxed::Box<dyn FlashController + Send> {
    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn unlock(&mut self) -> ControllerResult<()> {
        (**self).unlock()
    }

    fn lock(&mut self) -> ControllerResult<()> {
        (**self).lock()
    }

    fn program_unit(&mut self, addr: u32, unit: ProgramUnit) -> ControllerResult<()> {
        (**self).program_unit(addr, unit)
    }

    fn erase_pages(
        &mut self,
        bank: Bank,
        start_page: u32,
        page_count: u32,
    ) -> ControllerResult<()> {
        (**self).erase_pages(bank, start_page, page_count)
    }

    fn mass_erase(&mut self, bank: Bank) -> ControllerResult<()> {
        (**self).mass_erase(bank)
    }

    fn read_word(&self, addr: u32) -> u32 {
        (**self).read_word(addr)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }
}
