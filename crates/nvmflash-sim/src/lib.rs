//! nvmflash-sim - In-memory flash controller for testing
//!
//! This crate provides a simulated on-chip flash controller that keeps the
//! array in memory. It follows the rules of real NOR flash closely enough to
//! catch planning mistakes: programming needs an unlocked controller and an
//! erased, aligned target, erases work on whole pages or whole banks, and
//! every primitive call is recorded. Failures can be injected per
//! primitive.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;
use core::cell::Cell;

use bitflags::bitflags;
use nvmflash_core::controller::{ControllerResult, FlashController};
use nvmflash_core::nvm::ERASED_VALUE;
use nvmflash_core::{Bank, BankLayout, ControllerError, FlashRegion, ProgramUnit};

bitflags! {
    /// Primitives that should report failure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Faults: u32 {
        /// `unlock` fails
        const UNLOCK      = 1 << 0;
        /// `lock` fails
        const LOCK        = 1 << 1;
        /// Every `program_unit` fails
        const PROGRAM     = 1 << 2;
        /// Page and mass erase of bank 1 fail
        const ERASE_BANK1 = 1 << 3;
        /// Page and mass erase of bank 2 fail
        const ERASE_BANK2 = 1 << 4;
        /// Every `mass_erase` fails
        const MASS_ERASE  = 1 << 5;
    }
}

/// A recorded primitive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    /// `unlock`
    Unlock,
    /// `lock`
    Lock,
    /// `program_unit`
    Program {
        /// Target address
        addr: u32,
        /// Value programmed
        unit: ProgramUnit,
    },
    /// `erase_pages`
    ErasePages {
        /// Target bank
        bank: Bank,
        /// First bank-local page
        start_page: u32,
        /// Number of pages
        page_count: u32,
    },
    /// `mass_erase`
    MassErase(Bank),
}

/// Simulated flash controller
///
/// The array covers every bank of `device`, starting at bank 1. The
/// controller starts locked, idle and fully erased.
#[cfg(feature = "alloc")]
pub struct SimFlash {
    device: FlashRegion,
    origin: u32,
    data: Vec<u8>,
    locked: bool,
    busy_polls: Cell<u32>,
    faults: Faults,
    ops: Vec<SimOp>,
}

#[cfg(feature = "alloc")]
impl SimFlash {
    /// Create a simulator for the flash array described by `device`
    pub fn new(device: FlashRegion) -> Self {
        let bank_size = device.bank_size() as usize;
        let (origin, len) = match device.banks {
            BankLayout::Single { start } => (start, bank_size),
            BankLayout::Dual {
                bank1_start,
                bank2_start,
            } => (bank1_start, (bank2_start - bank1_start) as usize + bank_size),
        };

        Self {
            device,
            origin,
            data: vec![ERASED_VALUE; len],
            locked: true,
            busy_polls: Cell::new(0),
            faults: Faults::empty(),
            ops: Vec::new(),
        }
    }

    /// Create a simulator with pre-filled contents starting at bank 1
    pub fn with_data(device: FlashRegion, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(device);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes at absolute address `addr`
    pub fn slice(&self, addr: u32, len: usize) -> &[u8] {
        let start = (addr - self.origin) as usize;
        &self.data[start..start + len]
    }

    /// Whether the controller is locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Report busy for the next `polls` calls to `is_busy`
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls.set(polls);
    }

    /// Remaining busy polls
    pub fn busy_polls(&self) -> u32 {
        self.busy_polls.get()
    }

    /// Replace the set of failing primitives
    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// Primitive calls recorded so far
    pub fn ops(&self) -> &[SimOp] {
        &self.ops
    }

    /// Forget recorded primitive calls
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.origin)? as usize;
        (offset < self.data.len()).then_some(offset)
    }

    fn bank_bounds(&self, bank: Bank) -> Option<(usize, usize)> {
        let start = self.device.bank_start(bank)?;
        let offset = self.offset(start)?;
        Some((offset, offset + self.device.bank_size() as usize))
    }

    fn check_erase(&self, bank: Bank) -> ControllerResult<()> {
        if self.locked {
            return Err(ControllerError::Locked);
        }
        let fault = match bank {
            Bank::Bank1 => Faults::ERASE_BANK1,
            Bank::Bank2 => Faults::ERASE_BANK2,
        };
        if self.faults.contains(fault) {
            return Err(ControllerError::WriteProtected);
        }
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl FlashController for SimFlash {
    fn is_busy(&self) -> bool {
        let polls = self.busy_polls.get();
        if polls == 0 {
            return false;
        }
        self.busy_polls.set(polls - 1);
        true
    }

    fn unlock(&mut self) -> ControllerResult<()> {
        self.ops.push(SimOp::Unlock);
        if self.faults.contains(Faults::UNLOCK) {
            return Err(ControllerError::Failure);
        }
        self.locked = false;
        Ok(())
    }

    fn lock(&mut self) -> ControllerResult<()> {
        self.ops.push(SimOp::Lock);
        if self.faults.contains(Faults::LOCK) {
            return Err(ControllerError::Failure);
        }
        self.locked = true;
        Ok(())
    }

    fn program_unit(&mut self, addr: u32, unit: ProgramUnit) -> ControllerResult<()> {
        self.ops.push(SimOp::Program { addr, unit });
        if self.locked {
            return Err(ControllerError::Locked);
        }
        if self.faults.contains(Faults::PROGRAM) {
            return Err(ControllerError::Failure);
        }

        let len = unit.width().bytes() as usize;
        if addr as usize % len != 0 {
            return Err(ControllerError::Alignment);
        }
        let start = self.offset(addr).ok_or(ControllerError::Alignment)?;
        let target = self
            .data
            .get_mut(start..start + len)
            .ok_or(ControllerError::Alignment)?;

        // The unit must be erased before it can be programmed
        if target.iter().any(|&b| b != ERASED_VALUE) {
            log::debug!("program over non-erased unit at 0x{:08X}", addr);
            return Err(ControllerError::NotErased);
        }
        target.copy_from_slice(&unit.to_le_bytes()[..len]);
        Ok(())
    }

    fn erase_pages(
        &mut self,
        bank: Bank,
        start_page: u32,
        page_count: u32,
    ) -> ControllerResult<()> {
        self.ops.push(SimOp::ErasePages {
            bank,
            start_page,
            page_count,
        });
        self.check_erase(bank)?;

        let last_page = start_page as u64 + page_count as u64;
        if page_count == 0 || last_page > self.device.pages_per_bank as u64 {
            return Err(ControllerError::Failure);
        }
        let (bank_start, _) = self.bank_bounds(bank).ok_or(ControllerError::Failure)?;
        let page_size = self.device.page_size as usize;
        let start = bank_start + start_page as usize * page_size;
        let end = start + page_count as usize * page_size;
        self.data[start..end].fill(ERASED_VALUE);
        Ok(())
    }

    fn mass_erase(&mut self, bank: Bank) -> ControllerResult<()> {
        self.ops.push(SimOp::MassErase(bank));
        self.check_erase(bank)?;
        if self.faults.contains(Faults::MASS_ERASE) {
            return Err(ControllerError::Failure);
        }

        let (start, end) = self.bank_bounds(bank).ok_or(ControllerError::Failure)?;
        self.data[start..end].fill(ERASED_VALUE);
        Ok(())
    }

    fn read_word(&self, addr: u32) -> u32 {
        let mut word = [ERASED_VALUE; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self.read_byte(addr + i as u32);
        }
        u32::from_le_bytes(word)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        match self.offset(addr) {
            Some(offset) => self.data[offset],
            None => {
                log::warn!("read outside the simulated array at 0x{:08X}", addr);
                ERASED_VALUE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvmflash_core::devices::{STM32G431XB, STM32G474XE_DUAL};
    use nvmflash_core::{Error, Nvm, ProgramWidth};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn ready(region: FlashRegion, device: FlashRegion) -> Nvm<SimFlash> {
        init_logger();
        let mut nvm = Nvm::new(SimFlash::new(device), region).unwrap();
        nvm.init().unwrap();
        nvm.controller_mut().clear_ops();
        nvm
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_init_waits_for_idle_controller() {
        init_logger();
        let mut flash = SimFlash::new(STM32G431XB);
        flash.set_busy_polls(5);
        let mut nvm = Nvm::new(flash, STM32G431XB).unwrap();

        nvm.init().unwrap();
        assert_eq!(nvm.controller().busy_polls(), 0);
        assert!(!nvm.controller().is_locked());

        nvm.init().unwrap();
        assert_eq!(nvm.controller().ops(), &[SimOp::Unlock]);
    }

    #[test]
    fn test_deinit_locks_once() {
        let mut nvm = ready(STM32G431XB, STM32G431XB);
        nvm.deinit().unwrap();
        nvm.deinit().unwrap();
        assert_eq!(nvm.controller().ops(), &[SimOp::Lock]);
        assert!(nvm.controller().is_locked());
        assert!(!nvm.is_init());
    }

    #[test]
    fn test_unlock_fault_keeps_handle_uninitialized() {
        init_logger();
        let mut flash = SimFlash::new(STM32G431XB);
        flash.set_faults(Faults::UNLOCK);
        let mut nvm = Nvm::new(flash, STM32G431XB).unwrap();
        assert!(nvm.init().is_err());
        assert!(!nvm.is_init());
        assert_eq!(nvm.erase(0x0800_0000, 1), Err(Error::NotInitialized));
    }

    #[test]
    fn test_round_trip_after_erase() {
        let mut nvm = ready(STM32G431XB, STM32G431XB);
        let data = pattern(256);
        nvm.erase(0x0800_4000, 256).unwrap();
        nvm.write(0x0800_4000, &data).unwrap();

        let mut buf = vec![0u8; 256];
        nvm.read(0x0800_4000, 256, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_round_trip_across_bank_boundary() {
        let mut nvm = ready(STM32G474XE_DUAL, STM32G474XE_DUAL);
        let data = pattern(0x1000);
        nvm.erase(0x0803_F800, 0x1000).unwrap();
        assert_eq!(
            nvm.controller().ops(),
            &[
                SimOp::ErasePages {
                    bank: Bank::Bank1,
                    start_page: 127,
                    page_count: 1
                },
                SimOp::ErasePages {
                    bank: Bank::Bank2,
                    start_page: 0,
                    page_count: 1
                },
            ]
        );

        nvm.write(0x0803_F800, &data).unwrap();
        let mut buf = vec![0u8; 0x1000];
        nvm.read(0x0803_F800, 0x1000, &mut buf).unwrap();
        assert_eq!(buf, data);
        nvm.verify(0x0803_F800, &data).unwrap();
    }

    #[test]
    fn test_rewrite_without_erase_fails() {
        let mut nvm = ready(STM32G431XB, STM32G431XB);
        nvm.write(0x0800_0000, &[0x11; 8]).unwrap();
        assert_eq!(
            nvm.write(0x0800_0000, &[0x22; 8]),
            Err(Error::Controller(ControllerError::NotErased))
        );

        nvm.erase(0x0800_0000, 8).unwrap();
        nvm.write(0x0800_0000, &[0x22; 8]).unwrap();
        assert_eq!(nvm.controller().slice(0x0800_0000, 8), &[0x22; 8]);
    }

    #[test]
    fn test_erase_keeps_neighbouring_pages() {
        let mut nvm = ready(STM32G431XB, STM32G431XB);
        nvm.write(0x0800_07F8, &[0u8; 16]).unwrap();
        nvm.write(0x0800_1000, &[0u8; 8]).unwrap();

        nvm.erase(0x0800_0800, 1).unwrap();
        assert!(nvm.is_erased(0x0800_0800, 0x800).unwrap());
        assert!(!nvm.is_erased(0x0800_07F8, 8).unwrap());
        assert!(!nvm.is_erased(0x0800_1000, 8).unwrap());
    }

    #[test]
    fn test_whole_bank_uses_mass_erase() {
        let mut nvm = ready(STM32G474XE_DUAL, STM32G474XE_DUAL);
        nvm.write(0x0804_0000, &[0u8; 8]).unwrap();
        nvm.write(0x0807_FFF8, &[0u8; 8]).unwrap();
        nvm.write(0x0800_0000, &[0u8; 8]).unwrap();
        nvm.controller_mut().clear_ops();

        nvm.erase(0x0804_0000, 0x4_0000).unwrap();
        assert_eq!(nvm.controller().ops(), &[SimOp::MassErase(Bank::Bank2)]);
        assert!(nvm.is_erased(0x0804_0000, 0x4_0000).unwrap());
        // Bank 1 untouched
        assert!(!nvm.is_erased(0x0800_0000, 8).unwrap());
    }

    #[test]
    fn test_bank1_fault_still_erases_bank2() {
        let mut nvm = ready(STM32G474XE_DUAL, STM32G474XE_DUAL);
        nvm.write(0x0803_F800, &[0u8; 8]).unwrap();
        nvm.write(0x0804_0000, &[0u8; 8]).unwrap();
        nvm.controller_mut().set_faults(Faults::ERASE_BANK1);

        let result = nvm.erase(0x0803_F800, 0x1000);
        assert_eq!(result, Err(Error::Controller(ControllerError::WriteProtected)));
        assert!(!nvm.is_erased(0x0803_F800, 8).unwrap());
        assert!(nvm.is_erased(0x0804_0000, 0x800).unwrap());
    }

    #[test]
    fn test_program_fault_stops_write() {
        let mut nvm = ready(STM32G431XB, STM32G431XB);
        nvm.controller_mut().set_faults(Faults::PROGRAM);
        assert!(nvm.write(0x0800_0000, &[0u8; 64]).is_err());
        assert_eq!(nvm.controller().ops().len(), 1);
    }

    #[test]
    fn test_window_limits_access() {
        let window = STM32G474XE_DUAL.with_window(0x0807_F000, 0x1000);
        let mut nvm = ready(window, STM32G474XE_DUAL);

        assert_eq!(nvm.erase(0x0807_E800, 0x800), Err(Error::AddressOutOfBounds));
        assert_eq!(nvm.write(0x0807_F800, &[0u8; 0x1000]), Err(Error::AddressOutOfBounds));
        assert!(nvm.controller().ops().is_empty());

        nvm.erase(0x0807_F000, 0x1000).unwrap();
        assert_eq!(
            nvm.controller().ops(),
            &[SimOp::ErasePages {
                bank: Bank::Bank2,
                start_page: 126,
                page_count: 2
            }]
        );
    }

    #[test]
    fn test_word_programming_width() {
        let mut region = STM32G431XB;
        region.program_width = ProgramWidth::Word;
        let mut nvm = ready(region, region);

        nvm.write(0x0800_0004, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            nvm.controller().ops(),
            &[SimOp::Program {
                addr: 0x0800_0004,
                unit: ProgramUnit::Word(0x0403_0201)
            }]
        );
    }

    #[test]
    fn test_boxed_controller() {
        init_logger();
        let boxed: alloc::boxed::Box<dyn FlashController + Send> =
            alloc::boxed::Box::new(SimFlash::new(STM32G431XB));
        let mut nvm = Nvm::new(boxed, STM32G431XB).unwrap();
        nvm.init().unwrap();
        nvm.erase(0x0800_0000, 0x800).unwrap();
        nvm.write(0x0800_0000, &[0x5A; 8]).unwrap();

        let mut buf = [0u8; 8];
        nvm.read(0x0800_0000, 8, &mut buf).unwrap();
        assert_eq!(buf, [0x5A; 8]);
    }

    #[test]
    fn test_direct_controller_rules() {
        let mut flash = SimFlash::new(STM32G474XE_DUAL);
        assert_eq!(
            flash.erase_pages(Bank::Bank1, 0, 1),
            Err(ControllerError::Locked)
        );
        flash.unlock().unwrap();
        assert_eq!(
            flash.erase_pages(Bank::Bank2, 127, 2),
            Err(ControllerError::Failure)
        );
        assert_eq!(
            flash.program_unit(0x0800_0004, ProgramUnit::DoubleWord(0)),
            Err(ControllerError::Alignment)
        );
        flash.set_faults(Faults::MASS_ERASE);
        assert_eq!(flash.mass_erase(Bank::Bank1), Err(ControllerError::Failure));
    }

    #[test]
    fn test_with_data_and_read_word() {
        let flash = SimFlash::with_data(STM32G431XB, &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(flash.read_word(0x0800_0000), 0x1234_5678);
        assert_eq!(flash.read_byte(0x0800_0004), ERASED_VALUE);
        assert_eq!(flash.data().len(), 128 * 1024);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_region_from_config() {
        let region = nvmflash_core::config::load_region_ron(
            r#"(device: Some("STM32L476xG"), window: Some((base: 0x0807F800, size: KiB(4))))"#,
        )
        .unwrap();
        let device = nvmflash_core::devices::STM32L476XG;
        let mut nvm = ready(region, device);

        nvm.erase(region.base, region.size).unwrap();
        assert_eq!(
            nvm.controller().ops(),
            &[
                SimOp::ErasePages {
                    bank: Bank::Bank1,
                    start_page: 255,
                    page_count: 1
                },
                SimOp::ErasePages {
                    bank: Bank::Bank2,
                    start_page: 0,
                    page_count: 1
                },
            ]
        );
    }
}
