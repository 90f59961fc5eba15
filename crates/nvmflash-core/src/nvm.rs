//! NVM access handle
//!
//! [`Nvm`] is the public entry point: it owns the controller driver, the
//! region descriptor and the readiness state, checks every request against
//! the region before any primitive runs, and routes erases through the
//! planner.

use crate::controller::FlashController;
use crate::error::{Error, Result};
use crate::geometry::ByteRange;
use crate::plan;
use crate::region::FlashRegion;

/// The erased value for flash memory (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Width of one read stride
const READ_STRIDE: u32 = 4;

/// Whether the controller has been unlocked by [`Nvm::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    /// Controller locked, program/erase/read refused
    #[default]
    Uninitialized,
    /// Controller unlocked
    Ready,
}

/// Handle over one flash region
///
/// # Example
///
/// ```ignore
/// use nvmflash_core::{devices, Nvm};
///
/// let mut nvm = Nvm::new(driver, devices::STM32G474XE_DUAL)?;
/// nvm.init()?;
/// nvm.erase(0x0807_F800, 0x800)?;
/// nvm.write(0x0807_F800, &record)?;
/// ```
#[derive(Debug)]
pub struct Nvm<C: FlashController> {
    controller: C,
    region: FlashRegion,
    state: Readiness,
}

impl<C: FlashController> Nvm<C> {
    /// Create a handle for `region`, driven by `controller`
    ///
    /// The region is validated here; the controller is not touched until
    /// [`init`](Self::init).
    pub fn new(controller: C, region: FlashRegion) -> Result<Self> {
        region.validate()?;
        Ok(Self {
            controller,
            region,
            state: Readiness::Uninitialized,
        })
    }

    /// Unlock the controller
    ///
    /// Does nothing if already initialized. Otherwise waits for the
    /// controller to go idle and unlocks it; readiness only changes if the
    /// unlock succeeds.
    pub fn init(&mut self) -> Result<()> {
        if self.state == Readiness::Ready {
            return Ok(());
        }

        while self.controller.is_busy() {
            core::hint::spin_loop();
        }

        self.controller.unlock().map_err(|e| {
            log::error!("flash unlock failed: {}", e);
            Error::Controller(e)
        })?;

        self.state = Readiness::Ready;
        log::debug!("flash unlocked");
        Ok(())
    }

    /// Lock the controller again
    ///
    /// Does nothing if not initialized. On failure the handle stays ready.
    pub fn deinit(&mut self) -> Result<()> {
        if self.state == Readiness::Uninitialized {
            return Ok(());
        }

        self.controller.lock().map_err(|e| {
            log::error!("flash lock failed: {}", e);
            Error::Controller(e)
        })?;

        self.state = Readiness::Uninitialized;
        log::debug!("flash locked");
        Ok(())
    }

    /// Whether [`init`](Self::init) has succeeded and not been undone
    pub fn is_init(&self) -> bool {
        self.state == Readiness::Ready
    }

    /// Current readiness state
    pub fn readiness(&self) -> Readiness {
        self.state
    }

    /// The region this handle manages
    pub fn region(&self) -> &FlashRegion {
        &self.region
    }

    /// Shared access to the controller driver
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Exclusive access to the controller driver
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Give the controller back, without locking it
    pub fn release(self) -> C {
        self.controller
    }

    /// Program `data` at `addr`
    ///
    /// The target must be erased. `addr` and `data.len()` must be multiples
    /// of the program width. Programming stops at the first failing unit;
    /// units already written stay written.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_ready()?;
        if data.is_empty() {
            return Err(precondition(Error::EmptyBuffer, "write", addr, 0));
        }
        let size = u32::try_from(data.len())
            .map_err(|_| precondition(Error::AddressOutOfBounds, "write", addr, u32::MAX))?;
        self.check_range("write", addr, size)?;

        let width = self.region.program_width;
        let unit_len = width.bytes();
        if addr % unit_len != 0 || size % unit_len != 0 {
            return Err(precondition(Error::InvalidAlignment, "write", addr, size));
        }

        for (index, chunk) in data.chunks_exact(unit_len as usize).enumerate() {
            let unit_addr = addr + index as u32 * unit_len;
            let unit = width
                .unit_from_le_bytes(chunk)
                .ok_or(Error::InvalidAlignment)?;

            log::trace!("program 0x{:08X} <- {:?}", unit_addr, unit);
            if let Err(e) = self.controller.program_unit(unit_addr, unit) {
                log::error!("program failed at 0x{:08X}: {}", unit_addr, e);
                return Err(Error::Controller(e));
            }
        }

        Ok(())
    }

    /// Read `size` bytes at `addr` into the start of `buf`
    ///
    /// This is a memory copy from the mapped array and only fails on a
    /// precondition violation.
    pub fn read(&self, addr: u32, size: u32, buf: &mut [u8]) -> Result<()> {
        self.check_ready()?;
        if size == 0 {
            return Err(precondition(Error::InvalidSize, "read", addr, size));
        }
        if buf.len() < size as usize {
            return Err(precondition(Error::BufferTooSmall, "read", addr, size));
        }
        self.check_range("read", addr, size)?;

        let out = &mut buf[..size as usize];
        let mut words = out.chunks_exact_mut(READ_STRIDE as usize);
        let mut offset = 0u32;
        for word in &mut words {
            word.copy_from_slice(&self.controller.read_word(addr + offset).to_le_bytes());
            offset += READ_STRIDE;
        }
        for byte in words.into_remainder() {
            *byte = self.controller.read_byte(addr + offset);
            offset += 1;
        }

        Ok(())
    }

    /// Erase every page touched by `size` bytes at `addr`
    ///
    /// No alignment is required; the erase rounds outward to page
    /// boundaries, so bytes before and after the range that share a page
    /// with it are erased too.
    pub fn erase(&mut self, addr: u32, size: u32) -> Result<()> {
        self.check_ready()?;
        if size == 0 {
            return Err(precondition(Error::InvalidSize, "erase", addr, size));
        }
        self.check_range("erase", addr, size)?;

        let plan = plan::plan_erase(&self.region, ByteRange::new(addr, size))?;
        plan::execute_plan(&mut self.controller, &plan)
    }

    /// Read back `expected.len()` bytes at `addr` and compare
    pub fn verify(&self, addr: u32, expected: &[u8]) -> Result<()> {
        self.check_ready()?;
        if expected.is_empty() {
            return Err(precondition(Error::EmptyBuffer, "verify", addr, 0));
        }
        let size = u32::try_from(expected.len())
            .map_err(|_| precondition(Error::AddressOutOfBounds, "verify", addr, u32::MAX))?;
        self.check_range("verify", addr, size)?;

        for (offset, &want) in expected.iter().enumerate() {
            let at = addr + offset as u32;
            if self.controller.read_byte(at) != want {
                log::warn!("verify mismatch at 0x{:08X}", at);
                return Err(Error::VerifyMismatch { addr: at });
            }
        }
        Ok(())
    }

    /// Check whether every byte of the range reads as erased
    pub fn is_erased(&self, addr: u32, size: u32) -> Result<bool> {
        self.check_ready()?;
        if size == 0 {
            return Err(precondition(Error::InvalidSize, "blank check", addr, size));
        }
        self.check_range("blank check", addr, size)?;

        Ok((0..size).all(|offset| self.controller.read_byte(addr + offset) == ERASED_VALUE))
    }

    fn check_ready(&self) -> Result<()> {
        if self.state != Readiness::Ready {
            log::warn!("flash access before init");
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn check_range(&self, op: &str, addr: u32, size: u32) -> Result<()> {
        if !self.region.contains_range(addr, size) {
            return Err(precondition(Error::AddressOutOfBounds, op, addr, size));
        }
        Ok(())
    }
}

fn precondition(error: Error, op: &str, addr: u32, size: u32) -> Error {
    log::warn!("{} 0x{:08X}+0x{:X} rejected: {}", op, addr, size, error);
    error
}
