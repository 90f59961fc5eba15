//! nvmflash-core - Page/bank-aware access to on-chip flash
//!
//! This crate provides read, write and erase over a byte-addressable flash
//! region while respecting the physical constraints of the array:
//! page-granular erase, fixed-width program units and bank boundaries. It
//! is designed to be `no_std` compatible for use in firmware.
//!
//! The register-level work is delegated to a [`FlashController`]
//! implementation; this crate does the boundary arithmetic and erase
//! planning on top of it, including splitting erases across the two banks
//! of dual-bank devices and mass-erasing banks that are covered completely.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`, RON config
//!   loading and `std::error::Error` impls)
//! - `alloc` - Enable boxed controller trait objects
//!
//! # Example
//!
//! ```ignore
//! use nvmflash_core::{devices, Nvm};
//!
//! fn store<C: FlashController>(driver: C, record: &[u8]) -> nvmflash_core::Result<()> {
//!     let region = devices::STM32G474XE_DUAL.with_window(0x0807_F000, 0x1000);
//!     let mut nvm = Nvm::new(driver, region)?;
//!     nvm.init()?;
//!     nvm.erase(region.base, region.size)?;
//!     nvm.write(region.base, record)?;
//!     nvm.deinit()
//! }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
pub mod config;
pub mod controller;
pub mod devices;
pub mod error;
pub mod geometry;
pub mod nvm;
pub mod plan;
pub mod region;

pub use controller::FlashController;
pub use error::{ControllerError, Error, ErrorKind, Result};
pub use geometry::{ByteRange, PageSpan};
pub use nvm::{Nvm, Readiness};
pub use plan::EraseCommand;
pub use region::{Bank, BankLayout, FlashRegion, ProgramUnit, ProgramWidth};
