//! Error types for nvmflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate. With the `std` feature the type also implements
//! `std::error::Error` through `thiserror`.

use core::fmt;

#[cfg(feature = "std")]
use thiserror::Error as ThisError;

use crate::region::Bank;

/// Failure reported by the low-level flash controller driver
///
/// These are passed through verbatim; nothing in this crate retries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// Controller did not leave the busy state
    Busy,
    /// Controller is locked (program/erase attempted before unlock)
    Locked,
    /// Target area is write protected
    WriteProtected,
    /// Address or width rejected by the controller
    Alignment,
    /// Programming target was not in the erased state
    NotErased,
    /// ECC fault detected by the controller
    Ecc,
    /// Generic command failure
    Failure,
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "controller busy"),
            Self::Locked => write!(f, "controller locked"),
            Self::WriteProtected => write!(f, "write protected"),
            Self::Alignment => write!(f, "alignment rejected by controller"),
            Self::NotErased => write!(f, "programming target not erased"),
            Self::Ecc => write!(f, "ECC fault"),
            Self::Failure => write!(f, "controller command failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ControllerError {}

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller broke a precondition (not initialized, out of range, bad
    /// alignment, bad buffer, bad configuration)
    Precondition,
    /// The controller reported a failure or the device content is wrong
    Controller,
    /// A computed page span does not fit in its bank
    Geometry,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(ThisError))]
pub enum Error {
    // Precondition errors
    /// Operation requires `init()` first
    #[cfg_attr(feature = "std", error("flash not initialized"))]
    NotInitialized,
    /// Range falls outside the configured region
    #[cfg_attr(feature = "std", error("address out of bounds"))]
    AddressOutOfBounds,
    /// Address or length is not a multiple of the program width
    #[cfg_attr(feature = "std", error("invalid alignment"))]
    InvalidAlignment,
    /// Zero-length request
    #[cfg_attr(feature = "std", error("invalid size"))]
    InvalidSize,
    /// Data buffer is empty
    #[cfg_attr(feature = "std", error("empty buffer"))]
    EmptyBuffer,
    /// Provided buffer is too small for the operation
    #[cfg_attr(feature = "std", error("buffer too small"))]
    BufferTooSmall,
    /// Region descriptor failed validation
    #[cfg_attr(feature = "std", error("invalid flash configuration: {0}"))]
    InvalidConfig(&'static str),

    // Geometry errors
    /// Planned page count exceeds the pages physically present in a bank
    #[cfg_attr(
        feature = "std",
        error("{page_count} pages do not fit in {bank}")
    )]
    GeometryViolation {
        /// Bank the span was computed for
        bank: Bank,
        /// Offending page count
        page_count: u32,
    },

    // Controller errors
    /// Read-back did not match the expected data
    #[cfg_attr(feature = "std", error("verify failed at 0x{addr:08X}"))]
    VerifyMismatch {
        /// Address of the first differing byte
        addr: u32,
    },
    /// Failure reported by the flash controller driver
    #[cfg_attr(feature = "std", error("controller error: {0}"))]
    Controller(ControllerError),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized
            | Self::AddressOutOfBounds
            | Self::InvalidAlignment
            | Self::InvalidSize
            | Self::EmptyBuffer
            | Self::BufferTooSmall
            | Self::InvalidConfig(_) => ErrorKind::Precondition,
            Self::GeometryViolation { .. } => ErrorKind::Geometry,
            Self::VerifyMismatch { .. } | Self::Controller(_) => ErrorKind::Controller,
        }
    }

    /// Whether this error is a caller precondition violation
    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }
}

impl From<ControllerError> for Error {
    fn from(e: ControllerError) -> Self {
        Error::Controller(e)
    }
}

#[cfg(not(feature = "std"))]
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "flash not initialized"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::InvalidSize => write!(f, "invalid size"),
            Self::EmptyBuffer => write!(f, "empty buffer"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidConfig(msg) => write!(f, "invalid flash configuration: {}", msg),
            Self::GeometryViolation { bank, page_count } => {
                write!(f, "{} pages do not fit in {}", page_count, bank)
            }
            Self::VerifyMismatch { addr } => write!(f, "verify failed at 0x{:08X}", addr),
            Self::Controller(e) => write!(f, "controller error: {}", e),
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
