//! Error types for hvprog-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// The write-class operation that was waiting for the target to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Whole-chip erase
    ChipErase,
    /// Flash page program
    FlashPage {
        /// Byte address of the page base
        addr: u32,
    },
    /// EEPROM byte program
    EepromByte {
        /// Byte address within EEPROM
        addr: u16,
    },
    /// Fuse byte program
    Fuse,
    /// Lock bits program
    LockBits,
}

/// Ordering rule that a caller broke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    /// Operation issued before `enter_programming_mode()`
    NotInProgrammingMode,
    /// `enter_programming_mode()` called twice without an exit
    AlreadyInProgrammingMode,
    /// Commit requested while no page is buffered
    NothingBuffered,
    /// Chip-specific operation issued before the target was identified
    ChipNotDetected,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Signature not found in the chip catalog
    UnsupportedChip {
        /// The signature bytes read from the target
        signature: [u8; 3],
    },
    /// Ready line or completion condition never observed within the budget
    HardwareTimeout(Operation),
    /// Operation invoked out of order
    SequenceViolation(Sequence),
    /// Byte read back does not match what was written
    VerifyMismatch {
        /// Address of the first differing byte
        addr: u32,
        /// Value that should have been there
        expected: u8,
        /// Value that was read back
        found: u8,
    },
    /// Address lies beyond the target memory
    AddressOutOfBounds,
    /// Page size is zero, not a power of two, or larger than supported
    InvalidPageSize,
}

impl Error {
    /// Whether the caller may retry the failed page/byte and continue the session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HardwareTimeout(_) | Self::VerifyMismatch { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipErase => write!(f, "chip erase"),
            Self::FlashPage { addr } => write!(f, "flash page write at 0x{:05X}", addr),
            Self::EepromByte { addr } => write!(f, "EEPROM write at 0x{:04X}", addr),
            Self::Fuse => write!(f, "fuse write"),
            Self::LockBits => write!(f, "lock bits write"),
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInProgrammingMode => write!(f, "target is not in programming mode"),
            Self::AlreadyInProgrammingMode => write!(f, "target is already in programming mode"),
            Self::NothingBuffered => write!(f, "no page is buffered"),
            Self::ChipNotDetected => write!(f, "target chip has not been identified"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedChip { signature } => write!(
                f,
                "unsupported chip: signature {:02X} {:02X} {:02X}",
                signature[0], signature[1], signature[2]
            ),
            Self::HardwareTimeout(op) => write!(f, "{} timed out", op),
            Self::SequenceViolation(seq) => write!(f, "sequence violation: {}", seq),
            Self::VerifyMismatch {
                addr,
                expected,
                found,
            } => write!(
                f,
                "verify failed at 0x{:05X}: expected 0x{:02X}, found 0x{:02X}",
                addr, expected, found
            ),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidPageSize => write!(f, "invalid page size"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
