//! Programmer trait definitions

use core::fmt;

use crate::chip::{Fuse, FuseSet};
use crate::error::Result;

/// Electrical protocol spoken to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// High-voltage parallel programming (HVPP)
    Parallel,
    /// High-voltage serial programming (HVSP)
    Serial,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Parallel => write!(f, "high-voltage parallel"),
            Protocol::Serial => write!(f, "high-voltage serial"),
        }
    }
}

/// How the driver waits for a write-class command to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Poll the ready line (parallel) or SDO (serial) with a bounded timeout
    #[default]
    Poll,
    /// Wait the datasheet maximum unconditionally, never polling
    Timed,
}

/// High-voltage programmer trait
///
/// This trait represents a programmer that can drive a target through one
/// of the high-voltage protocols. Every operation blocks until the target
/// has finished or the timeout budget is spent; nothing is retried
/// internally.
///
/// All operations other than `enter_programming_mode()` require the target
/// to be in programming mode and fail with
/// [`Sequence::NotInProgrammingMode`](crate::error::Sequence::NotInProgrammingMode)
/// otherwise. `exit_programming_mode()` must run on every path once the
/// mode has been entered; [`Session`](crate::flash::Session) takes care of
/// that.
pub trait HvProgrammer {
    /// The protocol this programmer speaks
    fn protocol(&self) -> Protocol;

    /// Power the target and raise /RESET to 12V, leaving control lines idle
    fn enter_programming_mode(&mut self) -> Result<()>;

    /// Drop control lines and /RESET to a safe low state and power down
    ///
    /// Calling this outside programming mode is harmless.
    fn exit_programming_mode(&mut self);

    /// Whether the target is currently in programming mode
    fn is_programming(&self) -> bool;

    /// Select how write completion is detected for the identified chip
    fn set_completion(&mut self, completion: Completion);

    /// Read the three signature bytes
    fn read_signature(&mut self) -> Result<[u8; 3]>;

    /// Read fuse, lock and calibration bytes
    fn read_fuses(&mut self) -> Result<FuseSet>;

    /// Erase flash and EEPROM and clear the lock bits
    fn chip_erase(&mut self) -> Result<()>;

    /// Program one flash page
    ///
    /// `page_base` must be page aligned and `data` exactly one page long.
    fn write_flash_page(&mut self, page_base: u32, data: &[u8]) -> Result<()>;

    /// Read flash contents starting at byte address `addr`
    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Program one EEPROM byte
    fn write_eeprom_byte(&mut self, addr: u16, value: u8) -> Result<()>;

    /// Read one EEPROM byte
    fn read_eeprom_byte(&mut self, addr: u16) -> Result<u8>;

    /// Program a fuse byte
    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()>;

    /// Program the lock bits
    fn write_lock_bits(&mut self, value: u8) -> Result<()>;
}
