//! High-voltage programming command and instruction definitions

// ============================================================================
// Commands (latched with action LOAD_COMMAND / SII_LOAD_COMMAND)
// ============================================================================

/// Chip erase
pub const CMD_CHIP_ERASE: u8 = 0b1000_0000;
/// Write fuse bits
pub const CMD_WRITE_FUSE_BITS: u8 = 0b0100_0000;
/// Write lock bits
pub const CMD_WRITE_LOCK_BITS: u8 = 0b0010_0000;
/// Write flash
pub const CMD_WRITE_FLASH: u8 = 0b0001_0000;
/// Write EEPROM
pub const CMD_WRITE_EEPROM: u8 = 0b0001_0001;
/// Read signature bytes and calibration byte
pub const CMD_READ_SIGNATURE: u8 = 0b0000_1000;
/// Read fuse and lock bits
pub const CMD_READ_FUSE_BITS: u8 = 0b0000_0100;
/// Read flash
pub const CMD_READ_FLASH: u8 = 0b0000_0010;
/// Read EEPROM
pub const CMD_READ_EEPROM: u8 = 0b0000_0011;
/// No operation (ends page programming)
pub const CMD_NO_OPERATION: u8 = 0b0000_0000;

// ============================================================================
// Serial instructions (SII byte of an HVSP frame)
// ============================================================================

/// Latch the SDI byte as a command
pub const SII_LOAD_COMMAND: u8 = 0b0100_1100;
/// Latch the SDI byte as address low byte
pub const SII_LOAD_ADDRESS_LOW: u8 = 0b0000_1100;
/// Latch the SDI byte as address high byte
pub const SII_LOAD_ADDRESS_HIGH: u8 = 0b0001_1100;
/// Latch the SDI byte as data low byte
pub const SII_LOAD_LOW_BYTE: u8 = 0b0010_1100;
/// Latch the SDI byte as data high byte
pub const SII_LOAD_HIGH_BYTE: u8 = 0b0011_1100;
/// Read low byte (flash low, EEPROM, signature, low fuse)
pub const SII_READ_LOW_BYTE: u8 = 0b0110_1000;
/// Read high byte (flash high, calibration, lock bits)
pub const SII_READ_HIGH_BYTE: u8 = 0b0111_1000;
/// Read high fuse
pub const SII_READ_HIGH_FUSE: u8 = 0b0111_1010;
/// Read extended fuse
pub const SII_READ_EXTENDED_FUSE: u8 = 0b0110_1010;
/// Write low byte (page program, low fuse, lock bits, EEPROM)
pub const SII_WRITE_LOW_BYTE: u8 = 0b0110_0100;
/// Write high byte (high fuse)
pub const SII_WRITE_HIGH_BYTE: u8 = 0b0111_0100;
/// Write extended fuse
pub const SII_WRITE_EXTENDED_FUSE: u8 = 0b0110_0110;
/// Latch a loaded byte into the EEPROM page buffer
pub const SII_PROGRAM_LOW_BYTE: u8 = 0b0110_1101;
/// Latch a loaded word into the flash page buffer
pub const SII_PROGRAM_HIGH_BYTE: u8 = 0b0111_1101;

/// ORed into a write/read instruction for its second (strobe) frame
pub const SII_OR_MASK: u8 = 0b0000_1100;
/// Cleared in a program instruction for its second (latch) frame
pub const SII_PAGEL: u8 = 0b0000_0001;

// ============================================================================
// Timing (microseconds)
// ============================================================================

/// Delay between ready polls
pub const POLL_INTERVAL_US: u32 = 10;
/// Ready-poll budget for any write-class command
pub const READY_TIMEOUT_US: u32 = 100_000;
/// Time for VCC to settle and /RESET to reach 12V through the RC network
pub const POWER_UP_US: u32 = 100;
/// Wait after releasing SDO before the first serial instruction
pub const HVSP_SETTLE_US: u32 = 300;
/// Fixed wait for chip erase when completion cannot be polled
pub const CHIP_ERASE_DELAY_US: u32 = 10_000;
/// Fixed wait for a flash page write when completion cannot be polled
pub const FLASH_WRITE_DELAY_US: u32 = 5_000;
/// Fixed wait for an EEPROM byte write when completion cannot be polled
pub const EEPROM_WRITE_DELAY_US: u32 = 10_000;
/// Fixed wait for a fuse or lock write when completion cannot be polled
pub const FUSE_WRITE_DELAY_US: u32 = 5_000;
