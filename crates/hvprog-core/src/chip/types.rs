//! Chip catalog type definitions

/// One kibibyte, for readable catalog entries
pub const KB: u32 = 1024;

/// A fuse byte that can be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fuse {
    /// Low fuse byte
    Low,
    /// High fuse byte
    High,
    /// Extended fuse byte
    Extended,
}

impl Fuse {
    /// All writable fuse bytes, in read order
    pub const ALL: [Fuse; 3] = [Fuse::Low, Fuse::High, Fuse::Extended];

    /// Short lowercase name, as accepted on the command line
    pub fn name(self) -> &'static str {
        match self {
            Fuse::Low => "low",
            Fuse::High => "high",
            Fuse::Extended => "extended",
        }
    }

    /// Parse a fuse name (`low`, `high`, `extended`/`ext`)
    pub fn from_name(name: &str) -> Option<Fuse> {
        match name {
            "low" | "lfuse" => Some(Fuse::Low),
            "high" | "hfuse" => Some(Fuse::High),
            "extended" | "ext" | "efuse" => Some(Fuse::Extended),
            _ => None,
        }
    }
}

/// Fuse, lock and calibration bytes read from a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FuseSet {
    /// Low fuse byte
    pub low: u8,
    /// High fuse byte
    pub high: u8,
    /// Extended fuse byte
    pub extended: u8,
    /// Lock byte
    pub lock: u8,
    /// Oscillator calibration byte (read-only)
    pub calibration: u8,
}

impl FuseSet {
    /// Marker used by chip tables for "no fuse holds the bootloader size".
    ///
    /// 0xFF is also a legal fuse value, so this is documentation only; the
    /// authoritative signal is [`ChipSignature::boot_fuse`] being `None`.
    pub const NO_FUSE: u8 = 0xFF;

    /// Get the value of one fuse byte
    pub fn get(&self, fuse: Fuse) -> u8 {
        match fuse {
            Fuse::Low => self.low,
            Fuse::High => self.high,
            Fuse::Extended => self.extended,
        }
    }

    /// Set the value of one fuse byte
    pub fn set(&mut self, fuse: Fuse, value: u8) {
        match fuse {
            Fuse::Low => self.low = value,
            Fuse::High => self.high = value,
            Fuse::Extended => self.extended = value,
        }
    }
}

/// Chip catalog entry
///
/// Immutable description of one AVR model, keyed by its 3-byte silicon
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipSignature {
    /// Silicon signature bytes
    pub signature: [u8; 3],
    /// Chip model name (e.g., "ATmega328P")
    pub description: &'static str,
    /// Flash size in bytes
    pub flash_size: u32,
    /// Smallest bootloader section size in bytes (0 if the chip has none)
    pub base_bootloader_size: u32,
    /// Flash programming page size in bytes
    pub page_size: u16,
    /// Fuse byte holding the BOOTSZ field, if any
    pub boot_fuse: Option<Fuse>,
    /// Write completion cannot be polled and must be timed
    pub timed_writes: bool,
}

impl ChipSignature {
    /// Check if this chip matches the given signature bytes
    pub fn matches(&self, signature: &[u8; 3]) -> bool {
        self.signature == *signature
    }

    /// Mask that turns a byte address into its page base address
    pub fn page_mask(&self) -> u32 {
        !(self.page_size as u32 - 1)
    }

    /// Bootloader section size selected by the BOOTSZ fuse bits
    ///
    /// BOOTSZ lives in bits 2..1 of the boot fuse; `11` selects the base
    /// size and each step down doubles it.
    pub fn bootloader_size(&self, fuses: &FuseSet) -> Option<u32> {
        let fuse = self.boot_fuse?;
        let multiplier = match (fuses.get(fuse) >> 1) & 0b11 {
            0b00 => 8,
            0b01 => 4,
            0b10 => 2,
            _ => 1,
        };
        Some(self.base_bootloader_size * multiplier)
    }

    /// Flash byte address where the bootloader section starts
    pub fn bootloader_start(&self, fuses: &FuseSet) -> Option<u32> {
        self.bootloader_size(fuses).map(|size| self.flash_size - size)
    }
}
