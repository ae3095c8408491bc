//! hvprog-dummy - Emulated AVR target for testing
//!
//! This crate provides a dummy programmer that emulates an AVR chip in
//! programming mode entirely in memory. It's useful for testing and
//! development without real hardware.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use hvprog_core::chip::{self, ChipSignature, Fuse, FuseSet};
use hvprog_core::error::{Error, Operation, Result, Sequence};
use hvprog_core::programmer::{Completion, HvProgrammer, Protocol};

/// Lock bit pattern with both LB bits programmed off (no memory lock)
const LOCK_UNPROGRAMMED: u8 = 0xFF;
/// Signature of the chip emulated by default
const ATMEGA328P: [u8; 3] = [0x1E, 0x95, 0x0F];
/// LB1/LB2 mask; any cleared bit disables further flash/EEPROM writes
const LOCK_MODE_MASK: u8 = 0x03;

/// Configuration for the emulated target
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Chip to emulate
    pub chip: &'static ChipSignature,
    /// Protocol the emulated wiring speaks
    pub protocol: Protocol,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Fuse and calibration bytes after power-on
    pub fuses: FuseSet,
}

impl DummyConfig {
    /// Configuration for a catalog chip by model name
    pub fn for_chip(name: &str) -> Option<Self> {
        let chip = chip::find_by_name(name)?;
        Some(Self {
            chip,
            ..Self::default()
        })
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        let chip = match chip::lookup(&ATMEGA328P) {
            Some(chip) => chip,
            None => &chip::CHIPS[0],
        };
        Self {
            chip,
            protocol: Protocol::Parallel,
            eeprom_size: 1024,
            fuses: FuseSet {
                low: 0x62,
                high: 0xD9,
                extended: 0xFF,
                lock: LOCK_UNPROGRAMMED,
                calibration: 0x9C,
            },
        }
    }
}

/// Dummy high-voltage programmer
///
/// Emulates the target side of the driver contract: flash and EEPROM start
/// erased, programming can only clear bits, chip erase restores 0xFF and
/// unlocks the part, and every operation outside programming mode fails
/// the way a real driver does.
#[cfg(feature = "alloc")]
pub struct DummyAvr {
    config: DummyConfig,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    fuses: FuseSet,
    programming: bool,
    completion: Completion,
    failing_pages: Vec<u32>,
    page_writes: usize,
}

#[cfg(feature = "alloc")]
impl DummyAvr {
    /// Create a new emulated target with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            flash: vec![0xFF; config.chip.flash_size as usize],
            eeprom: vec![0xFF; config.eeprom_size],
            fuses: config.fuses,
            programming: false,
            completion: Completion::default(),
            failing_pages: Vec::new(),
            page_writes: 0,
            config,
        }
    }

    /// Create a new emulated ATmega328P
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create an emulated target with pre-filled flash
    pub fn with_flash(config: DummyConfig, initial: &[u8]) -> Self {
        let mut avr = Self::new(config);
        let len = core::cmp::min(initial.len(), avr.flash.len());
        avr.flash[..len].copy_from_slice(&initial[..len]);
        avr
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Get a reference to the flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Get a reference to the EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Current fuse, lock and calibration bytes
    pub fn fuses(&self) -> &FuseSet {
        &self.fuses
    }

    /// Completion policy selected by the last `set_completion()` call
    pub fn completion(&self) -> Completion {
        self.completion
    }

    /// Number of flash pages programmed successfully
    pub fn page_writes(&self) -> usize {
        self.page_writes
    }

    /// Make the next write of the page containing `addr` time out
    ///
    /// Calling this more than once for a page queues that many failures.
    pub fn fail_page(&mut self, addr: u32) {
        let base = addr & self.config.chip.page_mask();
        self.failing_pages.push(base);
    }

    fn ensure_programming(&self) -> Result<()> {
        if self.programming {
            Ok(())
        } else {
            Err(Error::SequenceViolation(Sequence::NotInProgrammingMode))
        }
    }

    fn memory_locked(&self) -> bool {
        self.fuses.lock & LOCK_MODE_MASK != LOCK_MODE_MASK
    }
}

#[cfg(feature = "alloc")]
impl HvProgrammer for DummyAvr {
    fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    fn enter_programming_mode(&mut self) -> Result<()> {
        if self.programming {
            return Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode));
        }
        log::debug!("dummy: entering programming mode");
        self.programming = true;
        Ok(())
    }

    fn exit_programming_mode(&mut self) {
        log::debug!("dummy: leaving programming mode");
        self.programming = false;
    }

    fn is_programming(&self) -> bool {
        self.programming
    }

    fn set_completion(&mut self, completion: Completion) {
        self.completion = completion;
    }

    fn read_signature(&mut self) -> Result<[u8; 3]> {
        self.ensure_programming()?;
        Ok(self.config.chip.signature)
    }

    fn read_fuses(&mut self) -> Result<FuseSet> {
        self.ensure_programming()?;
        Ok(self.fuses)
    }

    fn chip_erase(&mut self) -> Result<()> {
        self.ensure_programming()?;
        self.flash.fill(0xFF);
        self.eeprom.fill(0xFF);
        self.fuses.lock = LOCK_UNPROGRAMMED;
        Ok(())
    }

    fn write_flash_page(&mut self, page_base: u32, data: &[u8]) -> Result<()> {
        self.ensure_programming()?;

        let chip = self.config.chip;
        if data.len() != chip.page_size as usize {
            return Err(Error::InvalidPageSize);
        }
        if page_base & !chip.page_mask() != 0 || page_base >= chip.flash_size {
            return Err(Error::AddressOutOfBounds);
        }

        if let Some(pos) = self.failing_pages.iter().position(|&p| p == page_base) {
            self.failing_pages.remove(pos);
            log::debug!("dummy: injected timeout for page 0x{:05X}", page_base);
            return Err(Error::HardwareTimeout(Operation::FlashPage { addr: page_base }));
        }

        if self.memory_locked() {
            log::debug!("dummy: page 0x{:05X} ignored, memory locked", page_base);
            return Ok(());
        }

        let start = page_base as usize;
        for (cell, &byte) in self.flash[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
        self.page_writes += 1;
        Ok(())
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.ensure_programming()?;

        let start = addr as usize;
        let end = start + buf.len();
        if end > self.flash.len() {
            return Err(Error::AddressOutOfBounds);
        }
        buf.copy_from_slice(&self.flash[start..end]);
        Ok(())
    }

    fn write_eeprom_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.ensure_programming()?;

        let cell = self
            .eeprom
            .get_mut(addr as usize)
            .ok_or(Error::AddressOutOfBounds)?;
        // EEPROM writes erase the byte first
        *cell = value;
        Ok(())
    }

    fn read_eeprom_byte(&mut self, addr: u16) -> Result<u8> {
        self.ensure_programming()?;
        self.eeprom
            .get(addr as usize)
            .copied()
            .ok_or(Error::AddressOutOfBounds)
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        self.ensure_programming()?;
        self.fuses.set(fuse, value);
        Ok(())
    }

    fn write_lock_bits(&mut self, value: u8) -> Result<()> {
        self.ensure_programming()?;
        // Lock bits can only be programmed (cleared), never released
        self.fuses.lock &= value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvprog_core::flash::Session;

    #[test]
    fn default_is_atmega328p() {
        let avr = DummyAvr::new_default();
        assert_eq!(avr.config().chip.description, "ATmega328P");
        assert_eq!(avr.config().chip.signature, ATMEGA328P);
        assert_eq!(avr.flash().len(), 32 * 1024);
    }

    #[test]
    fn requires_programming_mode() {
        let mut avr = DummyAvr::new_default();
        assert_eq!(
            avr.read_signature(),
            Err(Error::SequenceViolation(Sequence::NotInProgrammingMode))
        );
        avr.enter_programming_mode().unwrap();
        assert_eq!(
            avr.enter_programming_mode(),
            Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode))
        );
    }

    #[test]
    fn detect_write_verify() {
        let mut avr = DummyAvr::new(DummyConfig::for_chip("attiny85").unwrap());
        let image: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        {
            let mut session = Session::begin(&mut avr).unwrap();
            assert_eq!(session.detect().unwrap().description, "ATtiny85");
            session.erase().unwrap();
            session.write_image(0x40, &image).unwrap();
            session.verify_flash(0x40, &image).unwrap();
        }
        assert!(!avr.is_programming());
        assert_eq!(&avr.flash()[0x40..0x40 + 200], &image[..]);
        // 200 bytes from 0x40 with 64-byte pages: 0x40, 0x80, 0xC0, 0x100
        assert_eq!(avr.page_writes(), 4);
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut avr = DummyAvr::new_default();
        avr.enter_programming_mode().unwrap();

        let mut page = [0xFF; 128];
        page[0] = 0xF0;
        avr.write_flash_page(0, &page).unwrap();
        page[0] = 0x0F;
        avr.write_flash_page(0, &page).unwrap();
        assert_eq!(avr.flash()[0], 0x00);

        avr.chip_erase().unwrap();
        assert_eq!(avr.flash()[0], 0xFF);
    }

    #[test]
    fn rejects_misaligned_or_short_pages() {
        let mut avr = DummyAvr::new_default();
        avr.enter_programming_mode().unwrap();
        assert_eq!(avr.write_flash_page(0, &[0; 64]), Err(Error::InvalidPageSize));
        assert_eq!(
            avr.write_flash_page(0x40, &[0; 128]),
            Err(Error::AddressOutOfBounds)
        );
        assert_eq!(
            avr.write_flash_page(0x8000, &[0; 128]),
            Err(Error::AddressOutOfBounds)
        );
    }

    #[test]
    fn injected_failure_is_retried_by_session() {
        let mut avr = DummyAvr::new_default();
        avr.fail_page(0x90);
        let image = [0xA5; 256];
        let errors = {
            let mut session = Session::begin(&mut avr).unwrap();
            session.detect().unwrap();
            session.write_image(0, &image).unwrap();
            session.verify_flash(0, &image).unwrap();
            session.errors()
        };
        assert_eq!(errors, 1);
        assert!(avr.flash()[..256].iter().all(|&b| b == 0xA5));
    }

    #[test]
    fn lock_bits_block_writes_until_erase() {
        let mut avr = DummyAvr::new_default();
        avr.enter_programming_mode().unwrap();
        avr.write_lock_bits(0xFC).unwrap();
        avr.write_lock_bits(0xFF).unwrap();
        assert_eq!(avr.fuses().lock, 0xFC);

        avr.write_flash_page(0, &[0x00; 128]).unwrap();
        assert_eq!(avr.flash()[0], 0xFF);

        avr.chip_erase().unwrap();
        assert_eq!(avr.fuses().lock, 0xFF);
        avr.write_flash_page(0, &[0x00; 128]).unwrap();
        assert_eq!(avr.flash()[0], 0x00);
    }

    #[test]
    fn fuse_writes_are_read_back() {
        let mut avr = DummyAvr::new_default();
        avr.enter_programming_mode().unwrap();
        avr.write_fuse(Fuse::High, 0xDE).unwrap();
        let fuses = avr.read_fuses().unwrap();
        assert_eq!(fuses.high, 0xDE);
        assert_eq!(avr.config().chip.bootloader_size(&fuses), Some(512));
    }

    #[test]
    fn timed_chip_gets_timed_completion() {
        let mut avr = DummyAvr::new(DummyConfig::for_chip("ATmega8A").unwrap());
        Session::begin(&mut avr).unwrap().detect().unwrap();
        assert_eq!(avr.completion(), Completion::Timed);
    }
}
