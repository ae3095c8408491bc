//! High-voltage serial programming (HVSP)
//!
//! Command sequences for the 8/14-pin AVR parts. Every step is one or more
//! 11-bit frames carrying a data byte on SDI and an instruction on SII; the
//! target answers on SDO, which also serves as the ready line once a write
//! has been started.

use crate::chip::{Fuse, FuseSet};
use crate::error::{Error, Operation, Result, Sequence};
use crate::programmer::pins::serial;
use crate::programmer::{Completion, HvProgrammer, Protocol, SerialPins};

use super::commands::*;
use super::{wait_ready, ReadySource};

/// SDO line as a ready source
struct SdoLine<'a, P: SerialPins + ?Sized>(&'a mut P);

impl<P: SerialPins + ?Sized> ReadySource for SdoLine<'_, P> {
    fn poll_ready(&mut self) -> bool {
        self.0.get_sdo()
    }

    fn wait_us(&mut self, us: u32) {
        self.0.delay_us(us);
    }
}

/// Serial programmer driving a target through [`SerialPins`]
pub struct SerialProgrammer<P> {
    pins: P,
    completion: Completion,
    programming: bool,
}

impl<P: SerialPins> SerialProgrammer<P> {
    /// Create a new serial programmer from a pin backend
    pub fn new(pins: P) -> Self {
        Self {
            pins,
            completion: Completion::default(),
            programming: false,
        }
    }

    /// Access the pin backend
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Consume the programmer and return the pin backend
    pub fn into_inner(self) -> P {
        self.pins
    }

    fn ensure_programming(&self) -> Result<()> {
        if self.programming {
            Ok(())
        } else {
            Err(Error::SequenceViolation(Sequence::NotInProgrammingMode))
        }
    }

    fn frame(&mut self, data: u8, instr: u8) -> u8 {
        serial::transfer(&mut self.pins, data, instr)
    }

    fn load_command(&mut self, cmd: u8) {
        self.frame(cmd, SII_LOAD_COMMAND);
    }

    fn load_address(&mut self, addr: u16) {
        self.frame(addr as u8, SII_LOAD_ADDRESS_LOW);
        self.frame((addr >> 8) as u8, SII_LOAD_ADDRESS_HIGH);
    }

    /// Issue a read/write instruction and its strobe frame
    ///
    /// For reads the target shifts the byte out during the strobe frame.
    fn strobe(&mut self, instr: u8) -> u8 {
        self.frame(0x00, instr);
        self.frame(0x00, instr | SII_OR_MASK)
    }

    /// Latch loaded data into the page buffer (PAGEL high, then low)
    fn latch(&mut self, instr: u8) {
        self.frame(0x00, instr);
        self.frame(0x00, instr & !SII_PAGEL);
    }

    fn wait(&mut self, timed_us: u32, op: Operation) -> Result<()> {
        let completion = self.completion;
        wait_ready(&mut SdoLine(&mut self.pins), completion, timed_us, op)
    }
}

impl<P: SerialPins> HvProgrammer for SerialProgrammer<P> {
    fn protocol(&self) -> Protocol {
        Protocol::Serial
    }

    fn enter_programming_mode(&mut self) -> Result<()> {
        if self.programming {
            return Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode));
        }

        log::debug!("Entering serial programming mode");
        self.pins.set_sdi_set_sii(false, false);
        self.pins.set_sci(false);
        // Prog_enable: SDO must read low while VCC and 12V come up
        self.pins.drive_sdo(Some(false));
        self.pins.set_power(true);
        self.pins.delay_us(POWER_UP_US);
        self.pins.drive_sdo(None);
        self.pins.delay_us(HVSP_SETTLE_US);

        self.programming = true;
        Ok(())
    }

    fn exit_programming_mode(&mut self) {
        log::debug!("Leaving serial programming mode");
        self.pins.set_sdi_set_sii(false, false);
        self.pins.set_sci(false);
        self.pins.drive_sdo(None);
        self.pins.set_power(false);
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

        let mut signature = [0u8; 3];
        for (i, byte) in signature.iter_mut().enumerate() {
            self.load_command(CMD_READ_SIGNATURE);
            self.frame(i as u8, SII_LOAD_ADDRESS_LOW);
            *byte = self.strobe(SII_READ_LOW_BYTE);
        }

        log::debug!(
            "Signature: {:02X} {:02X} {:02X}",
            signature[0],
            signature[1],
            signature[2]
        );
        Ok(signature)
    }

    fn read_fuses(&mut self) -> Result<FuseSet> {
        self.ensure_programming()?;

        self.load_command(CMD_READ_FUSE_BITS);
        let low = self.strobe(SII_READ_LOW_BYTE);
        let high = self.strobe(SII_READ_HIGH_FUSE);
        let extended = self.strobe(SII_READ_EXTENDED_FUSE);
        let lock = self.strobe(SII_READ_HIGH_BYTE);

        self.load_command(CMD_READ_SIGNATURE);
        self.frame(0x00, SII_LOAD_ADDRESS_LOW);
        let calibration = self.strobe(SII_READ_HIGH_BYTE);

        Ok(FuseSet {
            low,
            high,
            extended,
            lock,
            calibration,
        })
    }

    fn chip_erase(&mut self) -> Result<()> {
        self.ensure_programming()?;

        log::debug!("Chip erase");
        self.load_command(CMD_CHIP_ERASE);
        self.strobe(SII_WRITE_LOW_BYTE);
        // SDO does not signal erase completion reliably on serial parts
        self.pins.delay_us(CHIP_ERASE_DELAY_US);
        Ok(())
    }

    fn write_flash_page(&mut self, page_base: u32, data: &[u8]) -> Result<()> {
        self.ensure_programming()?;
        if data.is_empty() || data.len() % 2 != 0 {
            return Err(Error::InvalidPageSize);
        }
        let first_word = page_base / 2;
        if first_word + (data.len() / 2) as u32 > 0x1_0000 {
            return Err(Error::AddressOutOfBounds);
        }

        log::trace!("Writing flash page at 0x{:04X}", page_base);
        self.load_command(CMD_WRITE_FLASH);
        for (i, word) in data.chunks_exact(2).enumerate() {
            let addr = first_word + i as u32;
            self.frame(addr as u8, SII_LOAD_ADDRESS_LOW);
            self.frame(word[0], SII_LOAD_LOW_BYTE);
            self.frame(word[1], SII_LOAD_HIGH_BYTE);
            self.latch(SII_PROGRAM_HIGH_BYTE);
        }
        self.frame((first_word >> 8) as u8, SII_LOAD_ADDRESS_HIGH);
        self.strobe(SII_WRITE_LOW_BYTE);

        let result = self.wait(FLASH_WRITE_DELAY_US, Operation::FlashPage { addr: page_base });
        self.load_command(CMD_NO_OPERATION);
        result
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.ensure_programming()?;
        if addr as u64 + buf.len() as u64 > 0x2_0000 {
            return Err(Error::AddressOutOfBounds);
        }

        self.load_command(CMD_READ_FLASH);
        for (i, byte) in buf.iter_mut().enumerate() {
            let byte_addr = addr + i as u32;
            self.load_address((byte_addr / 2) as u16);
            *byte = if byte_addr & 1 == 0 {
                self.strobe(SII_READ_LOW_BYTE)
            } else {
                self.strobe(SII_READ_HIGH_BYTE)
            };
        }
        Ok(())
    }

    fn write_eeprom_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.ensure_programming()?;

        self.load_command(CMD_WRITE_EEPROM);
        self.load_address(addr);
        self.frame(value, SII_LOAD_LOW_BYTE);
        self.latch(SII_PROGRAM_LOW_BYTE);
        self.strobe(SII_WRITE_LOW_BYTE);
        self.wait(EEPROM_WRITE_DELAY_US, Operation::EepromByte { addr })
    }

    fn read_eeprom_byte(&mut self, addr: u16) -> Result<u8> {
        self.ensure_programming()?;

        self.load_command(CMD_READ_EEPROM);
        self.load_address(addr);
        Ok(self.strobe(SII_READ_LOW_BYTE))
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        self.ensure_programming()?;

        log::debug!("Writing {} fuse: 0x{:02X}", fuse.name(), value);
        self.load_command(CMD_WRITE_FUSE_BITS);
        self.frame(value, SII_LOAD_LOW_BYTE);
        self.strobe(match fuse {
            Fuse::Low => SII_WRITE_LOW_BYTE,
            Fuse::High => SII_WRITE_HIGH_BYTE,
            Fuse::Extended => SII_WRITE_EXTENDED_FUSE,
        });
        self.wait(FUSE_WRITE_DELAY_US, Operation::Fuse)
    }

    fn write_lock_bits(&mut self, value: u8) -> Result<()> {
        self.ensure_programming()?;

        log::debug!("Writing lock bits: 0x{:02X}", value);
        self.load_command(CMD_WRITE_LOCK_BITS);
        self.frame(value, SII_LOAD_LOW_BYTE);
        self.strobe(SII_WRITE_LOW_BYTE);
        self.wait(FUSE_WRITE_DELAY_US, Operation::LockBits)
    }
}
