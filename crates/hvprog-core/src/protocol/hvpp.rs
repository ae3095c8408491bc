//! High-voltage parallel programming (HVPP)
//!
//! Command sequences for the 28/40-pin AVR parts that expose an 8-bit data
//! bus in programming mode. Every byte the target latches goes through
//! [`parallel::load`]: XA1/XA0 pick address, data or command, BS1/BS2 pick
//! the byte, and an XTAL1 pulse latches it.

use crate::chip::{Fuse, FuseSet};
use crate::error::{Error, Operation, Result, Sequence};
use crate::programmer::pins::parallel;
use crate::programmer::{Action, Completion, ControlLines, HvProgrammer, ParallelPins, Protocol};

use super::commands::*;
use super::{wait_ready, ReadySource};

/// Every control line, for the all-low safe state
const ALL_LINES: ControlLines = ControlLines::all();
/// No byte-select line high: low byte, address low, low fuse
const SELECT_LOW: ControlLines = ControlLines::empty();
/// BS1 high: high byte, address high, high fuse
const SELECT_HIGH: ControlLines = ControlLines::BS1;
/// BS2 high: extended address byte, extended fuse
const SELECT_EXTENDED: ControlLines = ControlLines::BS2;

/// RDY/BSY line as a ready source
struct RdyLine<'a, P: ParallelPins + ?Sized>(&'a mut P);

impl<P: ParallelPins + ?Sized> ReadySource for RdyLine<'_, P> {
    fn poll_ready(&mut self) -> bool {
        self.0.is_ready()
    }

    fn wait_us(&mut self, us: u32) {
        self.0.delay_us(us);
    }
}

/// Parallel programmer driving a target through [`ParallelPins`]
pub struct ParallelProgrammer<P> {
    pins: P,
    completion: Completion,
    programming: bool,
    /// Extended address byte the target currently holds
    extended: u8,
}

impl<P: ParallelPins> ParallelProgrammer<P> {
    /// Create a new parallel programmer from a pin backend
    pub fn new(pins: P) -> Self {
        Self {
            pins,
            completion: Completion::default(),
            programming: false,
            extended: 0,
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

    fn load_command(&mut self, cmd: u8) {
        parallel::load(&mut self.pins, Action::LoadCommand, SELECT_LOW, cmd);
    }

    /// Latch the extended address byte if the target holds a different one
    ///
    /// The target keeps this byte across commands, so a lower-half access
    /// after an upper-half one has to load 0x00 again.
    fn load_extended_address(&mut self, word: u32) {
        let extended = (word >> 16) as u8;
        if extended != self.extended {
            parallel::load(&mut self.pins, Action::LoadAddress, SELECT_EXTENDED, extended);
            self.extended = extended;
        }
    }

    /// Load a word address: extended byte (when it changes), high, low
    fn load_word_address(&mut self, word: u32) {
        self.load_extended_address(word);
        parallel::load(&mut self.pins, Action::LoadAddress, SELECT_HIGH, (word >> 8) as u8);
        parallel::load(&mut self.pins, Action::LoadAddress, SELECT_LOW, word as u8);
    }

    fn wait(&mut self, timed_us: u32, op: Operation) -> Result<()> {
        let completion = self.completion;
        wait_ready(&mut RdyLine(&mut self.pins), completion, timed_us, op)
    }

    /// Pulse WR with the current byte select and wait for completion
    fn program(&mut self, timed_us: u32, op: Operation) -> Result<()> {
        parallel::pulse_wr(&mut self.pins);
        self.wait(timed_us, op)
    }
}

impl<P: ParallelPins> HvProgrammer for ParallelProgrammer<P> {
    fn protocol(&self) -> Protocol {
        Protocol::Parallel
    }

    fn enter_programming_mode(&mut self) -> Result<()> {
        if self.programming {
            return Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode));
        }

        log::debug!("Entering parallel programming mode");
        self.pins.set_lines(ALL_LINES, false);
        self.pins.write_data(0x00);
        self.pins.set_power(true);
        self.pins.delay_us(POWER_UP_US);
        self.pins.set_lines(ControlLines::IDLE, true);
        self.pins.delay_us(POWER_UP_US);

        self.extended = 0;
        self.programming = true;
        Ok(())
    }

    fn exit_programming_mode(&mut self) {
        log::debug!("Leaving parallel programming mode");
        self.pins.set_lines(ALL_LINES, false);
        self.pins.release_data();
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
        self.load_command(CMD_READ_SIGNATURE);
        for (i, byte) in signature.iter_mut().enumerate() {
            parallel::load(&mut self.pins, Action::LoadAddress, SELECT_LOW, i as u8);
            *byte = parallel::read(&mut self.pins, SELECT_LOW);
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
        let low = parallel::read(&mut self.pins, SELECT_LOW);
        let high = parallel::read(&mut self.pins, ControlLines::BS1 | ControlLines::BS2);
        let extended = parallel::read(&mut self.pins, SELECT_EXTENDED);
        let lock = parallel::read(&mut self.pins, ControlLines::BS1);

        self.load_command(CMD_READ_SIGNATURE);
        parallel::load(&mut self.pins, Action::LoadAddress, SELECT_LOW, 0x00);
        let calibration = parallel::read(&mut self.pins, SELECT_HIGH);

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
        self.program(CHIP_ERASE_DELAY_US, Operation::ChipErase)
    }

    fn write_flash_page(&mut self, page_base: u32, data: &[u8]) -> Result<()> {
        self.ensure_programming()?;
        if data.is_empty() || data.len() % 2 != 0 {
            return Err(Error::InvalidPageSize);
        }

        log::trace!("Writing flash page at 0x{:05X}", page_base);
        let first_word = page_base / 2;
        self.load_command(CMD_WRITE_FLASH);

        for (i, word) in data.chunks_exact(2).enumerate() {
            let addr = first_word + i as u32;
            parallel::load(&mut self.pins, Action::LoadAddress, SELECT_LOW, addr as u8);
            parallel::load(&mut self.pins, Action::LoadData, SELECT_LOW, word[0]);
            parallel::load(&mut self.pins, Action::LoadData, SELECT_HIGH, word[1]);
            parallel::set_byte_select(&mut self.pins, SELECT_HIGH);
            parallel::pulse_pagel(&mut self.pins);
        }

        self.load_extended_address(first_word);
        parallel::load(
            &mut self.pins,
            Action::LoadAddress,
            SELECT_HIGH,
            (first_word >> 8) as u8,
        );
        parallel::set_byte_select(&mut self.pins, SELECT_LOW);

        let result = self.program(FLASH_WRITE_DELAY_US, Operation::FlashPage { addr: page_base });
        self.load_command(CMD_NO_OPERATION);
        result
    }

    fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.ensure_programming()?;

        self.load_command(CMD_READ_FLASH);
        let mut loaded_word = None;
        for (i, byte) in buf.iter_mut().enumerate() {
            let byte_addr = addr + i as u32;
            let word = byte_addr / 2;
            if loaded_word != Some(word) {
                self.load_word_address(word);
                loaded_word = Some(word);
            }
            let select = if byte_addr & 1 == 0 {
                SELECT_LOW
            } else {
                SELECT_HIGH
            };
            *byte = parallel::read(&mut self.pins, select);
        }
        Ok(())
    }

    fn write_eeprom_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.ensure_programming()?;

        self.load_command(CMD_WRITE_EEPROM);
        self.load_word_address(addr as u32);
        parallel::load(&mut self.pins, Action::LoadData, SELECT_LOW, value);
        parallel::pulse_pagel(&mut self.pins);
        self.program(EEPROM_WRITE_DELAY_US, Operation::EepromByte { addr })
    }

    fn read_eeprom_byte(&mut self, addr: u16) -> Result<u8> {
        self.ensure_programming()?;

        self.load_command(CMD_READ_EEPROM);
        self.load_word_address(addr as u32);
        Ok(parallel::read(&mut self.pins, SELECT_LOW))
    }

    fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        self.ensure_programming()?;

        log::debug!("Writing {} fuse: 0x{:02X}", fuse.name(), value);
        self.load_command(CMD_WRITE_FUSE_BITS);
        parallel::load(&mut self.pins, Action::LoadData, SELECT_LOW, value);
        let select = match fuse {
            Fuse::Low => SELECT_LOW,
            Fuse::High => SELECT_HIGH,
            Fuse::Extended => SELECT_EXTENDED,
        };
        parallel::set_byte_select(&mut self.pins, select);
        let result = self.program(FUSE_WRITE_DELAY_US, Operation::Fuse);
        parallel::set_byte_select(&mut self.pins, SELECT_LOW);
        result
    }

    fn write_lock_bits(&mut self, value: u8) -> Result<()> {
        self.ensure_programming()?;

        log::debug!("Writing lock bits: 0x{:02X}", value);
        self.load_command(CMD_WRITE_LOCK_BITS);
        parallel::load(&mut self.pins, Action::LoadData, SELECT_LOW, value);
        self.program(FUSE_WRITE_DELAY_US, Operation::LockBits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// A byte latched by an XTAL1 rising edge
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Latch {
        action: ControlLines,
        select: ControlLines,
        byte: u8,
    }

    #[derive(Default)]
    struct MockPins {
        lines: ControlLines,
        data: u8,
        bus_driven: bool,
        power: bool,
        latches: Vec<Latch>,
        pagel_pulses: usize,
        wr_pulses: usize,
        reads: VecDeque<u8>,
        read_selects: Vec<ControlLines>,
        /// Polls answered busy before RDY goes high; None = never ready
        busy_polls: Option<u32>,
        polls: u32,
        delayed_us: u64,
    }

    impl MockPins {
        fn ready_after(busy_polls: u32) -> Self {
            Self {
                busy_polls: Some(busy_polls),
                ..Default::default()
            }
        }

        fn commands(&self) -> Vec<u8> {
            self.latches
                .iter()
                .filter(|l| l.action == Action::LoadCommand.lines())
                .map(|l| l.byte)
                .collect()
        }
    }

    impl ParallelPins for MockPins {
        fn set_power(&mut self, on: bool) {
            self.power = on;
        }

        fn set_lines(&mut self, lines: ControlLines, high: bool) {
            let before = self.lines;
            self.lines.set(lines, high);
            let rising = self.lines - before;
            let falling = before - self.lines;
            if rising.contains(ControlLines::XTAL1) {
                self.latches.push(Latch {
                    action: self.lines & (ControlLines::XA0 | ControlLines::XA1),
                    select: self.lines & (ControlLines::BS1 | ControlLines::BS2),
                    byte: self.data,
                });
            }
            if rising.contains(ControlLines::PAGEL) {
                self.pagel_pulses += 1;
            }
            if falling.contains(ControlLines::WR) && self.power {
                self.wr_pulses += 1;
            }
        }

        fn write_data(&mut self, byte: u8) {
            self.bus_driven = true;
            self.data = byte;
        }

        fn release_data(&mut self) {
            self.bus_driven = false;
        }

        fn read_data(&mut self) -> u8 {
            assert!(!self.bus_driven, "bus read while driven");
            assert!(!self.lines.contains(ControlLines::OE), "bus read with OE high");
            self.read_selects
                .push(self.lines & (ControlLines::BS1 | ControlLines::BS2));
            self.reads.pop_front().unwrap_or(0xFF)
        }

        fn is_ready(&mut self) -> bool {
            self.polls += 1;
            match self.busy_polls {
                Some(busy) => self.polls > busy,
                None => false,
            }
        }

        fn delay_us(&mut self, us: u32) {
            self.delayed_us += us as u64;
        }
    }

    fn entered(pins: MockPins) -> ParallelProgrammer<MockPins> {
        let mut prog = ParallelProgrammer::new(pins);
        prog.enter_programming_mode().unwrap();
        prog
    }

    #[test]
    fn enter_then_exit_leaves_lines_low() {
        let mut prog = entered(MockPins::ready_after(0));
        assert!(prog.is_programming());
        assert!(prog.pins().power);
        assert_eq!(prog.pins().lines, ControlLines::IDLE);

        prog.exit_programming_mode();
        let pins = prog.pins();
        assert!(!pins.power);
        assert!(!pins.bus_driven);
        assert_eq!(pins.lines, ControlLines::empty());
        assert!(!prog.is_programming());
    }

    #[test]
    fn double_enter_is_rejected() {
        let mut prog = entered(MockPins::ready_after(0));
        assert_eq!(
            prog.enter_programming_mode(),
            Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode))
        );
    }

    #[test]
    fn operations_require_programming_mode() {
        let mut prog = ParallelProgrammer::new(MockPins::ready_after(0));
        let expected = Err(Error::SequenceViolation(Sequence::NotInProgrammingMode));
        assert_eq!(prog.read_signature().map(|_| ()), expected);
        assert_eq!(prog.chip_erase(), expected);
        assert_eq!(prog.write_flash_page(0, &[0; 4]), expected);
        assert_eq!(prog.write_fuse(Fuse::Low, 0x62), expected);
        assert!(prog.pins().latches.is_empty());
    }

    #[test]
    fn signature_is_read_with_low_byte_select() {
        let mut pins = MockPins::ready_after(0);
        pins.reads = VecDeque::from([0x1E, 0x95, 0x0F]);
        let mut prog = entered(pins);

        assert_eq!(prog.read_signature().unwrap(), [0x1E, 0x95, 0x0F]);

        let pins = prog.pins();
        assert_eq!(pins.commands(), [CMD_READ_SIGNATURE]);
        let addresses: Vec<u8> = pins
            .latches
            .iter()
            .filter(|l| l.action == Action::LoadAddress.lines())
            .map(|l| l.byte)
            .collect();
        assert_eq!(addresses, [0, 1, 2]);
        assert!(pins.read_selects.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn page_write_latches_every_word() {
        let mut prog = entered(MockPins::ready_after(2));
        let page: Vec<u8> = (0..64u8).collect();

        prog.write_flash_page(0x0180, &page).unwrap();

        let pins = prog.pins();
        assert_eq!(pins.pagel_pulses, 32);
        assert_eq!(pins.wr_pulses, 1);
        assert_eq!(pins.commands(), [CMD_WRITE_FLASH, CMD_NO_OPERATION]);

        let data: Vec<Latch> = pins
            .latches
            .iter()
            .copied()
            .filter(|l| l.action == Action::LoadData.lines())
            .collect();
        assert_eq!(data.len(), 64);
        assert_eq!(data[0].select, SELECT_LOW);
        assert_eq!(data[1].select, SELECT_HIGH);
        assert_eq!(data[3].byte, 3);

        // Word address 0xC0: high byte 0x00 loaded once, after the words
        let high: Vec<u8> = pins
            .latches
            .iter()
            .filter(|l| l.action == Action::LoadAddress.lines() && l.select == SELECT_HIGH)
            .map(|l| l.byte)
            .collect();
        assert_eq!(high, [0x00]);
        assert_eq!(pins.polls, 3);
    }

    #[test]
    fn extended_address_loaded_above_64k_words() {
        let mut prog = entered(MockPins::ready_after(0));
        prog.write_flash_page(0x3_FF00, &[0; 256]).unwrap();

        let extended: Vec<u8> = prog
            .pins()
            .latches
            .iter()
            .filter(|l| l.action == Action::LoadAddress.lines() && l.select == SELECT_EXTENDED)
            .map(|l| l.byte)
            .collect();
        assert_eq!(extended, [0x01]);
    }

    #[test]
    fn lower_half_after_upper_page_reloads_extended_byte() {
        let mut prog = entered(MockPins::ready_after(0));
        prog.write_flash_page(0x3_FF00, &[0; 256]).unwrap();
        let upper_latches = prog.pins().latches.len();

        let mut buf = [0u8; 2];
        prog.read_flash(0, &mut buf).unwrap();
        prog.write_flash_page(0, &[0; 256]).unwrap();

        let extended: Vec<u8> = prog.pins().latches[upper_latches..]
            .iter()
            .filter(|l| l.action == Action::LoadAddress.lines() && l.select == SELECT_EXTENDED)
            .map(|l| l.byte)
            .collect();
        // Reloaded once by the read, the page write then finds it in place
        assert_eq!(extended, [0x00]);
    }

    #[test]
    fn low_flash_never_touches_extended_byte() {
        let mut prog = entered(MockPins::ready_after(0));
        prog.write_flash_page(0x1_FF00, &[0; 256]).unwrap();
        let mut buf = [0u8; 4];
        prog.read_flash(0x100, &mut buf).unwrap();

        assert!(prog
            .pins()
            .latches
            .iter()
            .all(|l| l.select != SELECT_EXTENDED));
    }

    #[test]
    fn timed_completion_never_polls() {
        let mut prog = entered(MockPins::default());
        prog.set_completion(Completion::Timed);

        prog.write_flash_page(0, &[0xAA; 64]).unwrap();
        prog.write_fuse(Fuse::High, 0xD9).unwrap();
        prog.chip_erase().unwrap();

        let pins = prog.pins();
        assert_eq!(pins.polls, 0);
        assert!(
            pins.delayed_us
                >= (FLASH_WRITE_DELAY_US + FUSE_WRITE_DELAY_US + CHIP_ERASE_DELAY_US) as u64
        );
    }

    #[test]
    fn stuck_ready_line_times_out_with_page_address() {
        let mut prog = entered(MockPins::default());

        let err = prog.write_flash_page(0x0100, &[0; 64]).unwrap_err();
        assert_eq!(err, Error::HardwareTimeout(Operation::FlashPage { addr: 0x0100 }));
        assert!(err.is_recoverable());
        // The page sequence is still closed with a NOP
        assert_eq!(
            prog.pins().commands().last().copied(),
            Some(CMD_NO_OPERATION)
        );
    }

    #[test]
    fn odd_page_length_is_rejected() {
        let mut prog = entered(MockPins::ready_after(0));
        assert_eq!(prog.write_flash_page(0, &[0; 3]), Err(Error::InvalidPageSize));
        assert_eq!(prog.write_flash_page(0, &[]), Err(Error::InvalidPageSize));
    }

    #[test]
    fn fuses_use_byte_select_per_fuse() {
        let mut pins = MockPins::ready_after(0);
        pins.reads = VecDeque::from([0x62, 0xDF, 0xF9, 0xFF, 0x9A]);
        let mut prog = entered(pins);

        let fuses = prog.read_fuses().unwrap();
        assert_eq!(
            fuses,
            FuseSet {
                low: 0x62,
                high: 0xDF,
                extended: 0xF9,
                lock: 0xFF,
                calibration: 0x9A,
            }
        );
        assert_eq!(
            prog.pins().read_selects,
            [
                SELECT_LOW,
                ControlLines::BS1 | ControlLines::BS2,
                SELECT_EXTENDED,
                ControlLines::BS1,
                SELECT_HIGH,
            ]
        );
    }

    #[test]
    fn read_flash_handles_odd_start() {
        let mut pins = MockPins::ready_after(0);
        pins.reads = VecDeque::from([0x11, 0x22, 0x33]);
        let mut prog = entered(pins);

        let mut buf = [0u8; 3];
        prog.read_flash(1, &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0x22, 0x33]);
        assert_eq!(
            prog.pins().read_selects,
            [SELECT_HIGH, SELECT_LOW, SELECT_HIGH]
        );
    }
}
