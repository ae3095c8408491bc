//! Programming session controller
//!
//! A [`Session`] owns the programming-mode bracket: it enters programming
//! mode on creation and leaves it when dropped, so control lines return to
//! a safe state on every exit path, including early returns through `?`.

use crate::chip::{self, ChipSignature, Fuse, FuseSet};
use crate::error::{Error, Result, Sequence};
use crate::programmer::{Completion, HvProgrammer};

use super::page::{ErrorCounter, PageWriter, MAX_PAGE_SIZE};
use super::progress::{NoProgress, WriteProgress};

/// Extra attempts for a page or byte that failed with a recoverable error
pub const MAX_RETRIES: usize = 3;

/// Highest EEPROM address plus one
const EEPROM_LIMIT: u32 = 0x1_0000;

/// Run `op`, repeating it while it fails recoverably and attempts remain
fn with_retries<F>(mut op: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if e.is_recoverable() && attempt < MAX_RETRIES => {
                attempt += 1;
                log::warn!("{}; retrying ({}/{})", e, attempt, MAX_RETRIES);
            }
            other => return other,
        }
    }
}

fn check_range(limit: u32, base: u32, len: usize) -> Result<()> {
    if base as u64 + len as u64 > limit as u64 {
        return Err(Error::AddressOutOfBounds);
    }
    Ok(())
}

/// One programming session on one target
pub struct Session<'a, M: HvProgrammer + ?Sized> {
    master: &'a mut M,
    chip: Option<&'static ChipSignature>,
    errors: ErrorCounter,
}

impl<'a, M: HvProgrammer + ?Sized> Session<'a, M> {
    /// Enter programming mode and open a session
    pub fn begin(master: &'a mut M) -> Result<Self> {
        log::debug!("Opening {} programming session", master.protocol());
        master.enter_programming_mode()?;
        Ok(Self {
            master,
            chip: None,
            errors: ErrorCounter::default(),
        })
    }

    /// Identify the target by its signature
    ///
    /// Selects ready-polling or timed completion for the chip. An unknown
    /// signature ends the useful part of the session with
    /// [`Error::UnsupportedChip`].
    pub fn detect(&mut self) -> Result<&'static ChipSignature> {
        let signature = self.master.read_signature()?;
        let Some(chip) = chip::lookup(&signature) else {
            log::warn!(
                "No chip matches signature {:02X} {:02X} {:02X}",
                signature[0],
                signature[1],
                signature[2]
            );
            return Err(Error::UnsupportedChip { signature });
        };

        log::info!(
            "Found {} ({} KiB flash, {} byte pages)",
            chip.description,
            chip.flash_size / chip::KB,
            chip.page_size
        );
        self.master.set_completion(if chip.timed_writes {
            Completion::Timed
        } else {
            Completion::Poll
        });
        self.chip = Some(chip);
        Ok(chip)
    }

    /// The chip found by [`detect()`](Self::detect)
    pub fn chip(&self) -> Result<&'static ChipSignature> {
        self.chip
            .ok_or(Error::SequenceViolation(Sequence::ChipNotDetected))
    }

    /// Write and verify failures counted so far
    pub fn errors(&self) -> usize {
        self.errors.count()
    }

    /// Read fuse, lock and calibration bytes
    pub fn read_fuses(&mut self) -> Result<FuseSet> {
        self.master.read_fuses()
    }

    /// Byte address of the bootloader section, if the chip has one
    pub fn bootloader_start(&mut self) -> Result<Option<u32>> {
        let chip = self.chip()?;
        let fuses = self.master.read_fuses()?;
        Ok(chip.bootloader_start(&fuses))
    }

    /// Erase flash and EEPROM and clear the lock bits
    pub fn erase(&mut self) -> Result<()> {
        self.chip()?;
        log::info!("Erasing chip");
        self.master.chip_erase()
    }

    /// Program one fuse byte
    pub fn write_fuse(&mut self, fuse: Fuse, value: u8) -> Result<()> {
        self.chip()?;
        self.master.write_fuse(fuse, value)
    }

    /// Program the lock bits
    pub fn write_lock_bits(&mut self, value: u8) -> Result<()> {
        self.chip()?;
        self.master.write_lock_bits(value)
    }

    /// A page write engine sized for the detected chip
    pub fn page_writer(&mut self) -> Result<PageWriter<'_, M>> {
        let chip = self.chip()?;
        PageWriter::new(
            &mut *self.master,
            &mut self.errors,
            chip.page_size,
            chip.flash_size,
        )
    }

    /// Read flash contents starting at `addr`
    pub fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let chip = self.chip()?;
        check_range(chip.flash_size, addr, buf.len())?;
        self.master.read_flash(addr, buf)
    }

    /// Stream an image into flash starting at `base`
    pub fn write_image(&mut self, base: u32, image: &[u8]) -> Result<()> {
        self.write_image_with_progress(base, image, &mut NoProgress)
    }

    /// Stream an image into flash, reporting progress
    ///
    /// Each page gets [`MAX_RETRIES`] extra attempts on recoverable errors.
    /// A page that runs out of attempts stops the stream and is abandoned
    /// without another write.
    pub fn write_image_with_progress<P: WriteProgress + ?Sized>(
        &mut self,
        base: u32,
        image: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        let chip = self.chip()?;
        check_range(chip.flash_size, base, image.len())?;

        log::info!("Writing {} bytes at 0x{:05X}", image.len(), base);
        progress.writing(image.len());

        let page_size = chip.page_size as u32;
        let mut writer = self.page_writer()?;
        let mut result = Ok(());
        for (i, &value) in image.iter().enumerate() {
            let addr = base + i as u32;
            if let Err(e) = with_retries(|| writer.add_byte(addr, value)) {
                // The pending page is the one that just failed
                if let Some(page) = writer.current_page() {
                    log::error!("Abandoning page 0x{:05X}", page);
                }
                result = Err(e);
                break;
            }
            if (addr + 1) % page_size == 0 {
                progress.write_progress(i + 1);
            }
        }

        if result.is_ok() {
            result = with_retries(|| writer.flush());
            if result.is_ok() {
                progress.write_progress(image.len());
            }
        }

        progress.complete(self.errors.count());
        result
    }

    /// Program a run of EEPROM bytes starting at `base`
    pub fn write_eeprom(&mut self, base: u16, data: &[u8]) -> Result<()> {
        self.chip()?;
        check_range(EEPROM_LIMIT, base as u32, data.len())?;

        log::info!("Writing {} EEPROM bytes at 0x{:04X}", data.len(), base);
        let master = &mut *self.master;
        let errors = &mut self.errors;
        for (i, &value) in data.iter().enumerate() {
            let addr = base + i as u16;
            with_retries(|| {
                master.write_eeprom_byte(addr, value).map_err(|e| {
                    if e.is_recoverable() {
                        errors.record();
                    }
                    e
                })
            })?;
        }
        Ok(())
    }

    /// Read EEPROM contents starting at `base`
    pub fn read_eeprom(&mut self, base: u16, buf: &mut [u8]) -> Result<()> {
        self.chip()?;
        check_range(EEPROM_LIMIT, base as u32, buf.len())?;
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.master.read_eeprom_byte(base + i as u16)?;
        }
        Ok(())
    }

    /// Compare flash against `image`
    pub fn verify_flash(&mut self, base: u32, image: &[u8]) -> Result<()> {
        self.verify_flash_with_progress(base, image, &mut NoProgress)
    }

    /// Compare flash against `image`, reporting progress
    ///
    /// The whole range is always scanned. Every differing byte is counted
    /// and the first one is returned as [`Error::VerifyMismatch`].
    pub fn verify_flash_with_progress<P: WriteProgress + ?Sized>(
        &mut self,
        base: u32,
        image: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        let chip = self.chip()?;
        check_range(chip.flash_size, base, image.len())?;

        log::info!("Verifying {} bytes at 0x{:05X}", image.len(), base);
        progress.verifying(image.len());

        let chunk_size = (chip.page_size as usize).min(MAX_PAGE_SIZE);
        let mut buf = [0u8; MAX_PAGE_SIZE];
        let mut first = None;
        let mut mismatches = 0usize;
        let mut done = 0usize;

        for expected in image.chunks(chunk_size) {
            let addr = base + done as u32;
            let actual = &mut buf[..expected.len()];
            self.master.read_flash(addr, actual)?;

            for (offset, (&want, &got)) in expected.iter().zip(actual.iter()).enumerate() {
                if want == got {
                    continue;
                }
                let addr = addr + offset as u32;
                log::debug!(
                    "Mismatch at 0x{:05X}: expected 0x{:02X}, found 0x{:02X}",
                    addr,
                    want,
                    got
                );
                self.errors.record();
                mismatches += 1;
                first.get_or_insert(Error::VerifyMismatch {
                    addr,
                    expected: want,
                    found: got,
                });
            }

            done += expected.len();
            progress.verify_progress(done);
        }

        progress.complete(self.errors.count());
        match first {
            Some(e) => {
                log::warn!("Verification found {} differing bytes", mismatches);
                Err(e)
            }
            None => Ok(()),
        }
    }
}

impl<M: HvProgrammer + ?Sized> Drop for Session<'_, M> {
    fn drop(&mut self) {
        if self.master.is_programming() {
            self.master.exit_programming_mode();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::flash::ERASED;
    use crate::programmer::Protocol;
    use std::vec;
    use std::vec::Vec;

    /// In-memory target with call counters
    struct MemoryDriver {
        signature: [u8; 3],
        flash: Vec<u8>,
        eeprom: Vec<u8>,
        programming: bool,
        enters: usize,
        exits: usize,
        completion: Option<Completion>,
        page_writes: Vec<u32>,
        /// Page base and the number of attempts that time out
        failing_page: Option<(u32, usize)>,
    }

    impl MemoryDriver {
        fn new(signature: [u8; 3]) -> Self {
            Self {
                signature,
                flash: vec![ERASED; 32 * 1024],
                eeprom: vec![ERASED; 1024],
                programming: false,
                enters: 0,
                exits: 0,
                completion: None,
                page_writes: Vec::new(),
                failing_page: None,
            }
        }

        fn atmega328p() -> Self {
            Self::new([0x1E, 0x95, 0x0F])
        }
    }

    impl HvProgrammer for MemoryDriver {
        fn protocol(&self) -> Protocol {
            Protocol::Parallel
        }

        fn enter_programming_mode(&mut self) -> Result<()> {
            if self.programming {
                return Err(Error::SequenceViolation(Sequence::AlreadyInProgrammingMode));
            }
            self.enters += 1;
            self.programming = true;
            Ok(())
        }

        fn exit_programming_mode(&mut self) {
            self.exits += 1;
            self.programming = false;
        }

        fn is_programming(&self) -> bool {
            self.programming
        }

        fn set_completion(&mut self, completion: Completion) {
            self.completion = Some(completion);
        }

        fn read_signature(&mut self) -> Result<[u8; 3]> {
            Ok(self.signature)
        }

        fn read_fuses(&mut self) -> Result<FuseSet> {
            Ok(FuseSet {
                low: 0x62,
                high: 0xDA,
                extended: 0xFF,
                lock: 0xFF,
                calibration: 0x80,
            })
        }

        fn chip_erase(&mut self) -> Result<()> {
            self.flash.iter_mut().for_each(|b| *b = ERASED);
            Ok(())
        }

        fn write_flash_page(&mut self, page_base: u32, data: &[u8]) -> Result<()> {
            if let Some((page, remaining)) = self.failing_page.as_mut() {
                if *page == page_base && *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::HardwareTimeout(Operation::FlashPage {
                        addr: page_base,
                    }));
                }
            }
            self.page_writes.push(page_base);
            let start = page_base as usize;
            for (dst, src) in self.flash[start..start + data.len()].iter_mut().zip(data) {
                *dst &= *src;
            }
            Ok(())
        }

        fn read_flash(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
            let start = addr as usize;
            buf.copy_from_slice(&self.flash[start..start + buf.len()]);
            Ok(())
        }

        fn write_eeprom_byte(&mut self, addr: u16, value: u8) -> Result<()> {
            self.eeprom[addr as usize] = value;
            Ok(())
        }

        fn read_eeprom_byte(&mut self, addr: u16) -> Result<u8> {
            Ok(self.eeprom[addr as usize])
        }

        fn write_fuse(&mut self, _fuse: Fuse, _value: u8) -> Result<()> {
            Ok(())
        }

        fn write_lock_bits(&mut self, _value: u8) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn session_brackets_programming_mode() {
        let mut driver = MemoryDriver::atmega328p();
        {
            let mut session = Session::begin(&mut driver).unwrap();
            session.detect().unwrap();
        }
        assert_eq!(driver.enters, 1);
        assert_eq!(driver.exits, 1);
        assert!(!driver.programming);
    }

    #[test]
    fn unsupported_chip_still_exits() {
        let mut driver = MemoryDriver::new([0x00, 0x00, 0x00]);
        let result = Session::begin(&mut driver).and_then(|mut s| s.detect().map(|_| ()));
        assert_eq!(
            result,
            Err(Error::UnsupportedChip {
                signature: [0, 0, 0]
            })
        );
        assert_eq!(driver.exits, 1);
    }

    #[test]
    fn detect_selects_completion_policy() {
        let mut driver = MemoryDriver::atmega328p();
        Session::begin(&mut driver).unwrap().detect().unwrap();
        assert_eq!(driver.completion, Some(Completion::Poll));

        let mut driver = MemoryDriver::new([0x1E, 0x93, 0x07]);
        let chip = Session::begin(&mut driver).unwrap().detect().unwrap();
        assert_eq!(chip.description, "ATmega8A");
        assert_eq!(driver.completion, Some(Completion::Timed));
    }

    #[test]
    fn writes_need_a_detected_chip() {
        let mut driver = MemoryDriver::atmega328p();
        let mut session = Session::begin(&mut driver).unwrap();
        let expected = Err(Error::SequenceViolation(Sequence::ChipNotDetected));
        assert_eq!(session.erase(), expected);
        assert_eq!(session.write_image(0, &[1, 2, 3]), expected);
        assert_eq!(session.write_fuse(Fuse::High, 0xDE), expected);
    }

    #[test]
    fn image_with_partial_last_page_is_fully_written() {
        let mut driver = MemoryDriver::atmega328p();
        let image: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
        {
            let mut session = Session::begin(&mut driver).unwrap();
            session.detect().unwrap();
            session.erase().unwrap();
            session.write_image(0x100, &image).unwrap();
            session.verify_flash(0x100, &image).unwrap();
            assert_eq!(session.errors(), 0);
        }
        assert_eq!(driver.page_writes, [0x100, 0x180, 0x200]);
        assert_eq!(&driver.flash[0x100..0x100 + 300], &image[..]);
        assert_eq!(driver.flash[0x100 + 300], ERASED);
    }

    #[test]
    fn transient_page_failure_is_retried_and_counted() {
        let mut driver = MemoryDriver::atmega328p();
        driver.failing_page = Some((0x80, 2));
        let image = [0x5A; 256];
        let errors = {
            let mut session = Session::begin(&mut driver).unwrap();
            session.detect().unwrap();
            session.write_image(0, &image).unwrap();
            session.errors()
        };
        assert_eq!(errors, 2);
        assert_eq!(driver.page_writes, [0x00, 0x80]);
        assert!(driver.flash[..256].iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn persistent_page_failure_aborts_stream() {
        let mut driver = MemoryDriver::atmega328p();
        driver.failing_page = Some((0x00, usize::MAX));
        let image = [0x00; 384];
        let (result, errors) = {
            let mut session = Session::begin(&mut driver).unwrap();
            session.detect().unwrap();
            let result = session.write_image(0, &image);
            (result, session.errors())
        };
        assert_eq!(
            result,
            Err(Error::HardwareTimeout(Operation::FlashPage { addr: 0 }))
        );
        // One attempt plus the retries, and no extra write when the stream stops
        assert_eq!(errors, 1 + MAX_RETRIES);
        assert!(driver.page_writes.is_empty());
        assert_eq!(driver.exits, 1);
    }

    #[test]
    fn verify_counts_every_mismatch_and_reports_first() {
        let mut driver = MemoryDriver::atmega328p();
        driver.flash[0x10] = 0x00;
        driver.flash[0x90] = 0x01;
        let image = [ERASED; 0x100];

        let mut session = Session::begin(&mut driver).unwrap();
        session.detect().unwrap();
        assert_eq!(
            session.verify_flash(0, &image),
            Err(Error::VerifyMismatch {
                addr: 0x10,
                expected: 0xFF,
                found: 0x00
            })
        );
        assert_eq!(session.errors(), 2);
    }

    #[test]
    fn image_past_end_of_flash_is_rejected() {
        let mut driver = MemoryDriver::atmega328p();
        let mut session = Session::begin(&mut driver).unwrap();
        session.detect().unwrap();
        assert_eq!(
            session.write_image(0x7F00, &[0; 0x101]),
            Err(Error::AddressOutOfBounds)
        );
        assert_eq!(
            session.write_eeprom(0xFFFF, &[1, 2]),
            Err(Error::AddressOutOfBounds)
        );
    }

    #[test]
    fn bootloader_start_follows_fuses() {
        let mut driver = MemoryDriver::atmega328p();
        let mut session = Session::begin(&mut driver).unwrap();
        session.detect().unwrap();
        // high fuse 0xDA: BOOTSZ = 01, four times 512 bytes
        assert_eq!(session.bootloader_start().unwrap(), Some(0x8000 - 2048));
    }

    #[test]
    fn eeprom_bytes_land_at_offset() {
        let mut driver = MemoryDriver::atmega328p();
        {
            let mut session = Session::begin(&mut driver).unwrap();
            session.detect().unwrap();
            session.write_eeprom(0x20, &[0xDE, 0xAD]).unwrap();

            let mut back = [0u8; 3];
            session.read_eeprom(0x1F, &mut back).unwrap();
            assert_eq!(back, [ERASED, 0xDE, 0xAD]);
        }
        assert_eq!(&driver.eeprom[0x20..0x22], &[0xDE, 0xAD]);
    }
}
