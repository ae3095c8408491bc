//! Page-buffered flash writes
//!
//! The target's flash controller programs whole pages, so incoming bytes are
//! collected in a one-page buffer and committed through the driver whenever
//! the stream moves to a different page.

use heapless::Vec;

use crate::error::{Error, Result, Sequence};
use crate::programmer::HvProgrammer;

/// Largest flash page of any supported chip
pub const MAX_PAGE_SIZE: usize = 256;

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

/// Running count of write and verify failures
///
/// Never reset while a session is open.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCounter(usize);

impl ErrorCounter {
    /// Count one failure
    pub fn record(&mut self) {
        self.0 += 1;
    }

    /// Failures counted so far
    pub fn count(&self) -> usize {
        self.0
    }
}

/// Page write engine
///
/// Accepts `(address, value)` pairs in any order within a page. A byte for
/// a different page commits the buffered one first. Bytes never written
/// within a page stay erased (0xFF), so sparse pages need no read-back.
///
/// [`flush()`](Self::flush) must be called once the stream ends; a final
/// partial page is otherwise never written.
pub struct PageWriter<'a, M: HvProgrammer + ?Sized> {
    master: &'a mut M,
    errors: &'a mut ErrorCounter,
    page_mask: u32,
    memory_size: u32,
    current_page: Option<u32>,
    buffer: Vec<u8, MAX_PAGE_SIZE>,
    dirty: bool,
}

impl<'a, M: HvProgrammer + ?Sized> PageWriter<'a, M> {
    /// Create an empty engine for a chip with the given page and memory size
    ///
    /// `page_size` must be a power of two no larger than [`MAX_PAGE_SIZE`].
    pub fn new(
        master: &'a mut M,
        errors: &'a mut ErrorCounter,
        page_size: u16,
        memory_size: u32,
    ) -> Result<Self> {
        let size = page_size as usize;
        if size < 2 || !size.is_power_of_two() || size > MAX_PAGE_SIZE {
            return Err(Error::InvalidPageSize);
        }

        let mut buffer = Vec::new();
        buffer
            .resize(size, ERASED)
            .map_err(|_| Error::InvalidPageSize)?;

        Ok(Self {
            master,
            errors,
            page_mask: !(page_size as u32 - 1),
            memory_size,
            current_page: None,
            buffer,
            dirty: false,
        })
    }

    /// Bytes per page
    pub fn page_size(&self) -> usize {
        self.buffer.len()
    }

    /// Page-aligned base of any byte address
    pub fn page_base(&self, addr: u32) -> u32 {
        addr & self.page_mask
    }

    /// Page currently buffered, `None` when empty
    pub fn current_page(&self) -> Option<u32> {
        self.current_page
    }

    /// Buffer one byte, committing the previous page if `addr` lies elsewhere
    ///
    /// If that commit fails the new byte is not buffered and the previous
    /// page stays pending, so the same call can simply be repeated.
    pub fn add_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        if addr >= self.memory_size {
            return Err(Error::AddressOutOfBounds);
        }

        let target = self.page_base(addr);
        if let Some(current) = self.current_page {
            if current != target {
                self.commit()?;
            }
        }

        self.current_page = Some(target);
        self.buffer[(addr - target) as usize] = value;
        self.dirty = true;
        Ok(())
    }

    /// Write the buffered page to the target
    ///
    /// The buffer returns to erase-state afterwards while the page stays
    /// current. Committing again without new bytes does nothing. On failure
    /// the buffer is kept for a retry and recoverable errors are counted.
    pub fn commit(&mut self) -> Result<()> {
        let page = self
            .current_page
            .ok_or(Error::SequenceViolation(Sequence::NothingBuffered))?;
        if !self.dirty {
            return Ok(());
        }

        log::trace!("Committing page 0x{:05X}", page);
        if let Err(e) = self.master.write_flash_page(page, &self.buffer) {
            if e.is_recoverable() {
                self.errors.record();
            }
            log::warn!("Page 0x{:05X} not written: {}", page, e);
            return Err(e);
        }

        self.buffer.iter_mut().for_each(|b| *b = ERASED);
        self.dirty = false;
        Ok(())
    }

    /// Commit whatever is buffered and return to the empty state
    ///
    /// A no-op when nothing is buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.current_page.is_none() {
            return Ok(());
        }
        self.commit()?;
        self.current_page = None;
        Ok(())
    }
}
