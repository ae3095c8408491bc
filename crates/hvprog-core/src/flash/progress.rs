//! Progress reporting hooks

/// Callback for progress reporting during long-running session operations
///
/// All methods default to doing nothing so reporters only implement what
/// they display.
pub trait WriteProgress {
    /// Called when a chip erase starts
    fn erasing(&mut self) {}

    /// Called when starting to stream an image into flash
    fn writing(&mut self, _total_bytes: usize) {}

    /// Called after each committed page with the bytes handled so far
    fn write_progress(&mut self, _bytes_written: usize) {}

    /// Called when starting to read flash back for comparison
    fn verifying(&mut self, _total_bytes: usize) {}

    /// Called after each compared chunk
    fn verify_progress(&mut self, _bytes_verified: usize) {}

    /// Called when the operation has finished, with the session error count
    fn complete(&mut self, _errors: usize) {}
}

/// A no-op progress reporter
pub struct NoProgress;

impl WriteProgress for NoProgress {}
