//! Protocol implementations
//!
//! This module contains the command sequences for the two high-voltage
//! programming protocols, each driving the target through a pin-level
//! backend.

pub mod commands;
mod hvpp;
mod hvsp;

pub use hvpp::ParallelProgrammer;
pub use hvsp::SerialProgrammer;

use crate::error::{Error, Operation, Result};
use crate::programmer::Completion;
use commands::{POLL_INTERVAL_US, READY_TIMEOUT_US};

/// Something that can report target readiness and wait
pub(crate) trait ReadySource {
    /// Sample the ready condition once
    fn poll_ready(&mut self) -> bool;

    /// Delay for the specified number of microseconds
    fn wait_us(&mut self, us: u32);
}

/// Wait for a write-class command to finish
///
/// With [`Completion::Poll`] the ready condition is sampled every
/// `POLL_INTERVAL_US` until `READY_TIMEOUT_US` is spent. With
/// [`Completion::Timed`] the ready condition is never sampled and the
/// function waits `timed_us` unconditionally.
pub(crate) fn wait_ready<R: ReadySource + ?Sized>(
    source: &mut R,
    completion: Completion,
    timed_us: u32,
    op: Operation,
) -> Result<()> {
    match completion {
        Completion::Timed => {
            source.wait_us(timed_us);
            Ok(())
        }
        Completion::Poll => {
            let max_polls = READY_TIMEOUT_US / POLL_INTERVAL_US;
            for _ in 0..max_polls {
                if source.poll_ready() {
                    return Ok(());
                }
                source.wait_us(POLL_INTERVAL_US);
            }
            log::error!("{} did not complete within {}us", op, READY_TIMEOUT_US);
            Err(Error::HardwareTimeout(op))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        busy_polls: u32,
        polls: u32,
        waited_us: u32,
    }

    impl ReadySource for Countdown {
        fn poll_ready(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.busy_polls
        }

        fn wait_us(&mut self, us: u32) {
            self.waited_us += us;
        }
    }

    #[test]
    fn poll_returns_once_ready() {
        let mut src = Countdown {
            busy_polls: 3,
            polls: 0,
            waited_us: 0,
        };
        wait_ready(&mut src, Completion::Poll, 5_000, Operation::ChipErase).unwrap();
        assert_eq!(src.polls, 4);
        assert_eq!(src.waited_us, 3 * POLL_INTERVAL_US);
    }

    #[test]
    fn poll_gives_up_after_budget() {
        let mut src = Countdown {
            busy_polls: u32::MAX,
            polls: 0,
            waited_us: 0,
        };
        let err = wait_ready(&mut src, Completion::Poll, 5_000, Operation::Fuse).unwrap_err();
        assert_eq!(err, Error::HardwareTimeout(Operation::Fuse));
        assert_eq!(src.polls, READY_TIMEOUT_US / POLL_INTERVAL_US);
    }

    #[test]
    fn timed_never_polls() {
        let mut src = Countdown {
            busy_polls: u32::MAX,
            polls: 0,
            waited_us: 0,
        };
        wait_ready(&mut src, Completion::Timed, 4_500, Operation::LockBits).unwrap();
        assert_eq!(src.polls, 0);
        assert_eq!(src.waited_us, 4_500);
    }
}
