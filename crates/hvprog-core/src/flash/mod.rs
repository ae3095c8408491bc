//! Flash programming
//!
//! This module provides the page write engine and the session controller
//! that drives a programmer through detection, erase, writes and
//! verification.

mod page;
mod progress;
mod session;

pub use page::{ErrorCounter, PageWriter, ERASED, MAX_PAGE_SIZE};
pub use progress::{NoProgress, WriteProgress};
pub use session::{Session, MAX_RETRIES};
