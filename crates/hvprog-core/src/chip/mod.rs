//! AVR chip types and catalog
//!
//! This module provides the types describing chip geometry and fuse
//! bytes, as well as the static catalog of known chips.

mod database;
mod types;

pub use database::*;
pub use types::*;
