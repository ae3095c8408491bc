//! CLI command implementations
//!
//! Every command that touches a target opens a [`Session`] on the selected
//! programmer, identifies the chip and then does its work. The session
//! leaves programming mode when it goes out of scope, whether the command
//! succeeded or not.
//!
//! [`Session`]: hvprog_core::flash::Session

pub mod image;
mod list;
pub mod program;
mod progress;
pub mod target;

pub use list::{list_chips, list_programmers};
