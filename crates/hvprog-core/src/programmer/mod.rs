//! Programmer traits and abstractions
//!
//! This module defines the driver-level trait every programmer implements
//! and the pin-level traits GPIO backends implement for the two
//! high-voltage protocols.

pub mod pins;
mod traits;

pub use pins::{Action, ControlLines, ParallelPins, SerialPins};
pub use traits::*;
