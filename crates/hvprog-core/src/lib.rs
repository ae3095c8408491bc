//! hvprog-core - Core library for high-voltage AVR programming
//!
//! This crate provides the protocol engine for identifying and programming
//! AVR microcontrollers in high-voltage mode, either over the parallel
//! interface (HVPP) or the serial interface (HVSP). It is `no_std`
//! compatible so the same engine can run on the host driving GPIO lines or
//! on a microcontroller acting as the programmer.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//!
//! # Example
//!
//! ```ignore
//! use hvprog_core::flash::Session;
//! use hvprog_core::programmer::HvProgrammer;
//!
//! fn upload<M: HvProgrammer>(master: &mut M, image: &[u8]) -> hvprog_core::Result<()> {
//!     let mut session = Session::begin(master)?;
//!     let chip = session.detect()?;
//!     println!("Found: {}", chip.description);
//!     session.erase()?;
//!     session.write_image(0, image)?;
//!     Ok(())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod chip;
pub mod error;
pub mod flash;
pub mod programmer;
pub mod protocol;

pub use error::{Error, Result};
