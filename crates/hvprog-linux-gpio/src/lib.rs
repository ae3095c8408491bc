//! hvprog-linux-gpio - Linux GPIO high-voltage programming support
//!
//! This crate drives the high-voltage programming wiring of an AVR target
//! from GPIO lines using the Linux character device GPIO interface
//! (gpiocdev). Both protocols are bitbanged: the parallel interface needs
//! 17 lines plus the ready input, the serial one needs five.
//!
//! The 12V on /RESET is not switched by the host directly. A transistor
//! and MOSFET high-side driver, fed through an RC network from target VCC,
//! raise /RESET about 40us after VCC comes up.
//!
//! # Example
//!
//! ```no_run
//! use hvprog_core::flash::Session;
//! use hvprog_core::protocol::SerialProgrammer;
//! use hvprog_linux_gpio::{LinuxGpioSerial, SerialPinConfig};
//!
//! let pins = LinuxGpioSerial::open("/dev/gpiochip0", &SerialPinConfig::default())?;
//! let mut programmer = SerialProgrammer::new(pins);
//!
//! let mut session = Session::begin(&mut programmer)?;
//! let chip = session.detect()?;
//! println!("Found {}", chip.description);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with hvprog CLI
//!
//! ```bash
//! # Parallel wiring with the reference pin assignment
//! hvprog detect -p linux_gpio:gpiochip=0
//!
//! # Serial wiring on custom lines
//! hvprog fuses -p linux_gpio:dev=/dev/gpiochip0,mode=serial,vcc=17,sdi=22,sii=23,sdo=24,sci=27
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;

// Re-exports
pub use device::{
    parse_options, LinuxGpioConfig, LinuxGpioParallel, LinuxGpioSerial, ParallelPinConfig,
    PinConfig, SerialPinConfig,
};
pub use error::{LinuxGpioError, Result};

use hvprog_core::programmer::HvProgrammer;
use hvprog_core::protocol::{ParallelProgrammer, SerialProgrammer};

/// Open a Linux GPIO programmer and return it as a boxed driver
///
/// This is a convenience function for use in the CLI programmer dispatch.
/// The protocol driver is picked from the `mode` option.
///
/// # Arguments
///
/// * `options` - Slice of (key, value) pairs from programmer string parsing
pub fn open_linux_gpio(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn HvProgrammer>, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    let programmer: Box<dyn HvProgrammer> = match &config.pins {
        PinConfig::Parallel(pins) => Box::new(ParallelProgrammer::new(LinuxGpioParallel::open(
            &config.device,
            pins,
        )?)),
        PinConfig::Serial(pins) => Box::new(SerialProgrammer::new(LinuxGpioSerial::open(
            &config.device,
            pins,
        )?)),
    };
    Ok(programmer)
}
