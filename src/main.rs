//! hvprog - High-voltage programmer for AVR microcontrollers
//!
//! Talks to AVR targets in high-voltage programming mode, over either the
//! parallel interface (HVPP, most ATmega parts) or the serial interface
//! (HVSP, 8 and 14 pin ATtiny parts). High-voltage mode works regardless of
//! the fuse settings, so it can recover chips whose reset pin, SPI
//! programming or clock source have been disabled.
//!
//! # Architecture
//!
//! - `hvprog-core` holds the chip catalog, both protocol drivers, the page
//!   write engine and the session controller
//! - each programmer backend provides pin-level access for one kind of
//!   hardware and is selected with `-p name[:key=value,...]`
//! - commands open a session, identify the chip and then act on it

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use commands::image::Image;
use commands::program::WriteOptions;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Detect { programmer } => {
            programmers::with_programmer(&programmer, |master| {
                commands::target::run_detect(master)
            })
        }
        Commands::Fuses { programmer } => {
            programmers::with_programmer(&programmer, |master| commands::target::run_fuses(master))
        }
        Commands::WriteFuse {
            programmer,
            fuse,
            value,
        } => programmers::with_programmer(&programmer, |master| {
            commands::target::run_write_fuse(master, fuse, value)
        }),
        Commands::Lock { programmer, value } => {
            programmers::with_programmer(&programmer, |master| {
                commands::target::run_lock(master, value)
            })
        }
        Commands::Erase { programmer } => {
            programmers::with_programmer(&programmer, |master| commands::target::run_erase(master))
        }
        Commands::Write {
            programmer,
            input,
            placement,
            eeprom,
            no_erase,
            no_verify,
        } => {
            // Load the image before touching the target
            let image = Image::load(&input)?;
            let options = WriteOptions {
                eeprom,
                erase: !no_erase,
                verify: !no_verify,
            };
            programmers::with_programmer(&programmer, |master| {
                commands::program::run_write(master, &image, &placement, options)
            })
        }
        Commands::Verify {
            programmer,
            input,
            placement,
        } => {
            let image = Image::load(&input)?;
            programmers::with_programmer(&programmer, |master| {
                commands::program::run_verify(master, &image, &placement)
            })
        }
        Commands::ListChips { filter } => {
            commands::list_chips(filter.as_deref());
            Ok(())
        }
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    };

    result
}
