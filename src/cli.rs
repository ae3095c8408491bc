//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use hvprog_core::chip::Fuse;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a fuse or lock byte, hex (0x..) or decimal
fn parse_byte(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range for a byte: {}", s))
}

/// Parse a fuse name
fn parse_fuse(s: &str) -> Result<Fuse, String> {
    Fuse::from_name(&s.to_ascii_lowercase())
        .ok_or_else(|| format!("Unknown fuse '{}', expected low, high or extended", s))
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "hvprog")]
#[command(author, version, about = "High-voltage AVR programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where an image goes and how it is checked
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PlacementArgs {
    /// Start address (defaults to the lowest address in a hex file, or 0)
    #[arg(long, value_parser = parse_hex_u32, conflicts_with = "bootloader")]
    pub base: Option<u32>,

    /// Place the image at the start of the bootloader section selected by the fuses
    #[arg(long)]
    pub bootloader: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the target chip and show its fuses
    Detect {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Read fuse, lock and calibration bytes
    Fuses {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Program one fuse byte
    WriteFuse {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Fuse to write (low, high, extended)
        #[arg(value_parser = parse_fuse)]
        fuse: Fuse,

        /// New value (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_byte)]
        value: u8,
    },

    /// Program the lock bits
    Lock {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// New lock byte (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_byte)]
        value: u8,
    },

    /// Erase flash and EEPROM and clear the lock bits
    Erase {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,
    },

    /// Write an Intel hex or raw binary image
    Write {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Input file (.hex is parsed as Intel hex, anything else is raw binary)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        placement: PlacementArgs,

        /// Write to EEPROM instead of flash
        #[arg(long, conflicts_with = "bootloader")]
        eeprom: bool,

        /// Don't erase before writing
        #[arg(long)]
        no_erase: bool,

        /// Skip read-back verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Compare flash contents against an image
    Verify {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Input file (.hex is parsed as Intel hex, anything else is raw binary)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    /// List supported chips
    ListChips {
        /// Only show chips whose name contains this string
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// List available programmers
    ListProgrammers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_hex_u32("0x7E00"), Ok(0x7E00));
        assert_eq!(parse_hex_u32("512"), Ok(512));
        assert_eq!(parse_byte("0xDE"), Ok(0xDE));
        assert!(parse_byte("0x100").is_err());
    }

    #[test]
    fn fuse_names_are_case_insensitive() {
        assert_eq!(parse_fuse("HFUSE"), Ok(Fuse::High));
        assert!(parse_fuse("lock").is_err());
    }

    #[test]
    fn write_command_parses() {
        let cli = Cli::try_parse_from([
            "hvprog", "write", "-p", "dummy", "-i", "blink.hex", "--bootloader", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Write { placement, .. } => {
                assert!(placement.bootloader);
                assert_eq!(placement.base, None);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn base_and_bootloader_conflict() {
        assert!(Cli::try_parse_from([
            "hvprog", "verify", "-p", "dummy", "-i", "a.bin", "--base", "0", "--bootloader",
        ])
        .is_err());
    }

    #[test]
    fn man_page_lists_subcommands() {
        use clap::CommandFactory;

        let mut page = Vec::new();
        clap_mangen::Man::new(Cli::command()).render(&mut page).unwrap();
        let page = String::from_utf8(page).unwrap();
        assert!(page.contains("SUBCOMMANDS"));
        assert!(page.contains("verify"));
    }
}
