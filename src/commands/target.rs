//! Identification, fuse, lock and erase commands

use hvprog_core::chip::{ChipSignature, Fuse, FuseSet};
use hvprog_core::flash::Session;
use hvprog_core::programmer::HvProgrammer;

use super::list::{format_signature, format_size};

/// Print chip information
fn print_chip_info(chip: &ChipSignature, fuses: &FuseSet) {
    println!("Chip: {}", chip.description);
    println!("  Signature:  {}", format_signature(&chip.signature));
    println!(
        "  Flash:      {} ({} pages of {} bytes)",
        format_size(chip.flash_size),
        chip.flash_size / chip.page_size as u32,
        chip.page_size
    );
    match (chip.bootloader_size(fuses), chip.bootloader_start(fuses)) {
        (Some(size), Some(start)) => println!(
            "  Bootloader: {} at 0x{:05X} (BOOTSZ in {} fuse)",
            format_size(size),
            start,
            chip.boot_fuse.map_or("", Fuse::name)
        ),
        _ => println!("  Bootloader: none"),
    }
    if chip.timed_writes {
        println!("  Writes are timed, the ready line is not polled");
    }
}

/// Print fuse, lock and calibration bytes
fn print_fuses(fuses: &FuseSet) {
    println!("Fuses:");
    println!("  Low:         0x{:02X}", fuses.low);
    println!("  High:        0x{:02X}", fuses.high);
    println!("  Extended:    0x{:02X}", fuses.extended);
    println!("  Lock:        0x{:02X}", fuses.lock);
    println!("  Calibration: 0x{:02X}", fuses.calibration);
}

/// Identify the target and show its geometry and fuses
pub fn run_detect<M: HvProgrammer + ?Sized>(
    master: &mut M,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;
    let fuses = session.read_fuses()?;
    print_chip_info(chip, &fuses);
    print_fuses(&fuses);
    Ok(())
}

/// Show fuse, lock and calibration bytes
pub fn run_fuses<M: HvProgrammer + ?Sized>(
    master: &mut M,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;
    println!("Chip: {}", chip.description);
    print_fuses(&session.read_fuses()?);
    Ok(())
}

/// Program one fuse byte and read it back
pub fn run_write_fuse<M: HvProgrammer + ?Sized>(
    master: &mut M,
    fuse: Fuse,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;

    let before = session.read_fuses()?.get(fuse);
    if before == value {
        println!("{} fuse already 0x{:02X}", fuse.name(), value);
        return Ok(());
    }

    log::info!(
        "Writing {} fuse of {}: 0x{:02X} -> 0x{:02X}",
        fuse.name(),
        chip.description,
        before,
        value
    );
    session.write_fuse(fuse, value)?;

    let after = session.read_fuses()?.get(fuse);
    if after != value {
        return Err(format!(
            "{} fuse reads back 0x{:02X} after writing 0x{:02X}",
            fuse.name(),
            after,
            value
        )
        .into());
    }
    println!("{} fuse: 0x{:02X} -> 0x{:02X}", fuse.name(), before, after);
    Ok(())
}

/// Program the lock bits
pub fn run_lock<M: HvProgrammer + ?Sized>(
    master: &mut M,
    value: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    session.detect()?;
    session.write_lock_bits(value)?;

    // Unprogrammed lock bits read back as 1
    let lock = session.read_fuses()?.lock;
    println!("Lock bits: 0x{:02X}", lock);
    if lock & value != lock {
        log::warn!(
            "Lock byte 0x{:02X} has bits set that were written as 0 (0x{:02X})",
            lock,
            value
        );
    }
    Ok(())
}

/// Erase flash and EEPROM and clear the lock bits
pub fn run_erase<M: HvProgrammer + ?Sized>(
    master: &mut M,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;
    session.erase()?;
    println!("Erased {}", chip.description);
    Ok(())
}
