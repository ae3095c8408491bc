//! Image write and verify commands

use hvprog_core::flash::{Session, WriteProgress};
use hvprog_core::programmer::HvProgrammer;

use super::image::Image;
use super::progress::IndicatifProgress;
use crate::cli::PlacementArgs;

/// What the `write` command should do besides programming
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Program EEPROM instead of flash
    pub eeprom: bool,
    /// Chip erase before programming flash
    pub erase: bool,
    /// Read back and compare after programming
    pub verify: bool,
}

/// Pick the flash address the image goes to
fn resolve_base<M: HvProgrammer + ?Sized>(
    session: &mut Session<'_, M>,
    image: &Image,
    placement: &PlacementArgs,
) -> Result<u32, Box<dyn std::error::Error>> {
    if !placement.bootloader {
        return Ok(placement.base.unwrap_or(image.base));
    }

    let chip = session.chip()?;
    let start = session
        .bootloader_start()?
        .ok_or_else(|| format!("{} has no bootloader section", chip.description))?;
    let section = chip.flash_size - start;
    if image.data.len() as u64 > section as u64 {
        return Err(format!(
            "Bootloader image is {} bytes but the section selected by the fuses is {} bytes",
            image.data.len(),
            section
        )
        .into());
    }
    Ok(start)
}

/// Write an image to flash or EEPROM
pub fn run_write<M: HvProgrammer + ?Sized>(
    master: &mut M,
    image: &Image,
    placement: &PlacementArgs,
    options: WriteOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;
    println!("Chip: {}", chip.description);

    if options.eeprom {
        return write_eeprom(&mut session, image, placement, options.verify);
    }

    let base = resolve_base(&mut session, image, placement)?;
    let mut progress = IndicatifProgress::new();

    if options.erase {
        progress.erasing();
        session.erase()?;
    }

    session.write_image_with_progress(base, &image.data, &mut progress)?;
    println!("Wrote {} bytes at 0x{:05X}", image.data.len(), base);

    if options.verify {
        session.verify_flash_with_progress(base, &image.data, &mut progress)?;
        println!("Verification passed");
    }

    report_errors(session.errors());
    Ok(())
}

fn write_eeprom<M: HvProgrammer + ?Sized>(
    session: &mut Session<'_, M>,
    image: &Image,
    placement: &PlacementArgs,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = placement.base.unwrap_or(image.base);
    let base = u16::try_from(base)
        .map_err(|_| format!("EEPROM address 0x{:X} out of range", base))?;

    session.write_eeprom(base, &image.data)?;
    println!("Wrote {} EEPROM bytes at 0x{:04X}", image.data.len(), base);

    if verify {
        let mut actual = vec![0u8; image.data.len()];
        session.read_eeprom(base, &mut actual)?;
        if let Some(offset) = image.data.iter().zip(&actual).position(|(a, b)| a != b) {
            return Err(format!(
                "EEPROM verify failed at 0x{:04X}: expected 0x{:02X}, found 0x{:02X}",
                base as usize + offset,
                image.data[offset],
                actual[offset]
            )
            .into());
        }
        println!("Verification passed");
    }

    report_errors(session.errors());
    Ok(())
}

/// Compare flash against an image
pub fn run_verify<M: HvProgrammer + ?Sized>(
    master: &mut M,
    image: &Image,
    placement: &PlacementArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::begin(master)?;
    let chip = session.detect()?;
    println!("Chip: {}", chip.description);

    let base = resolve_base(&mut session, image, placement)?;
    let mut progress = IndicatifProgress::new();
    let result = session.verify_flash_with_progress(base, &image.data, &mut progress);
    if result.is_err() {
        eprintln!("{} bytes differ", session.errors());
    }
    result?;

    println!("Verification passed");
    Ok(())
}

fn report_errors(errors: usize) {
    if errors > 0 {
        log::warn!("{} recoverable errors during programming", errors);
    }
}
