//! List commands implementation

use crate::programmers;
use hvprog_core::chip::{self, ChipSignature, Fuse};

/// List all supported programmers
pub fn list_programmers() {
    let available = programmers::available_programmers();
    if available.is_empty() {
        println!("No programmers available (recompile with programmer features enabled)");
        return;
    }

    println!("Supported programmers:");
    println!();
    for p in &available {
        println!("  {:12} - {}", p.name, p.description);
        if !p.aliases.is_empty() {
            println!("  {:12}   aliases: {}", "", p.aliases.join(", "));
        }
    }
}

/// List all supported chips
pub fn list_chips(name_filter: Option<&str>) {
    println!("Supported chips:");
    println!();
    println!(
        "{:<15} {:>10} {:>8} {:>6} {:>12}  {}",
        "Name", "Signature", "Flash", "Page", "Boot (min)", "Notes"
    );
    println!("{}", "-".repeat(68));

    for chip in chip::CHIPS {
        // Apply name filter if specified
        if let Some(filter) = name_filter {
            if !chip
                .description
                .to_lowercase()
                .contains(&filter.to_lowercase())
            {
                continue;
            }
        }

        println!(
            "{:<15} {:>10} {:>8} {:>6} {:>12}  {}",
            chip.description,
            format_signature(&chip.signature),
            format_size(chip.flash_size),
            chip.page_size,
            format_boot(chip),
            if chip.timed_writes { "timed writes" } else { "" }
        );
    }
}

pub(crate) fn format_signature(signature: &[u8; 3]) -> String {
    format!("{:02X}{:02X}{:02X}", signature[0], signature[1], signature[2])
}

fn format_boot(chip: &ChipSignature) -> String {
    match chip.boot_fuse {
        Some(fuse) => format!("{} ({})", format_size(chip.base_bootloader_size), fuse_short(fuse)),
        None => "-".to_string(),
    }
}

fn fuse_short(fuse: Fuse) -> &'static str {
    match fuse {
        Fuse::Low => "lfuse",
        Fuse::High => "hfuse",
        Fuse::Extended => "efuse",
    }
}

pub(crate) fn format_size(bytes: u32) -> String {
    if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_and_signatures() {
        assert_eq!(format_size(32 * 1024), "32 KiB");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_signature(&[0x1E, 0x95, 0x0F]), "1E950F");
    }

    #[test]
    fn boot_column_names_the_fuse() {
        let chip = chip::find_by_name("ATmega328P").unwrap();
        assert_eq!(format_boot(chip), "512 B (hfuse)");
        let tiny = chip::find_by_name("ATtiny85").unwrap();
        assert_eq!(format_boot(tiny), "-");
    }
}
