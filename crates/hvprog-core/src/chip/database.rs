//! Static chip catalog
//!
//! Adding support for a chip means appending an entry here; lookup logic
//! never changes. Entries are matched by exact signature and the first
//! match wins.

use super::types::{ChipSignature, Fuse, KB};

const fn entry(
    signature: [u8; 3],
    description: &'static str,
    flash_size: u32,
    base_bootloader_size: u32,
    page_size: u16,
    boot_fuse: Option<Fuse>,
    timed_writes: bool,
) -> ChipSignature {
    ChipSignature {
        signature,
        description,
        flash_size,
        base_bootloader_size,
        page_size,
        boot_fuse,
        timed_writes,
    }
}

const HIGH: Option<Fuse> = Some(Fuse::High);
const EXT: Option<Fuse> = Some(Fuse::Extended);
const NONE: Option<Fuse> = None;

/// All known chips
#[rustfmt::skip]
pub static CHIPS: &[ChipSignature] = &[
    //     signature            description      flash      boot     page  fuse  timed

    // ATtiny84 family
    entry([0x1E, 0x91, 0x0B], "ATtiny24",       2 * KB,        0,    32, NONE, false),
    entry([0x1E, 0x92, 0x07], "ATtiny44",       4 * KB,        0,    64, NONE, false),
    entry([0x1E, 0x93, 0x0C], "ATtiny84",       8 * KB,        0,    64, NONE, false),

    // ATtiny85 family
    entry([0x1E, 0x91, 0x08], "ATtiny25",       2 * KB,        0,    32, NONE, false),
    entry([0x1E, 0x92, 0x06], "ATtiny45",       4 * KB,        0,    64, NONE, false),
    entry([0x1E, 0x93, 0x0B], "ATtiny85",       8 * KB,        0,    64, NONE, false),

    // ATmega328 family
    entry([0x1E, 0x92, 0x0A], "ATmega48PA",     4 * KB,        0,    64, NONE, false),
    entry([0x1E, 0x93, 0x0F], "ATmega88PA",     8 * KB,      256,   128, EXT,  false),
    entry([0x1E, 0x94, 0x0B], "ATmega168PA",   16 * KB,      256,   128, EXT,  false),
    entry([0x1E, 0x94, 0x06], "ATmega168V",    16 * KB,      256,   128, EXT,  false),
    entry([0x1E, 0x95, 0x0F], "ATmega328P",    32 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x95, 0x16], "ATmega328PB",   32 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x95, 0x14], "ATmega328",     32 * KB,      512,   128, HIGH, false),

    // ATmega644 family
    entry([0x1E, 0x94, 0x0A], "ATmega164P",    16 * KB,      256,   128, HIGH, false),
    entry([0x1E, 0x95, 0x08], "ATmega324P",    32 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x96, 0x0A], "ATmega644P",    64 * KB,   1 * KB,   256, HIGH, false),

    // ATmega2560 family
    entry([0x1E, 0x96, 0x08], "ATmega640",     64 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0x97, 0x03], "ATmega1280",   128 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0x97, 0x04], "ATmega1281",   128 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0x98, 0x01], "ATmega2560",   256 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0x98, 0x02], "ATmega2561",   256 * KB,   1 * KB,   256, HIGH, false),

    // AT90USB family
    entry([0x1E, 0x93, 0x82], "AT90USB82",      8 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x94, 0x82], "AT90USB162",    16 * KB,      512,   128, HIGH, false),

    // ATmega32U2 family
    entry([0x1E, 0x93, 0x89], "ATmega8U2",      8 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x94, 0x89], "ATmega16U2",    16 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x95, 0x8A], "ATmega32U2",    32 * KB,      512,   128, HIGH, false),

    // ATmega32U4 family (128-byte pages, not 128 words)
    entry([0x1E, 0x94, 0x88], "ATmega16U4",    16 * KB,      512,   128, HIGH, false),
    entry([0x1E, 0x95, 0x87], "ATmega32U4",    32 * KB,      512,   128, HIGH, false),

    // ATmega1284P family
    entry([0x1E, 0x97, 0x05], "ATmega1284P",  128 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0x97, 0x06], "ATmega1284",   128 * KB,   1 * KB,   256, HIGH, false),

    // ATtiny4313 family
    entry([0x1E, 0x91, 0x0A], "ATtiny2313A",    2 * KB,        0,    32, NONE, false),
    entry([0x1E, 0x92, 0x0D], "ATtiny4313",     4 * KB,        0,    64, NONE, false),

    // ATtiny13 family
    entry([0x1E, 0x90, 0x07], "ATtiny13A",      1 * KB,        0,    32, NONE, false),

    // ATmega8A family (RDY/BSY is not usable during HV programming)
    entry([0x1E, 0x93, 0x07], "ATmega8A",       8 * KB,      256,    64, HIGH, true),

    // ATmega64RFR2 family
    entry([0x1E, 0xA6, 0x02], "ATmega64RFR2",  64 * KB,   1 * KB,   256, HIGH, false),
    entry([0x1E, 0xA7, 0x02], "ATmega128RFR2", 128 * KB,  1 * KB,   256, HIGH, false),
    entry([0x1E, 0xA8, 0x02], "ATmega256RFR2", 256 * KB,  1 * KB,   256, HIGH, false),

    // ATmega64 family
    entry([0x1E, 0x96, 0x02], "ATmega64A",     64 * KB,   1 * KB,   256, HIGH, false),
];

/// Find the catalog entry for a signature
///
/// Returns `None` when the target is not supported; that is a valid outcome,
/// not an error.
pub fn lookup(signature: &[u8; 3]) -> Option<&'static ChipSignature> {
    CHIPS.iter().find(|chip| chip.matches(signature))
}

/// Find a catalog entry by model name (case-insensitive)
pub fn find_by_name(name: &str) -> Option<&'static ChipSignature> {
    CHIPS
        .iter()
        .find(|chip| chip.description.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_atmega328p() {
        let chip = lookup(&[0x1E, 0x95, 0x0F]).unwrap();
        assert_eq!(chip.description, "ATmega328P");
        assert_eq!(chip.flash_size, 32 * KB);
        assert_eq!(chip.page_size, 128);
        assert_eq!(chip.boot_fuse, Some(Fuse::High));
        assert!(!chip.timed_writes);
    }

    #[test]
    fn lookup_unknown_signature() {
        assert!(lookup(&[0x00, 0x00, 0x00]).is_none());
        assert!(lookup(&[0xFF, 0xFF, 0xFF]).is_none());
    }

    #[test]
    fn signatures_are_unique() {
        for (i, a) in CHIPS.iter().enumerate() {
            for b in &CHIPS[i + 1..] {
                assert_ne!(a.signature, b.signature, "{} / {}", a.description, b.description);
            }
        }
    }

    #[test]
    fn geometry_is_consistent() {
        for chip in CHIPS {
            assert!(chip.page_size.is_power_of_two(), "{}", chip.description);
            assert_eq!(chip.flash_size % chip.page_size as u32, 0, "{}", chip.description);
            assert_eq!(
                chip.boot_fuse.is_some(),
                chip.base_bootloader_size > 0,
                "{}",
                chip.description
            );
        }
    }

    #[test]
    fn only_atmega8a_needs_timed_writes() {
        let timed: heapless::Vec<&str, 4> = CHIPS
            .iter()
            .filter(|c| c.timed_writes)
            .map(|c| c.description)
            .collect();
        assert_eq!(timed.len(), 1);
        assert_eq!(timed[0], "ATmega8A");
    }

    #[test]
    fn find_by_name_ignores_case() {
        assert_eq!(find_by_name("attiny85").unwrap().signature, [0x1E, 0x93, 0x0B]);
        assert!(find_by_name("ATmega9999").is_none());
    }
}
