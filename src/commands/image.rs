//! Input image loading
//!
//! Files ending in `.hex`, `.ihex` or `.eep` are parsed as Intel hex;
//! anything else is taken as a raw binary placed at address 0.

use std::path::Path;

/// Largest image accepted, the flash size of the biggest catalog chip
pub const MAX_IMAGE_SIZE: u32 = 256 * 1024;

/// Errors from loading an image file
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8 text")]
    NotText { path: String },

    #[error("malformed Intel hex: {0}")]
    Hex(#[from] ihex::ReaderError),

    #[error("image contains no data")]
    Empty,

    #[error("image spans 0x{start:05X}..0x{end:05X}, larger than any supported flash")]
    TooLarge { start: u32, end: u32 },
}

/// A contiguous run of bytes and the address it was built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Address of the first byte
    pub base: u32,
    /// Image contents; holes in a hex file are filled with 0xFF
    pub data: Vec<u8>,
}

impl Image {
    /// Load an image from disk, picking the format from the file extension
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
            path: display.clone(),
            source,
        })?;

        let is_hex = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "hex" | "ihex" | "eep"));

        let image = if is_hex {
            let text = String::from_utf8(bytes).map_err(|_| ImageError::NotText { path: display })?;
            Self::from_ihex(&text)?
        } else {
            Self::from_binary(bytes)?
        };

        log::info!(
            "Loaded {} bytes for 0x{:05X} from {}",
            image.data.len(),
            image.base,
            path.display()
        );
        Ok(image)
    }

    /// Wrap raw bytes placed at address 0
    pub fn from_binary(data: Vec<u8>) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        if data.len() as u64 > MAX_IMAGE_SIZE as u64 {
            return Err(ImageError::TooLarge {
                start: 0,
                end: u32::try_from(data.len()).unwrap_or(u32::MAX),
            });
        }
        Ok(Self { base: 0, data })
    }

    /// Parse Intel hex text into one contiguous image
    pub fn from_ihex(text: &str) -> Result<Self, ImageError> {
        let mut segments: Vec<(u32, Vec<u8>)> = Vec::new();
        let mut base_address = 0u32;

        for record in ihex::Reader::new(text) {
            match record? {
                ihex::Record::Data { value, .. } if value.is_empty() => {}
                ihex::Record::Data { offset, value } => {
                    let addr = base_address
                        .checked_add(offset as u32)
                        .ok_or(ImageError::TooLarge {
                            start: base_address,
                            end: u32::MAX,
                        })?;
                    segments.push((addr, value));
                }
                ihex::Record::EndOfFile => break,
                ihex::Record::ExtendedSegmentAddress(address) => {
                    base_address = (address as u32) * 16;
                }
                ihex::Record::ExtendedLinearAddress(address) => {
                    base_address = (address as u32) << 16;
                }
                ihex::Record::StartSegmentAddress { .. } | ihex::Record::StartLinearAddress(_) => {}
            }
        }

        let start = segments
            .iter()
            .map(|(addr, _)| *addr)
            .min()
            .ok_or(ImageError::Empty)?;
        let mut end = start;
        for (addr, value) in &segments {
            let segment_end = u32::try_from(value.len())
                .ok()
                .and_then(|len| addr.checked_add(len))
                .ok_or(ImageError::TooLarge {
                    start,
                    end: u32::MAX,
                })?;
            end = end.max(segment_end);
        }
        if end - start > MAX_IMAGE_SIZE {
            return Err(ImageError::TooLarge { start, end });
        }

        let mut data = vec![0xFF; (end - start) as usize];
        for (addr, value) in segments {
            let offset = (addr - start) as usize;
            data[offset..offset + value.len()].copy_from_slice(&value);
        }

        Ok(Self { base: start, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_hex() {
        let hex = ":100000000C945C000C946E000C946E000C946E00CA\n\
                   :00000001FF\n";
        let image = Image::from_ihex(hex).unwrap();
        assert_eq!(image.base, 0);
        assert_eq!(image.data.len(), 16);
        assert_eq!(&image.data[..4], &[0x0C, 0x94, 0x5C, 0x00]);
    }

    #[test]
    fn fills_gaps_with_erased_bytes() {
        let hex = ":020000001122CB\n\
                   :02000400334483\n\
                   :00000001FF\n";
        let image = Image::from_ihex(hex).unwrap();
        assert_eq!(image.data, vec![0x11, 0x22, 0xFF, 0xFF, 0x33, 0x44]);
    }

    #[test]
    fn honours_extended_linear_address() {
        // Bootloader of an ATmega2560 at 0x3E000
        let hex = ":020000040003F7\n\
                   :02E00000AABBB9\n\
                   :00000001FF\n";
        let image = Image::from_ihex(hex).unwrap();
        assert_eq!(image.base, 0x3E000);
        assert_eq!(image.data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn empty_records_do_not_move_the_base() {
        let hex = ":0000000000
                   :020000040001F9
                   :0100000011EE
                   :00000001FF
";
        let image = Image::from_ihex(hex).unwrap();
        assert_eq!(image.base, 0x10000);
        assert_eq!(image.data, vec![0x11]);
    }

    #[test]
    fn rejects_records_past_the_address_space() {
        // Two bytes at 0xFFFFFFFF run past the end of a 32-bit address
        let hex = ":02000004FFFFFC
                   :02FFFF001122CD
                   :00000001FF
";
        assert!(matches!(
            Image::from_ihex(hex),
            Err(ImageError::TooLarge { .. })
        ));
    }

    #[test]
    fn rejects_bad_checksum() {
        let hex = ":020000001122CC\n:00000001FF\n";
        assert!(matches!(Image::from_ihex(hex), Err(ImageError::Hex(_))));
    }

    #[test]
    fn rejects_empty_images() {
        assert!(matches!(Image::from_ihex(":00000001FF\n"), Err(ImageError::Empty)));
        assert!(matches!(Image::from_binary(Vec::new()), Err(ImageError::Empty)));
    }

    #[test]
    fn rejects_sparse_images_wider_than_any_chip() {
        let hex = ":0100000011EE\n\
                   :020000040010EA\n\
                   :0100000022DD\n\
                   :00000001FF\n";
        assert!(matches!(
            Image::from_ihex(hex),
            Err(ImageError::TooLarge { start: 0, .. })
        ));
    }
}
