use derive_more::Display;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8; 6] = b"GIF87a";
const GIF89_MAGIC: &[u8; 6] = b"GIF89a";
const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const WEBP_MAGIC: &[u8; 4] = b"WEBP";

/// A recognised image encoding.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    #[display("jpeg")]
    Jpeg,
    #[display("png")]
    Png,
    #[display("gif")]
    Gif,
    #[display("webp")]
    WebP,
}

impl ImageFormat {
    /// Detect the image format from magic bytes.
    ///
    /// Returns `None` if no signature matches or the input is too short to
    /// contain one.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&JPEG_MAGIC) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(&PNG_MAGIC) {
            return Some(Self::Png);
        }
        if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
            return Some(Self::Gif);
        }
        // RIFF container: "RIFF", 4 bytes of length, then the form type.
        if bytes.len() >= 12 && bytes.starts_with(RIFF_MAGIC) && &bytes[8..12] == WEBP_MAGIC {
            return Some(Self::WebP);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], Some(ImageFormat::Jpeg))]
    #[case(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00], Some(ImageFormat::Png))]
    #[case(b"GIF89a\x01\x00", Some(ImageFormat::Gif))]
    #[case(b"GIF87a", Some(ImageFormat::Gif))]
    #[case(b"RIFF\x24\x00\x00\x00WEBPVP8 ", Some(ImageFormat::WebP))]
    #[case(b"RIFF\x24\x00\x00\x00WAVEfmt ", None)]
    #[case(b"RIFF", None)]
    #[case(&[0x89, 0x50, 0x4E, 0x47], None)]
    #[case(b"<!DOCTYPE html>", None)]
    #[case(b"{\"status_code\":34}", None)]
    #[case(&[], None)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: Option<ImageFormat>) {
        assert_eq!(ImageFormat::from_magic_bytes(bytes), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ImageFormat::Jpeg.to_string(), "jpeg");
        assert_eq!(ImageFormat::WebP.to_string(), "webp");
    }
}
