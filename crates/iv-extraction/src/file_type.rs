// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-type detection by magic bytes — attachments arrive with unreliable
//! or absent `Content-Type` headers, so the pipeline sniffs the bytes
//! themselves rather than trusting MIME metadata.

/// A detected file kind, used to route into the right extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// `%PDF-` header.
    Pdf,
    /// `image/jpeg`.
    Jpeg,
    /// `image/png`.
    Png,
    /// `image/gif`.
    Gif,
    /// `image/bmp`.
    Bmp,
    /// `image/tiff`.
    Tiff,
    /// `image/webp` (RIFF container, `WEBP` brand).
    Webp,
    /// `image/heic` (ISO-BMFF container, `heic`/`heix`/`mif1` brand).
    Heic,
    /// Plain text: no recognized binary signature, and the first ~1KB is
    /// at least 85% printable ASCII/UTF-8.
    Text,
    /// Neither a recognized binary signature nor plausible text.
    Unknown,
}

impl FileType {
    /// `true` for any of the recognized raster image kinds.
    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            FileType::Jpeg
                | FileType::Png
                | FileType::Gif
                | FileType::Bmp
                | FileType::Tiff
                | FileType::Webp
                | FileType::Heic
        )
    }
}

const SNIFF_WINDOW: usize = 1024;

/// Detect `bytes`' file type from its magic-byte signature, falling back to
/// a printable-ratio heuristic for plain text.
#[must_use]
pub fn detect(bytes: &[u8]) -> FileType {
    if bytes.starts_with(b"%PDF-") {
        return FileType::Pdf;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return FileType::Jpeg;
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return FileType::Png;
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return FileType::Gif;
    }
    if bytes.starts_with(b"BM") {
        return FileType::Bmp;
    }
    if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return FileType::Tiff;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return FileType::Webp;
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        let brand = &bytes[8..12];
        if matches!(brand, b"heic" | b"heix" | b"mif1" | b"msf1") {
            return FileType::Heic;
        }
    }

    if looks_like_text(bytes) {
        return FileType::Text;
    }

    FileType::Unknown
}

fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    let printable = window
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t')
        .count();
    printable as f64 / window.len() as f64 >= 0.85
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_header() {
        assert_eq!(detect(b"%PDF-1.7\n..."), FileType::Pdf);
    }

    #[test]
    fn detects_jpeg_and_png_signatures() {
        assert_eq!(detect(&[0xFF, 0xD8, 0xFF, 0xE0]), FileType::Jpeg);
        assert_eq!(
            detect(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            FileType::Png
        );
    }

    #[test]
    fn detects_webp_riff_container() {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBP");
        assert_eq!(detect(&bytes), FileType::Webp);
    }

    #[test]
    fn ascii_text_is_detected_as_text() {
        assert_eq!(detect(b"INVOICE #1042\nTotal: $37.50\n"), FileType::Text);
    }

    #[test]
    fn random_binary_noise_is_unknown() {
        let noise: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(detect(&noise), FileType::Unknown);
    }
}
