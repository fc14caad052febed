// SPDX-License-Identifier: MIT OR Apache-2.0
//! Image preprocessing variants handed to `tesseract`.

use image::{DynamicImage, GrayImage, ImageFormat};
use imageproc::contrast::{stretch_contrast, threshold, ThresholdType};
use imageproc::filter::median_filter;
use std::io::Cursor;

/// Which preprocessing pipeline produced a given attempt's input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocessing {
    /// Grayscale, auto-rotate, histogram stretch, mild median denoise.
    Standard,
    /// Standard plus a stronger median filter and a sharpening pass —
    /// used when the standard pass reads low confidence.
    Advanced,
    /// Hard black/white threshold — used as a last resort for faint or
    /// low-contrast scans.
    HighContrast,
}

/// Preprocessing failure: a malformed or unsupported source image.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    /// The image bytes could not be decoded.
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Threshold used to binarize the `Advanced` pass — looser than
/// `HighContrast`'s, since this pass still expects a sharpened grayscale
/// image rather than an already-aggressive-contrast one.
const ADVANCED_THRESHOLD: u8 = 140;

/// Threshold used to binarize the `HighContrast` pass.
const HIGH_CONTRAST_THRESHOLD: u8 = 120;

/// Decode `bytes`, apply `variant`'s pipeline, and re-encode as PNG (the
/// format `tesseract` is handed).
pub fn apply(bytes: &[u8], variant: Preprocessing) -> Result<Vec<u8>, PreprocessError> {
    let img = image::load_from_memory(bytes)?;
    let img = auto_rotate(img, bytes);
    let gray = img.to_luma8();

    let processed = match variant {
        Preprocessing::Standard => {
            let stretched = stretch_contrast(&gray, 2, 253);
            let denoised = median_filter(&stretched, 1, 1);
            sharpen(&denoised)
        }
        Preprocessing::Advanced => {
            let stretched = stretch_contrast(&gray, 2, 253);
            let denoised = median_filter(&stretched, 2, 2);
            let sharpened = sharpen(&denoised);
            threshold(&sharpened, ADVANCED_THRESHOLD, ThresholdType::Binary)
        }
        Preprocessing::HighContrast => {
            let stretched = stretch_contrast(&gray, 2, 253);
            let mut binarized = threshold(&stretched, HIGH_CONTRAST_THRESHOLD, ThresholdType::Binary);
            // Double-negate: invert the binarized image so the weakest,
            // most washed-out scans still hand tesseract dark-on-light text.
            image::imageops::invert(&mut binarized);
            binarized
        }
    };

    encode_png(&processed)
}

fn encode_png(img: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut out, ImageFormat::Png)
        .map_err(PreprocessError::Decode)?;
    Ok(out.into_inner())
}

/// Mild unsharp-style 3x3 sharpen kernel — emphasizes edges that PSM word
/// segmentation relies on without amplifying scan noise the way a larger
/// kernel would.
fn sharpen(img: &GrayImage) -> GrayImage {
    let kernel: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
    imageproc::filter::filter3x3(img, &kernel)
}

/// Apply EXIF orientation (tag `0x0112`) when present. Scanned invoice
/// photos from phone cameras routinely carry this tag instead of storing
/// pixels pre-rotated; tesseract segments columns assuming upright text.
fn auto_rotate(img: DynamicImage, original_bytes: &[u8]) -> DynamicImage {
    let orientation = exif::Reader::new()
        .read_from_container(&mut Cursor::new(original_bytes))
        .ok()
        .and_then(|exif| {
            exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        })
        .unwrap_or(1);

    match orientation {
        3 => img.rotate180(),
        6 => img.rotate90(),
        8 => img.rotate270(),
        _ => img,
    }
}
