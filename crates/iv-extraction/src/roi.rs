// SPDX-License-Identifier: MIT OR Apache-2.0
//! Region-of-interest fallback: when parsing can't find an invoice total
//! (or can't find it confidently) in the full-page text, a focused OCR pass
//! over just the bottom strip of the page — where totals live on nearly
//! every distributor layout — recovers the figure at a capped confidence.

use image::{DynamicImage, GenericImageView};

/// Fraction of the page height, measured from the bottom, cropped for the
/// totals-region OCR pass.
pub const ROI_HEIGHT_FRACTION: f32 = 0.2;

/// Cap applied to the field confidence this fallback can ever assert — an
/// ROI guess should never outrank a real parse, only patch a gap in one.
pub const ROI_CONFIDENCE_CAP: f64 = 0.95;

/// Crop the bottom `ROI_HEIGHT_FRACTION` of `page` — the region a totals
/// line almost always falls in.
#[must_use]
pub fn crop_totals_region(page: &DynamicImage) -> DynamicImage {
    let (w, h) = page.dimensions();
    let roi_h = ((h as f32) * ROI_HEIGHT_FRACTION).round() as u32;
    let y = h.saturating_sub(roi_h);
    page.crop_imm(0, y, w, roi_h.max(1))
}

/// Map the OCR confidence measured on the totals ROI crop to a field
/// confidence for the recovered amount: `roi_confidence * 0.2`, capped at
/// [`ROI_CONFIDENCE_CAP`]. The `0.2` weight reflects that this is a
/// narrow, unvalidated crop read, not a reconciled parse.
#[must_use]
pub fn field_confidence(roi_confidence: f64) -> f64 {
    (roi_confidence * 0.2).min(ROI_CONFIDENCE_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_confidence_scales_down_and_caps() {
        assert!((field_confidence(1.0) - 0.2).abs() < 1e-9);
        assert!((field_confidence(0.5) - 0.1).abs() < 1e-9);
        assert!(field_confidence(100.0) <= ROI_CONFIDENCE_CAP);
    }

    #[test]
    fn crop_takes_bottom_strip() {
        let img = DynamicImage::new_luma8(100, 200);
        let cropped = crop_totals_region(&img);
        assert_eq!(cropped.dimensions(), (100, 40));
    }
}
