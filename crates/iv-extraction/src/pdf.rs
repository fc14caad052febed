// SPDX-License-Identifier: MIT OR Apache-2.0
//! PDF text-layer extraction, gated by text quality before being accepted
//! over the slower OCR path.

use iv_error::{ErrorCode, IvError, IvResult};

/// Extract the text layer of a PDF. Returns an error if the PDF has no
/// usable text layer at all (encrypted, scanned-only, or corrupt) — that
/// error is the caller's signal to fall back to rasterize-and-OCR.
pub fn extract_text(bytes: &[u8]) -> IvResult<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        IvError::new(ErrorCode::ProcessingError, "failed to extract PDF text layer")
            .with_context("reason", e.to_string())
    })
}

/// `true` if `text` contains at least one currency-shaped token — part of
/// the PDF-text-layer acceptance gate alongside the quality score.
#[must_use]
pub fn has_prices(text: &str) -> bool {
    iv_ocr::score_text_quality(text) > 0.0 && PRICE_RE.is_match(text)
}

static PRICE_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"\$?\d+[,\d]*\.\d{2}\b").unwrap());

/// Confidence threshold a PDF text layer must clear, combined with
/// [`has_prices`], before it's accepted over rasterize-and-OCR.
pub const TEXT_LAYER_QUALITY_GATE: f64 = 0.7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_price_tokens() {
        assert!(has_prices("Subtotal 12.34\nTotal $56.78"));
        assert!(!has_prices("no numbers here at all"));
    }
}
