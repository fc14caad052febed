// SPDX-License-Identifier: MIT OR Apache-2.0
//! Additive text quality scoring shared by the PDF-text gate and the OCR
//! combination step — a cheap proxy for "did we actually get an invoice
//! out of this" before handing the text to the parser.

use regex::Regex;
use std::sync::OnceLock;

pub(crate) fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$£€]\s?\d|\d+\.\d{2}\b").unwrap())
}

pub(crate) fn invoice_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(invoice|bill|statement|receipt|total|subtotal|amount due)\b").unwrap()
    })
}

fn line_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+[A-Za-z]+\d+\.\d{2}").unwrap())
}

/// Is `line` worth stitching into another attempt's text when combining
/// weak OCR (or extraction-strategy) results? Longer than 5 characters and
/// carrying a currency or invoice-keyword signal, checked case-insensitively
/// — a bare fragment like "OK" or a page-number artifact isn't.
#[must_use]
pub fn is_meaningful_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() <= 5 {
        return false;
    }
    let normalized = trimmed.to_lowercase();
    currency_re().is_match(&normalized) || invoice_keyword_re().is_match(&normalized)
}

/// Score recognized/extracted text on a `0.0..=1.0` scale: how likely is
/// this actually usable invoice text, as opposed to noise.
///
/// Additive rubric:
/// - base `0.3` for any non-empty text
/// - `+0.2` if a currency-shaped token appears (`$12.34`, `12.34`)
/// - `+0.15` if an invoice-ish keyword appears (`invoice`, `total`, ...)
/// - `+0.1` if at least 10 alphabetic words of length >= 3 appear
/// - `+0.1` if at least 5 numeric tokens appear
/// - `+0.15` if a line matches `digits-letters-digits.digits{2}` (a classic
///   OCR'd line-item shape: `"2xWIDGET12.50"`-ish runs)
/// - `-0.3 * non_printable_byte_ratio` — garbled OCR output is heavy on
///   control/replacement characters
///
/// Clamped to `[0.0, 1.0]`.
#[must_use]
pub fn score_text_quality(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let mut score = 0.3_f64;

    if currency_re().is_match(text) {
        score += 0.2;
    }
    if invoice_keyword_re().is_match(text) {
        score += 0.15;
    }

    let alpha_words = text
        .split_whitespace()
        .filter(|w| w.len() >= 3 && w.chars().all(|c| c.is_alphabetic()))
        .count();
    if alpha_words >= 10 {
        score += 0.1;
    }

    let numeric_tokens = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_ascii_digit()))
        .count();
    if numeric_tokens >= 5 {
        score += 0.1;
    }

    if line_item_re().is_match(text) {
        score += 0.15;
    }

    let total = text.len().max(1);
    let non_printable = text
        .chars()
        .filter(|c| c.is_control() && *c != '\n' && *c != '\t' && *c != '\r')
        .count();
    let ratio = non_printable as f64 / total as f64;
    score -= 0.3 * ratio;

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(score_text_quality(""), 0.0);
        assert_eq!(score_text_quality("   "), 0.0);
    }

    #[test]
    fn invoice_like_text_scores_high() {
        let text = "INVOICE #1042\nAcme Supply Company Widgets Delivered Today\n\
                     3 WIDGET-9000 12.50\nSubtotal 37.50\nTotal due: $37.50";
        let score = score_text_quality(text);
        assert!(score > 0.7, "expected high score, got {score}");
    }

    #[test]
    fn garbled_noise_scores_low() {
        let noise: String = std::iter::repeat('\u{1}').take(50).collect();
        let score = score_text_quality(&noise);
        assert!(score < 0.2, "expected low score, got {score}");
    }

    #[test]
    fn meaningful_line_requires_length_and_signal() {
        assert!(is_meaningful_line("Subtotal 37.50"));
        assert!(is_meaningful_line("INVOICE TOTAL: $148.20"));
        assert!(!is_meaningful_line("OK"));
        assert!(!is_meaningful_line("----"));
        assert!(!is_meaningful_line("Thank you for shopping"));
    }
}
