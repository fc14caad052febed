// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unit-of-measure continuation-line resolution.
//!
//! Distributor invoices often print a line item's *billing* quantity (e.g.
//! cases) on one line and its *actual weight* — the quantity the unit price
//! was computed against — on the line immediately below, in one of a small
//! number of conventional shapes. When a continuation line is recognized,
//! the item's quantity is corrected to the weight and its unit price is
//! recomputed so the two stay consistent.

use regex::Regex;
use std::sync::LazyLock;

static T_WT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)T\s*/\s*WT\s*=\s*(\d+(?:\.\d+)?)").unwrap());
static NET_GROSS_WT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:NET|GROSS)\s*WT\.?\s*:?\s*(\d+(?:\.\d+)?)").unwrap());
static AVG_WT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAVG\s+(\d+(?:\.\d+)?)").unwrap());
static ACTUAL_WT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bACTUAL\s*:?\s*(\d+(?:\.\d+)?)").unwrap());
static BARE_WEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:LB|LBS|KG)?\s*$").unwrap());

/// If `line` is one of the recognized continuation shapes, return the
/// weight it carries. Tried in the order a distributor's format is most
/// likely to appear, most specific first so `"T/WT= 12.5"` isn't mistaken
/// for a bare weight.
#[must_use]
pub fn continuation_quantity(line: &str) -> Option<f64> {
    for re in [&*T_WT, &*NET_GROSS_WT, &*AVG_WT, &*ACTUAL_WT, &*BARE_WEIGHT] {
        if let Some(caps) = re.captures(line) {
            if let Ok(v) = caps[1].parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

/// Outcome of applying a continuation-line correction to one line item.
#[derive(Debug, Clone, Copy)]
pub struct Correction {
    /// The weight the quantity was corrected to.
    pub quantity: f64,
    /// Unit price recomputed as `total / quantity`, rounded to cents.
    pub unit_price: f64,
    /// `true` if `quantity * unit_price` still reconciles with `total`
    /// within 1% or 10 cents, whichever is larger.
    pub verified: bool,
}

/// Recompute `unit_price` from `total` and the corrected `quantity`, and
/// check the result still reconciles with `total` within tolerance.
#[must_use]
pub fn correct(total: f64, corrected_quantity: f64) -> Option<Correction> {
    if corrected_quantity <= 0.0 {
        return None;
    }
    let unit_price = (total / corrected_quantity * 100.0).round() / 100.0;
    let recomputed = unit_price * corrected_quantity;
    let tolerance = (0.10_f64).max(total.abs() * 0.01);
    let verified = (recomputed - total).abs() <= tolerance;
    Some(Correction {
        quantity: corrected_quantity,
        unit_price,
        verified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_wt_pattern_is_recognized() {
        assert_eq!(continuation_quantity("T/WT= 12.50"), Some(12.50));
    }

    #[test]
    fn net_and_gross_wt_are_recognized() {
        assert_eq!(continuation_quantity("NET WT: 9.3"), Some(9.3));
        assert_eq!(continuation_quantity("GROSS WT 10"), Some(10.0));
    }

    #[test]
    fn avg_and_actual_are_recognized() {
        assert_eq!(continuation_quantity("AVG 8.25"), Some(8.25));
        assert_eq!(continuation_quantity("ACTUAL: 7"), Some(7.0));
    }

    #[test]
    fn bare_numeric_weight_line_is_recognized() {
        assert_eq!(continuation_quantity("  11.4 LBS  "), Some(11.4));
    }

    #[test]
    fn unrelated_line_is_not_a_continuation() {
        assert_eq!(continuation_quantity("Thank you for your business"), None);
    }

    #[test]
    fn correction_recomputes_unit_price_and_verifies_within_tolerance() {
        let c = correct(37.50, 12.5).unwrap();
        assert_eq!(c.quantity, 12.5);
        assert!((c.unit_price - 3.0).abs() < 0.01);
        assert!(c.verified);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(correct(10.0, 0.0).is_none());
    }
}
