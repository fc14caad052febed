// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vendor-aware parsing of extracted text into the loosely-shaped JSON
//! payload [`iv_canonical::build`] coerces into a canonical invoice.

use crate::uom;
use iv_vendor::VendorRegistry;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

static LINE_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\d+(?:\.\d+)?)\s+(.{3,60}?)\s+(\d+\.\d{2})\s+(\d+\.\d{2})\s*$").unwrap()
});
static INVOICE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)invoice\s*(?:#|no\.?|number)?\s*[:\-]?\s*([A-Za-z0-9][A-Za-z0-9-]{2,})").unwrap()
});
static INVOICE_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bINVOICE\s+TOTAL\b\D{0,10}([\d,]+\.\d{2})").unwrap());
static GROUP_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+TOTAL\b\D{0,10}([\d,]+\.\d{2})").unwrap());

/// Result of parsing one document's text: the loosely-shaped payload ready
/// for [`iv_canonical::build`], this parser's own confidence in it
/// (`parsing.overall`), and any non-fatal parsing warnings.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    /// Payload in the candidate-key shape `iv_canonical::build` expects.
    pub payload: Value,
    /// This parser's confidence in its own output, independent of how the
    /// text was extracted (OCR vs PDF text layer).
    pub overall: f64,
    /// Parsing-stage warnings (uom corrections that failed their
    /// reconciliation check, missing totals, etc).
    pub warnings: Vec<String>,
}

/// Parse `text` (already extracted, by whatever means) into a canonical
/// builder payload.
///
/// `vendor_hint` is honored as-is (a vendor already known from the
/// monitor/attachment context, e.g. a recognized sender domain); when
/// absent, the vendor is detected from the text itself.
#[must_use]
pub fn parse(text: &str, vendor_hint: Option<&str>) -> ParseOutput {
    let mut warnings = Vec::new();

    let vendor_name = vendor_hint.map(str::to_string).or_else(|| {
        VendorRegistry::with_builtin_vendors()
            .detect_confident(text)
            .map(|m| m.name)
    });

    let invoice_number = INVOICE_NUMBER_RE
        .captures(text)
        .map(|c| c[1].to_string());

    // "INVOICE TOTAL" is the figure actually owed; "GROUP TOTAL" is a
    // subtotal some distributors print above it. Prefer the former.
    let invoice_total = INVOICE_TOTAL_RE
        .captures(text)
        .or_else(|| GROUP_TOTAL_RE.captures(text))
        .and_then(|c| c[1].replace(',', "").parse::<f64>().ok());

    let lines: Vec<&str> = text.lines().collect();
    let mut items = Vec::new();
    let mut consumed_as_continuation = vec![false; lines.len()];

    for caps in LINE_ITEM_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let line_idx = text[..whole.start()].matches('\n').count();

        let quantity: f64 = caps[1].parse().unwrap_or(1.0);
        let description = caps[2].trim().to_string();
        let unit_price: f64 = caps[3].parse().unwrap_or(0.0);
        let total_price: f64 = caps[4].parse().unwrap_or(0.0);

        let mut item = json!({
            "description": description,
            "quantity": quantity,
            "unitPrice": unit_price,
            "total": total_price,
        });

        if let Some(next_idx) = (line_idx + 1..lines.len()).find(|&i| !lines[i].trim().is_empty()) {
            if !consumed_as_continuation[next_idx] {
                if let Some(corrected_qty) = uom::continuation_quantity(lines[next_idx]) {
                    if let Some(correction) = uom::correct(total_price, corrected_qty) {
                        item["quantity"] = json!(correction.quantity);
                        item["unitPrice"] = json!(correction.unit_price);
                        item["uom_corrected"] = json!(true);
                        consumed_as_continuation[next_idx] = true;
                        if !correction.verified {
                            warnings.push(format!(
                                "uom correction for '{description}' did not reconcile within tolerance"
                            ));
                        }
                    }
                }
            }
        }

        items.push(item);
    }

    if items.is_empty() {
        warnings.push("no line items recognized in extracted text".to_string());
    }
    if invoice_total.is_none() {
        warnings.push("no invoice total recognized in extracted text".to_string());
    }

    let mut overall: f64 = 0.4;
    if vendor_name.is_some() {
        overall += 0.2;
    }
    if !items.is_empty() {
        overall += 0.2;
    }
    if invoice_total.is_some() {
        overall += 0.2;
    }

    let mut payload = json!({
        "raw_text": text,
        "items": items,
    });
    if let Some(name) = vendor_name {
        payload["vendor"] = json!({ "name": name });
    }
    if let Some(num) = invoice_number {
        payload["invoice_number"] = json!(num);
    }
    if let Some(total) = invoice_total {
        payload["totals"] = json!({ "total": total });
    }

    ParseOutput {
        payload,
        overall: overall.min(1.0),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_items_vendor_and_preferred_total() {
        let text = "SYSCO\n\
                     2 Chicken breast case 12.50 25.00\n\
                     GROUP TOTAL 1,747.30\n\
                     INVOICE TOTAL 1,748.85\n";
        let out = parse(text, None);
        assert_eq!(out.payload["vendor"]["name"], "Sysco Corporation");
        assert_eq!(out.payload["items"].as_array().unwrap().len(), 1);
        assert_eq!(out.payload["totals"]["total"], 1748.85);
    }

    #[test]
    fn uom_continuation_line_corrects_quantity_and_unit_price() {
        let text = "1 Ribeye steaks case 3.00 37.50\nT/WT= 12.5\nINVOICE TOTAL 37.50\n";
        let out = parse(text, None);
        let item = &out.payload["items"][0];
        assert_eq!(item["quantity"], 12.5);
        assert_eq!(item["uom_corrected"], true);
    }

    #[test]
    fn missing_total_and_items_produce_warnings() {
        let out = parse("no structured content here", None);
        assert!(out.warnings.iter().any(|w| w.contains("no line items")));
        assert!(out.warnings.iter().any(|w| w.contains("no invoice total")));
    }

    #[test]
    fn vendor_hint_overrides_detection() {
        let out = parse("INVOICE TOTAL 10.00", Some("Known Vendor Inc"));
        assert_eq!(out.payload["vendor"]["name"], "Known Vendor Inc");
    }
}
