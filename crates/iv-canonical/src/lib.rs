// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Tolerant mapping of arbitrary parser output into a canonical invoice.
//!
//! Parsers disagree about field names and nesting (`items` vs `line_items`,
//! flat `accountName` vs nested `customer.name`, four different spellings of
//! a unit price). This crate's job is to absorb that variance: every coercion
//! here walks a documented, ordered list of candidate keys and takes the
//! first usable value, recording a warning instead of failing when nothing
//! usable is found. Strict schema validation is a separate, stricter
//! collaborator (`iv-validate`) that runs after this one.

mod address;

use chrono::{DateTime, Utc};
use iv_core::{
    derive_doc_id, money, Address, CanonicalInvoice, Confidence, Doc, FieldConfidence, Frequency,
    LineConfidence, LineItem, Parties, ParserInfo, Party, Provenance, SourceRef, SourceType, Totals,
};
use serde_json::Value;

/// Everything the builder needs besides the raw parser payload.
#[derive(Debug, Clone)]
pub struct BuildInput {
    /// The parser's output, in whatever shape it produced.
    pub payload: Value,
    /// Email attachment or direct upload.
    pub source_type: SourceType,
    /// Name of the parser that produced `payload`.
    pub parser_name: String,
    /// Version of the parser that produced `payload`.
    pub parser_version: String,
    /// Reference back to the original artifact.
    pub source_ref: SourceRef,
}

/// The result of a build attempt: a canonical invoice is always produced,
/// soft defects are recorded as warnings rather than failing the build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The built canonical invoice.
    pub invoice: CanonicalInvoice,
    /// Non-fatal issues encountered while coercing the payload.
    pub warnings: Vec<String>,
}

const ITEM_ARRAY_CANDIDATES: &[&str] = &[
    "items",
    "line_items",
    "parsed.items",
    "parsed.line_items",
    "result.items",
    "result.line_items",
    "data.items",
    "data.line_items",
];

const RAW_TEXT_CANDIDATES: &[&str] = &["raw_text", "text", "parsed.raw_text"];
const CURRENCY_CANDIDATES: &[&str] = &["currency", "metadata.currency", "parsed.metadata.currency"];
const INVOICE_NUMBER_CANDIDATES: &[&str] = &[
    "invoice_number",
    "invoiceNumber",
    "metadata.invoice_number",
    "parsed.metadata.invoice_number",
];
const PURCHASE_ORDER_CANDIDATES: &[&str] =
    &["purchase_order", "po_number", "poNumber", "metadata.po_number"];
const ISSUED_AT_CANDIDATES: &[&str] =
    &["issued_at", "date", "metadata.date", "parsed.metadata.date"];
const CUSTOMER_NAME_CANDIDATES: &[&str] = &["accountName", "customer.name", "customer_name"];
const VENDOR_NAME_CANDIDATES: &[&str] = &["vendor.name", "vendor", "parsed.vendor.name", "parsed.vendor"];
const UNIT_PRICE_CANDIDATES: &[&str] = &["unit_price", "unitPrice", "price", "rate", "unit_cost"];
const TOTAL_PRICE_CANDIDATES: &[&str] = &["total", "total_price", "lineTotal", "amount"];
const DESCRIPTION_CANDIDATES: &[&str] = &["description", "desc", "name"];
const QUANTITY_CANDIDATES: &[&str] = &["quantity", "qty"];
const INVOICE_TOTAL_CANDIDATES: &[&str] = &[
    "totals.total_cents",
    "totals.invoice_total",
    "totals.total",
    "total",
];

/// Walk a dotted path (`"a.b.c"`) through nested JSON objects.
fn dig<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |v, key| v.get(key))
}

/// Try each candidate path in order, returning the first present value.
fn first_present<'a>(payload: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|c| dig(payload, c))
}

fn first_present_str(payload: &Value, candidates: &[&str]) -> Option<String> {
    first_present(payload, candidates)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Take the first non-empty array among the candidate paths.
fn first_non_empty_array<'a>(payload: &'a Value, candidates: &[&str]) -> Option<&'a Vec<Value>> {
    candidates
        .iter()
        .find_map(|c| dig(payload, c))
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
}

/// Build a canonical invoice from `input`. Always succeeds; defects short of
/// a usable document are recorded in the returned `warnings`.
#[must_use]
pub fn build(input: BuildInput) -> BuildOutput {
    let payload = &input.payload;
    let mut warnings = Vec::new();

    let raw_text = first_present_str(payload, RAW_TEXT_CANDIDATES);
    let currency = first_present_str(payload, CURRENCY_CANDIDATES).unwrap_or_else(|| "USD".to_string());

    let mut doc = Doc::new(raw_text.as_deref(), currency.clone());
    doc.invoice_number = first_present_str(payload, INVOICE_NUMBER_CANDIDATES);
    doc.purchase_order = first_present_str(payload, PURCHASE_ORDER_CANDIDATES);
    if let Some(issued) = first_present_str(payload, ISSUED_AT_CANDIDATES)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
    {
        doc.issued_at = issued.with_timezone(&Utc);
    }
    // else doc.issued_at keeps the now() that Doc::new already filled in.

    let vendor_name = coerce_vendor_name(payload, raw_text.as_deref());
    let customer_name = first_present_str(payload, CUSTOMER_NAME_CANDIDATES);

    if vendor_name.is_none() {
        warnings.push("no vendor could be recovered from parser output".to_string());
    }
    if customer_name.is_none() {
        warnings.push("no customer could be recovered from parser output".to_string());
    }

    let vendor = Party::named(vendor_name.clone().unwrap_or_else(|| "Unknown Vendor".to_string()));
    let customer = Party::named(customer_name.clone().unwrap_or_else(|| "Unknown Customer".to_string()));
    let bill_to = first_present(payload, &["bill_to"])
        .and_then(address::coerce_address)
        .map(party_with_address);
    let ship_to = first_present(payload, &["ship_to"])
        .and_then(address::coerce_address)
        .map(party_with_address);

    let parties = Parties {
        vendor,
        customer,
        bill_to,
        ship_to,
    };

    let line_items = match first_non_empty_array(payload, ITEM_ARRAY_CANDIDATES) {
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| build_line_item(i, item, &currency))
            .collect(),
        None => {
            warnings.push("no line items could be recovered from parser output".to_string());
            Vec::new()
        }
    };

    let invoice_total = first_present(payload, INVOICE_TOTAL_CANDIDATES)
        .and_then(|v| money::parse_money(v, &currency));

    let totals = Totals {
        invoice_total: invoice_total.clone(),
        weekly_equivalent_total: None,
        notes: Vec::new(),
    };

    let overall = {
        let mut score: f64 = 0.5;
        if !line_items.is_empty() {
            score += 0.25;
        }
        if vendor_name.is_some() {
            score += 0.1;
        }
        if customer_name.is_some() {
            score += 0.1;
        }
        if invoice_total.is_some() {
            score += 0.05;
        }
        score.min(0.9)
    };

    let confidence = Confidence {
        overall,
        fields: vec![FieldConfidence {
            path: "totals.invoice_total".to_string(),
            score: if invoice_total.is_some() { 0.9 } else { 0.0 },
            method: "candidate_key_coercion".to_string(),
            evidence: Vec::new(),
        }],
    };

    let provenance = Provenance {
        source_type: input.source_type,
        captured_at: Utc::now(),
        parser: ParserInfo {
            name: input.parser_name,
            version: input.parser_version,
            warnings: Vec::new(),
        },
        source_ref: input.source_ref,
    };

    let invoice = CanonicalInvoice {
        doc,
        parties,
        line_items,
        totals,
        provenance,
        confidence,
    };

    BuildOutput { invoice, warnings }
}

fn coerce_vendor_name(payload: &Value, raw_text: Option<&str>) -> Option<String> {
    if let Some(name) = first_present_str(payload, VENDOR_NAME_CANDIDATES) {
        return Some(name);
    }
    let text = raw_text?;
    let registry = iv_vendor::VendorRegistry::with_builtin_vendors();
    registry.detect_confident(text).map(|m| m.name)
}

fn build_line_item(index: usize, item: &Value, currency: &str) -> LineItem {
    let mut notes = Vec::new();
    let mut score: f64 = 0.0;

    let raw_description = first_present_str(item, DESCRIPTION_CANDIDATES).unwrap_or_default();
    if !raw_description.is_empty() {
        score += 0.2;
        notes.push("description present".to_string());
    }

    let quantity = first_present(item, QUANTITY_CANDIDATES)
        .and_then(Value::as_f64)
        .unwrap_or_else(|| {
            if raw_description.is_empty() {
                0.0
            } else {
                1.0
            }
        });
    if first_present(item, QUANTITY_CANDIDATES).is_some() {
        score += 0.1;
        notes.push("quantity present".to_string());
    }

    let unit_price = first_present(item, UNIT_PRICE_CANDIDATES)
        .and_then(|v| money::parse_money(v, currency))
        .or_else(|| vendor_specific_unit_price(item, currency));
    if unit_price.is_some() {
        score += 0.15;
        notes.push("unit price present".to_string());
    }

    let total_price = first_present(item, TOTAL_PRICE_CANDIDATES)
        .and_then(|v| money::parse_money(v, currency))
        .or_else(|| vendor_specific_total_price(item, currency));

    LineItem {
        line_id: (index + 1).to_string(),
        raw_description,
        normalized_description: None,
        sku: first_present_str(item, &["sku", "product_code"]),
        quantity,
        unit_price,
        total_price,
        frequency: Frequency::Unknown,
        attributes: Default::default(),
        confidence: LineConfidence {
            overall: score.clamp(0.0, 0.95),
            notes,
        },
    }
}

/// Vendor-specific unit price spelling: `unitPriceDollars` (major units) or
/// `unitPriceCents` (integer cents).
fn vendor_specific_unit_price(item: &Value, currency: &str) -> Option<money::Money> {
    if let Some(v) = item.get("unitPriceDollars").and_then(Value::as_f64) {
        return Some(money::Money::new(v, currency));
    }
    if let Some(c) = item.get("unitPriceCents").and_then(Value::as_i64) {
        return Some(money::Money::from_cents(c, currency));
    }
    None
}

fn vendor_specific_total_price(item: &Value, currency: &str) -> Option<money::Money> {
    item.get("lineTotalCents")
        .and_then(Value::as_i64)
        .map(|c| money::Money::from_cents(c, currency))
}

/// Build an unnamed [`Party`] carrying only `address` — used for bill-to/
/// ship-to shapes that are just an address with no separate name field.
fn party_with_address(address: Address) -> Party {
    let mut party = Party::named("Unnamed");
    party.addresses.push(address);
    party
}

#[cfg(test)]
mod tests {
    use super::*;
    use iv_core::SourceRefKind;
    use serde_json::json;

    fn input(payload: Value) -> BuildInput {
        BuildInput {
            payload,
            source_type: SourceType::Email,
            parser_name: "generic-ocr-parser".to_string(),
            parser_version: "1.0.0".to_string(),
            source_ref: SourceRef {
                kind: SourceRefKind::MessageId,
                value: Some("<abc@example.com>".to_string()),
                mime_type: Some("application/pdf".to_string()),
            },
        }
    }

    #[test]
    fn builds_a_well_formed_payload_with_high_confidence() {
        let payload = json!({
            "vendor": { "name": "Sysco Corporation" },
            "accountName": "Joe's Diner",
            "raw_text": "SYSCO invoice ... INVOICE TOTAL 1,748.85",
            "currency": "USD",
            "items": [
                { "description": "Chicken breast", "quantity": 10, "unitPrice": 4.50 },
            ],
            "totals": { "total_cents": 174885 },
        });
        let out = build(input(payload));
        assert_eq!(out.invoice.parties.vendor.name, "Sysco Corporation");
        assert_eq!(out.invoice.parties.customer.name, "Joe's Diner");
        assert_eq!(out.invoice.line_items.len(), 1);
        assert_eq!(out.invoice.line_items[0].quantity, 10.0);
        assert!(out.invoice.totals.invoice_total.is_some());
        assert!(out.invoice.confidence.overall > 0.8);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn falls_back_to_nested_line_items_key() {
        let payload = json!({
            "parsed": {
                "line_items": [{ "name": "Widget" }],
            },
        });
        let out = build(input(payload));
        assert_eq!(out.invoice.line_items.len(), 1);
        assert_eq!(out.invoice.line_items[0].raw_description, "Widget");
        assert_eq!(out.invoice.line_items[0].quantity, 1.0, "defaults to 1 when absent");
    }

    #[test]
    fn missing_line_items_produces_a_warning_but_still_builds() {
        let out = build(input(json!({})));
        assert!(out.invoice.line_items.is_empty());
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("no line items")));
        assert_eq!(out.invoice.confidence.overall, 0.5 - 0.0 + 0.0); // only base minus nothing recovered
    }

    #[test]
    fn vendor_specific_cents_keys_are_coerced() {
        let payload = json!({
            "items": [
                { "description": "Case of napkins", "unitPriceCents": 1250, "lineTotalCents": 2500, "quantity": 2 },
            ],
        });
        let out = build(input(payload));
        let item = &out.invoice.line_items[0];
        assert_eq!(item.unit_price.unwrap().cents(), 1250);
        assert_eq!(item.total_price.unwrap().cents(), 2500);
    }

    #[test]
    fn overall_confidence_is_capped_at_point_nine() {
        let payload = json!({
            "vendor": "Acme",
            "accountName": "Customer",
            "items": [{ "description": "x" }],
            "totals": { "total": 10.0 },
        });
        let out = build(input(payload));
        assert!(out.invoice.confidence.overall <= 0.9);
    }

    #[test]
    fn line_confidence_is_clamped_to_0_95() {
        let payload = json!({
            "items": [{ "description": "x", "quantity": 1, "unitPrice": 1.0 }],
        });
        let out = build(input(payload));
        assert!(out.invoice.line_items[0].confidence.overall <= 0.95);
    }

    #[test]
    fn city_state_zip_bill_to_is_attached() {
        let payload = json!({
            "bill_to": { "line1": "1 Infinite Loop", "city_state_zip": "Cupertino, CA 95014" },
        });
        let out = build(input(payload));
        let bill_to = out.invoice.parties.bill_to.expect("bill_to should be present");
        assert_eq!(bill_to.addresses[0].postal.as_deref(), Some("95014"));
    }
}
