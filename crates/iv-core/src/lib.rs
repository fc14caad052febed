// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical invoice v1 contract types.
//!
//! This crate defines the single versioned schema (`invoice.v1`) that every
//! parser output is eventually mapped into by the canonical builder
//! (`iv-canonical`). The types here are the wire contract: field names,
//! nesting, and nullability match the data model exactly, so a caller
//! serializing a [`CanonicalInvoice`] gets the external interface verbatim.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub mod money;

pub use money::Money;

/// Schema version tag carried in [`Doc::doc_type`]'s sibling field; kept as a
/// constant so callers comparing against "invoice.v1" don't hand-roll the
/// literal.
pub const SCHEMA_VERSION: &str = "invoice.v1";

/// Generate a `doc_id` from raw text (`"DOC-" + sha256(raw_text)[0:12]`), or
/// a random fallback when no raw text is available.
#[must_use]
pub fn derive_doc_id(raw_text: Option<&str>) -> String {
    match raw_text {
        Some(text) if !text.is_empty() => {
            let digest = Sha256::digest(text.as_bytes());
            let hex = hex_prefix(&digest, 12);
            format!("DOC-{hex}")
        }
        _ => format!("DOC-{}", random_hex(12)),
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(chars);
    s
}

fn random_hex(chars: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..chars)
        .map(|_| {
            let v: u8 = rng.gen_range(0..16);
            std::char::from_digit(u32::from(v), 16).unwrap()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Top-level CanonicalInvoice
// ---------------------------------------------------------------------------

/// The normalized, schema-versioned invoice output of the canonical builder.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CanonicalInvoice {
    /// Document identity and header fields.
    pub doc: Doc,
    /// Vendor, customer, and optional bill/ship-to parties.
    pub parties: Parties,
    /// Ordered line items.
    pub line_items: Vec<LineItem>,
    /// Invoice-level totals.
    pub totals: Totals,
    /// Where this invoice came from and which parser produced it.
    pub provenance: Provenance,
    /// Overall confidence and per-field evidence.
    pub confidence: Confidence,
}

/// Document identity and header-level fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Doc {
    /// Stable document identifier, `"DOC-" + sha256(raw_text)[0:12]` or random.
    pub doc_id: String,
    /// Always `"invoice"` for this schema version.
    pub doc_type: String,
    /// Vendor-assigned invoice number, if recovered.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub invoice_number: Option<String>,
    /// Purchase order reference, if recovered.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub purchase_order: Option<String>,
    /// When the invoice was issued.
    pub issued_at: DateTime<Utc>,
    /// Billing service period, if present (e.g. "2026-01-01..2026-01-31").
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service_period: Option<String>,
    /// ISO 4217 currency code, default `"USD"`.
    pub currency: String,
    /// First 12 hex chars of `sha256(raw_text)`, independent of `doc_id`'s
    /// derivation so callers can detect raw-text identity without recomputing.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_text_hash: Option<String>,
    /// Free-form classification tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The vendor, customer, and (optional) bill-to/ship-to parties on an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Parties {
    /// The invoice's issuing vendor.
    pub vendor: Party,
    /// The invoice's recipient/customer.
    pub customer: Party,
    /// Billing party, if distinct from `customer`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bill_to: Option<Party>,
    /// Shipping party, if distinct from `customer`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ship_to: Option<Party>,
}

/// A named party (vendor, customer, bill-to, or ship-to) with addresses.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Party {
    /// Raw, as-seen name.
    pub name: String,
    /// Normalized (trimmed, case-folded, punctuation-stripped) name used for
    /// vendor/customer matching.
    pub normalized_name: String,
    /// Known addresses for this party.
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl Party {
    /// Build a party from a raw name, deriving `normalized_name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let normalized_name = normalize_name(&name);
        Self {
            name,
            normalized_name,
            addresses: Vec::new(),
        }
    }
}

/// Normalize a party name: trim, lowercase, collapse internal whitespace,
/// strip a trailing corporate suffix's punctuation (kept as text, only
/// punctuation normalized — this is a matching key, not a display string).
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// A postal address with confidence in how it was parsed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Address {
    /// The raw, unparsed address text.
    pub raw: String,
    /// Street line, if separated out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub street: Option<String>,
    /// City, if separated out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<String>,
    /// State/province code, if separated out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<String>,
    /// Postal/ZIP code, if separated out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub postal: Option<String>,
    /// Country, defaulting to `"US"` when unspecified.
    pub country: String,
    /// Confidence that the parsed fields above are correct (`0.85` if a ZIP
    /// was recovered via regex, `0.5` otherwise).
    pub confidence: f64,
}

/// Recurrence cadence implied by a line item's description or unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Billed weekly.
    Weekly,
    /// Billed monthly.
    Monthly,
    /// Billed daily.
    Daily,
    /// Billed annually.
    Annual,
    /// No recurrence detected.
    Unknown,
}

impl Default for Frequency {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A single invoice line item.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LineItem {
    /// Stable identifier for this line within the invoice (1-based index by
    /// convention, but callers should treat it as opaque).
    pub line_id: String,
    /// The description exactly as it appeared in the source text.
    pub raw_description: String,
    /// A cleaned-up description, if normalization was applied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub normalized_description: Option<String>,
    /// Vendor SKU/product code, if present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sku: Option<String>,
    /// Quantity; defaults to `1.0` when absent but a description exists.
    pub quantity: f64,
    /// Per-unit price.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit_price: Option<Money>,
    /// Extended (line) total.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_price: Option<Money>,
    /// Billing cadence implied by the line, if any.
    #[serde(default)]
    pub frequency: Frequency,
    /// Free-form extracted attributes (e.g. `uom_corrected`, `category`).
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Per-line confidence and supporting notes.
    pub confidence: LineConfidence,
}

/// Confidence for a single [`LineItem`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LineConfidence {
    /// Overall confidence, clamped to `[0, 0.95]`.
    pub overall: f64,
    /// Free-form notes explaining how the score was derived.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Invoice-level totals.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Totals {
    /// The final, authoritative invoice total.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub invoice_total: Option<Money>,
    /// Weekly-equivalent total, for recurring invoices normalized to a
    /// common cadence.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub weekly_equivalent_total: Option<Money>,
    /// Free-form notes (e.g. ROI fallback recovery, math mismatch warnings).
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Where a canonical invoice's source text or image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Arrived as an email attachment.
    Email,
    /// Arrived via a direct upload.
    Upload,
}

/// What kind of reference `source_ref.value` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceRefKind {
    /// `value` is an opaque storage path or key.
    Path,
    /// `value` is an email message-id.
    MessageId,
    /// No reference is available.
    None,
}

/// A reference back to the original source artifact.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SourceRef {
    /// Discriminates what `value` means.
    pub kind: SourceRefKind,
    /// The reference value itself, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
    /// MIME type of the source artifact, if known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
}

/// Which parser produced this invoice, and how.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ParserInfo {
    /// Parser name (e.g. `"sysco-vendor-parser"`, `"generic-ocr-parser"`).
    pub name: String,
    /// Parser version string.
    pub version: String,
    /// Non-fatal issues the parser itself surfaced.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Provenance metadata: where this invoice came from and who produced it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Provenance {
    /// Email or upload.
    pub source_type: SourceType,
    /// When the canonical invoice was built.
    pub captured_at: DateTime<Utc>,
    /// Parser identity.
    pub parser: ParserInfo,
    /// Reference back to the raw source artifact.
    pub source_ref: SourceRef,
}

/// How a single field's value was determined, for audit/debugging.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FieldConfidence {
    /// Dot-path into the canonical invoice (e.g. `"totals.invoice_total"`).
    pub path: String,
    /// Confidence score for this field.
    pub score: f64,
    /// Short tag for how the score was derived (e.g. `"vendor_pattern"`,
    /// `"roi_fallback"`, `"additive_heuristic"`).
    pub method: String,
    /// Supporting text snippets or rule ids.
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Overall invoice confidence plus per-field evidence.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Confidence {
    /// Overall confidence, clamped to `[0, 0.9]`.
    pub overall: f64,
    /// Per-field confidence breakdown.
    #[serde(default)]
    pub fields: Vec<FieldConfidence>,
}

impl Doc {
    /// Clamp and apply the `[0, 0.9]`-style rules that apply to the *document*
    /// overall confidence live on [`Confidence`], not here; this constructor
    /// only fills in the structural defaults every doc needs.
    #[must_use]
    pub fn new(raw_text: Option<&str>, currency: impl Into<String>) -> Self {
        Self {
            doc_id: derive_doc_id(raw_text),
            doc_type: "invoice".to_string(),
            invoice_number: None,
            purchase_order: None,
            issued_at: Utc::now(),
            service_period: None,
            currency: currency.into(),
            raw_text_hash: raw_text.map(|t| {
                let digest = Sha256::digest(t.as_bytes());
                hex_prefix(&digest, 12)
            }),
            tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_is_deterministic_for_identical_raw_text() {
        let a = derive_doc_id(Some("hello invoice"));
        let b = derive_doc_id(Some("hello invoice"));
        assert_eq!(a, b);
        assert!(a.starts_with("DOC-"));
        assert_eq!(a.len(), "DOC-".len() + 12);
    }

    #[test]
    fn doc_id_differs_for_different_raw_text() {
        let a = derive_doc_id(Some("hello invoice"));
        let b = derive_doc_id(Some("goodbye invoice"));
        assert_ne!(a, b);
    }

    #[test]
    fn doc_id_falls_back_to_random_when_no_raw_text() {
        let a = derive_doc_id(None);
        let b = derive_doc_id(None);
        assert_ne!(a, b, "random fallback should not collide in practice");
    }

    #[test]
    fn normalize_name_folds_case_and_whitespace() {
        assert_eq!(normalize_name("  Sysco   Corporation. "), "sysco corporation");
    }

    #[test]
    fn party_named_derives_normalized_name() {
        let p = Party::named("Acme, LLC");
        assert_eq!(p.normalized_name, "acme llc");
    }
}
