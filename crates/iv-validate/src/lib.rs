// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strict JSON Schema validation of canonical invoice v1 documents.
//!
//! The canonical builder (`iv-canonical`) is deliberately tolerant: it emits
//! best-effort warnings rather than failing on soft defects. This crate is
//! the separate, strict collaborator: schema validation happens *after* the
//! builder, as its own pass, so a caller can choose to accept a
//! low-confidence-but-valid invoice or reject one that violates the wire
//! contract outright.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use iv_core::CanonicalInvoice;
use jsonschema::Validator;
use schemars::schema_for;
use serde_json::Value;
use std::sync::OnceLock;

/// A single schema validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON Pointer into the document where validation failed.
    pub instance_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

/// Errors returned by [`validate`].
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// The document failed schema validation; carries every violation found
    /// (not just the first) so a caller can report them all at once.
    #[error("canonical invoice failed schema validation ({} issue(s))", .0.len())]
    SchemaViolations(Vec<ValidationIssue>),
    /// The input could not even be parsed as JSON.
    #[error("input is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
}

fn compiled_schema() -> &'static Validator {
    static SCHEMA: OnceLock<Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = schema_for!(CanonicalInvoice);
        let schema_value = serde_json::to_value(&schema).expect("schema serializes to JSON");
        jsonschema::validator_for(&schema_value).expect("generated schema is a valid JSON Schema")
    })
}

/// Validate a [`CanonicalInvoice`] against the draft 2020-12 JSON Schema
/// derived from its Rust type definition.
pub fn validate(invoice: &CanonicalInvoice) -> Result<(), ValidateError> {
    let value = serde_json::to_value(invoice)?;
    validate_value(&value)
}

/// Validate a raw JSON value (e.g. one read back from storage or received
/// over the wire) against the canonical invoice v1 schema.
pub fn validate_value(value: &Value) -> Result<(), ValidateError> {
    let validator = compiled_schema();
    let issues: Vec<ValidationIssue> = validator
        .iter_errors(value)
        .map(|e| ValidationIssue {
            instance_path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::SchemaViolations(issues))
    }
}

/// Returns the schema itself as a JSON value, e.g. for publishing alongside
/// API documentation.
#[must_use]
pub fn schema_json() -> Value {
    let schema = schema_for!(CanonicalInvoice);
    serde_json::to_value(&schema).expect("schema serializes to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use iv_core::*;

    fn sample_invoice() -> CanonicalInvoice {
        CanonicalInvoice {
            doc: Doc::new(Some("raw text"), "USD"),
            parties: Parties {
                vendor: Party::named("Sysco Corporation"),
                customer: Party::named("Acme LLC"),
                bill_to: None,
                ship_to: None,
            },
            line_items: vec![LineItem {
                line_id: "1".to_string(),
                raw_description: "Widget".to_string(),
                normalized_description: None,
                sku: None,
                quantity: 3.0,
                unit_price: Some(Money::new(4.50, "USD")),
                total_price: Some(Money::new(13.50, "USD")),
                frequency: Frequency::Unknown,
                attributes: Default::default(),
                confidence: LineConfidence {
                    overall: 0.8,
                    notes: vec![],
                },
            }],
            totals: Totals {
                invoice_total: Some(Money::new(13.50, "USD")),
                weekly_equivalent_total: None,
                notes: vec![],
            },
            provenance: Provenance {
                source_type: SourceType::Upload,
                captured_at: Utc::now(),
                parser: ParserInfo {
                    name: "p".to_string(),
                    version: "1".to_string(),
                    warnings: vec![],
                },
                source_ref: SourceRef {
                    kind: SourceRefKind::None,
                    value: None,
                    mime_type: None,
                },
            },
            confidence: Confidence {
                overall: 0.75,
                fields: vec![],
            },
        }
    }

    #[test]
    fn valid_invoice_passes() {
        let invoice = sample_invoice();
        assert!(validate(&invoice).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let mut value = serde_json::to_value(sample_invoice()).unwrap();
        value.as_object_mut().unwrap().remove("doc");
        let err = validate_value(&value).unwrap_err();
        assert!(matches!(err, ValidateError::SchemaViolations(_)));
    }

    #[test]
    fn schema_json_is_a_valid_schema_document() {
        let schema = schema_json();
        assert!(schema.is_object());
    }
}
