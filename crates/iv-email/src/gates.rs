// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-message gates applied in order: dedupe, has-attachment,
//! supported-attachment, keyword, extraction-success. The first four are
//! expressed as [`iv_rule_engine`] rule sets rather than nested `if`s, the
//! same shape `iv-vendor` uses for vendor signals.

use iv_rule_engine::{Rule, RuleCondition, RuleEffect, RuleEngine};

/// Keywords that satisfy the keyword gate when found, case-insensitively, in
/// a message's subject or attachment filenames.
pub const KEYWORDS: &[&str] = &[
    "invoice",
    "bill",
    "statement",
    "receipt",
    "order",
    "payment",
    "purchase",
    "po",
    "quote",
    "estimate",
    "remittance",
    "credit",
    "debit",
];

const FILENAME_PATTERNS: &[&str] = &[r"(?i)inv[-_]?\d+", r"(?i)po[-_]?\d+", r"\d{4,}"];

const SUPPORTED_MIME_PATTERNS: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Build the attachment MIME support policy as an ordered rule set: anything
/// not explicitly allow-listed is denied.
#[must_use]
pub fn attachment_support_engine() -> RuleEngine {
    let mut engine = RuleEngine::new();
    for (idx, pattern) in SUPPORTED_MIME_PATTERNS.iter().enumerate() {
        engine.add_rule(Rule {
            id: format!("supported-mime-{idx}"),
            description: format!("{pattern} is a supported attachment type"),
            condition: RuleCondition::Pattern((*pattern).to_string()),
            effect: RuleEffect::Allow,
            priority: 10,
        });
    }
    engine.add_rule(Rule {
        id: "unsupported-mime-default".to_string(),
        description: "anything not allow-listed is unsupported".to_string(),
        condition: RuleCondition::Always,
        effect: RuleEffect::Deny {
            reason: "unsupported_attachment_type".to_string(),
        },
        priority: 0,
    });
    engine
}

/// `true` when `mime_type` clears the attachment support policy.
#[must_use]
pub fn is_supported_attachment(mime_type: &str) -> bool {
    matches!(
        attachment_support_engine().evaluate(mime_type),
        RuleEffect::Allow
    )
}

/// Build the keyword/filename gate: a keyword substring or filename pattern
/// match allows the message through.
#[must_use]
pub fn keyword_gate_engine() -> RuleEngine {
    let mut engine = RuleEngine::new();
    for (idx, kw) in KEYWORDS.iter().enumerate() {
        engine.add_rule(Rule {
            id: format!("keyword-{idx}"),
            description: format!("subject or filename contains '{kw}'"),
            condition: RuleCondition::Contains((*kw).to_string()),
            effect: RuleEffect::Allow,
            priority: 10,
        });
    }
    for (idx, pattern) in FILENAME_PATTERNS.iter().enumerate() {
        engine.add_rule(Rule {
            id: format!("filename-{idx}"),
            description: format!("filename matches {pattern}"),
            condition: RuleCondition::Regex((*pattern).to_string()),
            effect: RuleEffect::Allow,
            priority: 10,
        });
    }
    engine.add_rule(Rule {
        id: "keyword-gate-default".to_string(),
        description: "no keyword or filename signal present".to_string(),
        condition: RuleCondition::Always,
        effect: RuleEffect::Deny {
            reason: "no_invoice_keyword_match".to_string(),
        },
        priority: 0,
    });
    engine
}

/// `true` when `haystack` (subject plus attachment filenames, concatenated)
/// clears the keyword gate.
#[must_use]
pub fn passes_keyword_gate(haystack: &str) -> bool {
    matches!(keyword_gate_engine().evaluate(haystack), RuleEffect::Allow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_and_image_types_are_supported_but_archives_are_not() {
        assert!(is_supported_attachment("application/pdf"));
        assert!(is_supported_attachment("image/jpeg"));
        assert!(!is_supported_attachment("application/zip"));
    }

    #[test]
    fn keyword_in_subject_passes_gate() {
        assert!(passes_keyword_gate("Your Invoice #4821 is attached"));
        assert!(!passes_keyword_gate("Happy birthday!"));
    }

    #[test]
    fn filename_pattern_passes_gate_without_a_keyword() {
        assert!(passes_keyword_gate("see attached INV-4821.pdf"));
        assert!(passes_keyword_gate("see attached file 20260101.pdf"));
    }
}
