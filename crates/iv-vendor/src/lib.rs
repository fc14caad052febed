// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Vendor detection: score extracted invoice text against known vendor
//! signal sets and produce a `(vendor_key, name, confidence)` triple.
//!
//! Each vendor is a bag of weighted [`iv_rule_engine::RuleCondition`]s
//! (substring, regex, or boolean combinations of those) rather than a single
//! hard-coded string match, so a vendor's evidence can be named, composed,
//! and given independently tunable weight — the same shape the check
//! engine's attachment and keyword policies use.

use iv_rule_engine::RuleCondition;
use serde::{Deserialize, Serialize};

/// A vendor claim below this confidence is not asserted by callers (it's
/// surfaced as a candidate, not a fact).
pub const CONFIDENCE_THRESHOLD: u8 = 50;

/// One scored signal contributing to a vendor's total confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSignal {
    /// The pattern this signal looks for in the normalized text.
    pub condition: RuleCondition,
    /// Points added to the vendor's score when this signal matches.
    pub weight: u8,
}

impl VendorSignal {
    /// A signal that fires when `needle` appears anywhere in the text.
    #[must_use]
    pub fn contains(needle: &str, weight: u8) -> Self {
        Self {
            condition: RuleCondition::Contains(needle.to_string()),
            weight,
        }
    }

    /// A signal that fires when `pattern` matches the text as a regex.
    #[must_use]
    pub fn regex(pattern: &str, weight: u8) -> Self {
        Self {
            condition: RuleCondition::Regex(pattern.to_string()),
            weight,
        }
    }
}

/// A known vendor's identity plus the signals that identify its invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorProfile {
    /// Stable, machine-readable identifier (e.g. `"sysco"`).
    pub vendor_key: String,
    /// Display name asserted on a confident match (e.g. `"Sysco Corporation"`).
    pub name: String,
    /// Weighted evidence for this vendor. Weights need not sum to 100; the
    /// total is clamped when scored.
    pub signals: Vec<VendorSignal>,
}

impl VendorProfile {
    /// Score `text` (already normalized: lower-cased is not required, since
    /// [`RuleCondition::Contains`] matches case-insensitively) against this
    /// profile's signals. Each matching signal contributes its weight once;
    /// the total is clamped to `[0, 100]`.
    #[must_use]
    pub fn score(&self, text: &str) -> u8 {
        let total: u32 = self
            .signals
            .iter()
            .filter(|s| s.condition.matches(text))
            .map(|s| u32::from(s.weight))
            .sum();
        total.min(100) as u8
    }
}

/// The outcome of scoring text against a vendor profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMatch {
    /// The matched vendor's stable key.
    pub vendor_key: String,
    /// The matched vendor's display name.
    pub name: String,
    /// Confidence in `[0, 100]`.
    pub confidence: u8,
}

impl VendorMatch {
    /// `true` when this match clears [`CONFIDENCE_THRESHOLD`] and can be
    /// asserted as a vendor claim rather than just a candidate.
    #[must_use]
    pub fn is_confident(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }
}

/// A collection of known vendor profiles, scored as a whole against one
/// piece of text.
#[derive(Debug, Clone, Default)]
pub struct VendorRegistry {
    profiles: Vec<VendorProfile>,
}

impl VendorRegistry {
    /// An empty registry with no known vendors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with a small set of food-distribution vendors
    /// commonly seen on invoice-attachment text. Callers with their own
    /// vendor catalog should start from [`VendorRegistry::new`] instead.
    #[must_use]
    pub fn with_builtin_vendors() -> Self {
        let mut registry = Self::new();
        registry.add_profile(VendorProfile {
            vendor_key: "sysco".to_string(),
            name: "Sysco Corporation".to_string(),
            signals: vec![
                VendorSignal::contains("sysco", 70),
                VendorSignal::contains("invoice total", 15),
                VendorSignal::contains("group total", 15),
            ],
        });
        registry.add_profile(VendorProfile {
            vendor_key: "us_foods".to_string(),
            name: "US Foods".to_string(),
            signals: vec![
                VendorSignal::contains("us foods", 70),
                VendorSignal::contains("usfoods", 60),
                VendorSignal::contains("chef'store", 20),
            ],
        });
        registry.add_profile(VendorProfile {
            vendor_key: "performance_food_group".to_string(),
            name: "Performance Food Group".to_string(),
            signals: vec![
                VendorSignal::contains("performance food group", 75),
                VendorSignal::contains("pfgc", 50),
            ],
        });
        registry
    }

    /// Register an additional vendor profile.
    pub fn add_profile(&mut self, profile: VendorProfile) {
        self.profiles.push(profile);
    }

    /// Score `text` against every registered profile, sorted by descending
    /// confidence (ties broken by registration order). Profiles that score
    /// `0` are omitted.
    #[must_use]
    pub fn score_all(&self, text: &str) -> Vec<VendorMatch> {
        let mut matches: Vec<VendorMatch> = self
            .profiles
            .iter()
            .filter_map(|p| {
                let confidence = p.score(text);
                (confidence > 0).then_some(VendorMatch {
                    vendor_key: p.vendor_key.clone(),
                    name: p.name.clone(),
                    confidence,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        matches
    }

    /// The single best-scoring vendor, if any profile scored above `0`.
    /// Does not apply [`CONFIDENCE_THRESHOLD`] — use
    /// [`VendorRegistry::detect_confident`] to only accept a claim-worthy
    /// match.
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<VendorMatch> {
        self.score_all(text).into_iter().next()
    }

    /// The best-scoring vendor, but only if it clears
    /// [`CONFIDENCE_THRESHOLD`]; otherwise `None`, even if a lower-confidence
    /// candidate exists.
    #[must_use]
    pub fn detect_confident(&self, text: &str) -> Option<VendorMatch> {
        self.detect(text).filter(VendorMatch::is_confident)
    }

    /// Number of registered profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// `true` when no profiles are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysco_style_invoice_is_detected_with_confidence_at_or_above_threshold() {
        let registry = VendorRegistry::with_builtin_vendors();
        let text = "SYSCO\n...\nGROUP TOTAL 1,747.30\nINVOICE TOTAL 1,748.85";
        let m = registry.detect_confident(text).expect("sysco should be detected");
        assert_eq!(m.vendor_key, "sysco");
        assert_eq!(m.name, "Sysco Corporation");
        assert!(m.confidence >= CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let registry = VendorRegistry::with_builtin_vendors();
        let m = registry.detect_confident("invoice from sysco foods").unwrap();
        assert_eq!(m.vendor_key, "sysco");
    }

    #[test]
    fn weak_single_signal_match_is_a_candidate_but_not_a_confident_claim() {
        let mut registry = VendorRegistry::new();
        registry.add_profile(VendorProfile {
            vendor_key: "acme".to_string(),
            name: "Acme Supply".to_string(),
            signals: vec![VendorSignal::contains("acme", 30)],
        });
        let text = "Thank you for your order from Acme.";
        let detected = registry.detect(text).unwrap();
        assert_eq!(detected.confidence, 30);
        assert!(!detected.is_confident());
        assert!(registry.detect_confident(text).is_none());
    }

    #[test]
    fn multiple_matching_signals_sum_and_clamp_to_100() {
        let mut registry = VendorRegistry::new();
        registry.add_profile(VendorProfile {
            vendor_key: "big".to_string(),
            name: "Big Vendor".to_string(),
            signals: vec![
                VendorSignal::contains("big vendor", 80),
                VendorSignal::contains("order", 80),
            ],
        });
        let m = registry.detect("Big Vendor order confirmation").unwrap();
        assert_eq!(m.confidence, 100);
    }

    #[test]
    fn no_matching_profile_returns_none() {
        let registry = VendorRegistry::with_builtin_vendors();
        assert!(registry.detect("totally unrelated text with no vendor names").is_none());
    }

    #[test]
    fn score_all_orders_by_descending_confidence() {
        let mut registry = VendorRegistry::new();
        registry.add_profile(VendorProfile {
            vendor_key: "low".to_string(),
            name: "Low".to_string(),
            signals: vec![VendorSignal::contains("shared", 20)],
        });
        registry.add_profile(VendorProfile {
            vendor_key: "high".to_string(),
            name: "High".to_string(),
            signals: vec![VendorSignal::contains("shared", 60)],
        });
        let ranked = registry.score_all("this text has the shared keyword");
        assert_eq!(ranked[0].vendor_key, "high");
        assert_eq!(ranked[1].vendor_key, "low");
    }

    #[test]
    fn regex_signal_matches_vendor_specific_invoice_number_pattern() {
        let mut registry = VendorRegistry::new();
        registry.add_profile(VendorProfile {
            vendor_key: "acme".to_string(),
            name: "Acme Supply".to_string(),
            signals: vec![VendorSignal::regex(r"(?i)acme-inv-\d{6}", 60)],
        });
        assert!(registry.detect_confident("Reference: ACME-INV-004821").is_some());
        assert!(registry.detect("Reference: OTHER-INV-004821").is_none());
    }
}
