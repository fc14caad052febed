// SPDX-License-Identifier: MIT OR Apache-2.0
//! Address coercion from whatever shape a parser handed back.

use iv_core::Address;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn zip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{5})(?:-\d{4})?\b").unwrap())
}

fn state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z]{2})\s+\d{5}").unwrap())
}

/// Coerce one address value into an [`Address`], accepting either:
/// - `{line1, line2?, city_state_zip}` — `city_state_zip` is parsed with a
///   ZIP and state regex, city taken as the text preceding the state code;
/// - `{street|line1|address1, city, state, postalCode|postal|zip, country?}`.
///
/// Returns `None` if `value` isn't an object or carries no usable field.
#[must_use]
pub fn coerce_address(value: &Value) -> Option<Address> {
    let obj = value.as_object()?;

    if let Some(csz) = obj.get("city_state_zip").and_then(Value::as_str) {
        let line1 = obj
            .get("line1")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let line2 = obj.get("line2").and_then(Value::as_str);
        let raw = match line2 {
            Some(l2) if !l2.is_empty() => format!("{line1}\n{l2}\n{csz}"),
            _ => format!("{line1}\n{csz}"),
        };

        let postal = zip_re().captures(csz).map(|c| c[1].to_string());
        let state = state_re().captures(csz).map(|c| c[1].to_string());
        let city = state.as_ref().and_then(|s| {
            let marker = format!(" {s} ");
            csz.find(&marker)
                .map(|idx| csz[..idx].trim_end_matches(',').trim().to_string())
        });

        let confidence = if postal.is_some() { 0.85 } else { 0.5 };
        return Some(Address {
            raw,
            street: (!line1.is_empty()).then(|| line1.to_string()),
            city,
            state,
            postal,
            country: "US".to_string(),
            confidence,
        });
    }

    let street = first_str(obj, &["street", "line1", "address1"]);
    let city = first_str(obj, &["city"]);
    let state = first_str(obj, &["state"]);
    let postal = first_str(obj, &["postalCode", "postal", "zip"]);
    let country = first_str(obj, &["country"]).unwrap_or_else(|| "US".to_string());

    if street.is_none() && city.is_none() && state.is_none() && postal.is_none() {
        return None;
    }

    let raw = [street.as_deref(), city.as_deref(), state.as_deref(), postal.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    let confidence = if postal.as_deref().is_some_and(|p| zip_re().is_match(p)) {
        0.85
    } else {
        0.5
    };

    Some(Address {
        raw,
        street,
        city,
        state,
        postal,
        country,
        confidence,
    })
}

fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn city_state_zip_yields_high_confidence_when_zip_recovered() {
        let addr = coerce_address(&json!({
            "line1": "123 Main St",
            "city_state_zip": "Springfield, IL 62704",
        }))
        .unwrap();
        assert_eq!(addr.street.as_deref(), Some("123 Main St"));
        assert_eq!(addr.city.as_deref(), Some("Springfield"));
        assert_eq!(addr.state.as_deref(), Some("IL"));
        assert_eq!(addr.postal.as_deref(), Some("62704"));
        assert_eq!(addr.confidence, 0.85);
    }

    #[test]
    fn nested_address_object_is_accepted() {
        let addr = coerce_address(&json!({
            "address1": "456 Elm Ave",
            "city": "Austin",
            "state": "TX",
            "postalCode": "73301",
            "country": "US",
        }))
        .unwrap();
        assert_eq!(addr.street.as_deref(), Some("456 Elm Ave"));
        assert_eq!(addr.confidence, 0.85);
    }

    #[test]
    fn missing_zip_yields_lower_confidence() {
        let addr = coerce_address(&json!({
            "city": "Austin",
            "state": "TX",
        }))
        .unwrap();
        assert_eq!(addr.confidence, 0.5);
    }

    #[test]
    fn non_object_or_empty_returns_none() {
        assert!(coerce_address(&json!("just a string")).is_none());
        assert!(coerce_address(&json!({})).is_none());
    }
}
