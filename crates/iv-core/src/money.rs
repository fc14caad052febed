// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tagged-sum money parsing.
//!
//! Parser output represents money inconsistently: a bare number, a formatted
//! string like `"$1,748.85"`, or an object with `amount`/`value`/`price` and
//! an optional currency. [`Money`] is the single canonical shape; [`parse_money`]
//! is the one coercion function every upstream caller (canonical builder,
//! extraction pipeline) should funnel through rather than hand-rolling string
//! parsing at each call site.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A monetary amount with an explicit currency.
///
/// Amounts are major-unit floats (e.g. `4.50` for four dollars fifty) at this
/// layer; callers needing exact integer cents (as the extraction pipeline's
/// totals do internally) convert via [`Money::cents`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Money {
    /// Major-unit amount (e.g. dollars).
    pub amount: f64,
    /// ISO 4217 currency code.
    pub currency: String,
}

impl Money {
    /// Construct a new `Money` value.
    #[must_use]
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Build from integer cents.
    #[must_use]
    pub fn from_cents(cents: i64, currency: impl Into<String>) -> Self {
        Self::new(cents as f64 / 100.0, currency)
    }

    /// Convert to integer cents, rounding to the nearest cent.
    #[must_use]
    pub fn cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

/// Any shape of input [`parse_money`] accepts: a bare `number | string`, or
/// an object carrying the amount under `amount`, `value`, or `price`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MoneyInput {
    /// A bare numeric amount, currency supplied out-of-band.
    Number(f64),
    /// A formatted string such as `"$1,748.85"` or `"1748.85 USD"`.
    Text(String),
    /// A structured object carrying the amount under one of several keys.
    Object(MoneyObject),
    /// Explicit absence.
    Null,
}

/// The structured object variant of [`MoneyInput`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoneyObject {
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    price: Option<serde_json::Value>,
    #[serde(default)]
    currency: Option<String>,
}

/// Parse any of the accepted raw shapes into a canonical [`Money`], or
/// `None` when nothing usable was found.
///
/// `currency_fallback` is used whenever the input doesn't name its own
/// currency (a bare number or string without a trailing currency code).
#[must_use]
pub fn parse_money(input: &serde_json::Value, currency_fallback: &str) -> Option<Money> {
    match input {
        serde_json::Value::Null => None,
        serde_json::Value::Number(n) => n.as_f64().map(|a| Money::new(a, currency_fallback)),
        serde_json::Value::String(s) => parse_money_string(s, currency_fallback),
        serde_json::Value::Object(_) => {
            let obj: MoneyObject = serde_json::from_value(input.clone()).ok()?;
            parse_money_object(&obj, currency_fallback)
        }
        _ => None,
    }
}

fn parse_money_object(obj: &MoneyObject, currency_fallback: &str) -> Option<Money> {
    let currency = obj.currency.clone().unwrap_or_else(|| currency_fallback.to_string());
    let candidate = obj
        .amount
        .as_ref()
        .or(obj.value.as_ref())
        .or(obj.price.as_ref())?;
    match candidate {
        serde_json::Value::Number(n) => n.as_f64().map(|a| Money::new(a, currency)),
        serde_json::Value::String(s) => parse_money_string(s, &currency),
        _ => None,
    }
}

/// Parse a formatted amount string like `"$1,748.85"`, `"1748.85"`, or
/// `"EUR 42.00"` into a [`Money`].
#[must_use]
pub fn parse_money_string(raw: &str, currency_fallback: &str) -> Option<Money> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative = trimmed.starts_with('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let currency = detect_currency_code(trimmed).unwrap_or_else(|| currency_fallback.to_string());

    let numeric: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if numeric.is_empty() {
        return None;
    }
    let mut amount: f64 = numeric.parse().ok()?;
    if negative {
        amount = -amount;
    }
    Some(Money::new(amount, currency))
}

fn detect_currency_code(raw: &str) -> Option<String> {
    if raw.contains('$') {
        return Some("USD".to_string());
    }
    if raw.contains('€') {
        return Some("EUR".to_string());
    }
    if raw.contains('£') {
        return Some("GBP".to_string());
    }
    for code in ["USD", "EUR", "GBP", "CAD", "AUD"] {
        if raw.to_ascii_uppercase().contains(code) {
            return Some(code.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_number() {
        let m = parse_money(&json!(42.5), "USD").unwrap();
        assert_eq!(m.amount, 42.5);
        assert_eq!(m.currency, "USD");
    }

    #[test]
    fn parses_formatted_dollar_string() {
        let m = parse_money(&json!("$1,748.85"), "USD").unwrap();
        assert!((m.amount - 1748.85).abs() < 1e-9);
        assert_eq!(m.currency, "USD");
    }

    #[test]
    fn parses_object_with_unit_price_dollars_style_key() {
        let m = parse_money(&json!({"value": 4.50, "currency": "USD"}), "USD").unwrap();
        assert_eq!(m.amount, 4.50);
    }

    #[test]
    fn parses_object_with_price_key_and_no_currency() {
        let m = parse_money(&json!({"price": "9.99"}), "EUR").unwrap();
        assert_eq!(m.currency, "EUR");
        assert!((m.amount - 9.99).abs() < 1e-9);
    }

    #[test]
    fn null_and_empty_string_are_none() {
        assert!(parse_money(&json!(null), "USD").is_none());
        assert!(parse_money(&json!(""), "USD").is_none());
    }

    #[test]
    fn negative_parenthesized_amount_is_negative() {
        let m = parse_money(&json!("($12.00)"), "USD").unwrap();
        assert!(m.amount < 0.0);
    }

    #[test]
    fn cents_round_trip() {
        let m = Money::from_cents(174_885, "USD");
        assert_eq!(m.cents(), 174_885);
    }
}
