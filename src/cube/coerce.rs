//! Numeric coercion for cube cells.
//!
//! PxWeb encodes missing observations as token strings (`".."`, `"..."`,
//! `"-"`) and formats large numbers with thousands separators. Everything
//! unparseable maps to `None`, never NaN.

use serde_json::{Number, Value};

/// Lenient coercion: sentinel tokens and unparseable strings become `None`.
pub fn coerce_value(v: &Value) -> Option<f64> {
    match v {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => coerce_str(s),
        _ => None,
    }
}

pub fn coerce_str(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() || matches!(trimmed, ".." | "..." | "." | "-" | ":") {
        return None;
    }
    // strip thousands separators: comma, NBSP, narrow NBSP, plain space
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '\u{a0}' | '\u{202f}' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Strict variant: snaps already-integral values to JSON integers so output
/// datasets carry `1234`, not `1234.0`.
pub fn tidy_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Tidy an optional cell into its JSON representation.
pub fn tidy_value(n: Option<f64>) -> Value {
    match n {
        Some(n) => tidy_number(n),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sentinel_tokens_become_none() {
        for token in ["..", "...", "-", ".", ":", "", "  "] {
            assert_eq!(coerce_str(token), None, "token {token:?}");
        }
        assert_eq!(coerce_value(&Value::Null), None);
    }

    #[test]
    fn thousands_separators_are_stripped() {
        assert_eq!(coerce_str("1,234"), Some(1234.0));
        assert_eq!(coerce_str("1\u{a0}234,567"), Some(1_234_567.0));
        assert_eq!(coerce_str("12.5"), Some(12.5));
        assert_eq!(coerce_str("-3.25"), Some(-3.25));
    }

    #[test]
    fn non_numeric_strings_become_none_not_nan() {
        assert_eq!(coerce_str("n/a"), None);
        assert_eq!(coerce_str("NaN"), None);
        assert_eq!(coerce_value(&json!(["1"])), None);
    }

    #[test]
    fn tidy_snaps_integral_values_lenient_does_not() {
        assert_eq!(coerce_value(&json!("1234")), Some(1234.0));
        assert_eq!(tidy_number(1234.0), json!(1234));
        assert_eq!(tidy_number(12.5), json!(12.5));
        assert_eq!(tidy_value(None), Value::Null);
    }
}
