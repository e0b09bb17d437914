//! Numeric coercion and the textual renderings a figure may take in print.

use crate::config::ScaleConfig;
use serde_json::Value;
use std::collections::BTreeSet;

/// Coerces any JSON value to a finite float, falling back to 0.
pub fn safe_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// True when a currency figure looks like raw base units rather than crores/millions.
pub fn is_likely_wrong_scale(value: f64, scale: &ScaleConfig) -> bool {
    value >= scale.wrong_scale_threshold
}

/// Formats with at most `decimals` places, trimming trailing zeros and the dot.
pub fn format_trimmed(value: f64, decimals: usize) -> String {
    let s = format!("{:.*}", decimals, value);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// `1234567` -> `1,234,567`
pub fn group_western(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut groups: Vec<&str> = Vec::new();
    let mut end = digits.len();
    while end > 3 {
        groups.push(&digits[end - 3..end]);
        end -= 3;
    }
    groups.push(&digits[..end]);
    groups.reverse();
    with_sign(n, groups.join(","))
}

/// `1234567` -> `12,34,567` (lakh/crore grouping)
pub fn group_south_asian(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    if digits.len() <= 3 {
        return with_sign(n, digits);
    }
    let (rest, last3) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = rest.len();
    while end > 2 {
        groups.push(&rest[end - 2..end]);
        end -= 2;
    }
    if end > 0 {
        groups.push(&rest[..end]);
    }
    groups.reverse();
    with_sign(n, format!("{},{}", groups.join(","), last3))
}

fn with_sign(n: i64, body: String) -> String {
    if n < 0 {
        format!("-{}", body)
    } else {
        body
    }
}

/// Plausible printed forms of `value`: the rounded integer, 1- and 2-decimal
/// forms, and both digit groupings of the integer.
pub fn format_groupings(value: f64) -> BTreeSet<String> {
    let mut candidates = BTreeSet::new();
    if !value.is_finite() {
        return candidates;
    }

    let rounded = value.round() as i64;
    candidates.insert(rounded.to_string());
    candidates.insert(format_trimmed(value, 2));
    candidates.insert(format_trimmed(value, 1));
    candidates.insert(group_western(rounded));
    candidates.insert(group_south_asian(rounded));
    candidates
}

/// Search strings used when highlighting a value on its cited page. Unlike
/// [`format_groupings`] this keeps the full-precision rendering and a
/// digits-only variant, and never yields "0".
pub fn highlight_candidates(value: f64) -> Vec<String> {
    if value == 0.0 || !value.is_finite() {
        return Vec::new();
    }

    let mut candidates = BTreeSet::new();
    if (value - value.trunc()).abs() < 1e-9 {
        candidates.insert((value as i64).to_string());
    }
    candidates.insert(value.to_string());
    candidates.insert(format_trimmed(value, 2));
    candidates.insert(format_trimmed(value, 1));

    let digit_forms: Vec<String> = candidates
        .iter()
        .map(|c| c.chars().filter(|ch| ch.is_ascii_digit()).collect::<String>())
        .filter(|d| !d.is_empty())
        .collect();
    candidates.extend(digit_forms);

    candidates
        .into_iter()
        .filter(|c| !c.is_empty() && c != "0")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_number_never_fails() {
        assert_eq!(safe_number(&json!(12.5)), 12.5);
        assert_eq!(safe_number(&json!(" 42 ")), 42.0);
        assert_eq!(safe_number(&json!("1,234")), 0.0);
        assert_eq!(safe_number(&json!(null)), 0.0);
        assert_eq!(safe_number(&json!({"value": 3})), 0.0);
        assert_eq!(safe_number(&json!([1, 2])), 0.0);
        assert_eq!(safe_number(&json!("NaN")), 0.0);
        assert_eq!(safe_number(&json!(true)), 1.0);
    }

    #[test]
    fn test_wrong_scale_threshold() {
        let scale = ScaleConfig::default();
        assert!(is_likely_wrong_scale(1e9, &scale));
        assert!(is_likely_wrong_scale(2.5e13, &scale));
        assert!(!is_likely_wrong_scale(999_999_999.0, &scale));
        assert!(!is_likely_wrong_scale(-5e12, &scale));
    }

    #[test]
    fn test_groupings() {
        assert_eq!(group_western(1234567), "1,234,567");
        assert_eq!(group_south_asian(1234567), "12,34,567");
        assert_eq!(group_south_asian(123456789), "12,34,56,789");
        assert_eq!(group_south_asian(123456), "1,23,456");
        assert_eq!(group_south_asian(999), "999");
        assert_eq!(group_western(999), "999");
        assert_eq!(group_western(-1234), "-1,234");
        assert_eq!(group_south_asian(-1234567), "-12,34,567");
    }

    #[test]
    fn test_format_groupings_of_decimal_value() {
        let candidates = format_groupings(1234567.38);
        assert!(candidates.contains("1234567"));
        assert!(candidates.contains("1234567.38"));
        assert!(candidates.contains("1234567.4"));
        assert!(candidates.contains("1,234,567"));
        assert!(candidates.contains("12,34,567"));
    }

    #[test]
    fn test_format_trimmed() {
        assert_eq!(format_trimmed(5.0, 2), "5");
        assert_eq!(format_trimmed(5.20, 2), "5.2");
        assert_eq!(format_trimmed(120.0, 1), "120");
    }

    #[test]
    fn test_highlight_candidates() {
        assert!(highlight_candidates(0.0).is_empty());

        let candidates = highlight_candidates(45.67);
        assert!(candidates.contains(&"45.67".to_string()));
        assert!(candidates.contains(&"4567".to_string()));
        assert!(candidates.contains(&"45.7".to_string()));

        let whole = highlight_candidates(1200.0);
        assert!(whole.contains(&"1200".to_string()));
        assert!(!whole.contains(&"0".to_string()));
    }
}
