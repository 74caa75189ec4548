//! Shared numeric and date coercion helpers for provider payloads.
//!
//! Provider JSON mixes numbers, numeric strings, nulls and empty strings for
//! the same fields, so every extraction goes through these coercions.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

const DEFAULT_RANGE_DAYS: i64 = 7;

/// Coerce a JSON value into a finite f64, accepting numeric strings.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Round to two decimal places for currency amounts.
pub fn to_currency(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

/// Walk a JSON path like `["financial_data", "products"]`.
pub fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

pub fn number_at(root: &Value, path: &[&str]) -> Option<f64> {
    value_at(root, path).and_then(to_number)
}

/// Non-empty trimmed string at a path; numbers are stringified so numeric
/// identifiers can serve as order/sku keys.
pub fn string_at(root: &Value, path: &[&str]) -> Option<String> {
    match value_at(root, path)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Evaluate an ordered list of path accessors and return the first non-zero
/// numeric hit. Zero-valued placeholder fields must not mask real values, so
/// a plain zero only wins when no later accessor produces anything else.
pub fn first_non_zero(root: &Value, paths: &[&[&str]]) -> Option<f64> {
    let mut first_numeric = None;
    for path in paths {
        if let Some(num) = number_at(root, path) {
            if num != 0.0 {
                return Some(num);
            }
            first_numeric.get_or_insert(num);
        }
    }
    first_numeric
}

/// Parse the datetime formats providers actually send: RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS`, or a bare date.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}

pub fn datetime_at(root: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    value_at(root, path)
        .and_then(Value::as_str)
        .and_then(parse_datetime)
}

/// Parse a date from the loose `date`/`stat_date` style fields, accepting a
/// full timestamp by truncating to its date part.
pub fn parse_stat_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() >= 10 {
        if let Ok(date) = NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }
    None
}

/// Clamp an optional date range to full UTC days.
///
/// Missing `to` defaults to now, missing `from` to six days earlier; an
/// inverted range is swapped rather than rejected.
pub fn normalize_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let mut to_date = to.unwrap_or(now);
    let mut from_date = from.unwrap_or(to_date - Duration::days(DEFAULT_RANGE_DAYS - 1));

    if from_date > to_date {
        std::mem::swap(&mut from_date, &mut to_date);
    }

    let start = from_date
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or(from_date);
    let end = to_date
        .date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or(to_date);

    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_number_accepts_numeric_strings() {
        assert_eq!(to_number(&json!("12.5")), Some(12.5));
        assert_eq!(to_number(&json!(7)), Some(7.0));
        assert_eq!(to_number(&json!("")), None);
        assert_eq!(to_number(&json!(null)), None);
        assert_eq!(to_number(&json!("abc")), None);
    }

    #[test]
    fn first_non_zero_skips_zero_placeholders() {
        let raw = json!({ "price": 0, "client_price": "49.90", "old_price": 60 });
        let picked = first_non_zero(&raw, &[&["price"], &["client_price"], &["old_price"]]);
        assert_eq!(picked, Some(49.9));
    }

    #[test]
    fn first_non_zero_falls_back_to_plain_zero() {
        let raw = json!({ "price": 0 });
        let picked = first_non_zero(&raw, &[&["price"], &["client_price"]]);
        assert_eq!(picked, Some(0.0));
        assert_eq!(first_non_zero(&raw, &[&["missing"]]), None);
    }

    #[test]
    fn normalize_range_clamps_to_full_days() {
        let from = parse_datetime("2025-01-01T10:30:00Z");
        let to = parse_datetime("2025-01-05T04:00:00Z");
        let (start, end) = normalize_range(from, to);
        assert_eq!(start.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(end.timestamp_subsec_millis(), 999);
        assert_eq!(end.date_naive().to_string(), "2025-01-05");
    }

    #[test]
    fn normalize_range_swaps_inverted_bounds() {
        let from = parse_datetime("2025-03-10T00:00:00Z");
        let to = parse_datetime("2025-03-01T00:00:00Z");
        let (start, end) = normalize_range(from, to);
        assert!(start < end);
        assert_eq!(start.date_naive().to_string(), "2025-03-01");
        assert_eq!(end.date_naive().to_string(), "2025-03-10");
    }

    #[test]
    fn parse_stat_date_truncates_timestamps() {
        assert_eq!(
            parse_stat_date("2024-09-01T08:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 9, 1)
        );
        assert_eq!(parse_stat_date("bogus"), None);
    }
}
