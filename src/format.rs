use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Coerces a loosely typed JSON value into a finite number, falling back to 0.
pub fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(0.0)
            }
        }
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    finite_or_zero(number)
}

/// Coerces a loosely typed JSON value into display text; containers become empty.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn finite_or_zero(number: f64) -> f64 {
    // -0.0 would otherwise print as "-0.00"
    if number.is_finite() && number != 0.0 {
        number
    } else {
        0.0
    }
}

/// Positive whole numbers as ids; fractions, zero and negatives are rejected.
pub fn whole_id(number: f64) -> Option<i64> {
    if number > 0.0 && number.fract() == 0.0 && number <= i64::MAX as f64 {
        Some(number as i64)
    } else {
        None
    }
}

pub fn format_currency(amount: f64, symbol: &str) -> String {
    format!("{symbol}{:.2}", finite_or_zero(amount))
}

pub fn format_gigabytes(bytes: f64) -> String {
    format!("{:.2} GB", finite_or_zero(finite_or_zero(bytes) / GIB))
}

pub fn format_margin(percent: f64) -> String {
    format!("{:.1}%", finite_or_zero(percent))
}

/// Reduces a date or timestamp string to its `YYYY-MM-DD` form.
///
/// Timestamps carrying an offset are normalized to UTC first. Strings that do
/// not look like a date are returned untouched.
pub fn clean_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.with_timezone(&Utc).format("%Y-%m-%d").to_string();
    }
    for pattern in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return parsed.date().format("%Y-%m-%d").to_string();
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return parsed.format("%Y-%m-%d").to_string();
    }
    // epoch milliseconds
    if trimmed.len() >= 12 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(parsed) = trimmed
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        {
            return parsed.format("%Y-%m-%d").to_string();
        }
    }

    trimmed.to_string()
}
