//! JSON boundary helpers
//!
//! Decimals stay exact inside the pipeline and are lowered to JSON numbers
//! only here.
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::{Number, Value};

/// Decimal → JSON number. Integral values become integers, the rest floats.
pub fn decimal_to_json(value: Decimal) -> Value {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        if let Ok(n) = i64::try_from(normalized.mantissa()) {
            return Value::Number(Number::from(n));
        }
    }
    normalized
        .to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Calendar date → ISO 8601 string
pub fn date_to_json(value: NaiveDate) -> Value {
    Value::String(value.format("%Y-%m-%d").to_string())
}

/// Timestamp → RFC 3339 string
pub fn datetime_to_json(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339())
}

/// Serialize any structure (including nested containers) into plain JSON
pub fn to_json_safe<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

/// Human-facing number: integers bare, others rounded to two places
pub fn format_decimal(value: Decimal) -> String {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        return normalized.to_string();
    }
    let rounded = normalized.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_decimal_to_json() {
        assert_eq!(decimal_to_json(Decimal::from_str("15.00").unwrap()), json!(15));
        assert_eq!(decimal_to_json(Decimal::from_str("600.305").unwrap()), json!(600.305));
        assert_eq!(decimal_to_json(Decimal::ZERO), json!(0));
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(Decimal::from_str("150.00").unwrap()), "150");
        assert_eq!(format_decimal(Decimal::from_str("600.305").unwrap()), "600.31");
        assert_eq!(format_decimal(Decimal::from_str("12.5").unwrap()), "12.50");
    }

    #[test]
    fn test_dates_become_iso_strings() {
        let d = NaiveDate::from_ymd_opt(2025, 4, 8).unwrap();
        assert_eq!(date_to_json(d), json!("2025-04-08"));
    }
}
