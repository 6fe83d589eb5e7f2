//! Loosely-typed intent hints from a language model.
//!
//! Every field is optional and coerced at the boundary. A malformed field is
//! dropped, never an error.

use chrono::NaiveDate;
use expq_core::{AggregateOp, DateRange, SortOrder};
use serde::Serialize;
use serde_json::{Map, Value};

/// Candidate query fields proposed by a hint source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntentHint {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub companions: Option<Vec<String>>,
    pub payment_method: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub date_range: Option<DateRange>,
    pub aggregate: Option<AggregateOp>,
    pub aggregate_field: Option<String>,
    pub group_by: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl IntentHint {
    /// Empty hint (no model, or the model failed)
    pub fn none() -> Self {
        Self::default()
    }

    /// Coerce an arbitrary JSON value. Filter fields may sit at the top level
    /// or inside a nested "filters" object; top-level values win.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let empty = Map::new();
        let filters = obj.get("filters").and_then(Value::as_object).unwrap_or(&empty);
        let pick = |key: &str| lookup(obj, filters, key);
        let pick_any = |keys: &[&str]| keys.iter().find_map(|k| lookup(obj, filters, k));

        IntentHint {
            category: pick("category").and_then(as_text),
            subcategory: pick("subcategory").and_then(as_text),
            companions: pick("companions").and_then(as_text_list),
            payment_method: pick_any(&["paymentMethod", "payment_method"]).and_then(as_text),
            min_amount: pick("min_amount").and_then(as_number),
            max_amount: pick("max_amount").and_then(as_number),
            date_range: pick("date_range").and_then(as_date_range),
            aggregate: pick("aggregate")
                .and_then(as_text)
                .and_then(|s| s.parse().ok()),
            aggregate_field: pick("aggregate_field").and_then(as_text),
            group_by: pick("group_by").and_then(as_text_list),
            columns: pick("columns").and_then(as_text_list),
            sort_by: pick("sort_by").and_then(as_text),
            sort_order: pick("sort_order")
                .and_then(as_text)
                .and_then(|s| s.parse().ok()),
            limit: pick("limit").and_then(as_count),
            offset: pick("offset").and_then(as_count),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, filters: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key)
        .filter(|v| !v.is_null())
        .or_else(|| filters.get(key).filter(|v| !v.is_null()))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list of strings, or a single string (optionally comma-separated)
fn as_text_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    (!items.is_empty()).then_some(items)
}

fn as_number(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches(['₹', '$'])
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn as_count(value: &Value) -> Option<usize> {
    as_number(value)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as usize)
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    let date_part = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn as_date_range(value: &Value) -> Option<DateRange> {
    let obj = value.as_object()?;
    let start = obj
        .get("start")
        .or_else(|| obj.get("start_date"))
        .and_then(as_date);
    let end = obj.get("end").or_else(|| obj.get("end_date")).and_then(as_date);
    let range = DateRange::new(start, end);
    (!range.is_unbounded()).then_some(range)
}
