//! Deterministic answers built straight from a `QueryResult`.
//!
//! Used when a generated answer is missing or contradicts the data. Never
//! calls a language model.

use expq_core::json::decimal_to_json;
use expq_core::{NlpResponse, QueryResult};
use serde_json::{json, Value};

use crate::renderer::{format_number, TemplateRenderer};

/// Display label for a metric key
pub fn metric_label(metric: &str) -> String {
    match metric {
        "sum" => "Sum".to_string(),
        "avg" => "Average".to_string(),
        "count" => "Count".to_string(),
        "min" => "Minimum".to_string(),
        "max" => "Maximum".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// "{Metric}: {value}" per metric, "Found {n} matching records", or
/// "No matching records found"
pub fn fallback_answer(result: &QueryResult, renderer: &TemplateRenderer) -> String {
    if let Some(aggregate) = result.aggregate_result.as_ref().filter(|a| !a.is_empty()) {
        let lines: Vec<String> = aggregate
            .iter()
            .map(|(metric, value)| {
                let label = metric_label(metric);
                match value {
                    Some(v) => {
                        let data = json!({"label": label, "value": decimal_to_json(v)});
                        renderer
                            .render("aggregate_metric", &data)
                            .unwrap_or_else(|_| format!("{}: {}", label, format_number(&data["value"])))
                    }
                    None => renderer
                        .render("aggregate_metric_empty", &json!({"label": label}))
                        .unwrap_or_else(|_| format!("{}: no matching records", label)),
                }
            })
            .collect();
        return lines.join("; ");
    }

    if !result.rows.is_empty() {
        let count = result.rows.len();
        return renderer
            .render("rows_found", &json!({"count": count}))
            .unwrap_or_else(|_| format!("Found {} matching records", count));
    }

    renderer
        .render("no_records", &json!({}))
        .unwrap_or_else(|_| "No matching records found".to_string())
}

/// Templated response for a result, flagged as a fallback
pub fn create_safe_fallback_response(result: &QueryResult, user_id: &str) -> NlpResponse {
    let answer = fallback_answer(result, TemplateRenderer::builtin());
    NlpResponse::new(user_id, answer)
        .with_output(result.clone())
        .with_context("fallback", Value::Bool(true))
        .with_context("source", json!("template"))
}

/// Richer deterministic phrasing: grouped buckets and pagination hints
pub fn phrase_result(result: &QueryResult, renderer: &TemplateRenderer, group_by: &[String]) -> String {
    if result.has_aggregate() || result.rows.is_empty() {
        return fallback_answer(result, renderer);
    }

    if !group_by.is_empty() {
        let groups: Vec<Value> = result
            .rows
            .iter()
            .filter_map(|row| {
                let key = group_by
                    .iter()
                    .map(|k| match row.get(k) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => "none".to_string(),
                        Some(other) => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" / ");
                let value = row
                    .iter()
                    .find(|(name, _)| !group_by.contains(name))
                    .map(|(_, v)| v.clone())?;
                Some(json!({"key": key, "value": value}))
            })
            .collect();
        if let Ok(text) = renderer.render("grouped_summary", &json!({"groups": groups})) {
            return text;
        }
        return fallback_answer(result, renderer);
    }

    let count = result.rows.len();
    let total = result.meta.total_count.unwrap_or(count as u64);
    renderer
        .render(
            "list_summary",
            &json!({"total": total, "count": count, "partial": total > count as u64}),
        )
        .unwrap_or_else(|_| fallback_answer(result, renderer))
}
