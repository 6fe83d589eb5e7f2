//! Commit-safety gate.
//!
//! The last check before execution. Pure and deterministic: no model calls,
//! no store access, no inference.
//!
//! ```text
//! QueryRequest → shape checks → category check → EXECUTE | CLARIFY | REJECT
//! ```
//!
//! CLARIFY is ordinary conversation. REJECT means an internal invariant broke.

use expq_core::{QueryRequest, QueryShape};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitDecisionType {
    Execute,
    Clarify,
    Reject,
}

/// Stable machine-readable reason for CLARIFY / REJECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitReason {
    MissingQueryShape,
    MalformedQueryRequest,
    MissingDateRange,
    GroupedWithoutGroupBy,
    GroupedWithoutAggregate,
    UnknownCategory,
}

impl CommitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitReason::MissingQueryShape => "missing_query_shape",
            CommitReason::MalformedQueryRequest => "malformed_query_request",
            CommitReason::MissingDateRange => "missing_date_range",
            CommitReason::GroupedWithoutGroupBy => "grouped_without_group_by",
            CommitReason::GroupedWithoutAggregate => "grouped_without_aggregate",
            CommitReason::UnknownCategory => "unknown_category",
        }
    }
}

impl fmt::Display for CommitReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced once per request, immediately before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDecision {
    #[serde(rename = "type")]
    pub decision: CommitDecisionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CommitReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CommitDecision {
    pub fn execute() -> Self {
        Self {
            decision: CommitDecisionType::Execute,
            reason: None,
            message: None,
            meta: None,
        }
    }

    pub fn clarify(reason: CommitReason, message: impl Into<String>) -> Self {
        Self {
            decision: CommitDecisionType::Clarify,
            reason: Some(reason),
            message: Some(message.into()),
            meta: None,
        }
    }

    pub fn reject(reason: CommitReason) -> Self {
        Self {
            decision: CommitDecisionType::Reject,
            reason: Some(reason),
            message: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn is_execute(&self) -> bool {
        self.decision == CommitDecisionType::Execute
    }
}

/// Optional knowledge about the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitContext {
    pub known_categories: Option<Vec<String>>,
}

impl CommitContext {
    pub fn with_known_categories(categories: Vec<String>) -> Self {
        Self {
            known_categories: Some(categories),
        }
    }
}

pub const MISSING_DATE_RANGE_MESSAGE: &str =
    "Do you want this calculated for a specific time period (for example, last month or this year)?";

pub const GROUPED_WITHOUT_AGGREGATE_MESSAGE: &str =
    "Should I group the results by count, sum, or another metric?";

/// Decide whether a resolved request is safe to execute as-is
pub fn semantic_commit(request: &QueryRequest, context: Option<&CommitContext>) -> CommitDecision {
    match request.shape() {
        QueryShape::Aggregate => {
            if !request.filters().has_date_range() {
                return CommitDecision::clarify(
                    CommitReason::MissingDateRange,
                    MISSING_DATE_RANGE_MESSAGE,
                );
            }
        }
        QueryShape::Grouped => {
            if request.group_by().is_empty() {
                return CommitDecision::reject(CommitReason::GroupedWithoutGroupBy)
                    .with_meta("shape", json!(request.shape()));
            }
            if request.aggregate().is_none() {
                return CommitDecision::clarify(
                    CommitReason::GroupedWithoutAggregate,
                    GROUPED_WITHOUT_AGGREGATE_MESSAGE,
                );
            }
        }
        QueryShape::List => {}
    }

    if let Some(category) = &request.filters().category {
        let known = context.and_then(|c| c.known_categories.as_deref());
        if let Some(known) = known.filter(|k| !k.is_empty()) {
            let wanted = category.to_lowercase();
            if !known.iter().any(|k| k.to_lowercase() == wanted) {
                return CommitDecision::clarify(
                    CommitReason::UnknownCategory,
                    format!(
                        "I couldn't find a category named '{}'. Could you clarify or choose an existing category?",
                        category
                    ),
                )
                .with_meta("category", json!(category));
            }
        }
    }

    CommitDecision::execute()
}

/// Gate an untyped request. A request that cannot be decoded is rejected;
/// one with no shape is rejected as `missing_query_shape`.
pub fn semantic_commit_value(value: &Value, context: Option<&CommitContext>) -> CommitDecision {
    let has_shape = value
        .get("shape")
        .map(|s| !s.is_null())
        .unwrap_or(false);
    if !has_shape {
        return CommitDecision::reject(CommitReason::MissingQueryShape);
    }
    match serde_json::from_value::<QueryRequest>(value.clone()) {
        Ok(request) => semantic_commit(&request, context),
        Err(e) => CommitDecision::reject(CommitReason::MalformedQueryRequest)
            .with_meta("error", json!(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use expq_core::{AggregateOp, DateRange, QueryDraft, SemanticIntents};

    fn request(shape: QueryShape, f: impl FnOnce(&mut QueryDraft)) -> QueryRequest {
        let mut draft = QueryDraft::new("u1");
        f(&mut draft);
        QueryRequest::new(draft, shape).unwrap()
    }

    fn march() -> DateRange {
        DateRange::between(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    #[test]
    fn test_aggregate_without_dates_clarifies() {
        let req = request(QueryShape::Aggregate, |d| {
            d.aggregate = Some(AggregateOp::Sum);
            d.semantic_intents = SemanticIntents {
                aggregate: true,
                ..Default::default()
            };
            d.filters.category = Some("Food".into());
            d.filters.payment_method = Some("Cash".into());
        });
        let decision = semantic_commit(&req, None);
        assert_eq!(decision.decision, CommitDecisionType::Clarify);
        assert_eq!(decision.reason, Some(CommitReason::MissingDateRange));
        assert_eq!(decision.message.as_deref(), Some(MISSING_DATE_RANGE_MESSAGE));
    }

    #[test]
    fn test_aggregate_with_dates_executes() {
        let req = request(QueryShape::Aggregate, |d| {
            d.aggregate = Some(AggregateOp::Sum);
            d.filters.date_range = Some(march());
        });
        assert!(semantic_commit(&req, None).is_execute());
    }

    #[test]
    fn test_grouped_rules() {
        let req = request(QueryShape::Grouped, |_| {});
        let decision = semantic_commit(&req, None);
        assert_eq!(decision.decision, CommitDecisionType::Reject);
        assert_eq!(decision.reason, Some(CommitReason::GroupedWithoutGroupBy));

        let req = request(QueryShape::Grouped, |d| d.group_by = Some(vec!["category".into()]));
        let decision = semantic_commit(&req, None);
        assert_eq!(decision.reason, Some(CommitReason::GroupedWithoutAggregate));
        assert_eq!(decision.decision, CommitDecisionType::Clarify);
    }

    #[test]
    fn test_unknown_category() {
        let req = request(QueryShape::List, |d| d.filters.category = Some("Pets".into()));
        let ctx = CommitContext::with_known_categories(vec!["Food".into(), "Travel".into()]);
        let decision = semantic_commit(&req, Some(&ctx));
        assert_eq!(decision.reason, Some(CommitReason::UnknownCategory));
        assert!(decision.message.unwrap().contains("'Pets'"));

        let req = request(QueryShape::List, |d| d.filters.category = Some("food".into()));
        assert!(semantic_commit(&req, Some(&ctx)).is_execute());
        assert!(semantic_commit(&req, None).is_execute());
    }

    #[test]
    fn test_untyped_request_without_shape_is_rejected() {
        let decision = semantic_commit_value(&json!({"user_id": "u1"}), None);
        assert_eq!(decision.decision, CommitDecisionType::Reject);
        assert_eq!(decision.reason, Some(CommitReason::MissingQueryShape));

        let decision = semantic_commit_value(&json!({"user_id": "u1", "shape": "pie"}), None);
        assert_eq!(decision.reason, Some(CommitReason::MalformedQueryRequest));

        let decision = semantic_commit_value(&json!({"user_id": "u1", "shape": "list"}), None);
        assert!(decision.is_execute());
    }

    #[test]
    fn test_decision_wire_format() {
        let value = serde_json::to_value(CommitDecision::execute()).unwrap();
        assert_eq!(value, json!({"type": "EXECUTE"}));
    }
}
