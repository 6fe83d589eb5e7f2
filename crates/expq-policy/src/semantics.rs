//! Semantic invariant validation for query drafts.
//!
//! Rules are checked in order and the first violation wins:
//! 1. list and aggregate intents are mutually exclusive
//! 2. a grouping intent requires an aggregate
//! 3. aggregates do not support column projection

use expq_core::{ErrorEnvelope, QueryDraft, INVALID_QUERY_SHAPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Which invariant a draft broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeRule {
    MultipleIntents,
    GroupByRequiresAggregate,
    AggregateWithColumns,
}

impl fmt::Display for ShapeRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ShapeRule::MultipleIntents => "multiple_intents",
            ShapeRule::GroupByRequiresAggregate => "group_by_requires_aggregate",
            ShapeRule::AggregateWithColumns => "aggregate_with_columns",
        };
        f.write_str(name)
    }
}

/// Client-facing invariant violation (never a server fault)
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}/{rule}: {message}", INVALID_QUERY_SHAPE)]
pub struct ShapeViolation {
    pub rule: ShapeRule,
    pub message: String,
    pub details: Map<String, Value>,
}

impl ShapeViolation {
    fn new(rule: ShapeRule, message: &str) -> Self {
        Self {
            rule,
            message: message.to_string(),
            details: Map::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// `{"error": {"code": "INVALID_QUERY_SHAPE", ...}}`
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(INVALID_QUERY_SHAPE, self.message.clone())
            .with_details(self.details.clone())
    }
}

/// Check a draft against the semantic invariants. Never mutates the draft.
pub fn validate_query_semantics(draft: &QueryDraft) -> Result<(), ShapeViolation> {
    let intents = draft.semantic_intents;

    let mut active = Vec::new();
    if intents.list {
        active.push("list");
    }
    if intents.aggregate {
        active.push("aggregate");
    }
    if active.len() > 1 {
        return Err(ShapeViolation::new(
            ShapeRule::MultipleIntents,
            "Query contains multiple semantic intents",
        )
        .with_detail("intents", json!(active)));
    }

    if intents.grouping && draft.aggregate.is_none() {
        let mut violation =
            ShapeViolation::new(ShapeRule::GroupByRequiresAggregate, "group_by requires aggregate");
        if let Some(keys) = &draft.group_by {
            violation = violation.with_detail("group_by", json!(keys));
        }
        return Err(violation);
    }

    if draft.aggregate.is_some() && draft.columns.is_some() {
        return Err(ShapeViolation::new(
            ShapeRule::AggregateWithColumns,
            "Aggregate queries cannot specify columns",
        )
        .with_detail("columns", json!(draft.columns)));
    }

    Ok(())
}
