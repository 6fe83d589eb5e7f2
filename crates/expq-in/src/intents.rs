//! Semantic intent classification over the lowercased raw text.

use expq_core::{AggregateOp, SemanticIntents};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AGGREGATE: Regex =
        Regex::new(r"\b(?:sum|total|spent|average|avg|count|how\s+much|how\s+many)\b").unwrap();
    static ref RANKING: Regex = Regex::new(
        r"\b(?:heaviest|largest|highest|top|biggest|most\s+expensive|maximum)\b"
    )
    .unwrap();
    static ref GROUPING: Regex =
        Regex::new(r"\bgroup(?:ed)?\s+(?:[a-z]+\s+){0,4}?by\b").unwrap();
    static ref LIST: Regex =
        Regex::new(r"\b(?:show|list|display|expenses|transactions|records)\b").unwrap();
    static ref COUNT_STYLE: Regex =
        Regex::new(r"\b(?:how\s+many|count|number\s+of)\b").unwrap();
    static ref AVERAGE: Regex = Regex::new(r"\b(?:average|avg|mean)\b").unwrap();
}

/// Keyword intents; `has_group_fields` marks a recognized group-by phrase
pub fn classify(text: &str, has_group_fields: bool) -> SemanticIntents {
    let count_style = is_count_style(text);
    SemanticIntents {
        list: LIST.is_match(text) && !count_style,
        aggregate: AGGREGATE.is_match(text),
        ranking: RANKING.is_match(text),
        grouping: GROUPING.is_match(text) || has_group_fields,
    }
}

/// "how many", "count", "number of"
pub fn is_count_style(text: &str) -> bool {
    COUNT_STYLE.is_match(text)
}

/// Aggregate metric by keyword priority: avg, then count, then sum
pub fn aggregate_op(text: &str) -> AggregateOp {
    if AVERAGE.is_match(text) {
        AggregateOp::Avg
    } else if is_count_style(text) {
        AggregateOp::Count
    } else {
        AggregateOp::Sum
    }
}
