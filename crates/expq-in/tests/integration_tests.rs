//! Integration tests for expq-in against the grammar file on disk.
//!
//! The vocabulary is loaded from `grammars/expense-vocabulary.yaml` rather
//! than the embedded copy, so edits to the grammar are exercised here.

use chrono::NaiveDate;
use expq_core::{AggregateOp, DateRange, FieldSource, SortOrder};
use expq_in::{pre_parse_with, IntentHint, Reconciler, Vocabulary};
use serde_json::json;

const VOCABULARY_PATH: &str = "grammars/expense-vocabulary.yaml";

fn vocabulary() -> Vocabulary {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = std::path::Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    Vocabulary::load(&workspace_root.join(VOCABULARY_PATH).to_string_lossy()).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 9).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

// =============================================================================
// Pre-parse + reconcile
// =============================================================================

#[test]
fn test_aggregate_question_draft() {
    let vocab = vocabulary();
    let signals = pre_parse_with("How much did I spend on food last month?", today(), &vocab);
    assert_eq!(signals.date_range, Some(DateRange::between(d(2025, 3, 1), d(2025, 3, 31))));
    assert!(signals.amounts.is_empty());

    let draft = Reconciler::new(&vocab).reconcile(&IntentHint::none(), &signals, "u1");
    assert_eq!(draft.aggregate, Some(AggregateOp::Sum));
    assert_eq!(draft.filters.category.as_deref(), Some("Food"));
    assert!(draft.semantic_intents.aggregate);
    assert!(!draft.semantic_intents.list);
}

#[test]
fn test_cardinality_is_a_limit() {
    let vocab = vocabulary();
    let signals = pre_parse_with("Show my top 3 expenses", today(), &vocab);
    assert_eq!(signals.limit, Some(3));
    assert!(signals.amounts.is_empty());

    let draft = Reconciler::new(&vocab).reconcile(&IntentHint::none(), &signals, "u1");
    assert_eq!(draft.limit, 3);
    assert_eq!(draft.sort_by.as_deref(), Some("amount"));
    assert_eq!(draft.sort_order, SortOrder::Desc);
    assert_eq!(draft.aggregate, None);
}

#[test]
fn test_list_with_companion() {
    let vocab = vocabulary();
    let signals = pre_parse_with("Show all my food expenses with Alice", today(), &vocab);
    let draft = Reconciler::new(&vocab).reconcile(&IntentHint::none(), &signals, "u1");
    assert!(draft.semantic_intents.list);
    assert_eq!(draft.filters.companions, Some(vec!["alice".to_string()]));
    assert_eq!(draft.filters.category.as_deref(), Some("Food"));
}

// =============================================================================
// Hints
// =============================================================================

#[test]
fn test_hint_fills_gaps_but_never_overrides() {
    let vocab = vocabulary();
    let signals = pre_parse_with("Show all my food expenses", today(), &vocab);
    let hint = IntentHint::from_value(&json!({
        "filters": {"category": "Travel", "paymentMethod": "upi"},
        "limit": 5
    }));

    let draft = Reconciler::new(&vocab).reconcile(&hint, &signals, "u1");
    assert_eq!(draft.filters.category.as_deref(), Some("Food"));
    assert_eq!(draft.filters.payment_method.as_deref(), Some("UPI"));
    assert_eq!(draft.limit, 5);
    assert_eq!(draft.extras.sources.get("category"), Some(&FieldSource::Deterministic));
    assert_eq!(draft.extras.sources.get("paymentMethod"), Some(&FieldSource::Llm));
}

#[test]
fn test_malformed_hint_is_ignored() {
    let hint = IntentHint::from_value(&json!({
        "aggregate": "median",
        "limit": "many",
        "min_amount": "NaN",
        "group_by": 7
    }));
    assert!(hint.is_empty());
    assert!(IntentHint::from_value(&json!(["not", "an", "object"])).is_empty());
}

#[test]
fn test_hint_cannot_group_by_companions() {
    let vocab = vocabulary();
    let signals = pre_parse_with("what did i spend last month", today(), &vocab);
    let hint = IntentHint::from_value(&json!({"aggregate": "sum", "group_by": ["companions"]}));
    let draft = Reconciler::new(&vocab).reconcile(&hint, &signals, "u1");
    assert!(draft.group_by.is_none());
}
