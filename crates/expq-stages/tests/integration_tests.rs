//! End-to-end scenarios for the query pipeline over an in-memory store.
//!
//! Every test pins `today` to 2025-04-09 so "last month" is March 2025.

use async_trait::async_trait;
use chrono::NaiveDate;
use expq_core::{
    AggregateOp, Decimal, QueryRequest, QueryResult, QueryShape, RequestContext, SortOrder,
    INVALID_QUERY_SHAPE,
};
use expq_exec::{ExecError, Expense, ExpenseStore, ExpenseWhere, MemoryStore, OrderBy, StoreError};
use expq_policy::commit::MISSING_DATE_RANGE_MESSAGE;
use expq_stages::{
    AgentError, AnswerPhraser, Dispatcher, PipelineConfig, PipelineError, QueryPipeline, Route,
};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SEED: &str = r#"[
  {"id": "e1", "user_id": "u1", "amount": "100.10", "category": "Food", "paymentMethod": "Cash",
   "date": "2025-03-03", "companions": ["alice"]},
  {"id": "e2", "user_id": "u1", "amount": "200.20", "category": "Food", "paymentMethod": "Card",
   "date": "2025-03-15", "companions": ["Alice", "bob"]},
  {"id": "e3", "user_id": "u1", "amount": "300.005", "category": "Food", "paymentMethod": "UPI",
   "date": "2025-03-28"},
  {"id": "e4", "user_id": "u1", "amount": 1200, "category": "Travel", "paymentMethod": "Card",
   "date": "2025-03-10T09:30:00Z"},
  {"id": "e5", "user_id": "u1", "amount": 45, "category": "Food", "paymentMethod": "Cash",
   "date": "2025-04-02", "companions": ["alice"]},
  {"id": "x1", "user_id": "u2", "amount": 9999, "category": "Food", "paymentMethod": "Cash",
   "date": "2025-03-05"}
]"#;

fn ctx() -> RequestContext {
    RequestContext::new("u1").with_today(NaiveDate::from_ymd_opt(2025, 4, 9).unwrap())
}

fn pipeline() -> QueryPipeline {
    QueryPipeline::new(Arc::new(MemoryStore::from_json(SEED).unwrap()))
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Counts store calls; holds no records
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl ExpenseStore for CountingStore {
    async fn find_many(
        &self,
        _filter: &ExpenseWhere,
        _skip: Option<usize>,
        _take: Option<usize>,
        _order: Option<&OrderBy>,
    ) -> Result<Vec<Expense>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn count(&self, _filter: &ExpenseWhere) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Never answers within any reasonable deadline
struct StalledStore;

#[async_trait]
impl ExpenseStore for StalledStore {
    async fn find_many(
        &self,
        _filter: &ExpenseWhere,
        _skip: Option<usize>,
        _take: Option<usize>,
        _order: Option<&OrderBy>,
    ) -> Result<Vec<Expense>, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn count(&self, _filter: &ExpenseWhere) -> Result<u64, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(0)
    }
}

/// Fails every call and counts attempts
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl ExpenseStore for FailingStore {
    async fn find_many(
        &self,
        _filter: &ExpenseWhere,
        _skip: Option<usize>,
        _take: Option<usize>,
        _order: Option<&OrderBy>,
    ) -> Result<Vec<Expense>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn count(&self, _filter: &ExpenseWhere) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

struct FixedPhraser(&'static str);

#[async_trait]
impl AnswerPhraser for FixedPhraser {
    fn name(&self) -> &'static str {
        "phrase.fixed.v1"
    }

    async fn phrase(&self, _: &str, _: &QueryRequest, _: &QueryResult) -> Result<String, AgentError> {
        Ok(self.0.to_string())
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_aggregate_sum_is_exact() {
    let response = pipeline()
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap();

    let query = response.query.as_ref().unwrap();
    assert_eq!(query.shape(), QueryShape::Aggregate);
    assert_eq!(query.aggregate(), Some(AggregateOp::Sum));
    assert_eq!(query.filters().category.as_deref(), Some("Food"));
    assert!(query.filters().has_date_range());

    let output = response.output.unwrap();
    let aggregate = output.aggregate_result.unwrap();
    assert_eq!(aggregate.get("sum"), Some(Some(dec("600.305"))));
    assert!(output.rows.is_empty());
}

#[tokio::test]
async fn test_scenario_b_list_with_companion() {
    let response = pipeline()
        .handle_query("Show all my food expenses with Alice", &ctx())
        .await
        .unwrap();

    let query = response.query.as_ref().unwrap();
    assert_eq!(query.shape(), QueryShape::List);
    assert_eq!(query.filters().companions, Some(vec!["alice".to_string()]));

    let output = response.output.unwrap();
    let ids: Vec<&str> = output.rows.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"e1") && ids.contains(&"e2") && ids.contains(&"e5"));
    assert!(output.meta.total_count.unwrap() >= output.rows.len() as u64);
}

#[tokio::test]
async fn test_scenario_c_grouping_without_aggregate_never_reaches_store() {
    let store = Arc::new(CountingStore::default());
    let err = QueryPipeline::new(store.clone())
        .handle_query("Group my expenses by category", &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidQueryShape(_)));
    let envelope = err.to_envelope();
    assert_eq!(envelope.error.code, INVALID_QUERY_SHAPE);
    assert_eq!(envelope.error.message, "group_by requires aggregate");
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scenario_d_top_n_is_limit_not_amount() {
    let response = pipeline()
        .handle_query("Show my top 3 expenses", &ctx())
        .await
        .unwrap();

    let query = response.query.as_ref().unwrap();
    assert_eq!(query.shape(), QueryShape::List);
    assert_eq!(query.limit(), 3);
    assert_eq!(query.sort_by(), Some("amount"));
    assert_eq!(query.sort_order(), SortOrder::Desc);
    assert_eq!(query.filters().min_amount, None);
    assert_eq!(query.filters().max_amount, None);

    let output = response.output.unwrap();
    let ids: Vec<&str> = output.rows.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["e4", "e3", "e2"]);
}

// =============================================================================
// Safety properties
// =============================================================================

#[tokio::test]
async fn test_group_by_companions_fails_before_store() {
    let store = Arc::new(CountingStore::default());
    let err = QueryPipeline::new(store.clone())
        .handle_query("total spent per companion last month", &ctx())
        .await
        .unwrap_err();

    assert_eq!(err.status(), 400);
    assert_eq!(err.code(), INVALID_QUERY_SHAPE);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undated_aggregate_asks_for_clarification() {
    let store = Arc::new(CountingStore::default());
    let response = QueryPipeline::new(store.clone())
        .handle_query("How much did I spend on travel?", &ctx())
        .await
        .unwrap();

    assert!(response.output.is_none());
    assert_eq!(response.answer, MISSING_DATE_RANGE_MESSAGE);
    let context = response.context.unwrap();
    assert_eq!(context["clarify"]["type"], json!("CLARIFY"));
    assert_eq!(context["clarify"]["reason"], json!("missing_date_range"));
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_category_asks_for_clarification() {
    let context = ctx().with_known_categories(vec!["travel".into(), "rent".into()]);
    let response = pipeline()
        .handle_query("How much did I spend on food last month?", &context)
        .await
        .unwrap();

    assert!(response.output.is_none());
    assert!(response.answer.contains("'Food'"));
}

#[tokio::test]
async fn test_dated_aggregate_over_empty_set_is_zero() {
    let response = pipeline()
        .handle_query("How much did I spend on shopping last month?", &ctx())
        .await
        .unwrap();

    let aggregate = response.output.unwrap().aggregate_result.unwrap();
    assert_eq!(aggregate.get("sum"), Some(Some(Decimal::ZERO)));
}

#[tokio::test]
async fn test_contradicting_answer_falls_back_to_template() {
    let store = MemoryStore::from_records(vec![]);
    let seed: Vec<Expense> = serde_json::from_value(json!([
        {"id": "a", "user_id": "u1", "amount": 1000, "category": "Food",
         "paymentMethod": "Card", "date": "2025-03-02"},
        {"id": "b", "user_id": "u1", "amount": 500, "category": "Food",
         "paymentMethod": "Cash", "date": "2025-03-09"}
    ]))
    .unwrap();
    for expense in seed {
        store.insert(expense).unwrap();
    }

    let response = QueryPipeline::new(Arc::new(store))
        .with_phraser(Arc::new(FixedPhraser("You spent ₹1,200 on food last month.")))
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap();

    assert!(response.answer.contains("1500"));
    let context = response.context.unwrap();
    assert_eq!(context["fallback"], json!(true));
    assert_eq!(context["source"], json!("template"));
    assert_eq!(context["validation_failure"]["type"], json!("amount_mismatch"));
}

#[tokio::test]
async fn test_consistent_answer_is_kept() {
    let response = pipeline()
        .with_phraser(Arc::new(FixedPhraser("You spent 600.31 on food in March.")))
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap();

    assert_eq!(response.answer, "You spent 600.31 on food in March.");
    assert!(!response.context.unwrap().contains_key("fallback"));
}

#[tokio::test]
async fn test_other_users_records_are_invisible() {
    let response = pipeline()
        .with_phraser(Arc::new(FixedPhraser("ok")))
        .handle_query("How many food expenses last month?", &ctx())
        .await
        .unwrap();

    let aggregate = response.output.unwrap().aggregate_result.unwrap();
    assert_eq!(aggregate.get("count"), Some(Some(Decimal::from(3))));
}

#[tokio::test]
async fn test_response_carries_trace_and_sources() {
    let response = pipeline()
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap();

    let context = response.context.unwrap();
    let stages = context["stages"].as_array().unwrap();
    assert!(stages
        .iter()
        .all(|s| s["out_hash"].as_str().map(|h| h.starts_with("blake3:")).unwrap_or(false)));
    assert_eq!(
        context["pipeline"],
        json!("preparse→hint→reconcile→validate→shape→commit→execute→phrase")
    );
    assert_eq!(context["sources"]["category"], json!("deterministic"));
    assert_eq!(context["shape"], json!("aggregate"));
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stalled_store_times_out_at_execute() {
    let config = PipelineConfig {
        store_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    };
    let err = QueryPipeline::new(Arc::new(StalledStore))
        .with_config(config)
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Timeout { stage: "execute", after_ms: 5000 }));
    assert_eq!(err.status(), 504);
    assert_eq!(err.code(), "TIMEOUT");
    assert_eq!(err.to_envelope().error.details["stage"], json!("execute"));
}

#[tokio::test]
async fn test_store_error_propagates_without_retry() {
    let store = Arc::new(FailingStore::default());
    let err = QueryPipeline::new(store.clone())
        .handle_query("How much did I spend on food last month?", &ctx())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Store(ExecError::Store(StoreError::Unavailable(_)))));
    assert_eq!(err.status(), 500);
    assert_eq!(err.code(), "STORE_ERROR");
    assert!(!err.to_envelope().error.message.contains("connection refused"));
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_routes_each_path() {
    let dispatcher = Dispatcher::new(Arc::new(pipeline()));

    let query = dispatcher
        .handle_message("How much did I spend on food last month?", &ctx())
        .await
        .unwrap();
    assert_eq!(query.route, Route::Query);
    assert!(query.response.output.is_some());

    let expense = dispatcher
        .handle_message("paid 1200 for groceries by upi", &ctx())
        .await
        .unwrap();
    assert_eq!(expense.route, Route::Expense);
    let noted: Value = expense.response.context.unwrap()["expense"].clone();
    assert_eq!(noted["paymentMethod"], json!("UPI"));
    assert_eq!(noted["amount"], json!(1200.0));

    let chat = dispatcher.handle_message("thanks!", &ctx()).await.unwrap();
    assert_eq!(chat.route, Route::Conversation);
    assert!(chat.response.output.is_none());
}
