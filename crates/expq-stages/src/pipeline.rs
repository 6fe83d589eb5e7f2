//! Query pipeline orchestrator.
//!
//! ```text
//! text → preflight → pre-parse → hints → reconcile → validate → shape
//!      → commit gate → execute → phrase → validate answer → NlpResponse
//! ```
//!
//! Every stage is recorded in a `PipelineTrace`. Model collaborators are
//! optional: a failed hint degrades to deterministic signals and a failed or
//! contradicted answer degrades to the templated fallback.

use expq_core::{
    CoreError, ErrorEnvelope, NlpResponse, PipelineTrace, QueryDraft, QueryRequest, QueryShape,
    RequestContext, INVALID_QUERY_SHAPE,
};
use expq_exec::{run_query, ExecError, ExpenseStore};
use expq_in::{pre_parse_with, preflight, IntentHint, Reconciler, Vocabulary, MAX_INPUT_CHARS};
use expq_out::{create_safe_fallback_response, validate_query_response, TemplateRenderer};
use expq_policy::{
    resolve_query_shape, semantic_commit, validate_query_semantics, CommitContext,
    CommitDecisionType, CommitReason, ShapeViolation,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::agents::{AnswerPhraser, IntentHintSource, NoHints, TemplatePhraser};
use crate::ratelimit::{guarded, RateLimiter};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Client-side invariant violation
    #[error(transparent)]
    InvalidQueryShape(#[from] ShapeViolation),

    #[error("REQUEST/{}: {}", .0.reason(), .0)]
    InvalidRequest(CoreError),

    /// Undecodable wire request
    #[error("REQUEST/{reason}: {message}")]
    Malformed { reason: CommitReason, message: String },

    /// Commit gate refused a resolved request (internal consistency bug)
    #[error("COMMIT/rejected: {reason}")]
    Rejected { reason: CommitReason, request: Value },

    #[error("TIMEOUT/{stage}: no response within {after_ms}ms")]
    Timeout { stage: &'static str, after_ms: u64 },

    #[error(transparent)]
    Store(#[from] ExecError),

    #[error("INTERNAL/{0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP-equivalent status class
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::InvalidQueryShape(_) | PipelineError::Malformed { .. } => 400,
            PipelineError::InvalidRequest(e) if e.is_client_error() => 400,
            PipelineError::Timeout { .. } => 504,
            PipelineError::InvalidRequest(_)
            | PipelineError::Rejected { .. }
            | PipelineError::Store(_)
            | PipelineError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidQueryShape(_) => INVALID_QUERY_SHAPE,
            PipelineError::InvalidRequest(e) if e.is_client_error() => INVALID_QUERY_SHAPE,
            PipelineError::InvalidRequest(_) => "INTERNAL_ERROR",
            PipelineError::Malformed { .. } => "MALFORMED_QUERY_REQUEST",
            PipelineError::Rejected { .. } => "COMMIT_REJECTED",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Store(_) => "STORE_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Wire envelope. Server faults carry no internals beyond a reason.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            PipelineError::InvalidQueryShape(v) => v.to_envelope(),
            PipelineError::InvalidRequest(e) => {
                ErrorEnvelope::new(self.code(), e.to_string()).with_detail("reason", json!(e.reason()))
            }
            PipelineError::Malformed { reason, message } => {
                ErrorEnvelope::new(self.code(), message.clone()).with_detail("reason", json!(reason))
            }
            PipelineError::Rejected { reason, .. } => {
                ErrorEnvelope::new(self.code(), "The query could not be executed safely")
                    .with_detail("reason", json!(reason))
            }
            PipelineError::Timeout { stage, after_ms } => {
                ErrorEnvelope::new(self.code(), "The request timed out")
                    .with_detail("stage", json!(stage))
                    .with_detail("after_ms", json!(after_ms))
            }
            PipelineError::Store(_) | PipelineError::Internal(_) => {
                ErrorEnvelope::new(self.code(), "There was an error processing your query")
            }
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_input_chars: usize,
    /// Per model call
    pub llm_timeout: Duration,
    /// Per store query
    pub store_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_input_chars: MAX_INPUT_CHARS,
            llm_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// Wire form of a structured request: a draft plus its shape
#[derive(Deserialize)]
struct WireRequest {
    #[serde(flatten)]
    draft: QueryDraft,
    #[serde(default)]
    shape: Option<QueryShape>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct QueryPipeline {
    store: Arc<dyn ExpenseStore>,
    hints: Arc<dyn IntentHintSource>,
    phraser: Arc<dyn AnswerPhraser>,
    limiter: Option<Arc<RateLimiter>>,
    vocabulary: Option<Arc<Vocabulary>>,
    config: PipelineConfig,
}

impl QueryPipeline {
    /// Deterministic pipeline: no hints, templated answers
    pub fn new(store: Arc<dyn ExpenseStore>) -> Self {
        Self {
            store,
            hints: Arc::new(NoHints),
            phraser: Arc::new(TemplatePhraser::new()),
            limiter: None,
            vocabulary: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_hints(mut self, hints: Arc<dyn IntentHintSource>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_phraser(mut self, phraser: Arc<dyn AnswerPhraser>) -> Self {
        self.phraser = phraser;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: Arc<Vocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_deref()
    }

    pub fn shared_vocabulary(&self) -> Option<Arc<Vocabulary>> {
        self.vocabulary.clone()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.vocabulary
            .as_deref()
            .unwrap_or_else(|| Vocabulary::builtin())
    }

    /// Answer a natural-language question about the user's expenses
    pub async fn handle_query(
        &self,
        text: &str,
        ctx: &RequestContext,
    ) -> Result<NlpResponse, PipelineError> {
        let input = preflight(text, self.config.max_input_chars);
        if input.is_blank() {
            return Ok(blank_input_response(&ctx.user_id));
        }

        let vocab = self.vocabulary();
        let mut trace = PipelineTrace::new();
        let mut degraded: Vec<&'static str> = Vec::new();

        let started = trace.start();
        let signals = pre_parse_with(&input.text, ctx.today, vocab);
        trace.record_value("preparse.signals.v1", &signals, true, started);

        let started = trace.start();
        let hint = match guarded(
            self.rate_limiter(),
            self.config.llm_timeout,
            self.hints.name(),
            self.hints.hint(&input.text, ctx),
        )
        .await
        {
            Ok(value) => IntentHint::from_value(&value),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, error = %e, "intent hints unavailable, using deterministic signals only");
                degraded.push("hint");
                IntentHint::none()
            }
        };
        trace.record_value(self.hints.name(), &hint, false, started);

        let started = trace.start();
        let draft = Reconciler::new(vocab).reconcile(&hint, &signals, &ctx.user_id);
        trace.record_value("reconcile.draft.v1", &draft, true, started);

        let request = self.resolve(draft, ctx, &mut trace)?;

        let mut response = self
            .commit_and_run(&input.text, request, ctx, trace, &mut degraded)
            .await?;
        if input.truncated {
            response = response.with_context("_truncated_input", json!(true));
        }
        if !degraded.is_empty() {
            response = response.with_context("degraded", json!(degraded));
        }
        Ok(response)
    }

    /// Run a structured request (a draft with a resolved shape)
    pub async fn execute_value(
        &self,
        value: &Value,
        ctx: &RequestContext,
    ) -> Result<NlpResponse, PipelineError> {
        let wire: WireRequest =
            serde_json::from_value(value.clone()).map_err(|e| PipelineError::Malformed {
                reason: CommitReason::MalformedQueryRequest,
                message: e.to_string(),
            })?;
        let shape = wire.shape.ok_or_else(|| PipelineError::Malformed {
            reason: CommitReason::MissingQueryShape,
            message: "query request has no shape".to_string(),
        })?;

        let mut draft = wire.draft;
        draft.user_id = ctx.user_id.clone();
        validate_query_semantics(&draft)?;
        let request = QueryRequest::new(draft, shape).map_err(PipelineError::InvalidRequest)?;

        let mut degraded = Vec::new();
        self.commit_and_run("", request, ctx, PipelineTrace::new(), &mut degraded)
            .await
    }

    fn resolve(
        &self,
        draft: QueryDraft,
        ctx: &RequestContext,
        trace: &mut PipelineTrace,
    ) -> Result<QueryRequest, PipelineError> {
        let started = trace.start();
        if let Err(violation) = validate_query_semantics(&draft) {
            info!(
                trace_id = %ctx.trace_id,
                user_id = %ctx.user_id,
                rule = %violation.rule,
                "query draft violates semantic invariants"
            );
            return Err(violation.into());
        }
        trace.record_value("validate.semantics.v1", &draft.semantic_intents, true, started);

        let started = trace.start();
        let shape = resolve_query_shape(&draft);
        let request = QueryRequest::new(draft, shape).map_err(PipelineError::InvalidRequest)?;
        trace.record_value("shape.resolve.v1", &request, true, started);
        Ok(request)
    }

    async fn commit_and_run(
        &self,
        text: &str,
        request: QueryRequest,
        ctx: &RequestContext,
        mut trace: PipelineTrace,
        degraded: &mut Vec<&'static str>,
    ) -> Result<NlpResponse, PipelineError> {
        let started = trace.start();
        let commit_ctx = CommitContext {
            known_categories: ctx.known_categories.clone(),
        };
        let decision = semantic_commit(&request, Some(&commit_ctx));
        trace.record_value("commit.gate.v1", &decision, true, started);

        match decision.decision {
            CommitDecisionType::Execute => {}
            CommitDecisionType::Clarify => {
                info!(
                    trace_id = %ctx.trace_id,
                    user_id = %ctx.user_id,
                    shape = %request.shape(),
                    reason = ?decision.reason,
                    "clarification requested"
                );
                let answer = decision.message.clone().unwrap_or_default();
                let response = NlpResponse::new(&ctx.user_id, answer)
                    .with_context("clarify", json!(decision));
                return Ok(attach_trace(response, request, ctx, &trace));
            }
            CommitDecisionType::Reject => {
                let serialized = serde_json::to_value(&request).unwrap_or(Value::Null);
                error!(
                    trace_id = %ctx.trace_id,
                    reason = ?decision.reason,
                    request = %serialized,
                    "commit gate rejected a resolved request"
                );
                return Err(PipelineError::Rejected {
                    reason: decision
                        .reason
                        .unwrap_or(CommitReason::MalformedQueryRequest),
                    request: serialized,
                });
            }
        }

        let started = trace.start();
        let store_timeout = self.config.store_timeout;
        let result = match tokio::time::timeout(store_timeout, run_query(self.store.as_ref(), &request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(
                    trace_id = %ctx.trace_id,
                    error = %e,
                    request = %serde_json::to_value(&request).unwrap_or(serde_json::Value::Null),
                    "query execution failed"
                );
                return Err(PipelineError::Store(e));
            }
            Err(_) => {
                error!(trace_id = %ctx.trace_id, "store query timed out");
                return Err(PipelineError::Timeout {
                    stage: "execute",
                    after_ms: store_timeout.as_millis() as u64,
                });
            }
        };
        trace.record_value("execute.store.v1", &result, true, started);

        let started = trace.start();
        let phrased = guarded(
            self.rate_limiter(),
            self.config.llm_timeout,
            self.phraser.name(),
            self.phraser.phrase(text, &request, &result),
        )
        .await;

        let mut failure = None;
        let answer = match phrased {
            Ok(answer) => match validate_query_response(&result, &answer, text) {
                Ok(()) => Some(answer),
                Err(f) => {
                    warn!(trace_id = %ctx.trace_id, failure = %f, "answer contradicts result, using template");
                    failure = Some(f);
                    None
                }
            },
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, error = %e, "answer phrasing failed, using template");
                degraded.push("phrase");
                None
            }
        };
        trace.record_value(
            self.phraser.name(),
            &answer,
            self.phraser.deterministic(),
            started,
        );

        let mut response = match answer {
            Some(answer) => NlpResponse::new(&ctx.user_id, answer).with_output(result),
            None => create_safe_fallback_response(&result, &ctx.user_id),
        };
        if let Some(f) = failure {
            response = response.with_context("validation_failure", json!(f));
        }
        Ok(attach_trace(response, request, ctx, &trace))
    }
}

fn attach_trace(
    response: NlpResponse,
    request: QueryRequest,
    ctx: &RequestContext,
    trace: &PipelineTrace,
) -> NlpResponse {
    let shape = request.shape();
    let sources = json!(request.sources());
    response
        .with_context("trace_id", json!(ctx.trace_id))
        .with_context("shape", json!(shape))
        .with_context("sources", sources)
        .with_context("pipeline", json!(trace.pipeline_id()))
        .with_context("stages", json!(trace.stages))
        .with_query(request)
}

/// Well-formed reply for empty input
pub fn blank_input_response(user_id: &str) -> NlpResponse {
    let answer = TemplateRenderer::builtin()
        .render("blank_input", &json!({}))
        .unwrap_or_else(|_| "Please type a question about your expenses.".to_string());
    NlpResponse::new(user_id, answer).with_context("error", json!("blank_input"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use expq_core::{Decimal, QueryResult};
    use expq_exec::{Expense, MemoryStore};
    use crate::agents::{AgentError, StaticHints};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 9).unwrap()
    }

    fn store() -> Arc<MemoryStore> {
        let at = |m: u32, d: u32| {
            NaiveDate::from_ymd_opt(2025, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc()
        };
        Arc::new(MemoryStore::from_records(vec![
            Expense::new("e1", "u1", Decimal::new(100, 0), "Food", "Cash", at(3, 4)),
            Expense::new("e2", "u1", Decimal::new(250, 0), "Food", "Card", at(3, 20)),
            Expense::new("e3", "u1", Decimal::new(900, 0), "Travel", "Card", at(4, 2)),
        ]))
    }

    fn ctx() -> RequestContext {
        RequestContext::new("u1").with_today(today())
    }

    struct LyingPhraser;

    #[async_trait]
    impl AnswerPhraser for LyingPhraser {
        fn name(&self) -> &'static str {
            "phrase.lying.v1"
        }

        async fn phrase(&self, _: &str, _: &QueryRequest, _: &QueryResult) -> Result<String, AgentError> {
            Ok("You spent ₹1,200 on food.".to_string())
        }
    }

    struct BrokenHints;

    #[async_trait]
    impl IntentHintSource for BrokenHints {
        fn name(&self) -> &'static str {
            "hint.broken.v1"
        }

        async fn hint(&self, _: &str, _: &RequestContext) -> Result<Value, AgentError> {
            Err(AgentError::Unavailable("model offline".into()))
        }
    }

    #[tokio::test]
    async fn test_aggregate_query_end_to_end() {
        let pipeline = QueryPipeline::new(store());
        let response = pipeline
            .handle_query("How much did I spend on food last month?", &ctx())
            .await
            .unwrap();
        assert_eq!(response.answer, "Sum: 350");
        let query = response.query.unwrap();
        assert_eq!(query.shape(), QueryShape::Aggregate);
        let context = response.context.unwrap();
        assert_eq!(context["pipeline"].as_str().unwrap().split('→').next(), Some("preparse"));
    }

    #[tokio::test]
    async fn test_contradicting_answer_replaced() {
        let pipeline = QueryPipeline::new(store()).with_phraser(Arc::new(LyingPhraser));
        let response = pipeline
            .handle_query("How much did I spend on food last month?", &ctx())
            .await
            .unwrap();
        assert_eq!(response.answer, "Sum: 350");
        let context = response.context.unwrap();
        assert_eq!(context["fallback"], json!(true));
        assert!(context.contains_key("validation_failure"));
    }

    #[tokio::test]
    async fn test_hint_failure_degrades() {
        let pipeline = QueryPipeline::new(store()).with_hints(Arc::new(BrokenHints));
        let response = pipeline.handle_query("Show my top 2 expenses", &ctx()).await.unwrap();
        let output = response.output.unwrap();
        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.rows[0]["id"], json!("e3"));
        assert_eq!(response.context.unwrap()["degraded"], json!(["hint"]));
    }

    #[tokio::test]
    async fn test_clarify_has_no_output() {
        let pipeline = QueryPipeline::new(store());
        let response = pipeline
            .handle_query("How much did I spend on food?", &ctx())
            .await
            .unwrap();
        assert!(response.output.is_none());
        assert_eq!(
            response.context.unwrap()["clarify"]["reason"],
            json!("missing_date_range")
        );
    }

    #[tokio::test]
    async fn test_grouping_without_aggregate_is_client_error() {
        let pipeline = QueryPipeline::new(store());
        let err = pipeline
            .handle_query("Group my expenses by category", &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_envelope().error.message, "group_by requires aggregate");
    }

    #[tokio::test]
    async fn test_hint_cannot_override_deterministic_category() {
        let hints = StaticHints(json!({"category": "Travel"}));
        let pipeline = QueryPipeline::new(store()).with_hints(Arc::new(hints));
        let response = pipeline
            .handle_query("Show all my food expenses", &ctx())
            .await
            .unwrap();
        let query = response.query.unwrap();
        assert_eq!(query.filters().category.as_deref(), Some("Food"));
    }

    #[tokio::test]
    async fn test_blank_and_truncated_input() {
        let pipeline = QueryPipeline::new(store()).with_config(PipelineConfig {
            max_input_chars: 24,
            ..PipelineConfig::default()
        });
        let blank = pipeline.handle_query("   ", &ctx()).await.unwrap();
        assert_eq!(blank.context.unwrap()["error"], json!("blank_input"));

        let long = pipeline
            .handle_query("Show all my food expenses please, and many more words", &ctx())
            .await
            .unwrap();
        assert_eq!(long.context.unwrap()["_truncated_input"], json!(true));
    }

    #[tokio::test]
    async fn test_structured_request_paths() {
        let pipeline = QueryPipeline::new(store());
        let err = pipeline
            .execute_value(&json!({"user_id": "u1"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Malformed { reason: CommitReason::MissingQueryShape, .. }));

        let err = pipeline
            .execute_value(
                &json!({"user_id": "u1", "shape": "grouped", "aggregate": "sum",
                        "group_by": ["companions"], "semantic_intents": {"aggregate": true}}),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), INVALID_QUERY_SHAPE);

        let ok = pipeline
            .execute_value(&json!({"user_id": "u1", "shape": "list", "limit": 1}), &ctx())
            .await
            .unwrap();
        let output = ok.output.unwrap();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.meta.total_count, Some(3));
    }
}
