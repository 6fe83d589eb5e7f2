//! Message dispatch: one free-text message → one of three handling paths.
//!
//! ```text
//! text → classifier ──┬─ query        → QueryPipeline
//!       (keyword      ├─ expense      → ExpenseExtractor → acknowledgement
//!        fallback)    └─ conversation → fixed reply
//! ```

use expq_core::{NlpResponse, RequestContext};
use expq_in::preflight;
use expq_out::TemplateRenderer;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agents::{
    ExpenseExtractor, ExtractedExpense, KeywordRouter, PreParseExtractor, Route, RouteClassifier,
};
use crate::pipeline::{blank_input_response, PipelineError, QueryPipeline};
use crate::ratelimit::guarded;

/// Which path handled the message, and its reply
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub route: Route,
    pub response: NlpResponse,
}

pub struct Dispatcher {
    router: Arc<dyn RouteClassifier>,
    extractor: Arc<dyn ExpenseExtractor>,
    pipeline: Arc<QueryPipeline>,
    keyword_router: KeywordRouter,
    fallback_extractor: PreParseExtractor,
}

impl Dispatcher {
    /// Deterministic routing and extraction around `pipeline`
    pub fn new(pipeline: Arc<QueryPipeline>) -> Self {
        let (keyword_router, fallback_extractor) = match pipeline.shared_vocabulary() {
            Some(vocab) => (
                KeywordRouter::with_vocabulary(vocab.clone()),
                PreParseExtractor::with_vocabulary(vocab),
            ),
            None => (KeywordRouter::new(), PreParseExtractor::new()),
        };
        Self {
            router: Arc::new(keyword_router.clone()),
            extractor: Arc::new(fallback_extractor.clone()),
            pipeline,
            keyword_router,
            fallback_extractor,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn RouteClassifier>) -> Self {
        self.router = router;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ExpenseExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn pipeline(&self) -> &QueryPipeline {
        &self.pipeline
    }

    pub async fn handle_message(
        &self,
        text: &str,
        ctx: &RequestContext,
    ) -> Result<DispatchOutcome, PipelineError> {
        let config = self.pipeline.config();
        let input = preflight(text, config.max_input_chars);
        if input.is_blank() {
            return Ok(DispatchOutcome {
                route: Route::Conversation,
                response: blank_input_response(&ctx.user_id),
            });
        }

        let route = match guarded(
            self.pipeline.rate_limiter(),
            config.llm_timeout,
            self.router.name(),
            self.router.classify(&input.text),
        )
        .await
        {
            Ok(route) => route,
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, error = %e, "routing failed, using keyword router");
                self.keyword_router.route(&input.text)
            }
        };
        debug!(trace_id = %ctx.trace_id, route = route.as_str(), "message routed");

        let mut response = match route {
            Route::Query => self.pipeline.handle_query(&input.text, ctx).await?,
            Route::Expense => self.note_expense(&input.text, ctx).await,
            Route::Conversation => {
                let answer = TemplateRenderer::builtin()
                    .render("conversation_reply", &json!({}))
                    .map_err(|e| PipelineError::Internal(e.to_string()))?;
                NlpResponse::new(&ctx.user_id, answer)
            }
        };

        response = response.with_context("route", json!(route));
        if input.truncated {
            response = response.with_context("_truncated_input", json!(true));
        }
        Ok(DispatchOutcome { route, response })
    }

    async fn note_expense(&self, text: &str, ctx: &RequestContext) -> NlpResponse {
        let config = self.pipeline.config();
        let expense = match guarded(
            self.pipeline.rate_limiter(),
            config.llm_timeout,
            self.extractor.name(),
            self.extractor.extract(text, ctx),
        )
        .await
        {
            Ok(expense) => expense,
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, error = %e, "expense extraction failed, using pre-parse signals");
                self.fallback_extractor.extract_now(text, ctx.today)
            }
        };

        let answer = acknowledge(&expense);
        NlpResponse::new(&ctx.user_id, answer).with_context("expense", json!(expense))
    }
}

fn acknowledge(expense: &ExtractedExpense) -> String {
    let renderer = TemplateRenderer::builtin();
    let rendered = match expense.amount {
        Some(amount) => renderer.render(
            "expense_noted",
            &json!({
                "amount": amount,
                "category": expense.category,
                "companions": expense.companions,
            }),
        ),
        None => renderer.render("expense_incomplete", &json!({})),
    };
    rendered.unwrap_or_else(|_| "Noted.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentError;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use expq_exec::MemoryStore;

    struct DownRouter;

    #[async_trait]
    impl RouteClassifier for DownRouter {
        fn name(&self) -> &'static str {
            "router.down.v1"
        }

        async fn classify(&self, _text: &str) -> Result<Route, AgentError> {
            Err(AgentError::Unavailable("connection refused".into()))
        }
    }

    fn dispatcher() -> Dispatcher {
        let pipeline = QueryPipeline::new(Arc::new(MemoryStore::new()));
        Dispatcher::new(Arc::new(pipeline))
    }

    fn ctx() -> RequestContext {
        RequestContext::new("u1").with_today(NaiveDate::from_ymd_opt(2025, 4, 9).unwrap())
    }

    #[tokio::test]
    async fn test_expense_message_acknowledged() {
        let outcome = dispatcher()
            .handle_message("spent 450 on dinner with alice", &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.route, Route::Expense);
        assert_eq!(outcome.response.answer, "Noted 450 for Food with alice.");
        let context = outcome.response.context.unwrap();
        assert_eq!(context["expense"]["category"], json!("Food"));
        assert_eq!(context["route"], json!("expense"));
    }

    #[tokio::test]
    async fn test_router_failure_falls_back_to_keywords() {
        let outcome = dispatcher()
            .with_router(Arc::new(DownRouter))
            .handle_message("hello there", &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.route, Route::Conversation);
        assert!(outcome.response.answer.starts_with("I can log your expenses"));
    }

    #[tokio::test]
    async fn test_query_reaches_pipeline() {
        let outcome = dispatcher()
            .handle_message("Show my top 3 expenses", &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.route, Route::Query);
        let output = outcome.response.output.unwrap();
        assert!(output.rows.is_empty());
        assert_eq!(outcome.response.answer, "No matching records found");
    }

    #[tokio::test]
    async fn test_blank_message() {
        let outcome = dispatcher().handle_message("\n\t ", &ctx()).await.unwrap();
        assert_eq!(outcome.response.context.unwrap()["error"], json!("blank_input"));
    }
}
