//! API Handlers
use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    Json,
};
use expq_core::{normalize_user_id, ErrorEnvelope, NlpResponse, RequestContext, EXPQ_VERSION};
use expq_stages::{PipelineError, Route};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use tracing::{error, info};

use crate::metrics::RequestCounters;
use crate::middleware::TraceId;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub text: String,
}

/// Free-text message → routed response
pub async fn process(
    State(state): State<AppState>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    Json(payload): Json<ProcessRequest>,
) -> (StatusCode, Json<Value>) {
    state.metrics.record(|c| c.total += 1);
    let ctx = state.context(&payload.user_id, trace_id);
    info!(
        user_id = %ctx.user_id,
        trace_id = %ctx.trace_id,
        text_length = payload.text.chars().count(),
        "request start"
    );

    let outcome = bounded(&state, state.dispatcher.handle_message(&payload.text, &ctx)).await;
    match outcome {
        Ok(outcome) => {
            let clarify = is_clarify(&outcome.response);
            state.metrics.record(|c| {
                count_route(c, outcome.route);
                if clarify {
                    c.clarify += 1;
                }
            });
            (StatusCode::OK, Json(json!(outcome.response)))
        }
        Err(e) => failure(&state, &ctx, e),
    }
}

/// Structured query request → pipeline, skipping natural-language parsing
pub async fn query(
    State(state): State<AppState>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.metrics.record(|c| c.total += 1);
    let user_id = payload.get("user_id").cloned().unwrap_or(Value::Null);
    let ctx = state.context(&user_id, trace_id);

    let pipeline = state.dispatcher.pipeline();
    match bounded(&state, pipeline.execute_value(&payload, &ctx)).await {
        Ok(response) => {
            let clarify = is_clarify(&response);
            state.metrics.record(|c| {
                c.query += 1;
                if clarify {
                    c.clarify += 1;
                }
            });
            (StatusCode::OK, Json(json!(response)))
        }
        Err(e) => failure(&state, &ctx, e),
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": EXPQ_VERSION,
            "records": state.store.len(),
        })),
    )
}

pub async fn metrics(
    State(state): State<AppState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let content_type = [(header::CONTENT_TYPE, "text/plain; version=0.0.4")];
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, content_type, text),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, content_type, String::new())
        }
    }
}

/// Apply the per-request deadline
async fn bounded<T, F>(state: &AppState, fut: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    let limit = state.config.request_timeout();
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            stage: "request",
            after_ms: limit.as_millis() as u64,
        }),
    }
}

fn failure(state: &AppState, ctx: &RequestContext, e: PipelineError) -> (StatusCode, Json<Value>) {
    state.metrics.record(|c| c.errors += 1);
    let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(user_id = %ctx.user_id, trace_id = %ctx.trace_id, error = %e, "request failed");
    } else {
        info!(user_id = %ctx.user_id, trace_id = %ctx.trace_id, error = %e, "request rejected");
    }
    let envelope: ErrorEnvelope = e.to_envelope();
    (status, Json(json!(envelope)))
}

fn is_clarify(response: &NlpResponse) -> bool {
    response
        .context
        .as_ref()
        .map(|c| c.contains_key("clarify"))
        .unwrap_or(false)
}

fn count_route(counters: &mut RequestCounters, route: Route) {
    match route {
        Route::Expense => counters.expense += 1,
        Route::Query => counters.query += 1,
        Route::Conversation => counters.conversation += 1,
    }
}

impl AppState {
    fn context(&self, raw_user_id: &Value, trace_id: String) -> RequestContext {
        let mut ctx = RequestContext::new(normalize_user_id(raw_user_id)).with_trace_id(trace_id);
        if let Some(categories) = &self.config.known_categories {
            ctx = ctx.with_known_categories(categories.clone());
        }
        ctx
    }
}
