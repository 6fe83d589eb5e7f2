//! Collaborator seams and their deterministic defaults.
//!
//! Model-backed implementations plug in behind these traits. Every default
//! here is pure and never fails, so the pipeline runs without any model.

use async_trait::async_trait;
use chrono::NaiveDate;
use expq_core::{QueryRequest, QueryResult, RequestContext};
use expq_in::{pre_parse_with, Canonicalizer, Vocabulary};
use expq_out::{phrase_result, TemplateRenderer};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("AGENT/timeout: {agent} gave no answer within {after_ms}ms")]
    Timeout { agent: &'static str, after_ms: u64 },

    #[error("AGENT/unavailable: {0}")]
    Unavailable(String),

    #[error("AGENT/malformed: {0}")]
    Malformed(String),
}

impl AgentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }
}

// ============================================================================
// ROUTING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Expense,
    Query,
    Conversation,
}

impl Route {
    /// Numeric route codes used by model routers (1, 2, 3)
    pub fn from_code(code: i64) -> Option<Route> {
        match code {
            1 => Some(Route::Expense),
            2 => Some(Route::Query),
            3 => Some(Route::Conversation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Expense => "expense",
            Route::Query => "query",
            Route::Conversation => "conversation",
        }
    }
}

#[async_trait]
pub trait RouteClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Result<Route, AgentError>;
}

lazy_static! {
    static ref QUESTION: Regex = Regex::new(
        r"(?i)^\s*(?:how|what|which|when|where|who|did|do|does|show|list|display|give|get|tell|find|group|break)\b|\?\s*$|\b(?:how much|how many|total|average|avg|sum|count|top|highest|lowest|breakdown|per|grouped)\b"
    )
    .unwrap();
    static ref EXPENSE_VERB: Regex = Regex::new(
        r"(?i)\b(?:spent|spend|paid|pay|bought|buy|purchased|cost|gave|ordered|booked)\b"
    )
    .unwrap();
}

/// Deterministic router: questions are queries, spending statements with an
/// amount are expenses, everything else is conversation
#[derive(Debug, Clone, Default)]
pub struct KeywordRouter {
    vocab: Option<Arc<Vocabulary>>,
}

impl KeywordRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab: Some(vocab) }
    }

    pub fn route(&self, text: &str) -> Route {
        if QUESTION.is_match(text) {
            return Route::Query;
        }
        let vocab = self.vocab.as_deref().unwrap_or_else(|| Vocabulary::builtin());
        let signals = pre_parse_with(text, chrono::Local::now().date_naive(), vocab);
        if !signals.amounts.is_empty()
            && (EXPENSE_VERB.is_match(text) || !signals.candidate_categories.is_empty())
        {
            return Route::Expense;
        }
        Route::Conversation
    }
}

#[async_trait]
impl RouteClassifier for KeywordRouter {
    fn name(&self) -> &'static str {
        "router.keyword.v1"
    }

    async fn classify(&self, text: &str) -> Result<Route, AgentError> {
        Ok(self.route(text))
    }
}

// ============================================================================
// QUERY HINTS
// ============================================================================

/// Loosely-typed query hints. `Value::Null` means "no hint".
#[async_trait]
pub trait IntentHintSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn hint(&self, text: &str, ctx: &RequestContext) -> Result<Value, AgentError>;
}

/// Deterministic-only operation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

#[async_trait]
impl IntentHintSource for NoHints {
    fn name(&self) -> &'static str {
        "hint.none.v1"
    }

    async fn hint(&self, _text: &str, _ctx: &RequestContext) -> Result<Value, AgentError> {
        Ok(Value::Null)
    }
}

/// Fixed hint, for tests and replaying a recorded model response
#[derive(Debug, Clone)]
pub struct StaticHints(pub Value);

#[async_trait]
impl IntentHintSource for StaticHints {
    fn name(&self) -> &'static str {
        "hint.static.v1"
    }

    async fn hint(&self, _text: &str, _ctx: &RequestContext) -> Result<Value, AgentError> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// ANSWER PHRASING
// ============================================================================

#[async_trait]
pub trait AnswerPhraser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the phrasing is reproducible for identical input
    fn deterministic(&self) -> bool {
        false
    }

    async fn phrase(
        &self,
        text: &str,
        request: &QueryRequest,
        result: &QueryResult,
    ) -> Result<String, AgentError>;
}

/// Phrases results from the response templates
#[derive(Debug, Clone, Default)]
pub struct TemplatePhraser {
    renderer: Option<Arc<TemplateRenderer>>,
}

impl TemplatePhraser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renderer(renderer: Arc<TemplateRenderer>) -> Self {
        Self {
            renderer: Some(renderer),
        }
    }
}

#[async_trait]
impl AnswerPhraser for TemplatePhraser {
    fn name(&self) -> &'static str {
        "phrase.template.v1"
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn phrase(
        &self,
        _text: &str,
        request: &QueryRequest,
        result: &QueryResult,
    ) -> Result<String, AgentError> {
        let renderer = self
            .renderer
            .as_deref()
            .unwrap_or_else(|| TemplateRenderer::builtin());
        Ok(phrase_result(result, renderer, request.group_by()))
    }
}

// ============================================================================
// EXPENSE EXTRACTION
// ============================================================================

/// Structured fields of a newly described expense
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedExpense {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub companions: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default, rename = "paymentMethod", alias = "payment_method")]
    pub payment_method: Option<String>,
}

#[async_trait]
pub trait ExpenseExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str, ctx: &RequestContext) -> Result<ExtractedExpense, AgentError>;
}

/// Builds an expense from pre-parse signals
#[derive(Debug, Clone, Default)]
pub struct PreParseExtractor {
    vocab: Option<Arc<Vocabulary>>,
}

impl PreParseExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab: Some(vocab) }
    }

    pub fn extract_now(&self, text: &str, today: NaiveDate) -> ExtractedExpense {
        let vocab = self.vocab.as_deref().unwrap_or_else(|| Vocabulary::builtin());
        let canon = Canonicalizer::new(vocab);
        let signals = pre_parse_with(text, today, vocab);

        // a single day when one was named, otherwise today
        let date = match signals.date_range {
            Some(range) if range.start.is_some() && range.start == range.end => range.start,
            _ => Some(today),
        };

        let description = text.trim();
        ExtractedExpense {
            amount: signals.amounts.first().copied(),
            date,
            companions: signals.companions.clone(),
            description: (!description.is_empty()).then(|| description.to_string()),
            category: signals
                .candidate_categories
                .first()
                .and_then(|c| canon.category(c)),
            subcategory: None,
            payment_method: signals
                .payment_methods
                .first()
                .and_then(|p| canon.payment_method(p)),
        }
    }
}

#[async_trait]
impl ExpenseExtractor for PreParseExtractor {
    fn name(&self) -> &'static str {
        "extract.preparse.v1"
    }

    async fn extract(&self, text: &str, ctx: &RequestContext) -> Result<ExtractedExpense, AgentError> {
        Ok(self.extract_now(text, ctx.today))
    }
}
