//! EXPQ Stages: collaborators, the query pipeline and message dispatch.
//!
//! Model-backed collaborators (router, intent hints, answer phrasing,
//! expense extraction) sit behind traits. The defaults here are
//! deterministic, so the whole flow runs without any model.
//!
//! # Pipeline Flow
//!
//! ```text
//! Message → Dispatcher → QueryPipeline → expq-in → expq-policy → expq-exec → expq-out
//!                                           ↓           ↓             ↓           ↓
//!                                         Draft      Request        Result      Answer
//! ```

pub mod agents;
pub mod dispatcher;
pub mod pipeline;
pub mod ratelimit;

pub use agents::{
    AgentError, AnswerPhraser, ExpenseExtractor, ExtractedExpense, IntentHintSource,
    KeywordRouter, NoHints, PreParseExtractor, Route, RouteClassifier, StaticHints,
    TemplatePhraser,
};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use pipeline::{blank_input_response, PipelineConfig, PipelineError, QueryPipeline};
pub use ratelimit::{guarded, RateLimiter, DEFAULT_WINDOW};
