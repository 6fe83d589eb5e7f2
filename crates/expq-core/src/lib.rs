//! Expense Query Core: data model, error envelope and stage trace
//!
//! Every other crate in the workspace speaks these types.

pub mod context;
pub mod data_model;
pub mod error;
pub mod json;
pub mod trace;

pub use context::{normalize_user_id, RequestContext, ANONYMOUS_USER};
pub use data_model::{
    AggregateOp, AggregateResult, DateRange, DraftExtras, FieldSource, NlpResponse, QueryDraft,
    QueryFilters, QueryRequest, QueryResult, QueryShape, ResultMeta, Row, SemanticIntents,
    SortOrder, ARRAY_FIELD, DEFAULT_AGGREGATE_FIELD, DEFAULT_LIMIT,
};
pub use error::{CoreError, ErrorBody, ErrorEnvelope, INVALID_QUERY_SHAPE};
pub use trace::{PipelineTrace, StageTrace};

/// Re-exported so downstream crates share one decimal type
pub use rust_decimal::Decimal;

/// Engine version
pub const EXPQ_VERSION: &str = "1.0.0";
