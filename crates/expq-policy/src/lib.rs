//! EXPQ Policy: semantic invariants, shape resolution and the commit gate
//!
//! # Architecture
//!
//! ```text
//! QueryDraft → validate_query_semantics → resolve_query_shape → QueryRequest
//!                      ↓                                            ↓
//!               ShapeViolation (4xx)                         semantic_commit
//!                                                                   ↓
//!                                                     EXECUTE / CLARIFY / REJECT
//! ```

pub mod commit;
pub mod semantics;
pub mod shape;

pub use commit::{
    semantic_commit, semantic_commit_value, CommitContext, CommitDecision, CommitDecisionType,
    CommitReason,
};
pub use semantics::{validate_query_semantics, ShapeRule, ShapeViolation};
pub use shape::resolve_query_shape;
