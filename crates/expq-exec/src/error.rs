//! Executor and store errors
use expq_core::AggregateOp;
use thiserror::Error;

/// Failures raised by a store backend. Never retried here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("STORE/unavailable: {0}")]
    Unavailable(String),

    #[error("STORE/io: {0}")]
    Io(String),

    #[error("STORE/decode: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("EXEC/missing_aggregate: AGGREGATE-shaped request has no aggregate")]
    MissingAggregate,

    #[error("EXEC/missing_group_by: GROUPED-shaped request has no group keys")]
    MissingGroupBy,

    #[error("EXEC/aggregate_on_list: LIST-shaped request carries aggregate '{0}'")]
    AggregateOnList(AggregateOp),

    #[error("EXEC/invalid_filter: {0}")]
    InvalidFilter(String),

    #[error("EXEC/overflow: decimal overflow computing {0}")]
    Overflow(AggregateOp),

    #[error(transparent)]
    Store(#[from] StoreError),
}
