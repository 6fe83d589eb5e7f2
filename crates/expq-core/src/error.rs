//! Unified Error Model
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error code for client-side shape violations
pub const INVALID_QUERY_SHAPE: &str = "INVALID_QUERY_SHAPE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("SHAPE/missing_query_shape: query request has no resolved shape")]
    MissingShape,

    #[error("SHAPE/array_field: cannot {usage} array field 'companions'")]
    ArrayField { usage: &'static str },

    #[error("PARSE/unknown aggregate '{0}'")]
    UnknownAggregate(String),

    #[error("PARSE/unknown sort order '{0}'")]
    UnknownSortOrder(String),
}

impl CoreError {
    /// Client-side errors map to INVALID_QUERY_SHAPE at the boundary
    pub fn is_client_error(&self) -> bool {
        matches!(self, CoreError::ArrayField { .. })
    }

    /// Stable machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::MissingShape => "missing_query_shape",
            CoreError::ArrayField { .. } => "array_field",
            CoreError::UnknownAggregate(_) | CoreError::UnknownSortOrder(_) => {
                "malformed_query_request"
            }
        }
    }
}

// ============================================================================
// ERROR ENVELOPE
// ============================================================================

/// Body of an error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Wire form of every client-visible error: `{"error": {code, message, details}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: Map::new(),
            },
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.error.details = details;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.error.details.insert(key.into(), value);
        self
    }
}
