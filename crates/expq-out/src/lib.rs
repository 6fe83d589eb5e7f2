//! EXPQ-OUT: result phrasing, answer validation and templated fallback
//!
//! # Flow
//!
//! ```text
//! QueryResult → phraser (model or template) → validate_query_response
//!                                                   ↓ (failure)
//!                                      create_safe_fallback_response
//! ```

pub mod fallback;
pub mod renderer;
pub mod templates;
pub mod validator;

pub use fallback::{create_safe_fallback_response, fallback_answer, metric_label, phrase_result};
pub use renderer::{format_number, TemplateRenderer};
pub use templates::{Template, TemplatesFile, BUILTIN_TEMPLATES};
pub use validator::{extract_numbers, validate_query_response, ValidationFailure};

use thiserror::Error;

/// Errors that can occur during rendering
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("RENDER/template: {0}")]
    Template(String),
    #[error("RENDER/render: {0}")]
    Render(String),
    #[error("RENDER/unknown_template: {0}")]
    Unknown(String),
}
