//! EXPQ-IN: natural language → query draft
//!
//! Deterministic pre-parsing, canonicalization and reconciliation of model
//! hints into a `QueryDraft`.
//!
//! # Example
//!
//! ```ignore
//! use expq_in::{pre_parse, reconcile, IntentHint};
//!
//! let signals = pre_parse("How much did I spend on food last month?");
//! let draft = reconcile(&IntentHint::none(), &signals, "u1");
//! assert_eq!(draft.filters.category.as_deref(), Some("Food"));
//! ```

pub mod amounts;
pub mod canonicalizer;
pub mod companions;
pub mod dates;
pub mod fields;
pub mod hint;
pub mod intents;
pub mod normalizer;
pub mod reconciler;
pub mod vocabulary;

pub use canonicalizer::{
    canonicalize_category, canonicalize_companion, canonicalize_payment_method, Canonicalizer,
};
pub use hint::IntentHint;
pub use normalizer::{preflight, Preflight, MAX_INPUT_CHARS};
pub use reconciler::{reconcile, Reconciler};
pub use vocabulary::{Vocabulary, VocabularyError};

use chrono::{Local, NaiveDate};
use expq_core::DateRange;
use serde::Serialize;

/// Deterministic signals extracted from raw text.
///
/// Every field is optional; an empty list means "no signal".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreParseSignals {
    pub amounts: Vec<f64>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Result count ("top 3"); never doubles as an amount
    pub limit: Option<usize>,
    pub date_range: Option<DateRange>,
    pub companions: Vec<String>,
    pub payment_methods: Vec<String>,
    /// Priority ordered
    pub candidate_categories: Vec<String>,
    pub group_by: Vec<String>,
    pub columns: Vec<String>,
    /// Normalized (lowercased) text the signals were read from
    pub raw_text: String,
}

/// Pre-parse relative to the local calendar date
pub fn pre_parse(text: &str) -> PreParseSignals {
    pre_parse_at(text, Local::now().date_naive())
}

/// Pre-parse relative to an explicit `today`
pub fn pre_parse_at(text: &str, today: NaiveDate) -> PreParseSignals {
    pre_parse_with(text, today, Vocabulary::builtin())
}

/// Pre-parse with a custom vocabulary
pub fn pre_parse_with(text: &str, today: NaiveDate, vocab: &Vocabulary) -> PreParseSignals {
    let normalized = normalizer::normalize(text);

    let dates = dates::scan_dates(&normalized, today);
    let cardinality = amounts::extract_cardinality(&normalized, &dates.spans);

    let mut excluded = dates.spans.clone();
    if let Some(card) = &cardinality {
        excluded.push(card.span.clone());
    }
    let tokens = amounts::extract_amounts(&normalized, &excluded);
    let bounds = amounts::amount_bounds(&normalized, &tokens);

    PreParseSignals {
        amounts: tokens.iter().map(|t| t.value).collect(),
        min_amount: bounds.min,
        max_amount: bounds.max,
        limit: cardinality.map(|c| c.limit),
        date_range: dates.range,
        companions: companions::extract_companions(&normalized, vocab),
        payment_methods: vocab.match_payment_methods(&normalized),
        candidate_categories: vocab.match_categories(&normalized),
        group_by: fields::extract_group_by(&normalized, vocab),
        columns: fields::extract_columns(&normalized, vocab),
        raw_text: normalized,
    }
}
