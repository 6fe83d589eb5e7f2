//! Draft reconciliation: deterministic signals + model hints → QueryDraft.
//!
//! Deterministic values always win. Hints only fill fields the pre-parser left
//! unset, and a hinted aggregate is accepted only when the text shows no list,
//! ranking or aggregate intent of its own. Every populated field records its
//! provenance in `extras.sources`.

use crate::canonicalizer::Canonicalizer;
use crate::hint::IntentHint;
use crate::intents;
use crate::vocabulary::Vocabulary;
use crate::PreParseSignals;
use expq_core::{FieldSource, QueryDraft, SortOrder, ARRAY_FIELD, DEFAULT_AGGREGATE_FIELD};

/// Upper bound on a model-proposed page size
pub const MAX_HINT_LIMIT: usize = 1000;

/// Reconcile with the built-in vocabulary
pub fn reconcile(hint: &IntentHint, signals: &PreParseSignals, user_id: &str) -> QueryDraft {
    Reconciler::new(Vocabulary::builtin()).reconcile(hint, signals, user_id)
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'v> {
    vocab: &'v Vocabulary,
    canon: Canonicalizer<'v>,
}

impl<'v> Reconciler<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self {
            vocab,
            canon: Canonicalizer::new(vocab),
        }
    }

    pub fn reconcile(
        &self,
        hint: &IntentHint,
        signals: &PreParseSignals,
        user_id: &str,
    ) -> QueryDraft {
        let text = signals.raw_text.as_str();
        let mut draft = QueryDraft::new(user_id);
        let mut semantic = intents::classify(text, !signals.group_by.is_empty());

        // ==================== FILTERS ====================

        let det_category = signals
            .candidate_categories
            .first()
            .and_then(|c| self.canon.category(c));
        let llm_category = hint.category.as_deref().and_then(|c| self.canon.category(c));
        draft.filters.category = merge(&mut draft, "category", det_category, llm_category);

        let llm_subcategory = hint.subcategory.clone();
        draft.filters.subcategory = merge(&mut draft, "subcategory", None, llm_subcategory);

        let det_payment = signals
            .payment_methods
            .first()
            .and_then(|p| self.canon.payment_method(p));
        let llm_payment = hint
            .payment_method
            .as_deref()
            .and_then(|p| self.canon.payment_method(p));
        draft.filters.payment_method = merge(&mut draft, "paymentMethod", det_payment, llm_payment);

        let det_companions = non_empty(lowercase_all(&signals.companions));
        let llm_companions = hint
            .companions
            .as_ref()
            .and_then(|c| non_empty(lowercase_all(c)));
        draft.filters.companions = merge(&mut draft, "companions", det_companions, llm_companions);

        draft.filters.min_amount =
            merge(&mut draft, "min_amount", signals.min_amount, hint.min_amount);
        draft.filters.max_amount =
            merge(&mut draft, "max_amount", signals.max_amount, hint.max_amount);
        draft.filters.date_range =
            merge(&mut draft, "date_range", signals.date_range, hint.date_range);

        // ==================== ORDERING & PAGING ====================

        if semantic.ranking {
            draft.sort_by = Some("amount".to_string());
            draft.sort_order = SortOrder::Desc;
            draft.record_source("sort_by", FieldSource::Deterministic);
        } else if let Some(field) = hint
            .sort_by
            .as_deref()
            .and_then(|f| self.vocab.resolve_field(f))
            .filter(|f| *f != ARRAY_FIELD)
        {
            draft.sort_by = Some(field.to_string());
            draft.sort_order = hint.sort_order.unwrap_or_default();
            draft.record_source("sort_by", FieldSource::Llm);
        }

        if let Some(limit) = signals.limit {
            draft.limit = limit;
            draft.record_source("limit", FieldSource::Deterministic);
        } else if let Some(limit) = hint.limit.filter(|l| *l > 0) {
            draft.limit = limit.min(MAX_HINT_LIMIT);
            draft.record_source("limit", FieldSource::Llm);
        }

        if let Some(offset) = hint.offset {
            draft.offset = offset;
            draft.record_source("offset", FieldSource::Llm);
        }

        // ==================== AGGREGATE ====================

        if semantic.aggregate {
            draft.aggregate = Some(intents::aggregate_op(text));
            draft.record_source("aggregate", FieldSource::Deterministic);
        } else if !semantic.list && !semantic.ranking {
            if let Some(op) = hint.aggregate {
                draft.aggregate = Some(op);
                semantic.aggregate = true;
                draft.record_source("aggregate", FieldSource::Llm);
            }
        }

        if draft.aggregate.is_some() {
            let hinted_field = hint
                .aggregate_field
                .as_deref()
                .and_then(|f| self.vocab.resolve_field(f));
            if hinted_field == Some(DEFAULT_AGGREGATE_FIELD) {
                draft.record_source("aggregate_field", FieldSource::Llm);
            }
        }

        // ==================== GROUPING & COLUMNS ====================

        if !signals.group_by.is_empty() {
            draft.group_by = Some(signals.group_by.clone());
            draft.record_source("group_by", FieldSource::Deterministic);
        } else if draft.aggregate.is_some() {
            let hinted = self.resolve_fields(hint.group_by.as_deref());
            if !hinted.is_empty() {
                draft.group_by = Some(hinted);
                semantic.grouping = true;
                draft.record_source("group_by", FieldSource::Llm);
            }
        }

        if !signals.columns.is_empty() {
            draft.columns = Some(signals.columns.clone());
            draft.record_source("columns", FieldSource::Deterministic);
        } else if draft.aggregate.is_none() {
            let hinted = self.resolve_fields(hint.columns.as_deref());
            if !hinted.is_empty() {
                draft.columns = Some(hinted);
                draft.record_source("columns", FieldSource::Llm);
            }
        }

        draft.semantic_intents = semantic;
        draft
    }

    /// Known field names only, deduplicated; the array field is never a hint target
    fn resolve_fields(&self, names: Option<&[String]>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in names.unwrap_or_default() {
            if let Some(field) = self.vocab.resolve_field(name) {
                if field != ARRAY_FIELD && !out.iter().any(|f| f == field) {
                    out.push(field.to_string());
                }
            }
        }
        out
    }
}

/// Deterministic value wins; provenance is recorded on the draft
fn merge<T: SameValue>(
    draft: &mut QueryDraft,
    field: &str,
    deterministic: Option<T>,
    llm: Option<T>,
) -> Option<T> {
    match (deterministic, llm) {
        (Some(det), Some(hinted)) => {
            let source = if det.same_value(&hinted) {
                FieldSource::Both
            } else {
                FieldSource::Deterministic
            };
            draft.record_source(field, source);
            Some(det)
        }
        (Some(det), None) => {
            draft.record_source(field, FieldSource::Deterministic);
            Some(det)
        }
        (None, Some(hinted)) => {
            draft.record_source(field, FieldSource::Llm);
            Some(hinted)
        }
        (None, None) => None,
    }
}

/// Agreement check used for the "both" provenance
trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

impl SameValue for String {
    fn same_value(&self, other: &Self) -> bool {
        self.to_lowercase() == other.to_lowercase()
    }
}

impl SameValue for Vec<String> {
    fn same_value(&self, other: &Self) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.sort();
        b.sort();
        a == b
    }
}

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        (self - other).abs() < f64::EPSILON
    }
}

impl SameValue for expq_core::DateRange {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        let lowered = v.trim().to_lowercase();
        if !lowered.is_empty() && !out.contains(&lowered) {
            out.push(lowered);
        }
    }
    out
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}
