//! Shape resolution.
//!
//! A pure function of the draft's aggregate intent and group keys. Ranking
//! changes ordering only; it never changes the shape.

use expq_core::{QueryDraft, QueryShape};

/// Map a validated draft to exactly one shape
pub fn resolve_query_shape(draft: &QueryDraft) -> QueryShape {
    if draft.semantic_intents.aggregate {
        if draft.has_group_by() {
            QueryShape::Grouped
        } else {
            QueryShape::Aggregate
        }
    } else {
        QueryShape::List
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expq_core::{AggregateOp, SemanticIntents};

    #[test]
    fn test_shapes() {
        let mut d = QueryDraft::new("u1");
        assert_eq!(resolve_query_shape(&d), QueryShape::List);

        d.semantic_intents = SemanticIntents {
            aggregate: true,
            ..Default::default()
        };
        d.aggregate = Some(AggregateOp::Sum);
        assert_eq!(resolve_query_shape(&d), QueryShape::Aggregate);

        d.group_by = Some(vec!["category".into()]);
        assert_eq!(resolve_query_shape(&d), QueryShape::Grouped);

        d.group_by = Some(Vec::new());
        assert_eq!(resolve_query_shape(&d), QueryShape::Aggregate);
    }

    #[test]
    fn test_ranking_stays_list() {
        let mut d = QueryDraft::new("u1");
        d.semantic_intents.ranking = true;
        d.sort_by = Some("amount".into());
        assert_eq!(resolve_query_shape(&d), QueryShape::List);
    }

    #[test]
    fn test_deterministic() {
        let mut d = QueryDraft::new("u1");
        d.semantic_intents.aggregate = true;
        d.aggregate = Some(AggregateOp::Avg);
        let first = resolve_query_shape(&d);
        for _ in 0..10 {
            assert_eq!(resolve_query_shape(&d), first);
        }
    }
}
