//! Exact-decimal aggregation
//!
//! Values stay `Decimal` end to end. Empty input: `count`, `sum` and `avg`
//! are zero, `min` and `max` are null.
use expq_core::{AggregateOp, Decimal};

use crate::error::ExecError;
use crate::record::Expense;

/// Numeric values of `field` across records, skipping records without one
pub fn decimal_values<'a, I>(records: I, field: &str) -> Vec<Decimal>
where
    I: IntoIterator<Item = &'a Expense>,
{
    records
        .into_iter()
        .filter_map(|r| r.decimal_field(field))
        .collect()
}

pub fn compute_aggregate(values: &[Decimal], op: AggregateOp) -> Result<Option<Decimal>, ExecError> {
    if op == AggregateOp::Count {
        return Ok(Some(Decimal::from(values.len() as u64)));
    }
    if values.is_empty() {
        return Ok(match op {
            AggregateOp::Min | AggregateOp::Max => None,
            _ => Some(Decimal::ZERO),
        });
    }

    let value = match op {
        AggregateOp::Sum => checked_sum(values, op)?,
        AggregateOp::Avg => {
            let total = checked_sum(values, op)?;
            total
                .checked_div(Decimal::from(values.len() as u64))
                .ok_or(ExecError::Overflow(op))?
        }
        AggregateOp::Min => values.iter().copied().min().unwrap_or(Decimal::ZERO),
        AggregateOp::Max => values.iter().copied().max().unwrap_or(Decimal::ZERO),
        AggregateOp::Count => Decimal::from(values.len() as u64),
    };
    Ok(Some(value))
}

fn checked_sum(values: &[Decimal], op: AggregateOp) -> Result<Decimal, ExecError> {
    values.iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(*v).ok_or(ExecError::Overflow(op))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_sum_is_exact() {
        let values = vec![dec("100.10"), dec("200.20"), dec("300.005")];
        let sum = compute_aggregate(&values, AggregateOp::Sum).unwrap().unwrap();
        assert_eq!(sum, dec("600.305"));
        assert_eq!(sum.to_string(), "600.305");
    }

    #[test]
    fn test_avg_is_exact() {
        let values = vec![dec("10"), dec("20")];
        let avg = compute_aggregate(&values, AggregateOp::Avg).unwrap().unwrap();
        assert_eq!(avg, dec("15"));
    }

    #[test]
    fn test_empty_set_policy() {
        assert_eq!(compute_aggregate(&[], AggregateOp::Count).unwrap(), Some(Decimal::ZERO));
        assert_eq!(compute_aggregate(&[], AggregateOp::Sum).unwrap(), Some(Decimal::ZERO));
        assert_eq!(compute_aggregate(&[], AggregateOp::Avg).unwrap(), Some(Decimal::ZERO));
        assert_eq!(compute_aggregate(&[], AggregateOp::Min).unwrap(), None);
        assert_eq!(compute_aggregate(&[], AggregateOp::Max).unwrap(), None);
    }

    #[test]
    fn test_min_max() {
        let values = vec![dec("5.5"), dec("-2"), dec("40")];
        assert_eq!(compute_aggregate(&values, AggregateOp::Min).unwrap(), Some(dec("-2")));
        assert_eq!(compute_aggregate(&values, AggregateOp::Max).unwrap(), Some(dec("40")));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let values = vec![Decimal::MAX, Decimal::MAX];
        assert_eq!(
            compute_aggregate(&values, AggregateOp::Sum),
            Err(ExecError::Overflow(AggregateOp::Sum))
        );
    }
}
