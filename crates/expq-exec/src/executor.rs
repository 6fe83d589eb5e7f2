//! Query executor
//!
//! Accepts only a resolved `QueryRequest` and matches on its shape. The
//! executor never infers a shape.
use expq_core::json::decimal_to_json;
use expq_core::{
    AggregateOp, AggregateResult, Decimal, QueryRequest, QueryResult, QueryShape, ResultMeta, Row,
    SortOrder,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::aggregate::{compute_aggregate, decimal_values};
use crate::error::ExecError;
use crate::predicate::{build_where, ExpenseWhere, OrderBy};
use crate::record::Expense;
use crate::store::ExpenseStore;

pub async fn run_query(
    store: &dyn ExpenseStore,
    request: &QueryRequest,
) -> Result<QueryResult, ExecError> {
    let filter = build_where(request.filters(), request.user_id())?;
    let meta = ResultMeta {
        limit: request.limit(),
        offset: request.offset(),
        total_count: None,
    };

    debug!(
        user_id = request.user_id(),
        shape = %request.shape(),
        "executing query"
    );

    match request.shape() {
        QueryShape::Aggregate => run_aggregate(store, request, &filter, meta).await,
        QueryShape::Grouped => run_grouped(store, request, &filter, meta).await,
        QueryShape::List => run_list(store, request, &filter, meta).await,
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

async fn run_aggregate(
    store: &dyn ExpenseStore,
    request: &QueryRequest,
    filter: &ExpenseWhere,
    meta: ResultMeta,
) -> Result<QueryResult, ExecError> {
    let op = request.aggregate().ok_or(ExecError::MissingAggregate)?;

    let value = if op == AggregateOp::Count {
        Some(Decimal::from(store.count(filter).await?))
    } else {
        let records = store.find_many(filter, None, None, None).await?;
        let values = decimal_values(&records, request.aggregate_field());
        compute_aggregate(&values, op)?
    };

    Ok(QueryResult::aggregate(
        AggregateResult::single(op.as_str(), value),
        meta,
    ))
}

// ============================================================================
// GROUPED
// ============================================================================

async fn run_grouped(
    store: &dyn ExpenseStore,
    request: &QueryRequest,
    filter: &ExpenseWhere,
    mut meta: ResultMeta,
) -> Result<QueryResult, ExecError> {
    let keys = request.group_by();
    if keys.is_empty() {
        return Err(ExecError::MissingGroupBy);
    }

    let records = store.find_many(filter, None, None, None).await?;
    let buckets = bucket_records(&records, keys);

    let op = request.aggregate().unwrap_or(AggregateOp::Count);
    let mut rows = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let mut row = Row::new();
        for (name, value) in keys.iter().zip(key) {
            row.insert(name.clone(), value);
        }
        let values: Vec<Decimal> = if op == AggregateOp::Count {
            // count ignores the aggregate field
            members.iter().map(|_| Decimal::ONE).collect()
        } else {
            decimal_values(members.iter().copied(), request.aggregate_field())
        };
        let metric = compute_aggregate(&values, op)?;
        row.insert(
            op.as_str().to_string(),
            metric.map(decimal_to_json).unwrap_or(Value::Null),
        );
        rows.push(row);
    }

    if let Some(sort_by) = request.sort_by() {
        let column = grouped_sort_column(sort_by, request, op, &rows);
        sort_grouped(&mut rows, &column, request.sort_order());
    }

    meta.total_count = Some(rows.len() as u64);
    rows.truncate(request.limit());
    Ok(QueryResult::rows(rows, meta))
}

/// Buckets keyed by the tuple of group values, in first-seen order
fn bucket_records<'a>(records: &'a [Expense], keys: &[String]) -> Vec<(Vec<Value>, Vec<&'a Expense>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(Vec<Value>, Vec<&'a Expense>)> = Vec::new();

    for record in records {
        let key: Vec<Value> = keys
            .iter()
            .map(|k| record.field(k).unwrap_or(Value::Null))
            .collect();
        let fingerprint = Value::Array(key.clone()).to_string();
        match index.get(&fingerprint) {
            Some(&i) => buckets[i].1.push(record),
            None => {
                index.insert(fingerprint, buckets.len());
                buckets.push((key, vec![record]));
            }
        }
    }
    buckets
}

/// Sorting by the aggregated field means sorting by its metric column
fn grouped_sort_column(sort_by: &str, request: &QueryRequest, op: AggregateOp, rows: &[Row]) -> String {
    let present = rows.iter().any(|r| r.contains_key(sort_by));
    if !present && sort_by.eq_ignore_ascii_case(request.aggregate_field()) {
        op.as_str().to_string()
    } else {
        sort_by.to_string()
    }
}

enum SortKey {
    Number(f64),
    Text(String),
    Missing,
}

impl SortKey {
    fn of(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map(SortKey::Number).unwrap_or(SortKey::Missing),
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => SortKey::Number(n),
                _ => SortKey::Text(s.clone()),
            },
            Some(Value::Bool(b)) => SortKey::Text(b.to_string()),
            _ => SortKey::Missing,
        }
    }

    fn tier(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Text(_) => 1,
            SortKey::Missing => 2,
        }
    }
}

/// Numbers first, then text, then missing. Direction applies within a tier.
fn sort_grouped(rows: &mut [Row], column: &str, order: SortOrder) {
    rows.sort_by(|a, b| {
        let ka = SortKey::of(a.get(column));
        let kb = SortKey::of(b.get(column));
        let within = match (&ka, &kb) {
            (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
            (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
            _ => return ka.tier().cmp(&kb.tier()),
        };
        match order {
            SortOrder::Asc => within,
            SortOrder::Desc => within.reverse(),
        }
    });
}

// ============================================================================
// LIST
// ============================================================================

async fn run_list(
    store: &dyn ExpenseStore,
    request: &QueryRequest,
    filter: &ExpenseWhere,
    mut meta: ResultMeta,
) -> Result<QueryResult, ExecError> {
    if let Some(op) = request.aggregate() {
        return Err(ExecError::AggregateOnList(op));
    }

    let order = request
        .sort_by()
        .map(|field| OrderBy::new(field, request.sort_order()));
    let records = store
        .find_many(
            filter,
            Some(request.offset()),
            Some(request.limit()),
            order.as_ref(),
        )
        .await?;
    let total = store.count(filter).await?;

    let rows = records
        .iter()
        .map(|r| r.to_row(request.columns()))
        .collect();
    meta.total_count = Some(total);
    Ok(QueryResult::rows(rows, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};
    use expq_core::{DateRange, QueryDraft};
    use serde_json::json;
    use std::str::FromStr;

    fn expense(id: &str, amount: &str, category: &str, pay: &str, day: u32) -> Expense {
        let date = NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_time(NaiveTime::MIN)
            .and_utc();
        Expense::new(id, "u1", Decimal::from_str(amount).unwrap(), category, pay, date)
    }

    fn store() -> MemoryStore {
        MemoryStore::from_records(vec![
            expense("e1", "100.10", "Food", "Cash", 1),
            expense("e2", "200.20", "Food", "Card", 2),
            expense("e3", "300.005", "Travel", "Card", 3),
            expense("e4", "40", "Bills", "UPI", 4),
        ])
    }

    fn request(shape: QueryShape, f: impl FnOnce(&mut QueryDraft)) -> QueryRequest {
        let mut draft = QueryDraft::new("u1");
        f(&mut draft);
        QueryRequest::new(draft, shape).unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_sum_is_exact() {
        let req = request(QueryShape::Aggregate, |d| {
            d.aggregate = Some(AggregateOp::Sum);
            d.filters.min_amount = Some(100.0);
        });
        let result = run_query(&store(), &req).await.unwrap();
        let agg = result.aggregate_result.unwrap();
        assert_eq!(agg.get("sum"), Some(Some(Decimal::from_str("600.305").unwrap())));
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_empty_set() {
        let req = request(QueryShape::Aggregate, |d| {
            d.aggregate = Some(AggregateOp::Max);
            d.filters.category = Some("Health".into());
        });
        let result = run_query(&store(), &req).await.unwrap();
        assert_eq!(result.aggregate_result.unwrap().get("max"), Some(None));

        let req = request(QueryShape::Aggregate, |d| {
            d.aggregate = Some(AggregateOp::Count);
            d.filters.date_range = Some(DateRange::day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        });
        let result = run_query(&store(), &req).await.unwrap();
        assert_eq!(result.aggregate_result.unwrap().get("count"), Some(Some(Decimal::ZERO)));
    }

    #[tokio::test]
    async fn test_aggregate_without_op_fails() {
        let req = request(QueryShape::Aggregate, |_| {});
        assert_eq!(run_query(&store(), &req).await, Err(ExecError::MissingAggregate));
    }

    #[tokio::test]
    async fn test_grouped_sum_sorted_desc() {
        let req = request(QueryShape::Grouped, |d| {
            d.aggregate = Some(AggregateOp::Sum);
            d.group_by = Some(vec!["category".into()]);
            d.sort_by = Some("sum".into());
            d.sort_order = SortOrder::Desc;
            d.limit = 2;
        });
        let result = run_query(&store(), &req).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["category"], json!("Food"));
        assert_eq!(result.rows[0]["sum"], json!(300.3));
        assert_eq!(result.rows[1]["category"], json!("Travel"));
        assert_eq!(result.rows[1]["sum"], json!(300.005));
        assert!(result.aggregate_result.is_none());
    }

    #[tokio::test]
    async fn test_grouped_defaults_to_count_and_keeps_first_seen_order() {
        let req = request(QueryShape::Grouped, |d| {
            d.group_by = Some(vec!["paymentMethod".into(), "category".into()]);
        });
        let result = run_query(&store(), &req).await.unwrap();
        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.rows[0]["paymentMethod"], json!("Cash"));
        assert_eq!(result.rows[0]["count"], json!(1));
    }

    #[test]
    fn test_grouped_sort_puts_missing_last() {
        let mut rows: Vec<Row> = vec![
            json!({"k": "b", "v": null}),
            json!({"k": "a", "v": 2}),
            json!({"k": "c", "v": "x"}),
            json!({"k": "d", "v": 10}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        sort_grouped(&mut rows, "v", SortOrder::Asc);
        let order: Vec<&str> = rows.iter().map(|r| r["k"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["a", "d", "c", "b"]);

        sort_grouped(&mut rows, "v", SortOrder::Desc);
        let order: Vec<&str> = rows.iter().map(|r| r["k"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["d", "a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_list_paginates_with_total() {
        let req = request(QueryShape::List, |d| {
            d.sort_by = Some("amount".into());
            d.sort_order = SortOrder::Desc;
            d.limit = 3;
        });
        let result = run_query(&store(), &req).await.unwrap();
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0]["id"], json!("e3"));
        assert_eq!(result.meta.total_count, Some(4));
        assert!(result.meta.total_count.unwrap() >= result.rows.len() as u64);
    }

    #[tokio::test]
    async fn test_list_with_aggregate_is_refused() {
        let req = request(QueryShape::List, |d| d.aggregate = Some(AggregateOp::Sum));
        assert_eq!(
            run_query(&store(), &req).await,
            Err(ExecError::AggregateOnList(AggregateOp::Sum))
        );
    }
}
