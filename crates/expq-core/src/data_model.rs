//! Data Model: DateRange, QueryFilters, QueryDraft, QueryRequest, QueryResult, NlpResponse
//!
//! Entities live for a single request only:
//!
//! ```text
//! QueryDraft → (validated) → QueryRequest → (executed) → QueryResult → NlpResponse
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::json::decimal_to_json;

/// Default page size when none (or zero) is requested
pub const DEFAULT_LIMIT: usize = 100;

/// Default numeric field for aggregates
pub const DEFAULT_AGGREGATE_FIELD: &str = "amount";

/// The only array-typed store field. Never a group key or aggregate target.
pub const ARRAY_FIELD: &str = "companions";

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_aggregate_field() -> String {
    DEFAULT_AGGREGATE_FIELD.to_string()
}

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive calendar date range. Serialized as ISO 8601 dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "DateRangeRepr")]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct DateRangeRepr {
    #[serde(default)]
    start: Option<NaiveDate>,
    #[serde(default)]
    end: Option<NaiveDate>,
}

impl From<DateRangeRepr> for DateRange {
    fn from(repr: DateRangeRepr) -> Self {
        DateRange::new(repr.start, repr.end)
    }
}

impl DateRange {
    /// Build a range, swapping the bounds if they arrive reversed
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) if s > e => DateRange {
                start: Some(e),
                end: Some(s),
            },
            _ => DateRange { start, end },
        }
    }

    /// Closed range between two dates (in either order)
    pub fn between(a: NaiveDate, b: NaiveDate) -> Self {
        Self::new(Some(a), Some(b))
    }

    /// A single calendar day
    pub fn day(d: NaiveDate) -> Self {
        Self::new(Some(d), Some(d))
    }

    /// True when neither bound is set
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// WHERE-equivalent filter set shared by drafts and requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Matched case-insensitively against the array field
    #[serde(default)]
    pub companions: Option<Vec<String>>,
    #[serde(default, rename = "paymentMethod", alias = "payment_method")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Provenance metadata, never used for filtering
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl QueryFilters {
    /// True when a bounded date range is present
    pub fn has_date_range(&self) -> bool {
        self.date_range.map(|r| !r.is_unbounded()).unwrap_or(false)
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Supported aggregate metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateOp {
    /// Metric key used in results ("sum", "avg", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateOp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" | "total" => Ok(AggregateOp::Sum),
            "avg" | "average" | "mean" => Ok(AggregateOp::Avg),
            "count" => Ok(AggregateOp::Count),
            "min" | "minimum" => Ok(AggregateOp::Min),
            "max" | "maximum" => Ok(AggregateOp::Max),
            other => Err(CoreError::UnknownAggregate(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(CoreError::UnknownSortOrder(other.to_string())),
        }
    }
}

/// Authoritative structural category of a query result.
///
/// Consumers match on it exhaustively; the enum carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryShape {
    /// Top-N, recent or ranked rows
    List,
    /// A single metric over all matching rows
    Aggregate,
    /// One metric per group_by bucket
    Grouped,
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryShape::List => write!(f, "LIST"),
            QueryShape::Aggregate => write!(f, "AGGREGATE"),
            QueryShape::Grouped => write!(f, "GROUPED"),
        }
    }
}

/// Keyword-derived classification of the raw text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SemanticIntents {
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub aggregate: bool,
    #[serde(default)]
    pub ranking: bool,
    #[serde(default)]
    pub grouping: bool,
}

/// Where a draft field value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Deterministic,
    Llm,
    Both,
}

/// Audit metadata carried from draft to request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftExtras {
    #[serde(default)]
    pub sources: BTreeMap<String, FieldSource>,
}

// ============================================================================
// QUERY DRAFT
// ============================================================================

/// Unresolved, unvalidated query intent produced by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDraft {
    pub user_id: String,
    #[serde(default)]
    pub filters: QueryFilters,
    #[serde(default)]
    pub aggregate: Option<AggregateOp>,
    #[serde(default = "default_aggregate_field")]
    pub aggregate_field: String,
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub semantic_intents: SemanticIntents,
    #[serde(default)]
    pub extras: DraftExtras,
}

impl QueryDraft {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            filters: QueryFilters::default(),
            aggregate: None,
            aggregate_field: default_aggregate_field(),
            group_by: None,
            columns: None,
            sort_by: None,
            sort_order: SortOrder::Desc,
            limit: DEFAULT_LIMIT,
            offset: 0,
            semantic_intents: SemanticIntents::default(),
            extras: DraftExtras::default(),
        }
    }

    /// Record the provenance of a field
    pub fn record_source(&mut self, field: impl Into<String>, source: FieldSource) {
        self.extras.sources.insert(field.into(), source);
    }

    /// True when at least one group key is present
    pub fn has_group_by(&self) -> bool {
        self.group_by.as_ref().map(|g| !g.is_empty()).unwrap_or(false)
    }
}

// ============================================================================
// QUERY REQUEST
// ============================================================================

/// Immutable, resolved query. The only object the executor accepts.
///
/// Construction fails closed: a request without a shape cannot be built or
/// deserialized, and the array field can never be a group key or aggregate
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QueryRequestRepr")]
pub struct QueryRequest {
    user_id: String,
    filters: QueryFilters,
    aggregate: Option<AggregateOp>,
    aggregate_field: String,
    group_by: Option<Vec<String>>,
    columns: Option<Vec<String>>,
    sort_by: Option<String>,
    sort_order: SortOrder,
    limit: usize,
    offset: usize,
    semantic_intents: SemanticIntents,
    shape: QueryShape,
    extras: DraftExtras,
}

#[derive(Deserialize)]
struct QueryRequestRepr {
    #[serde(flatten)]
    draft: QueryDraft,
    #[serde(default)]
    shape: Option<QueryShape>,
}

impl TryFrom<QueryRequestRepr> for QueryRequest {
    type Error = CoreError;

    fn try_from(repr: QueryRequestRepr) -> Result<Self, Self::Error> {
        let shape = repr.shape.ok_or(CoreError::MissingShape)?;
        QueryRequest::new(repr.draft, shape)
    }
}

impl QueryRequest {
    /// Bind a draft to its resolved shape
    pub fn new(draft: QueryDraft, shape: QueryShape) -> Result<Self, CoreError> {
        if draft.aggregate_field.eq_ignore_ascii_case(ARRAY_FIELD) {
            return Err(CoreError::ArrayField { usage: "aggregate on" });
        }

        let group_by = draft.group_by.filter(|g| !g.is_empty());
        if let Some(keys) = &group_by {
            if keys.iter().any(|k| k.eq_ignore_ascii_case(ARRAY_FIELD)) {
                return Err(CoreError::ArrayField { usage: "group by" });
            }
        }

        Ok(QueryRequest {
            user_id: draft.user_id,
            filters: draft.filters,
            aggregate: draft.aggregate,
            aggregate_field: draft.aggregate_field,
            group_by,
            columns: draft.columns,
            sort_by: draft.sort_by,
            sort_order: draft.sort_order,
            limit: if draft.limit == 0 { DEFAULT_LIMIT } else { draft.limit },
            offset: draft.offset,
            semantic_intents: draft.semantic_intents,
            shape,
            extras: draft.extras,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn filters(&self) -> &QueryFilters {
        &self.filters
    }

    pub fn aggregate(&self) -> Option<AggregateOp> {
        self.aggregate
    }

    pub fn aggregate_field(&self) -> &str {
        &self.aggregate_field
    }

    /// Group keys in request order (empty when not grouped)
    pub fn group_by(&self) -> &[String] {
        self.group_by.as_deref().unwrap_or(&[])
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn semantic_intents(&self) -> SemanticIntents {
        self.semantic_intents
    }

    pub fn shape(&self) -> QueryShape {
        self.shape
    }

    pub fn sources(&self) -> &BTreeMap<String, FieldSource> {
        &self.extras.sources
    }
}

// ============================================================================
// QUERY RESULT
// ============================================================================

/// A flat, JSON-safe record
pub type Row = Map<String, Value>;

/// Pagination metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    pub limit: usize,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// Metric name → exact decimal value (`None` for min/max of an empty set).
///
/// Values stay decimal in memory and become JSON numbers only when serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult(BTreeMap<String, Option<Decimal>>);

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result holding one metric
    pub fn single(metric: impl Into<String>, value: Option<Decimal>) -> Self {
        let mut result = Self::new();
        result.insert(metric, value);
        result
    }

    pub fn insert(&mut self, metric: impl Into<String>, value: Option<Decimal>) {
        self.0.insert(metric.into(), value);
    }

    /// Outer `None`: metric absent. Inner `None`: metric is null.
    pub fn get(&self, metric: &str) -> Option<Option<Decimal>> {
        self.0.get(metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<Decimal>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Non-null metric values
    pub fn values(&self) -> Vec<Decimal> {
        self.0.values().filter_map(|v| *v).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.as_str(), v.map(decimal_to_json).unwrap_or(Value::Null)))
            .collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AggregateResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, Option<Number>> = BTreeMap::deserialize(deserializer)?;
        let mut out = BTreeMap::new();
        for (metric, number) in raw {
            let value = match number {
                Some(n) => {
                    let text = n.to_string();
                    let parsed = Decimal::from_str(&text)
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map_err(D::Error::custom)?;
                    Some(parsed)
                }
                None => None,
            };
            out.insert(metric, value);
        }
        Ok(AggregateResult(out))
    }
}

/// Output of execution. Both payload fields always exist structurally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub aggregate_result: Option<AggregateResult>,
    #[serde(default)]
    pub meta: ResultMeta,
}

impl QueryResult {
    /// AGGREGATE-shaped result
    pub fn aggregate(result: AggregateResult, meta: ResultMeta) -> Self {
        Self {
            rows: Vec::new(),
            aggregate_result: Some(result),
            meta,
        }
    }

    /// LIST- or GROUPED-shaped result
    pub fn rows(rows: Vec<Row>, meta: ResultMeta) -> Self {
        Self {
            rows,
            aggregate_result: None,
            meta,
        }
    }

    /// True when there is an aggregate payload with at least one metric
    pub fn has_aggregate(&self) -> bool {
        self.aggregate_result
            .as_ref()
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    }

    /// No rows and no aggregate metrics
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && !self.has_aggregate()
    }
}

// ============================================================================
// NLP RESPONSE
// ============================================================================

/// Terminal response object, serialized directly to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpResponse {
    pub user_id: String,
    pub answer: String,
    #[serde(default)]
    pub query: Option<QueryRequest>,
    #[serde(default)]
    pub output: Option<QueryResult>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

impl NlpResponse {
    pub fn new(user_id: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            answer: answer.into(),
            query: None,
            output: None,
            context: None,
        }
    }

    pub fn with_query(mut self, query: QueryRequest) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_output(mut self, output: QueryResult) -> Self {
        self.output = Some(output);
        self
    }

    /// Add one context entry, creating the context map if needed
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}
