//! Store interface and the in-memory backend
use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::RwLock;

use expq_core::SortOrder;

use crate::error::StoreError;
use crate::predicate::{ExpenseWhere, OrderBy};
use crate::record::Expense;

/// The two store operations the executor needs
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn find_many(
        &self,
        filter: &ExpenseWhere,
        skip: Option<usize>,
        take: Option<usize>,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Expense>, StoreError>;

    async fn count(&self, filter: &ExpenseWhere) -> Result<u64, StoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Expense>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Expense>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load a JSON array of expense records
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let records: Vec<Expense> =
            serde_json::from_str(content).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Self::from_records(records))
    }

    pub fn insert(&self, expense: Expense) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.push(expense);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut seen: Vec<String> = Vec::new();
        for r in records.iter() {
            if !seen.iter().any(|c| c.eq_ignore_ascii_case(&r.category)) {
                seen.push(r.category.clone());
            }
        }
        Ok(seen)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn find_many(
        &self,
        filter: &ExpenseWhere,
        skip: Option<usize>,
        take: Option<usize>,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Expense>, StoreError> {
        let mut matched: Vec<Expense> = {
            let records = self.records.read().map_err(poisoned)?;
            records.iter().filter(|r| filter.matches(r)).cloned().collect()
        };

        if let Some(order) = order {
            matched.sort_by(|a, b| compare_field(a, b, order));
        }

        let skip = skip.unwrap_or(0);
        let take = take.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(take).collect())
    }

    async fn count(&self, filter: &ExpenseWhere) -> Result<u64, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }
}

/// Missing values sort last in either direction
fn compare_field(a: &Expense, b: &Expense, order: &OrderBy) -> Ordering {
    let directed = |ord: Ordering| match order.order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    };
    match order.field.as_str() {
        "amount" => directed(a.amount.cmp(&b.amount)),
        "date" => directed(a.date.cmp(&b.date)),
        name => {
            let left = text_of(a, name);
            let right = text_of(b, name);
            match (left, right) {
                (Some(l), Some(r)) => directed(l.cmp(&r)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }
    }
}

fn text_of(expense: &Expense, name: &str) -> Option<String> {
    match expense.field(name)? {
        serde_json::Value::String(s) => Some(s.to_lowercase()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
