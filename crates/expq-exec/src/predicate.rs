//! Filter → store predicate
//!
//! Strings compare case-insensitively, amounts and dates are inclusive on
//! both ends, and the end date reaches the last instant of its day.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use expq_core::{Decimal, QueryFilters, SortOrder};
use std::str::FromStr;

use crate::error::ExecError;
use crate::record::Expense;

/// Array-field membership test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionMatch {
    /// Contains this (lowercase) name
    Has(String),
    /// Contains at least one of these (lowercase) names
    HasSome(Vec<String>),
}

/// Inclusive bounds, each side optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    pub gte: Option<T>,
    pub lte: Option<T>,
}

impl<T: PartialOrd> Bounds<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.gte.as_ref().map_or(true, |lo| value >= lo)
            && self.lte.as_ref().map_or(true, |hi| value <= hi)
    }
}

/// Store-side WHERE clause. Always scoped to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseWhere {
    pub user_id: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub payment_method: Option<String>,
    pub companions: Option<CompanionMatch>,
    pub amount: Option<Bounds<Decimal>>,
    pub date: Option<Bounds<DateTime<Utc>>>,
}

impl ExpenseWhere {
    /// Match everything the user owns
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category: None,
            subcategory: None,
            payment_method: None,
            companions: None,
            amount: None,
            date: None,
        }
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        if expense.user_id != self.user_id {
            return false;
        }
        if !text_matches(&self.category, Some(&expense.category)) {
            return false;
        }
        if !text_matches(&self.subcategory, expense.subcategory.as_ref()) {
            return false;
        }
        if !text_matches(&self.payment_method, Some(&expense.payment_method)) {
            return false;
        }
        if let Some(companions) = &self.companions {
            let has = |name: &str| expense.companions.iter().any(|c| c.to_lowercase() == name);
            let ok = match companions {
                CompanionMatch::Has(name) => has(name),
                CompanionMatch::HasSome(names) => names.iter().any(|n| has(n)),
            };
            if !ok {
                return false;
            }
        }
        if let Some(bounds) = &self.amount {
            if !bounds.contains(&expense.amount) {
                return false;
            }
        }
        if let Some(bounds) = &self.date {
            if !bounds.contains(&expense.date) {
                return false;
            }
        }
        true
    }
}

fn text_matches(wanted: &Option<String>, actual: Option<&String>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(w), Some(a)) => w.to_lowercase() == a.to_lowercase(),
    }
}

/// Ordering request passed to `find_many`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Build the WHERE clause for a user's filters
pub fn build_where(filters: &QueryFilters, user_id: &str) -> Result<ExpenseWhere, ExecError> {
    let mut clause = ExpenseWhere::for_user(user_id);

    clause.category = non_empty(&filters.category);
    clause.subcategory = non_empty(&filters.subcategory);
    clause.payment_method = non_empty(&filters.payment_method);

    if let Some(names) = &filters.companions {
        let mut lowered: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        clause.companions = match lowered.len() {
            0 => None,
            1 => lowered.pop().map(CompanionMatch::Has),
            _ => Some(CompanionMatch::HasSome(lowered)),
        };
    }

    let gte = filters.min_amount.map(amount_to_decimal).transpose()?;
    let lte = filters.max_amount.map(amount_to_decimal).transpose()?;
    if gte.is_some() || lte.is_some() {
        clause.amount = Some(Bounds { gte, lte });
    }

    if let Some(range) = filters.date_range.filter(|r| !r.is_unbounded()) {
        clause.date = Some(Bounds {
            gte: range.start.map(start_of_day),
            lte: range.end.map(end_of_day).transpose()?,
        });
    }

    Ok(clause)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Via the shortest decimal text of the float, so 100.1 stays 100.1
fn amount_to_decimal(value: f64) -> Result<Decimal, ExecError> {
    if !value.is_finite() {
        return Err(ExecError::InvalidFilter(format!("amount bound {}", value)));
    }
    let text = value.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| ExecError::InvalidFilter(format!("amount bound {}: {}", value, e)))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> Result<DateTime<Utc>, ExecError> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ExecError::InvalidFilter(format!("end of day for {}", date)))
}
