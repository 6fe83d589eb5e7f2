//! Answer/data consistency checks.
//!
//! A generated answer may only state numbers the result supports. Checks run
//! in order and the first failure wins:
//! 1. aggregate present: every number in the answer is within 0.01 of an
//!    aggregate value
//! 2. rows present: the answer does not claim there are no records
//! 3. nothing present: the answer mentions no numbers at all
//! 4. the question names one calendar date: the answer neither states a
//!    range nor names any other date
//!
//! Calendar dates and relative periods ("last 30 days") are not treated as
//! claims. Every other number is, including one the user typed.

use expq_core::{Decimal, QueryResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref NUMBER: Regex =
        Regex::new(r"[₹$]?\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").unwrap();

    static ref DATE_LIKE: Regex = Regex::new(
        r"(?ix)
        \b\d{4}-\d{1,2}-\d{1,2}\b
        | \b\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}\b
        | \b\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?(?:,?\s+\d{4})?\b
        | \b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b
        | \b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{4}\b
        | \b(?:last|past|previous|next)\s+\d+\s+(?:days?|weeks?|months?|years?)\b
        "
    )
    .unwrap();

    static ref ISO_DATE: Regex = Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap();

    static ref DAY_MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
    )
    .unwrap();

    static ref MONTH_DAY_YEAR: Regex = Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"
    )
    .unwrap();

    static ref STATES_RANGE: Regex = Regex::new(
        r"(?i)\bbetween\b.+\band\b|\bfrom\b.+\b(?:to|until|through)\b"
    )
    .unwrap();

    static ref DENIES_RECORDS: Regex = Regex::new(
        r"(?i)\bno\s+(?:matching\s+)?(?:records|transactions|expenses|results|entries)\b|\bnothing\s+(?:was\s+)?(?:found|matched)\b|\b(?:couldn't|could not|didn't|did not|can't|cannot)\s+find\s+any\b|\bnone\s+found\b"
    )
    .unwrap();
}

/// Absolute tolerance between a stated number and an aggregate value
pub fn tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("VALIDATE/amount_mismatch: answer states {mentioned}, result has [{}]", .expected.join(", "))]
    AmountMismatch {
        mentioned: String,
        expected: Vec<String>,
    },

    #[error("VALIDATE/denies_records: answer claims no records but {rows} rows matched")]
    DeniesRecords { rows: usize },

    #[error("VALIDATE/fabricated_numbers: empty result but answer states [{}]", .numbers.join(", "))]
    FabricatedNumbers { numbers: Vec<String> },

    #[error("VALIDATE/date_scope_mismatch: question names {requested}, answer states [{}] (range: {range})", .stated.join(", "))]
    DateScopeMismatch {
        requested: String,
        stated: Vec<String>,
        range: bool,
    },
}

/// Check a generated answer against the authoritative result
pub fn validate_query_response(
    result: &QueryResult,
    answer: &str,
    original_query: &str,
) -> Result<(), ValidationFailure> {
    let claims = extract_numbers(answer);

    if let Some(aggregate) = result.aggregate_result.as_ref().filter(|a| !a.is_empty()) {
        let truth = aggregate.values();
        for (text, value) in &claims {
            let supported = truth.iter().any(|t| (*t - *value).abs() <= tolerance());
            if !supported {
                return Err(ValidationFailure::AmountMismatch {
                    mentioned: text.clone(),
                    expected: truth.iter().map(|t| t.normalize().to_string()).collect(),
                });
            }
        }
    }

    if !result.rows.is_empty() && DENIES_RECORDS.is_match(answer) {
        return Err(ValidationFailure::DeniesRecords {
            rows: result.rows.len(),
        });
    }

    if result.is_empty() && !claims.is_empty() {
        return Err(ValidationFailure::FabricatedNumbers {
            numbers: claims.into_iter().map(|(text, _)| text).collect(),
        });
    }

    check_date_scope(answer, original_query)
}

/// A question about one calendar day must be answered about that day only
fn check_date_scope(answer: &str, original_query: &str) -> Result<(), ValidationFailure> {
    let requested = extract_calendar_dates(original_query);
    let [(requested_text, requested_day)] = requested.as_slice() else {
        return Ok(());
    };

    let mut stated: Vec<(String, (u32, u32, u32))> = Vec::new();
    for (text, day) in extract_calendar_dates(answer) {
        if !stated.iter().any(|(_, seen)| *seen == day) {
            stated.push((text, day));
        }
    }
    let range = STATES_RANGE.is_match(answer);
    let other_day = stated.iter().any(|(_, day)| day != requested_day);

    if range || other_day {
        return Err(ValidationFailure::DateScopeMismatch {
            requested: requested_text.clone(),
            stated: stated.into_iter().map(|(text, _)| text).collect(),
            range,
        });
    }
    Ok(())
}

/// Fully specified calendar dates as (year, month, day), in order of appearance
fn extract_calendar_dates(text: &str) -> Vec<(String, (u32, u32, u32))> {
    let mut found: Vec<(usize, String, (u32, u32, u32))> = Vec::new();

    for caps in ISO_DATE.captures_iter(text) {
        let (Some(all), Some(y), Some(m), Some(d)) = (caps.get(0), caps.get(1), caps.get(2), caps.get(3)) else {
            continue;
        };
        if let (Ok(y), Ok(m), Ok(d)) = (y.as_str().parse::<u32>(), m.as_str().parse::<u32>(), d.as_str().parse::<u32>()) {
            found.push((all.start(), all.as_str().to_string(), (y, m, d)));
        }
    }
    for (pattern, day_group, month_group) in [(&*DAY_MONTH_YEAR, 1, 2), (&*MONTH_DAY_YEAR, 2, 1)] {
        for caps in pattern.captures_iter(text) {
            let (Some(all), Some(d), Some(m), Some(y)) =
                (caps.get(0), caps.get(day_group), caps.get(month_group), caps.get(3))
            else {
                continue;
            };
            let (Ok(y), Some(m), Ok(d)) = (y.as_str().parse::<u32>(), month_number(m.as_str()), d.as_str().parse::<u32>()) else {
                continue;
            };
            found.push((all.start(), all.as_str().to_string(), (y, m, d)));
        }
    }

    found.sort_by_key(|(start, _, _)| *start);
    found.into_iter().map(|(_, text, day)| (text, day)).collect()
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// Numbers stated in free text, with date-like spans blanked out first
pub fn extract_numbers(text: &str) -> Vec<(String, Decimal)> {
    let cleaned = DATE_LIKE.replace_all(text, " ");
    NUMBER
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str();
            let value = Decimal::from_str(&raw.replace(',', "")).ok()?;
            Some((raw.to_string(), value))
        })
        .collect()
}
