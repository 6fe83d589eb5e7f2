//! Date range extraction.
//!
//! Resolution order:
//! 1. Relative phrases ("today", "last week", "past 7 days", "last 3 months")
//! 2. Explicit calendar dates (two or more form a range)
//! 3. Month-year ("april 2025") and bare months ("in march")
//!
//! "This X" ranges never extend past today. "Last N <unit>" is a rolling
//! window ending today. Unresolvable text yields no range.

use chrono::{Datelike, Duration, Months, NaiveDate};
use expq_core::DateRange;
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

lazy_static! {
    static ref TODAY: Regex = Regex::new(r"\b(?:today|current day)\b").unwrap();
    static ref YESTERDAY: Regex = Regex::new(r"\byesterday\b").unwrap();
    static ref THIS_WEEK: Regex = Regex::new(r"\b(?:this|current)\s+week\b").unwrap();
    static ref LAST_WEEK: Regex = Regex::new(r"\b(?:last|previous|past)\s+week\b").unwrap();
    static ref THIS_MONTH: Regex = Regex::new(r"\b(?:this|current)\s+month\b").unwrap();
    static ref LAST_MONTH: Regex = Regex::new(r"\b(?:last|previous|past)\s+month\b").unwrap();
    static ref THIS_YEAR: Regex = Regex::new(r"\b(?:this|current)\s+year\b").unwrap();
    static ref LAST_YEAR: Regex = Regex::new(r"\b(?:last|previous|past)\s+year\b").unwrap();
    static ref LAST_N_PERIOD: Regex =
        Regex::new(r"\b(?:last|past|previous)\s+(\d{1,3})\s+(days?|weeks?|months?|years?)\b").unwrap();

    static ref ISO: Regex = Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap();
    static ref NUMERIC_DMY: Regex =
        Regex::new(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b").unwrap();
    static ref DAY_MONTH_YEAR: Regex = Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{}\.?,?\s+(\d{{4}})\b",
        MONTH
    ))
    .unwrap();
    static ref MONTH_DAY_YEAR: Regex = Regex::new(&format!(
        r"\b{}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b",
        MONTH
    ))
    .unwrap();
    static ref DAY_MONTH: Regex = Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{}\b",
        MONTH
    ))
    .unwrap();
    static ref MONTH_DAY: Regex =
        Regex::new(&format!(r"\b{}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b", MONTH)).unwrap();
    static ref MONTH_YEAR: Regex =
        Regex::new(&format!(r"\b{}\.?,?\s+(\d{{4}})\b", MONTH)).unwrap();
    static ref IN_MONTH: Regex =
        Regex::new(&format!(r"\b(?:in|during|for)\s+{}\b", MONTH)).unwrap();
}

/// Resolved range plus every byte span that looked like a date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateScan {
    pub range: Option<DateRange>,
    pub spans: Vec<Range<usize>>,
}

impl DateScan {
    /// True when `span` overlaps any date-like span
    pub fn covers(&self, span: &Range<usize>) -> bool {
        self.spans
            .iter()
            .any(|s| s.start < span.end && span.start < s.end)
    }
}

/// Scan lowercased text for date expressions relative to `today`
pub fn scan_dates(text: &str, today: NaiveDate) -> DateScan {
    let explicit = explicit_dates(text, today);
    let mut spans: Vec<Range<usize>> = explicit.iter().map(|(span, _)| span.clone()).collect();
    for re in [&*LAST_N_PERIOD, &*MONTH_YEAR, &*IN_MONTH] {
        spans.extend(re.find_iter(text).map(|m| m.range()));
    }

    let range = relative_range(text, today)
        .or_else(|| {
            let mut days: Vec<NaiveDate> = explicit.iter().map(|(_, d)| *d).collect();
            days.sort();
            match (days.first(), days.last()) {
                (Some(first), Some(last)) => Some(DateRange::between(*first, *last)),
                _ => None,
            }
        })
        .or_else(|| month_year_range(text, today))
        .or_else(|| bare_month_range(text, today));

    DateScan { range, spans }
}

/// Convenience wrapper returning only the range
pub fn extract_date_range(text: &str, today: NaiveDate) -> Option<DateRange> {
    scan_dates(text, today).range
}

// ============================================================================
// RELATIVE PHRASES
// ============================================================================

fn relative_range(text: &str, today: NaiveDate) -> Option<DateRange> {
    if let Some(caps) = LAST_N_PERIOD.captures(text) {
        let n: u32 = caps[1].parse().ok()?;
        if n == 0 {
            return None;
        }
        let start = match &caps[2][..1] {
            "d" => today - Duration::days(i64::from(n) - 1),
            "w" => today - Duration::days(7 * i64::from(n) - 1),
            "m" => today.checked_sub_months(Months::new(n))? + Duration::days(1),
            _ => today.checked_sub_months(Months::new(12 * n))? + Duration::days(1),
        };
        return Some(DateRange::between(start, today));
    }
    if LAST_WEEK.is_match(text) {
        let end = today - Duration::days(today.weekday().num_days_from_monday() as i64 + 1);
        return Some(DateRange::between(end - Duration::days(6), end));
    }
    if THIS_WEEK.is_match(text) {
        let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let end = (start + Duration::days(6)).min(today);
        return Some(DateRange::between(start, end));
    }
    if LAST_MONTH.is_match(text) {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        return whole_month(year, month);
    }
    if THIS_MONTH.is_match(text) {
        let start = today.with_day(1)?;
        return Some(DateRange::between(start, today));
    }
    if LAST_YEAR.is_match(text) {
        let year = today.year() - 1;
        return Some(DateRange::between(
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        ));
    }
    if THIS_YEAR.is_match(text) {
        return Some(DateRange::between(
            NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            today,
        ));
    }
    if YESTERDAY.is_match(text) {
        return Some(DateRange::day(today - Duration::days(1)));
    }
    if TODAY.is_match(text) {
        return Some(DateRange::day(today));
    }
    None
}

// ============================================================================
// EXPLICIT DATES
// ============================================================================

/// Non-overlapping explicit dates, in text order
fn explicit_dates(text: &str, today: NaiveDate) -> Vec<(Range<usize>, NaiveDate)> {
    let mut found: Vec<(Range<usize>, NaiveDate)> = Vec::new();

    for caps in ISO.captures_iter(text) {
        if let Some(d) = ymd(&caps[1], &caps[2], &caps[3]) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }
    for caps in NUMERIC_DMY.captures_iter(text) {
        if let Some(d) = ymd(&caps[3], &caps[2], &caps[1]) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }
    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        if let Some(d) = named(&caps[3], &caps[2], &caps[1]) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }
    for caps in MONTH_DAY_YEAR.captures_iter(text) {
        if let Some(d) = named(&caps[3], &caps[1], &caps[2]) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }
    for caps in DAY_MONTH.captures_iter(text) {
        if let Some(d) = without_year(&caps[2], &caps[1], today) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }
    for caps in MONTH_DAY.captures_iter(text) {
        if let Some(d) = without_year(&caps[1], &caps[2], today) {
            found.push((caps.get(0).map(|m| m.range()).unwrap_or_default(), d));
        }
    }

    // Earliest start wins; on ties the longer (more specific) match wins
    found.sort_by(|a, b| {
        a.0.start
            .cmp(&b.0.start)
            .then_with(|| b.0.end.cmp(&a.0.end))
    });
    let mut kept: Vec<(Range<usize>, NaiveDate)> = Vec::new();
    for (span, date) in found {
        let overlaps = kept
            .last()
            .map(|(prev, _)| span.start < prev.end)
            .unwrap_or(false);
        if !overlaps {
            kept.push((span, date));
        }
    }
    kept
}

fn month_year_range(text: &str, today: NaiveDate) -> Option<DateRange> {
    let caps = MONTH_YEAR.captures(text)?;
    let month = month_number(&caps[1])?;
    let year: i32 = caps[2].parse().ok()?;
    let range = whole_month(year, month)?;
    Some(clamp_to_today(range, today))
}

fn bare_month_range(text: &str, today: NaiveDate) -> Option<DateRange> {
    let caps = IN_MONTH.captures(text)?;
    let month = month_number(&caps[1])?;
    let year = if month > today.month() {
        today.year() - 1
    } else {
        today.year()
    };
    let range = whole_month(year, month)?;
    Some(clamp_to_today(range, today))
}

// ============================================================================
// CALENDAR HELPERS
// ============================================================================

pub fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Last calendar day of a month
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).map(|d| d - Duration::days(1))
}

fn whole_month(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = last_day_of_month(year, month)?;
    Some(DateRange::between(start, end))
}

fn clamp_to_today(range: DateRange, today: NaiveDate) -> DateRange {
    match (range.start, range.end) {
        (Some(start), Some(end)) if start <= today && end > today => {
            DateRange::between(start, today)
        }
        _ => range,
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn named(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month_number(month)?, day.parse().ok()?)
}

/// Day and month with the year inferred so the date is not in the future
fn without_year(month: &str, day: &str, today: NaiveDate) -> Option<NaiveDate> {
    let month = month_number(month)?;
    let day: u32 = day.parse().ok()?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(d) if d <= today => Some(d),
        _ => NaiveDate::from_ymd_opt(today.year() - 1, month, day),
    }
}
