//! Amount and result-count extraction.
//!
//! A bare integer next to a result-count word ("top 3", "5 transactions") is a
//! limit, never an amount. Numbers inside date expressions are never amounts.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    /// Optional currency prefix, grouped or plain number, optional currency suffix
    static ref AMOUNT: Regex = Regex::new(
        r"(?:(₹|rs\.?|inr|\$|usd)\s*)?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s*(rupees?|rs\b|inr\b|₹|dollars?|bucks))?"
    )
    .unwrap();

    static ref ORDINAL_SUFFIX: Regex = Regex::new(r"^(?:st|nd|rd|th)\b").unwrap();

    static ref LIMIT_BEFORE: Regex = Regex::new(
        r"\b(?:top|highest|largest|biggest|heaviest|first|last|latest|recent|most\s+recent)\s+(\d{1,4})\b"
    )
    .unwrap();

    static ref LIMIT_AFTER: Regex = Regex::new(
        r"\b(\d{1,4})\s+(?:(?:most\s+expensive|largest|biggest|highest|heaviest|recent|latest|last)\s+)?(?:transactions?|expenses?|records?|purchases?|entries|entry|items?|payments?)\b"
    )
    .unwrap();

    static ref RANGE_WORDS: Regex = Regex::new(r"\b(?:between|to|from)\b|\d\s*-\s*\d").unwrap();

    static ref PERIOD_AFTER: Regex = Regex::new(r"^\s*(?:days?|weeks?|months?|years?)\b").unwrap();

    static ref LOWER_BOUND: Regex = Regex::new(
        r"\b(?:over|above|more\s+than|greater\s+than|at\s+least|exceeding|min(?:imum)?\s+of)\s*$"
    )
    .unwrap();

    static ref UPPER_BOUND: Regex = Regex::new(
        r"\b(?:under|below|less\s+than|lower\s+than|at\s+most|cheaper\s+than|up\s+to|max(?:imum)?\s+of|within)\s*$"
    )
    .unwrap();
}

/// A numeric token found in text
#[derive(Debug, Clone, PartialEq)]
pub struct AmountToken {
    pub value: f64,
    pub span: Range<usize>,
}

/// Result-count request ("top 3")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cardinality {
    pub limit: usize,
    pub span: Range<usize>,
}

/// Amount filter derived from the tokens
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmountBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// First result-count phrase in text order, ignoring excluded spans
pub fn extract_cardinality(text: &str, excluded: &[Range<usize>]) -> Option<Cardinality> {
    let mut candidates: Vec<Cardinality> = Vec::new();
    for re in [&*LIMIT_BEFORE, &*LIMIT_AFTER] {
        for caps in re.captures_iter(text) {
            let Some(number) = caps.get(1) else { continue };
            let span = number.range();
            if overlaps_any(&span, excluded) || PERIOD_AFTER.is_match(&text[span.end..]) {
                continue;
            }
            if let Ok(limit) = number.as_str().parse::<usize>() {
                if limit > 0 {
                    candidates.push(Cardinality { limit, span });
                }
            }
        }
    }
    candidates.into_iter().min_by_key(|c| c.span.start)
}

/// All amounts, skipping spans claimed by dates or result counts
pub fn extract_amounts(text: &str, excluded: &[Range<usize>]) -> Vec<AmountToken> {
    let mut out = Vec::new();
    for caps in AMOUNT.captures_iter(text) {
        let Some(number) = caps.get(2) else { continue };
        let span = number.range();
        let has_currency = caps.get(1).is_some() || caps.get(3).is_some();

        if overlaps_any(&span, excluded) {
            continue;
        }

        // Glued to a word ("mp3", "q4") unless a currency prefix is present
        let glued_before = text[..span.start]
            .chars()
            .next_back()
            .map(|c| c.is_alphabetic())
            .unwrap_or(false);
        if glued_before && caps.get(1).is_none() {
            continue;
        }

        // Ordinals ("8th") are day numbers, not money
        if !has_currency && ORDINAL_SUFFIX.is_match(&text[span.end..]) {
            continue;
        }

        let cleaned = number.as_str().replace(',', "");
        if let Ok(value) = cleaned.parse::<f64>() {
            out.push(AmountToken { value, span });
        }
    }
    out
}

fn overlaps_any(span: &Range<usize>, excluded: &[Range<usize>]) -> bool {
    excluded
        .iter()
        .any(|e| e.start < span.end && span.start < e.end)
}

/// Turn tokens into min/max bounds
///
/// - comparative words bound one side ("over 500", "under 100")
/// - range language with two or more amounts spans min..max
/// - a single amount is an exact point filter
pub fn amount_bounds(text: &str, amounts: &[AmountToken]) -> AmountBounds {
    if amounts.is_empty() {
        return AmountBounds::default();
    }

    let mut bounds = AmountBounds::default();
    for token in amounts {
        let before = &text[..token.span.start];
        let before = before.trim_end_matches(|c: char| c == '₹' || c == '$' || c.is_whitespace());
        let before = before
            .strip_suffix("rs.")
            .or_else(|| before.strip_suffix("rs"))
            .or_else(|| before.strip_suffix("inr"))
            .unwrap_or(before);
        if LOWER_BOUND.is_match(before) && bounds.min.is_none() {
            bounds.min = Some(token.value);
        } else if UPPER_BOUND.is_match(before) && bounds.max.is_none() {
            bounds.max = Some(token.value);
        }
    }
    if bounds.min.is_some() || bounds.max.is_some() {
        return bounds;
    }

    if amounts.len() >= 2 && RANGE_WORDS.is_match(text) {
        let min = amounts.iter().map(|a| a.value).fold(f64::INFINITY, f64::min);
        let max = amounts
            .iter()
            .map(|a| a.value)
            .fold(f64::NEG_INFINITY, f64::max);
        return AmountBounds {
            min: Some(min),
            max: Some(max),
        };
    }

    if amounts.len() == 1 {
        return AmountBounds {
            min: Some(amounts[0].value),
            max: Some(amounts[0].value),
        };
    }

    AmountBounds::default()
}
