//! Field references: group-by keys and projected columns.

use crate::vocabulary::Vocabulary;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GROUP_CONNECTOR: Regex = Regex::new(
        r"\b(?:group(?:ed)?\s+(?:[a-z]+\s+){0,4}?by|broken\s+down\s+by|break\s*down\s+by|split\s+by|per|for\s+each|by\s+each)\s+"
    )
    .unwrap();
    static ref COLUMN_CONNECTOR: Regex = Regex::new(
        r"\b(?:show|display|list|give|get)\s+(?:me\s+)?(?:the\s+|only\s+|just\s+|my\s+)?"
    )
    .unwrap();
    static ref LIST_SEPARATOR: Regex = Regex::new(r"^\s*(?:,\s*(?:and\s+)?|and\s+|&\s*)").unwrap();
}

/// Group-by keys named after a grouping phrase, in text order
pub fn extract_group_by(text: &str, vocab: &Vocabulary) -> Vec<String> {
    let mut keys = Vec::new();
    for m in GROUP_CONNECTOR.find_iter(text) {
        for field in field_list(&text[m.end()..], vocab) {
            if !keys.contains(&field) {
                keys.push(field);
            }
        }
    }
    keys
}

/// Columns named directly after a show/display verb
pub fn extract_columns(text: &str, vocab: &Vocabulary) -> Vec<String> {
    COLUMN_CONNECTOR
        .find_iter(text)
        .map(|m| field_list(&text[m.end()..], vocab))
        .find(|fields| !fields.is_empty())
        .unwrap_or_default()
}

/// "category and payment method" → ["category", "paymentMethod"]
fn field_list(mut rest: &str, vocab: &Vocabulary) -> Vec<String> {
    let mut fields = Vec::new();
    loop {
        let Some((field, consumed)) = vocab.field_at(rest) else {
            break;
        };
        if !fields.iter().any(|f: &String| f == field) {
            fields.push(field.to_string());
        }
        rest = &rest[consumed..];
        match LIST_SEPARATOR.find(rest) {
            Some(sep) => rest = &rest[sep.end()..],
            None => break,
        }
    }
    fields
}
