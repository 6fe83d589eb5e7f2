//! Companion extraction.
//!
//! Recognized forms:
//! - "with alice", "with alice, bob and carol"
//! - "me and alice"
//! - "alice and me", "alice, bob and me", "alice, bob, me"
//!
//! Names are single words. Expense vocabulary, time words and pronouns are
//! never names.

use crate::vocabulary::Vocabulary;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Longest plausible companion name, in characters
pub const MAX_NAME_CHARS: usize = 40;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[\p{L}][\p{L}'.-]*|,|&").unwrap();

    static ref STOPWORDS: HashSet<&'static str> = [
        // pronouns and determiners
        "me", "my", "i", "we", "us", "our", "you", "your", "the", "a", "an", "all", "any",
        "some", "myself", "them", "him", "her", "his", "their", "everyone", "someone",
        // connectors
        "and", "or", "with", "on", "at", "in", "for", "from", "to", "of", "by", "via",
        "using", "during", "between", "since", "about", "than", "over", "under", "above",
        "below", "when", "where", "while", "who",
        // time words
        "today", "yesterday", "tomorrow", "last", "this", "next", "past", "previous",
        "current", "week", "weeks", "month", "months", "year", "years", "day", "days",
        "morning", "evening", "night", "weekend",
        // expense words
        "paid", "pay", "spent", "spend", "spending", "bought", "expense", "expenses",
        "transaction", "transactions", "record", "records", "total", "sum", "average",
        "count", "show", "list", "display", "how", "much", "many", "what", "did", "do",
        "was", "were", "is", "are", "went", "go", "had", "have", "rupees", "rs", "inr",
    ]
    .into_iter()
    .collect();
}

#[derive(Debug, Clone, PartialEq)]
enum Tok<'a> {
    Word(&'a str),
    Sep,
}

impl<'a> Tok<'a> {
    fn is_word(&self, w: &str) -> bool {
        matches!(self, Tok::Word(x) if *x == w)
    }
}

/// Extract lowercase, deduplicated companion names in order of appearance
pub fn extract_companions(text: &str, vocab: &Vocabulary) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<Tok> = TOKEN
        .find_iter(&lowered)
        .map(|m| match m.as_str() {
            "," | "&" => Tok::Sep,
            w => Tok::Word(w.trim_end_matches(['.', '\''])),
        })
        .collect();

    let mut found: Vec<String> = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        // "with X ..." and "me and X ..."
        if tok.is_word("with") {
            found.extend(names_forward(&tokens[i + 1..], vocab));
        } else if tok.is_word("me") && tokens.get(i + 1).map(|t| t.is_word("and")).unwrap_or(false)
        {
            found.extend(names_forward(&tokens[i + 2..], vocab));
        }

        // "... X and me" / "... X, me"
        if tok.is_word("me") && i > 0 {
            let joined = tokens[i - 1].is_word("and") || tokens[i - 1] == Tok::Sep;
            if joined {
                found.extend(names_backward(&tokens[..i - 1], vocab));
            }
        }
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn is_name(word: &str, vocab: &Vocabulary) -> bool {
    let len = word.chars().count();
    (1..=MAX_NAME_CHARS).contains(&len)
        && word.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-' || c == '.')
        && !STOPWORDS.contains(word)
        && !vocab.is_keyword(word)
}

/// Names separated by commas / "and" / "&", read left to right
fn names_forward(tokens: &[Tok], vocab: &Vocabulary) -> Vec<String> {
    let mut names = Vec::new();
    let mut expect_name = true;
    for tok in tokens {
        match tok {
            Tok::Word(w) if expect_name => {
                if !is_name(w, vocab) {
                    break;
                }
                names.push(w.to_string());
                expect_name = false;
            }
            Tok::Word(w) if *w == "and" => expect_name = true,
            Tok::Sep => expect_name = true,
            _ => break,
        }
    }
    names
}

/// Names before a trailing "and me", read right to left
fn names_backward(tokens: &[Tok], vocab: &Vocabulary) -> Vec<String> {
    let mut names = Vec::new();
    let mut expect_name = true;
    for tok in tokens.iter().rev() {
        match tok {
            Tok::Word(w) if expect_name => {
                if !is_name(w, vocab) {
                    break;
                }
                names.push(w.to_string());
                expect_name = false;
            }
            Tok::Word(w) if *w == "and" => expect_name = true,
            Tok::Sep => expect_name = true,
            _ => break,
        }
    }
    names.reverse();
    names
}
