//! Text normalization for the pre-parser.
//!
//! - Lowercase conversion
//! - Whitespace normalization
//! - Expansion of contractions
//! - Length capping on a character boundary

use lazy_static::lazy_static;
use regex::Regex;

/// Default input cap, in characters
pub const MAX_INPUT_CHARS: usize = 2000;

lazy_static! {
    /// Contractions and their expansions, applied in order
    static ref CONTRACTIONS: Vec<(&'static str, &'static str)> = vec![
        ("can't", "cannot"),
        ("won't", "will not"),
        ("don't", "do not"),
        ("doesn't", "does not"),
        ("didn't", "did not"),
        ("isn't", "is not"),
        ("aren't", "are not"),
        ("wasn't", "was not"),
        ("weren't", "were not"),
        ("haven't", "have not"),
        ("i'm", "i am"),
        ("i've", "i have"),
        ("i'd", "i would"),
        ("what's", "what is"),
        ("how's", "how is"),
        ("that's", "that is"),
        ("it's", "it is"),
    ];

    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Curly quotes folded to ASCII so contractions match
    static ref CURLY_QUOTE: Regex = Regex::new(r"[‘’]").unwrap();
}

/// Outcome of capping raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub text: String,
    pub truncated: bool,
}

impl Preflight {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Cap input to `max_chars` characters, never splitting a code point
pub fn preflight(raw: &str, max_chars: usize) -> Preflight {
    match raw.char_indices().nth(max_chars) {
        Some((cut, _)) => Preflight {
            text: raw[..cut].to_string(),
            truncated: true,
        },
        None => Preflight {
            text: raw.to_string(),
            truncated: false,
        },
    }
}

/// Normalize text for keyword matching
pub fn normalize(text: &str) -> String {
    let mut result = CURLY_QUOTE.replace_all(text, "'").to_lowercase();
    result = result.trim().to_string();

    for (contraction, expansion) in CONTRACTIONS.iter() {
        result = result.replace(contraction, expansion);
    }

    result = MULTI_SPACE.replace_all(&result, " ").to_string();

    while result.ends_with(['?', '!', '.']) {
        result.pop();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_normalization() {
        assert_eq!(normalize("  How MUCH   did I spend?  "), "how much did i spend");
        assert_eq!(normalize("Show expenses!!"), "show expenses");
    }

    #[test]
    fn test_contraction_expansion() {
        assert_eq!(normalize("What’s my total"), "what is my total");
        assert_eq!(normalize("I didn't pay"), "i did not pay");
    }

    #[test]
    fn test_preflight_truncates_on_char_boundary() {
        let raw = "₹".repeat(5);
        let capped = preflight(&raw, 3);
        assert!(capped.truncated);
        assert_eq!(capped.text.chars().count(), 3);

        let short = preflight("food", 10);
        assert!(!short.truncated);
        assert_eq!(short.text, "food");
    }

    #[test]
    fn test_blank_detection() {
        assert!(preflight("   \n", 10).is_blank());
        assert!(!preflight("x", 10).is_blank());
    }
}
