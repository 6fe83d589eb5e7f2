//! Canonicalization of categories, payment methods and companion names.
//!
//! Resolution order for categories and payment methods:
//! 1. exact lowercase match in the direct table
//! 2. abbreviation table
//! 3. substring containment in either direction (direct table order)
//! 4. closest direct key with similarity ratio >= 0.6
//! 5. title-cased input
//!
//! Companion names only consult the name and nickname tables before falling
//! back to title case; fuzzy matching person names would merge distinct people.

use crate::vocabulary::{MappingTable, Vocabulary};

/// Minimum similarity for a fuzzy match
pub const FUZZY_CUTOFF: f64 = 0.6;

/// Canonicalizer bound to a vocabulary
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer<'v> {
    vocab: &'v Vocabulary,
}

impl Default for Canonicalizer<'static> {
    fn default() -> Self {
        Self::new(Vocabulary::builtin())
    }
}

impl<'v> Canonicalizer<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self { vocab }
    }

    pub fn category(&self, raw: &str) -> Option<String> {
        resolve(&self.vocab.canonical.category, raw)
    }

    pub fn payment_method(&self, raw: &str) -> Option<String> {
        resolve(&self.vocab.canonical.payment_method, raw)
    }

    pub fn companion(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lowered = trimmed.to_lowercase();
        let table = &self.vocab.canonical.companion;

        if let Some(name) = table.names.iter().find(|n| n.to_lowercase() == lowered) {
            return Some(name.clone());
        }
        if let Some((_, name)) = table.nicknames.iter().find(|(nick, _)| *nick == lowered) {
            return Some(name.clone());
        }
        Some(title_case(trimmed))
    }
}

/// Category via the built-in vocabulary
pub fn canonicalize_category(raw: &str) -> Option<String> {
    Canonicalizer::default().category(raw)
}

/// Payment method via the built-in vocabulary
pub fn canonicalize_payment_method(raw: &str) -> Option<String> {
    Canonicalizer::default().payment_method(raw)
}

/// Companion name via the built-in vocabulary
pub fn canonicalize_companion(raw: &str) -> Option<String> {
    Canonicalizer::default().companion(raw)
}

fn resolve(table: &MappingTable, raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }

    if let Some((_, canonical)) = table.direct.iter().find(|(k, _)| *k == key) {
        return Some(canonical.clone());
    }

    if let Some((_, canonical)) = table.abbreviations.iter().find(|(k, _)| *k == key) {
        return Some(canonical.clone());
    }

    if let Some((_, canonical)) = table
        .direct
        .iter()
        .find(|(k, _)| key.contains(k.as_str()) || k.contains(key.as_str()))
    {
        return Some(canonical.clone());
    }

    let best = table
        .direct
        .iter()
        .map(|(k, canonical)| (similarity_ratio(&key, k), canonical))
        .filter(|(score, _)| *score >= FUZZY_CUTOFF)
        .fold(None::<(f64, &String)>, |best, (score, canonical)| match best {
            Some((top, _)) if top >= score => best,
            _ => Some((score, canonical)),
        });
    if let Some((_, canonical)) = best {
        return Some(canonical.clone());
    }

    Some(title_case(&key))
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

// ============================================================================
// GESTALT PATTERN MATCHING
// ============================================================================

/// Ratcliff/Obershelp similarity: 2 * matched / total characters
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..start_a], &b[..start_b])
        + matching_chars(&a[start_a + len..], &b[start_b + len..])
}

/// Earliest longest common substring: (start in a, start in b, length)
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best.2 {
                    best = (i + 1 - row[j + 1], j + 1 - row[j + 1], row[j + 1]);
                }
            }
        }
        prev = row;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_resolution_order() {
        assert_eq!(canonicalize_category("FOOD"), Some("Food".to_string()));
        assert_eq!(canonicalize_category("groceries"), Some("Food".to_string()));
        assert_eq!(canonicalize_category("uber"), Some("Transportation".to_string()));
        assert_eq!(canonicalize_category("health"), Some("Healthcare".to_string()));
        assert_eq!(canonicalize_category("entertainmnt"), Some("Entertainment".to_string()));
        assert_eq!(canonicalize_category("pets stuff"), Some("Pets Stuff".to_string()));
        assert_eq!(canonicalize_category("   "), None);
    }

    #[test]
    fn test_payment_method_resolution() {
        assert_eq!(canonicalize_payment_method("cash"), Some("Cash".to_string()));
        assert_eq!(canonicalize_payment_method("cc"), Some("Credit Card".to_string()));
        assert_eq!(canonicalize_payment_method("upi"), Some("UPI".to_string()));
        assert_eq!(canonicalize_payment_method("card"), Some("Credit Card".to_string()));
        assert_eq!(canonicalize_payment_method("gpay"), Some("Google Pay".to_string()));
    }

    #[test]
    fn test_companion_resolution() {
        assert_eq!(canonicalize_companion("alice"), Some("Alice".to_string()));
        assert_eq!(canonicalize_companion("dave"), Some("David".to_string()));
        assert_eq!(canonicalize_companion("ravi kumar"), Some("Ravi Kumar".to_string()));
        assert_eq!(canonicalize_companion(""), None);
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert!((similarity_ratio("shoping", "shopping") - 14.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("personal care"), "Personal Care");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }
}
