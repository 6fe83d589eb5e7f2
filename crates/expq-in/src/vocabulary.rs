//! Vocabulary loading for the pre-parser and canonicalizer.
//!
//! Supports the expense-vocabulary.yaml format with:
//! - Priority-ordered category keyword lists
//! - Payment method tokens
//! - Canonical mapping tables (direct, abbreviation, companion names)
//! - Field aliases for group-by and column references

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;

/// Embedded default vocabulary
pub const BUILTIN_VOCABULARY: &str = include_str!("../../../grammars/expense-vocabulary.yaml");

lazy_static! {
    static ref BUILTIN: Vocabulary =
        Vocabulary::from_yaml(BUILTIN_VOCABULARY).expect("embedded vocabulary must compile");
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("VOCAB/read: {0}")]
    Read(String),
    #[error("VOCAB/yaml: {0}")]
    Yaml(String),
    #[error("VOCAB/regex: {0}")]
    Regex(String),
}

// ============================================================================
// FILE FORMAT
// ============================================================================

/// Top-level vocabulary file structure
#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyFile {
    pub version: String,
    pub categories: Vec<CategoryEntry>,
    #[serde(default)]
    pub payment_tokens: Vec<String>,
    pub canonical: CanonicalTables,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub direct: Vec<(String, String)>,
    #[serde(default)]
    pub abbreviations: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionTable {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub nicknames: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalTables {
    pub category: MappingTable,
    pub payment_method: MappingTable,
    #[serde(default)]
    pub companion: CompanionTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub aliases: Vec<String>,
}

// ============================================================================
// COMPILED VOCABULARY
// ============================================================================

#[derive(Debug, Clone)]
struct CompiledCategory {
    name: String,
    keywords: Vec<String>,
    regex: Regex,
}

/// Vocabulary with keyword regexes compiled once
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub version: String,
    pub canonical: CanonicalTables,
    categories: Vec<CompiledCategory>,
    payments: Vec<(String, Regex)>,
    /// (canonical field, alias), longest alias first
    field_aliases: Vec<(String, String)>,
}

impl Vocabulary {
    /// Shared instance compiled from the embedded YAML
    pub fn builtin() -> &'static Vocabulary {
        &BUILTIN
    }

    /// Load and compile a vocabulary from a YAML file
    pub fn load(path: &str) -> Result<Self, VocabularyError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VocabularyError::Read(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Compile a vocabulary from YAML content
    pub fn from_yaml(yaml: &str) -> Result<Self, VocabularyError> {
        let file: VocabularyFile =
            serde_yaml::from_str(yaml).map_err(|e| VocabularyError::Yaml(e.to_string()))?;

        let mut categories = Vec::with_capacity(file.categories.len());
        for entry in file.categories {
            let keywords: Vec<String> = entry.keywords.iter().map(|k| k.to_lowercase()).collect();
            let regex = keyword_regex(&keywords)?;
            categories.push(CompiledCategory {
                name: entry.name.to_lowercase(),
                keywords,
                regex,
            });
        }

        let mut payments = Vec::with_capacity(file.payment_tokens.len());
        for token in file.payment_tokens {
            let token = token.to_lowercase();
            let regex = keyword_regex(std::slice::from_ref(&token))?;
            payments.push((token, regex));
        }

        let mut field_aliases: Vec<(String, String)> = file
            .fields
            .iter()
            .flat_map(|f| {
                f.aliases
                    .iter()
                    .map(move |a| (f.name.clone(), a.to_lowercase()))
            })
            .collect();
        field_aliases.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        Ok(Vocabulary {
            version: file.version,
            canonical: file.canonical,
            categories,
            payments,
            field_aliases,
        })
    }

    /// Category names whose keywords occur in `text`, in priority order
    pub fn match_categories(&self, text: &str) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| c.regex.is_match(text))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Payment tokens occurring in `text`, in vocabulary order
    pub fn match_payment_methods(&self, text: &str) -> Vec<String> {
        self.payments
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// True for single words that belong to a category or payment vocabulary
    pub fn is_keyword(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        let singular = word.strip_suffix('s').unwrap_or(&word);
        self.categories.iter().any(|c| {
            c.name == word || c.keywords.iter().any(|k| k == &word || k == singular)
        }) || self
            .payments
            .iter()
            .any(|(t, _)| t.split_whitespace().any(|w| w == word))
    }

    /// Longest field alias at the start of `text`: (canonical field, bytes consumed)
    pub fn field_at<'a>(&'a self, text: &str) -> Option<(&'a str, usize)> {
        self.field_aliases.iter().find_map(|(field, alias)| {
            let rest = text.strip_prefix(alias.as_str())?;
            let boundary = rest
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
            boundary.then_some((field.as_str(), alias.len()))
        })
    }

    /// Canonical field name for a single alias
    pub fn resolve_field(&self, name: &str) -> Option<&str> {
        let lowered = name.trim().to_lowercase().replace('_', " ");
        let compact = lowered.replace(' ', "");
        self.field_aliases
            .iter()
            .find(|(field, alias)| *alias == lowered || field.to_lowercase() == compact)
            .map(|(field, _)| field.as_str())
    }

    /// Canonical field names known to this vocabulary
    pub fn fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (field, _) in &self.field_aliases {
            if !out.contains(&field.as_str()) {
                out.push(field);
            }
        }
        out
    }
}

/// `\b(?:kw1|kw2)(?:s|es)?\b`, case-insensitive
fn keyword_regex(keywords: &[String]) -> Result<Regex, VocabularyError> {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{})(?:s|es)?\b", alternation))
        .case_insensitive(true)
        .build()
        .map_err(|e| VocabularyError::Regex(e.to_string()))
}
