// Lexicon matcher - flags text containing any term from a preloaded list.
//
// Matching is deliberately permissive: case-insensitive substring
// containment with no word-boundary logic, so a term inside a compound
// word still matches. The term set is built once at startup and never
// mutated, which makes concurrent lookups safe without locking.

use std::fs;
use std::path::Path;

use super::escalation::ModerationError;

/// Immutable set of disallowed terms.
#[derive(Debug)]
pub struct Lexicon {
    /// Lowercased, trimmed, deduplicated.
    terms: Vec<String>,
}

impl Lexicon {
    /// Build from raw entries: trims, lowercases, drops blanks and
    /// duplicates.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    /// Load one term per line. An unreadable word list is a configuration
    /// error and aborts startup.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModerationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ModerationError::Configuration(format!(
                "cannot read lexicon {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(raw.lines()))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// First disallowed term contained anywhere in `text`, if any.
    pub fn find_term(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }

    pub fn contains_term(&self, text: &str) -> bool {
        self.find_term(text).is_some()
    }

    /// Usernames follow the same containment rule as message bodies.
    pub fn matches_username(&self, name: &str) -> bool {
        self.contains_term(name)
    }
}
