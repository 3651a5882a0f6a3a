//! String matching primitives behind the three match modes.
//!
//! Queries are normalized once by the caller (`normalize_query`) and then
//! compared against each rule's phrase. Nothing here allocates per
//! comparison except the normalization itself.

use log::debug;
use regex::{Regex, RegexBuilder};

/// Trim, collapse internal whitespace runs to a single space and lower-case.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Literal phrase search bounded by non-word characters.
///
/// The phrase is escaped before compilation, so characters such as `+`, `.`
/// or `(` match themselves. A match must not be preceded or followed by a
/// word character; the start and end of the query count as boundaries.
///
/// Phrases too large for the regex engine fall back to a boundary-checked
/// substring scan with the same semantics, so construction never fails.
#[derive(Clone, Debug)]
pub struct PhraseMatcher {
    inner: PhraseSearch,
}

#[derive(Clone, Debug)]
enum PhraseSearch {
    Compiled(Regex),
    Literal(String),
}

impl PhraseMatcher {
    pub fn new(phrase: &str) -> Self {
        let source = format!(r"(?:^|\W){}(?:\W|$)", regex::escape(phrase));
        match RegexBuilder::new(&source).build() {
            Ok(pattern) => Self {
                inner: PhraseSearch::Compiled(pattern),
            },
            Err(e) => {
                debug!(
                    "Phrase of {} bytes not compiled ({}), using literal scan",
                    phrase.len(),
                    e
                );
                Self::literal(phrase)
            }
        }
    }

    /// Matcher that always uses the substring scan.
    pub fn literal(phrase: &str) -> Self {
        Self {
            inner: PhraseSearch::Literal(phrase.to_string()),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.inner, PhraseSearch::Literal(_))
    }

    #[inline]
    pub fn is_match(&self, query: &str) -> bool {
        match &self.inner {
            PhraseSearch::Compiled(pattern) => pattern.is_match(query),
            PhraseSearch::Literal(phrase) => contains_bounded(query, phrase),
        }
    }
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn contains_bounded(query: &str, phrase: &str) -> bool {
    query.match_indices(phrase).any(|(start, found)| {
        let before = query[..start].chars().next_back();
        let after = query[start + found.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// `exact`: the whole query equals the phrase.
#[inline]
pub fn matches_exact(phrase: &str, query: &str) -> bool {
    query == phrase
}

/// `all`: every word appears somewhere in the query as a substring.
///
/// Containment is substring-based, not whole-word: "red" is found inside
/// "bored".
#[inline]
pub fn matches_all<S: AsRef<str>>(words: &[S], query: &str) -> bool {
    words.iter().all(|word| query.contains(word.as_ref()))
}
