//! Rule data model: a phrase, a match mode and the action to take on a hit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RedirectError, Result};
use crate::matching::{matches_all, matches_exact, PhraseMatcher};

/// A rule phrase split into whitespace-separated words.
///
/// An empty or whitespace-only phrase yields a single empty word, so `words`
/// is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    phrase: String,
    words: Vec<String>,
}

impl Term {
    pub fn new(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        let mut words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            words.push(String::new());
        }
        Self { phrase, words }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// How a normalized query is compared against a rule phrase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Query equals the phrase.
    Exact,
    /// Query contains the phrase between word boundaries.
    Phrase,
    /// Query contains every word of the phrase, in any order.
    All,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Phrase => "phrase",
            MatchMode::All => "all",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = RedirectError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(MatchMode::Exact),
            "phrase" => Ok(MatchMode::Phrase),
            "all" => Ok(MatchMode::All),
            other => Err(RedirectError::InvalidArgument(format!(
                "Unknown match mode '{}', expected one of exact, phrase, all",
                other
            ))),
        }
    }
}

/// What happens when a rule matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleAction {
    /// Attach the target URL to the response and stop the pipeline.
    Redirect { target: String },
}

/// An immutable redirect rule. Updates replace the whole rule.
#[derive(Clone, Debug)]
pub struct Rule {
    term: Term,
    match_mode: MatchMode,
    action: RuleAction,
    /// Compiled only for `MatchMode::Phrase`.
    phrase_matcher: Option<PhraseMatcher>,
}

/// The only rule kind in use today.
pub type RedirectRule = Rule;

impl Rule {
    /// Build a redirect rule for `phrase`.
    pub fn redirect(
        phrase: impl Into<String>,
        match_mode: MatchMode,
        target: impl Into<String>,
    ) -> Self {
        Self::new(
            phrase,
            match_mode,
            RuleAction::Redirect {
                target: target.into(),
            },
        )
    }

    /// Build a redirect rule from a textual match mode.
    ///
    /// Fails with `InvalidArgument` if the mode is not one of `exact`,
    /// `phrase` or `all`.
    pub fn redirect_with_mode_str(
        phrase: impl Into<String>,
        match_mode: &str,
        target: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::redirect(phrase, match_mode.parse()?, target))
    }

    /// Never fails: only parsing a textual match mode can reject a rule.
    pub fn new(phrase: impl Into<String>, match_mode: MatchMode, action: RuleAction) -> Self {
        let term = Term::new(phrase);
        let phrase_matcher = match match_mode {
            MatchMode::Phrase => Some(PhraseMatcher::new(term.phrase())),
            MatchMode::Exact | MatchMode::All => None,
        };

        Self {
            term,
            match_mode,
            action,
            phrase_matcher,
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// Redirect target, if this rule redirects.
    pub fn redirect_target(&self) -> Option<&str> {
        match &self.action {
            RuleAction::Redirect { target } => Some(target),
        }
    }

    /// Check whether this rule applies to an already-normalized query.
    pub fn matches(&self, query: &str) -> bool {
        match self.match_mode {
            MatchMode::Exact => matches_exact(self.term.phrase(), query),
            MatchMode::Phrase => self
                .phrase_matcher
                .as_ref()
                .is_some_and(|m| m.is_match(query)),
            MatchMode::All => matches_all(self.term.words(), query),
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.match_mode == other.match_mode && self.action == other.action
    }
}

impl Eq for Rule {}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            RuleAction::Redirect { target } => write!(
                f,
                "RedirectRule [phrase={}, matchMode={}, url={}]",
                self.term.phrase(),
                self.match_mode,
                target
            ),
        }
    }
}
