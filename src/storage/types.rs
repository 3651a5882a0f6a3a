//! Stored view of the rule set and its JSON codec.
//!
//! # Format
//! ```json
//! {
//!   "staples chair": { "url": "/chairs", "matchMode": "exact" },
//!   "red chair":     { "url": "/red",    "matchMode": "all" }
//! }
//! ```
//! Outer keys are rule phrases. The same shape is persisted and returned by
//! the administrative list operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{RedirectError, Result};
use crate::rule::{MatchMode, Rule, RuleAction};

/// Persisted record for one rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRule {
    pub url: String,
    pub match_mode: MatchMode,
}

impl From<&Rule> for StoredRule {
    fn from(rule: &Rule) -> Self {
        match rule.action() {
            RuleAction::Redirect { target } => StoredRule {
                url: target.clone(),
                match_mode: rule.match_mode(),
            },
        }
    }
}

/// Rule key -> stored record, in key order.
pub type StoredView = BTreeMap<String, StoredRule>;

/// An entry dropped while decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub key: String,
    pub reason: String,
}

/// Result of decoding a payload: the usable entries plus what was skipped.
#[derive(Clone, Debug, Default)]
pub struct DecodedView {
    pub rules: StoredView,
    pub skipped: Vec<SkippedEntry>,
}

/// Decode a stored payload.
///
/// A blank payload decodes to an empty view. Invalid JSON or a root that is
/// not an object fails with `MalformedData`. Individual entries that are not
/// objects, miss `url`/`matchMode`, carry an unknown match mode or have an
/// empty key are skipped and reported in `DecodedView::skipped`.
pub fn decode_stored_view(data: &[u8]) -> Result<DecodedView> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecodedView::default());
    }

    let root: Value = serde_json::from_slice(data)
        .map_err(|e| RedirectError::MalformedData(format!("Payload is not valid JSON: {}", e)))?;

    let entries = match root {
        Value::Object(map) => map,
        other => {
            return Err(RedirectError::MalformedData(format!(
                "Expected a JSON object of rules, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut decoded = DecodedView::default();
    for (key, value) in entries {
        if key.trim().is_empty() {
            decoded.skipped.push(SkippedEntry {
                key,
                reason: "empty rule phrase".to_string(),
            });
            continue;
        }

        match serde_json::from_value::<StoredRule>(value) {
            Ok(stored) => {
                decoded.rules.insert(key, stored);
            }
            Err(e) => decoded.skipped.push(SkippedEntry {
                key,
                reason: e.to_string(),
            }),
        }
    }

    Ok(decoded)
}

/// Encode a stored view as pretty-printed JSON.
pub fn encode_stored_view(view: &StoredView) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(view)?)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
