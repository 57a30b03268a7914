//! Per-session key/value state carried across executions.
//!
//! State flows in two directions: [`SessionState::render`] serializes the
//! mapping into assignment statements prefixed onto the next snippet, and
//! [`SessionState::merge`] scans a snippet's output for marker lines the
//! snippet emitted to report updates back.

use std::collections::BTreeMap;

use codepod_core::{Error, Result};
use serde_json::Value;

/// Reserved line prefix for state updates, versioned so the wire protocol
/// can evolve without ambiguity. A snippet persists variables by printing:
///
/// ```text
/// __CODEPOD_STATE_V1__ {"counter": 2, "name": "ada"}
/// ```
pub const STATE_MARKER: &str = "__CODEPOD_STATE_V1__";

/// Python keywords that cannot be assignment targets.
const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Flat key/value session state.
///
/// Keys must be Python identifiers and values JSON scalars, so that
/// `render()` always produces valid re-injectable statements. The map is
/// ordered, which makes repeated renders of unchanged state byte-identical.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    state: BTreeMap<String, Value>,
}

/// Whether `key` can appear on the left side of a Python assignment.
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    let leading_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    leading_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !PYTHON_KEYWORDS.contains(&key)
}

/// Whether `value` is a flat scalar (no nested session state).
fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Render a JSON scalar as a Python literal.
fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        // JSON number and string syntax is valid Python syntax
        other => other.to_string(),
    }
}

impl SessionState {
    /// Create an empty state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the state as assignment statements for prefixing onto the
    /// next snippet. Ordering is lexicographic by key, so repeated renders
    /// of unchanged state are byte-identical.
    pub fn render(&self) -> String {
        self.state
            .iter()
            .map(|(k, v)| format!("{} = {}", k, python_literal(v)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Scan execution output for marker lines and merge their payloads.
    ///
    /// Later lines overwrite earlier ones for the same key. Lines that match
    /// the sentinel but fail to parse are skipped — the snippet's author may
    /// emit arbitrary output that only coincidentally resembles the marker —
    /// as are non-scalar values and keys that are not Python identifiers.
    pub fn merge(&mut self, raw_output: &str) {
        for line in raw_output.lines() {
            let Some(payload) = line.strip_prefix(STATE_MARKER) else {
                continue;
            };
            let record: serde_json::Map<String, Value> = match serde_json::from_str(payload.trim())
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring malformed state-update line");
                    continue;
                }
            };
            for (key, value) in record {
                if !is_identifier(&key) {
                    tracing::debug!(key = %key, "Ignoring state key that is not a Python identifier");
                    continue;
                }
                if !is_scalar(&value) {
                    tracing::debug!(key = %key, "Ignoring non-scalar state value");
                    continue;
                }
                self.state.insert(key, value);
            }
        }
    }

    /// Look up a single key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Set a key out-of-band, without an execution having occurred.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if !is_identifier(&key) {
            return Err(Error::invalid_request(format!(
                "state key '{}' is not a valid identifier",
                key
            )));
        }
        if !is_scalar(&value) {
            return Err(Error::invalid_request(
                "state values must be flat scalars (null, bool, number, string)",
            ));
        }
        self.state.insert(key, value);
        Ok(())
    }

    /// Remove a single key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    /// Copy of the full mapping, for out-of-band inspection.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.state.clone()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether the state is empty.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}
