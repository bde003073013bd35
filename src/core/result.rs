//! Gate and dispatch results.

use crate::core::schema::Verdict;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What produced a gate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Explicit hard block.
    Blocked,
    /// A policy matched.
    Policy,
    /// Countdown warning.
    Countdown,
    /// A trigger's informational message.
    Trigger,
}

/// Outcome of one gate for one event. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub verdict: Verdict,

    /// Message for the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Message for the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_injection: Option<String>,

    /// Tracing values; always includes `source` (the gate name).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl GateResult {
    /// Bare result from `gate`.
    #[must_use]
    pub fn new(verdict: Verdict, gate: &str, kind: ResultKind) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), Value::from(gate));
        metadata.insert(
            "kind".to_string(),
            serde_json::to_value(kind).unwrap_or(Value::Null),
        );
        Self {
            verdict,
            system_message: None,
            context_injection: None,
            metadata,
        }
    }

    #[must_use]
    pub fn with_system_message(mut self, message: String) -> Self {
        self.system_message = Some(message);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: String) -> Self {
        self.context_injection = Some(context);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Gate that produced this result.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// Aggregate of every gate's result for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub verdict: Verdict,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_injection: Option<String>,

    /// Per-gate results in registration order.
    #[serde(default)]
    pub results: Vec<GateResult>,
}

impl DispatchResult {
    /// Plain ALLOW with no messages.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            system_message: None,
            context_injection: None,
            results: Vec::new(),
        }
    }

    /// Combine gate results.
    ///
    /// Any DENY makes the whole event DENY; otherwise any WARN makes it WARN.
    /// Messages are joined with a blank line in the order given.
    #[must_use]
    pub fn aggregate(results: Vec<GateResult>) -> Self {
        let verdict = if results.iter().any(|r| r.verdict == Verdict::Deny) {
            Verdict::Deny
        } else if results.iter().any(|r| r.verdict == Verdict::Warn) {
            Verdict::Warn
        } else {
            Verdict::Allow
        };
        let system_message = join(results.iter().filter_map(|r| r.system_message.as_deref()));
        let context_injection =
            join(results.iter().filter_map(|r| r.context_injection.as_deref()));
        Self {
            verdict,
            system_message,
            context_injection,
            results,
        }
    }

    /// Process exit code for a hook binary: 2 on DENY, 0 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.verdict == Verdict::Deny { 2 } else { 0 }
    }

    /// Gates that denied.
    pub fn denied_by(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.verdict == Verdict::Deny)
            .filter_map(GateResult::source)
    }
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> Option<String> {
    let parts: Vec<&str> = parts.filter(|p| !p.trim().is_empty()).collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}
