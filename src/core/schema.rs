//! Declarative gate configuration.
//!
//! A gate is pure data: conditions, triggers that move its status, policies
//! that produce verdicts, and an optional countdown warning. One evaluator
//! interprets every gate.

use crate::core::event::HookEvent;
use crate::core::state::GateStatus;
use crate::core::tools::ToolCategory;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Compiled regular expression used in conditions.
///
/// Matching is unanchored, so a plain string is a substring match.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` if the regex does not compile.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Whether the pattern matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    /// Source text of the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Pattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.0.as_str().to_string()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Conjunction of optional checks. Absent fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateCondition {
    /// Event must be exactly this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_event: Option<HookEvent>,

    /// Tool name must match. Fails on events without a tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name_pattern: Option<Pattern>,

    /// Invoked agent or skill must match. Fails when nothing was invoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_pattern: Option<Pattern>,

    /// Tool category must not be one of these.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_categories: Vec<ToolCategory>,

    /// Gate must currently be in this status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<GateStatus>,

    /// Gate's op counter must be at least this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ops_since_open: Option<u32>,

    /// Registered predicate that must hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_condition: Option<String>,
}

impl GateCondition {
    /// Condition on one event.
    #[must_use]
    pub fn on(event: HookEvent) -> Self {
        Self {
            hook_event: Some(event),
            ..Self::default()
        }
    }

    /// Condition that matches every event.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tool(mut self, pattern: Pattern) -> Self {
        self.tool_name_pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn subagent(mut self, pattern: Pattern) -> Self {
        self.subagent_pattern = Some(pattern);
        self
    }

    #[must_use]
    pub fn excluding(mut self, categories: &[ToolCategory]) -> Self {
        self.excluded_categories = categories.to_vec();
        self
    }

    #[must_use]
    pub fn when(mut self, status: GateStatus) -> Self {
        self.current_status = Some(status);
        self
    }

    #[must_use]
    pub fn min_ops(mut self, ops: u32) -> Self {
        self.min_ops_since_open = Some(ops);
        self
    }

    #[must_use]
    pub fn custom(mut self, predicate: &str) -> Self {
        self.custom_condition = Some(predicate.to_string());
        self
    }

    /// Every compiled pattern in this condition.
    pub(crate) fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.tool_name_pattern
            .iter()
            .chain(self.subagent_pattern.iter())
    }
}

/// Status change applied when a trigger matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTransition {
    /// Status to move to.
    pub target_status: GateStatus,

    /// Informational message emitted when nothing else speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
}

/// Condition plus transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTrigger {
    pub condition: GateCondition,
    pub transition: GateTransition,
}

impl GateTrigger {
    /// Trigger moving the gate to `target` when `condition` holds.
    #[must_use]
    pub fn new(condition: GateCondition, target: GateStatus) -> Self {
        Self {
            condition,
            transition: GateTransition {
                target_status: target,
                message_template: None,
            },
        }
    }

    /// Attach an informational message.
    #[must_use]
    pub fn with_message(mut self, template: &str) -> Self {
        self.transition.message_template = Some(template.to_string());
        self
    }
}

/// Outcome of a gate for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Proceed.
    #[default]
    Allow,
    /// Refuse the action.
    Deny,
    /// Proceed with a warning.
    Warn,
}

impl Verdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Warn => "warn",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition plus verdict plus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub condition: GateCondition,
    pub verdict: Verdict,
    pub message_template: String,
}

impl GatePolicy {
    #[must_use]
    pub fn new(condition: GateCondition, verdict: Verdict, template: &str) -> Self {
        Self {
            condition,
            verdict,
            message_template: template.to_string(),
        }
    }
}

fn default_start_before() -> u32 {
    5
}

fn default_metric() -> String {
    "ops_since_open".to_string()
}

/// Advance warning before a threshold-based policy starts denying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownConfig {
    /// How many ops before the threshold to start warning.
    #[serde(default = "default_start_before")]
    pub start_before: u32,

    /// Value at which the blocking policy takes over.
    pub threshold: u32,

    /// `ops_since_open`, or the name of an integer gate metadata entry.
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Supports `{remaining}`, `{threshold}` and `{temp_path}`.
    pub message_template: String,
}

impl CountdownConfig {
    /// Countdown on `ops_since_open` with the default window.
    #[must_use]
    pub fn new(threshold: u32, template: &str) -> Self {
        Self {
            start_before: default_start_before(),
            threshold,
            metric: default_metric(),
            message_template: template.to_string(),
        }
    }

    /// Ops remaining if `value` falls in the warning window.
    #[must_use]
    pub fn remaining(&self, value: u64) -> Option<u64> {
        let threshold = u64::from(self.threshold);
        let start = threshold.saturating_sub(u64::from(self.start_before));
        (start <= value && value < threshold).then(|| threshold - value)
    }
}

/// How strictly a gate enforces its DENY policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// DENY policies deny.
    #[default]
    Block,
    /// DENY policies are downgraded to WARN.
    Warn,
}

impl FromStr for EnforcementMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            other => Err(Error::Config(format!("invalid enforcement mode: {other}"))),
        }
    }
}

/// Full static description of one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Unique gate name.
    pub name: String,

    pub description: String,

    /// Status of a gate with no persisted state.
    pub initial_status: GateStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<CountdownConfig>,

    /// Evaluated in order; every matching trigger applies.
    #[serde(default)]
    pub triggers: Vec<GateTrigger>,

    /// Evaluated in order; the first match wins.
    #[serde(default)]
    pub policies: Vec<GatePolicy>,

    /// Skip policies and countdown for subagent events.
    #[serde(default)]
    pub main_agent_only: bool,

    #[serde(default)]
    pub mode: EnforcementMode,

    /// Stop denials allowed before the gate stops denying `Stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stop_denials: Option<u32>,
}

impl GateConfig {
    /// Empty gate at the given initial status.
    #[must_use]
    pub fn new(name: &str, description: &str, initial_status: GateStatus) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            initial_status,
            countdown: None,
            triggers: Vec::new(),
            policies: Vec::new(),
            main_agent_only: false,
            mode: EnforcementMode::Block,
            max_stop_denials: None,
        }
    }

    #[must_use]
    pub fn trigger(mut self, trigger: GateTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: GatePolicy) -> Self {
        self.policies.push(policy);
        self
    }

    #[must_use]
    pub fn countdown(mut self, countdown: CountdownConfig) -> Self {
        self.countdown = Some(countdown);
        self
    }

    #[must_use]
    pub fn main_agent_only(mut self) -> Self {
        self.main_agent_only = true;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn max_stop_denials(mut self, max: Option<u32>) -> Self {
        self.max_stop_denials = max;
        self
    }

    fn conditions(&self) -> impl Iterator<Item = &GateCondition> {
        self.triggers
            .iter()
            .map(|t| &t.condition)
            .chain(self.policies.iter().map(|p| &p.condition))
    }
}

/// Ordered, validated set of gates.
#[derive(Debug, Clone, Default)]
pub struct GateSet {
    gates: Vec<GateConfig>,
}

impl GateSet {
    /// Validate and wrap gates in registration order.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateGate` if two gates share a name, and
    /// `Error::Config` if a gate has an empty name or a condition has an
    /// empty pattern.
    pub fn new(gates: Vec<GateConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for gate in &gates {
            if gate.name.trim().is_empty() {
                return Err(Error::Config("gate name must not be empty".into()));
            }
            if !seen.insert(gate.name.as_str()) {
                return Err(Error::DuplicateGate(gate.name.clone()));
            }
            if gate
                .conditions()
                .flat_map(GateCondition::patterns)
                .any(|p| p.as_str().is_empty())
            {
                return Err(Error::Config(format!(
                    "gate {} has an empty pattern",
                    gate.name
                )));
            }
        }
        Ok(Self { gates })
    }

    /// Gate by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GateConfig> {
        self.gates.iter().find(|g| g.name == name)
    }

    /// Gates in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, GateConfig> {
        self.gates.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl<'a> IntoIterator for &'a GateSet {
    type Item = &'a GateConfig;
    type IntoIter = std::slice::Iter<'a, GateConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
