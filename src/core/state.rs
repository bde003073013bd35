//! Session state types.

use crate::core::schema::GateConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Session flag set by a bypass prompt.
const GATES_BYPASSED: &str = "gates_bypassed";

/// Session state stored on disk.
///
/// One document per session. Every gate invocation loads it, mutates it and
/// saves it back as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session identifier (from the host).
    pub session_id: String,

    /// UTC date the session was created (YYYY-MM-DD). Part of the storage path.
    pub date: String,

    /// When the session was created.
    pub started_at: DateTime<Utc>,

    /// When the session ended.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Free-form execution flags.
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,

    /// Hydration state.
    #[serde(default)]
    pub hydration: HydrationState,

    /// Main agent state.
    #[serde(default)]
    pub main_agent: MainAgentState,

    /// Last invocation record per subagent type.
    #[serde(default)]
    pub subagents: BTreeMap<String, SubagentRecord>,

    /// Per-gate state, keyed by gate name.
    #[serde(default)]
    pub gates: BTreeMap<String, GateState>,

    /// Summary written when the session ends.
    #[serde(default)]
    pub insights: Option<Value>,

    /// Document schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl SessionState {
    /// Create a new session state.
    ///
    /// Hydration starts pending: the prompt event is not guaranteed to fire
    /// on a session's first turn, so creation is where the safe default is set.
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            started_at: now,
            ended_at: None,
            flags: BTreeMap::new(),
            hydration: HydrationState {
                pending: true,
                ..HydrationState::default()
            },
            main_agent: MainAgentState::default(),
            subagents: BTreeMap::new(),
            gates: BTreeMap::new(),
            insights: None,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Get a gate's state, materializing it at the configured initial status.
    pub fn gate(&mut self, config: &GateConfig) -> &mut GateState {
        self.gates
            .entry(config.name.clone())
            .or_insert_with(|| GateState::new(config.initial_status))
    }

    /// Status of a gate, treating an absent entry as the initial status.
    #[must_use]
    pub fn gate_status(&self, config: &GateConfig) -> GateStatus {
        self.gates
            .get(&config.name)
            .map_or(config.initial_status, |g| g.status)
    }

    /// Remove a gate's state for exclusive mutation.
    ///
    /// Pair with [`SessionState::put_gate`]; lets a gate state be borrowed
    /// mutably while the rest of the session is borrowed shared.
    pub(crate) fn take_gate(&mut self, config: &GateConfig) -> GateState {
        self.gates
            .remove(&config.name)
            .unwrap_or_else(|| GateState::new(config.initial_status))
    }

    /// Put back a gate state taken with [`SessionState::take_gate`].
    pub(crate) fn put_gate(&mut self, name: &str, gate: GateState) {
        self.gates.insert(name.to_string(), gate);
    }

    /// Whether the user waived gating for the current prompt.
    #[must_use]
    pub fn gates_bypassed(&self) -> bool {
        self.flags
            .get(GATES_BYPASSED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_gates_bypassed(&mut self, bypassed: bool) {
        self.flags
            .insert(GATES_BYPASSED.to_string(), Value::Bool(bypassed));
    }

    /// Record one subagent invocation.
    pub fn record_subagent(&mut self, agent: &str) {
        let record = self.subagents.entry(agent.to_string()).or_default();
        record.invocations += 1;
        record.last_invoked = Some(Utc::now());
    }

    /// Finalize the session.
    pub fn finalize(&mut self, insights: Value) {
        self.ended_at = Some(Utc::now());
        self.insights = Some(insights);
    }
}

/// Hydration state within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HydrationState {
    /// Whether the agent still needs to be primed with context.
    pub pending: bool,

    /// The prompt that triggered hydration.
    #[serde(default)]
    pub original_prompt: Option<String>,

    /// Intent produced by the hydrator.
    #[serde(default)]
    pub hydrated_intent: Option<String>,
}

/// Main agent state within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MainAgentState {
    /// Task currently bound to the session.
    #[serde(default)]
    pub current_task: Option<String>,

    /// Acceptance criteria for the current work.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,

    /// Checked flag per acceptance criterion (parallel to `acceptance_criteria`).
    #[serde(default)]
    pub criteria_checked: Vec<bool>,

    /// Whether plan mode was entered.
    #[serde(default)]
    pub plan_mode_invoked: bool,

    /// Number of mutating tool calls completed.
    #[serde(default)]
    pub mutating_calls: u32,
}

impl MainAgentState {
    /// Replace the acceptance criteria, all unchecked.
    pub fn set_criteria(&mut self, criteria: Vec<String>) {
        self.criteria_checked = vec![false; criteria.len()];
        self.acceptance_criteria = criteria;
    }

    /// Mark one criterion checked. Returns `false` if out of range.
    pub fn check_criterion(&mut self, index: usize) -> bool {
        match self.criteria_checked.get_mut(index) {
            Some(flag) => {
                *flag = true;
                true
            }
            None => false,
        }
    }

    /// Criteria not yet checked.
    #[must_use]
    pub fn unchecked_criteria(&self) -> Vec<&str> {
        self.acceptance_criteria
            .iter()
            .zip(self.criteria_checked.iter().chain(std::iter::repeat(&false)))
            .filter(|(_, checked)| !**checked)
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

/// Last invocation record for one subagent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubagentRecord {
    /// When it was last invoked.
    #[serde(default)]
    pub last_invoked: Option<DateTime<Utc>>,

    /// How many times it was invoked this session.
    #[serde(default)]
    pub invocations: u32,
}

/// Gate door status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStatus {
    /// Gate satisfied.
    Open,
    /// Gate not satisfied.
    Closed,
}

/// Per session x gate mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    /// Door status.
    pub status: GateStatus,

    /// Operations since the gate last opened.
    #[serde(default)]
    pub ops_since_open: u32,

    /// Explicit hard block, independent of status.
    #[serde(default)]
    pub blocked: bool,

    /// Why the gate is hard-blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,

    /// Decision-relevant values specific to this gate.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Presentation-only values used to fill message placeholders.
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

impl GateState {
    /// Fresh gate state at the given status.
    #[must_use]
    pub fn new(status: GateStatus) -> Self {
        Self {
            status,
            ops_since_open: 0,
            blocked: false,
            block_reason: None,
            metadata: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Apply a trigger transition. The op counter always restarts, so
    /// re-opening an already open gate resets it.
    pub fn transition(&mut self, target: GateStatus) {
        self.status = target;
        self.ops_since_open = 0;
    }

    /// Set the explicit hard block.
    pub fn block(&mut self, reason: &str) {
        self.blocked = true;
        self.block_reason = Some(reason.to_string());
    }

    /// Clear the explicit hard block.
    pub fn unblock(&mut self) {
        self.blocked = false;
        self.block_reason = None;
    }

    /// Integer metadata counter, zero when absent.
    #[must_use]
    pub fn counter(&self, key: &str) -> u64 {
        self.metadata.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    /// Increment an integer metadata counter, returning the new value.
    pub fn bump_counter(&mut self, key: &str) -> u64 {
        let next = self.counter(key) + 1;
        self.metadata.insert(key.to_string(), Value::from(next));
        next
    }

    /// Metadata flag, false when absent.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gates_bypassed_flag() {
        let mut state = SessionState::new("s");
        assert!(!state.gates_bypassed());
        state.set_gates_bypassed(true);
        assert!(state.gates_bypassed());
        assert_eq!(state.flags["gates_bypassed"], json!(true));
        state.set_gates_bypassed(false);
        assert!(!state.gates_bypassed());
    }

    #[test]
    fn session_state_new() {
        let state = SessionState::new("test-123");
        assert_eq!(state.session_id, "test-123");
        assert!(state.hydration.pending);
        assert!(state.gates.is_empty());
        assert!(state.ended_at.is_none());
        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.date.len(), 10);
    }

    #[test]
    fn gate_status_serialization() {
        assert_eq!(serde_json::to_string(&GateStatus::Open).unwrap(), r#""OPEN""#);
        assert_eq!(
            serde_json::from_str::<GateStatus>(r#""CLOSED""#).unwrap(),
            GateStatus::Closed
        );
    }

    #[test]
    fn transition_to_open_resets_counter() {
        let mut gate = GateState::new(GateStatus::Open);
        gate.ops_since_open = 42;
        gate.transition(GateStatus::Open);
        assert_eq!(gate.ops_since_open, 0);
    }

    #[test]
    fn transition_to_closed() {
        let mut gate = GateState::new(GateStatus::Open);
        gate.ops_since_open = 7;
        gate.transition(GateStatus::Closed);
        assert_eq!(gate.status, GateStatus::Closed);
        assert_eq!(gate.ops_since_open, 0);
    }

    #[test]
    fn block_and_unblock() {
        let mut gate = GateState::new(GateStatus::Open);
        gate.block("manual hold");
        assert!(gate.blocked);
        assert_eq!(gate.block_reason.as_deref(), Some("manual hold"));
        gate.unblock();
        assert!(!gate.blocked);
        assert!(gate.block_reason.is_none());
    }

    #[test]
    fn counters_default_to_zero() {
        let mut gate = GateState::new(GateStatus::Closed);
        assert_eq!(gate.counter("stop_denials"), 0);
        assert_eq!(gate.bump_counter("stop_denials"), 1);
        assert_eq!(gate.bump_counter("stop_denials"), 2);
        assert!(!gate.flag("tripped"));
    }

    #[test]
    fn metrics_string_values_survive_serialization() {
        let mut state = SessionState::new("s");
        let mut gate = GateState::new(GateStatus::Closed);
        gate.metrics
            .insert("temp_path".to_string(), json!("/tmp/x/custodiet.md"));
        gate.metrics.insert("count_like".to_string(), json!("0012"));
        state.gates.insert("custodiet".to_string(), gate);

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
        assert_eq!(parsed.gates["custodiet"].metrics["count_like"], json!("0012"));
    }

    #[test]
    fn old_documents_gain_defaults() {
        let json = r#"{
            "session_id": "legacy",
            "date": "2026-01-01",
            "started_at": "2026-01-01T00:00:00Z"
        }"#;
        let state: SessionState = serde_json::from_str(json).unwrap();
        assert!(state.gates.is_empty());
        assert!(!state.hydration.pending);
        assert_eq!(state.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn criteria_tracking() {
        let mut agent = MainAgentState::default();
        agent.set_criteria(vec!["tests pass".into(), "docs updated".into()]);
        assert!(agent.check_criterion(0));
        assert!(!agent.check_criterion(5));
        assert_eq!(agent.unchecked_criteria(), vec!["docs updated"]);
    }

    #[test]
    fn record_subagent_counts() {
        let mut state = SessionState::new("s");
        state.record_subagent("critic");
        state.record_subagent("critic");
        assert_eq!(state.subagents["critic"].invocations, 2);
        assert!(state.subagents["critic"].last_invoked.is_some());
    }

    #[test]
    fn finalize_sets_end() {
        let mut state = SessionState::new("s");
        state.finalize(json!({"gates": {}}));
        assert!(state.ended_at.is_some());
        assert!(state.insights.is_some());
    }
}
