//! Event dispatch across every registered gate.
//!
//! One call per lifecycle event: load or create the session, apply the
//! session-level bookkeeping, evaluate each gate in registration order,
//! persist once and aggregate.

use crate::config::Config;
use crate::core::circuit_breaker;
use crate::core::definitions::{self, HYDRATION};
use crate::core::evaluator::Evaluator;
use crate::core::event::{HookContext, HookEvent};
use crate::core::predicates::{self, PredicateRegistry};
use crate::core::result::DispatchResult;
use crate::core::schema::{GateSet, Verdict};
use crate::core::state::{GateState, GateStatus, SessionState};
use crate::core::tools::ToolCategory;
use crate::error::{Error, Result};
use crate::storage::SessionStore;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Gates plus the predicates they reference.
#[derive(Debug)]
pub struct Dispatcher {
    gates: GateSet,
    predicates: PredicateRegistry,
}

impl Dispatcher {
    #[must_use]
    pub fn new(gates: GateSet, predicates: PredicateRegistry) -> Self {
        Self { gates, predicates }
    }

    /// Dispatcher with the built-in gates and predicates.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a gate definition is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            definitions::builtin_gates(&config.gates)?,
            PredicateRegistry::with_builtins(&config.predicates.settings()),
        ))
    }

    #[must_use]
    pub fn gates(&self) -> &GateSet {
        &self.gates
    }

    /// Evaluate every gate for one event and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be persisted or a gate message
    /// template is invalid.
    pub fn dispatch(&self, ctx: &HookContext, store: &dyn SessionStore) -> Result<DispatchResult> {
        let mut state = store.get_or_create(&ctx.session_id)?;
        apply_session_effects(ctx, &mut state);

        let evaluator = Evaluator::new(&self.predicates, store);
        let mut results = Vec::new();
        for gate in &self.gates {
            if let Some(result) = evaluator.evaluate(gate, ctx, &mut state)? {
                results.push(result);
            }
        }

        if let Some(hydration) = self.gates.get(HYDRATION) {
            if state.gate_status(hydration) == GateStatus::Open {
                state.hydration.pending = false;
            }
        }

        let result = DispatchResult::aggregate(results);
        if ctx.hook_event == HookEvent::Stop {
            let insights = self.insights(&state, &result);
            state.finalize(insights);
        }

        store.save(&state)?;

        if result.verdict == Verdict::Deny {
            info!(
                session_id = %ctx.session_id,
                event = %ctx.hook_event,
                gates = ?result.denied_by().collect::<Vec<_>>(),
                "Event denied"
            );
        }
        Ok(result)
    }

    /// Set an explicit hard block on a gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the gate is unknown, the session does not exist,
    /// or state cannot be saved.
    pub fn block(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        gate: &str,
        reason: &str,
    ) -> Result<()> {
        self.update_gate(store, session_id, gate, |g| g.block(reason))
    }

    /// Clear an explicit hard block.
    ///
    /// # Errors
    ///
    /// Returns an error if the gate is unknown, the session does not exist,
    /// or state cannot be saved.
    pub fn unblock(&self, store: &dyn SessionStore, session_id: &str, gate: &str) -> Result<()> {
        self.update_gate(store, session_id, gate, |g| g.unblock())
    }

    fn update_gate(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        gate: &str,
        update: impl FnOnce(&mut GateState),
    ) -> Result<()> {
        let config = self
            .gates
            .get(gate)
            .ok_or_else(|| Error::UnknownGate(gate.to_string()))?;
        let mut state = store
            .load(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        update(store.get_gate(&mut state, config));
        store.save(&state)
    }

    fn insights(&self, state: &SessionState, result: &DispatchResult) -> Value {
        let gates: serde_json::Map<String, Value> = self
            .gates
            .iter()
            .map(|config| {
                let status = state.gate_status(config);
                let gate = state.gates.get(&config.name);
                let summary = json!({
                    "status": status,
                    "ops_since_open": gate.map_or(0, |g| g.ops_since_open),
                    "blocked": gate.is_some_and(|g| g.blocked),
                    "stop_denials": gate.map_or(0, |g| g.counter(circuit_breaker::STOP_DENIALS)),
                });
                (config.name.clone(), summary)
            })
            .collect();

        let mut verdicts = serde_json::Map::new();
        for verdict in [Verdict::Allow, Verdict::Deny, Verdict::Warn] {
            let count = result.results.iter().filter(|r| r.verdict == verdict).count();
            verdicts.insert(verdict.as_str().to_string(), Value::from(count));
        }

        let subagents: serde_json::Map<String, Value> = state
            .subagents
            .iter()
            .map(|(name, record)| (name.clone(), Value::from(record.invocations)))
            .collect();

        json!({
            "gates": gates,
            "verdicts": verdicts,
            "final_verdict": result.verdict,
            "mutating_calls": state.main_agent.mutating_calls,
            "current_task": state.main_agent.current_task,
            "subagents": subagents,
        })
    }
}

/// Prompt prefix with which the user waives gating for that prompt.
const BYPASS_PREFIX: &str = ".";

/// Session-level bookkeeping that gates read but do not own.
fn apply_session_effects(ctx: &HookContext, state: &mut SessionState) {
    match ctx.hook_event {
        HookEvent::PromptSubmitted if predicates::is_hydratable(ctx) => {
            state.hydration.pending = true;
            state.hydration.original_prompt = ctx.prompt().map(str::to_string);
            state.hydration.hydrated_intent = None;
            state.set_gates_bypassed(false);
        }
        HookEvent::PromptSubmitted => {
            state.hydration.pending = false;
            if ctx.prompt().is_some_and(|p| p.trim_start().starts_with(BYPASS_PREFIX)) {
                debug!(session_id = %ctx.session_id, "Gates bypassed by prompt");
                state.set_gates_bypassed(true);
            }
        }
        HookEvent::AfterTool => apply_tool_effects(ctx, state),
        HookEvent::AfterResponse => {
            if let Some(workflow) = ctx.response_text().and_then(predicates::hydration_workflow) {
                state.hydration.hydrated_intent = Some(workflow.to_string());
            }
        }
        _ => {}
    }
}

fn apply_tool_effects(ctx: &HookContext, state: &mut SessionState) {
    let Some(tool) = ctx.tool_name.as_deref() else {
        return;
    };
    let category = ToolCategory::of(tool);

    if category == ToolCategory::AlwaysAvailable {
        if let Some(agent) = ctx.invoked_agent() {
            state.record_subagent(agent);
        }
    }
    if category == ToolCategory::Write && !ctx.is_subagent {
        state.main_agent.mutating_calls += 1;
    }
    if tool == "EnterPlanMode" {
        state.main_agent.plan_mode_invoked = true;
    }

    match task_operation(tool) {
        op if binds_task(op, &ctx.tool_input) => {
            let id = task_id(&ctx.tool_output).or_else(|| task_id(&ctx.tool_input));
            if let Some(id) = id {
                bind_task(ctx, state, id);
            }
        }
        "complete_task" if succeeded(&ctx.tool_output) => {
            let completed = task_id(&ctx.tool_input).or_else(|| task_id(&ctx.tool_output));
            let bound = state.main_agent.current_task.as_deref();
            if bound.is_some() && (completed.is_none() || completed.as_deref() == bound) {
                unbind_task(ctx, state);
            }
        }
        "complete_tasks" if completed_count(&ctx.tool_output) > 0 => unbind_task(ctx, state),
        _ => {}
    }
}

/// Operation name of a task tool, without any MCP server prefix.
fn task_operation(tool: &str) -> &str {
    tool.rsplit("__").next().unwrap_or(tool)
}

fn binds_task(op: &str, input: &Value) -> bool {
    match op {
        "create_task" => true,
        "update_task" => input.get("status").and_then(Value::as_str) == Some("active"),
        op => op.contains("claim"),
    }
}

/// Bind `id` unless another task already holds the session.
fn bind_task(ctx: &HookContext, state: &mut SessionState, id: String) {
    match state.main_agent.current_task.as_deref() {
        Some(bound) if bound != id => {
            debug!(session_id = %ctx.session_id, bound, ignored = %id, "Task already bound");
        }
        _ => {
            debug!(session_id = %ctx.session_id, task = %id, "Task bound");
            state.main_agent.current_task = Some(id);
        }
    }
}

fn unbind_task(ctx: &HookContext, state: &mut SessionState) {
    if let Some(task) = state.main_agent.current_task.take() {
        debug!(session_id = %ctx.session_id, task = %task, "Task unbound");
    }
}

/// `success_count` reported by a batch completion.
fn completed_count(output: &Value) -> u64 {
    output_json(output)
        .get("success_count")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Tool output as JSON, unwrapping JSON-in-string and MCP text content.
fn output_json(value: &Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        Value::Object(map) => map
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .find_map(|text| serde_json::from_str::<Value>(text).ok())
            })
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Task ID from `id`, `task_id` or `task.id`.
fn task_id(value: &Value) -> Option<String> {
    let value = output_json(value);
    let text = |v: &Value| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    value
        .get("id")
        .and_then(text)
        .or_else(|| value.get("task_id").and_then(text))
        .or_else(|| value.pointer("/task/id").and_then(text))
}

fn succeeded(output: &Value) -> bool {
    let output = output_json(output);
    output.get("error").is_none_or(Value::is_null)
        && output.get("success").and_then(Value::as_bool) != Some(false)
}
