//! Gate evaluation.
//!
//! Applies one gate configuration to one event:
//!
//! 1. Triggers, in order. Each matching trigger applies its transition
//!    immediately, so later triggers and all policies see the new status.
//!    On `AfterTool`, an open gate whose triggers did not fire counts one op.
//! 2. Explicit hard block: DENY with the block reason.
//! 3. Main-agent-only gates stop here for subagent events.
//! 4. Policies, in order. The first match wins.
//! 5. Countdown warning, if configured and inside its window.
//! 6. Otherwise the message of any fired trigger, or nothing.
//!
//! A message that references `{temp_path}` gets the gate's scratch file,
//! freshly written with the session context, unless a predicate already
//! recorded a `temp_path` metric.

use crate::core::audit;
use crate::core::circuit_breaker;
use crate::core::event::{HookContext, HookEvent};
use crate::core::predicates::PredicateRegistry;
use crate::core::result::{GateResult, ResultKind};
use crate::core::schema::{CountdownConfig, EnforcementMode, GateConfig, GatePolicy, Verdict};
use crate::core::state::{GateState, GateStatus, SessionState};
use crate::error::Result;
use crate::storage::SessionStore;
use crate::template::{self, TemplateVars};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Metric name that reads the gate's own op counter.
pub const OPS_METRIC: &str = "ops_since_open";

/// Placeholder for the gate's scratch file.
pub const TEMP_PATH: &str = "temp_path";

/// Evaluates gates against events.
pub struct Evaluator<'a> {
    predicates: &'a PredicateRegistry,
    store: &'a dyn SessionStore,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(predicates: &'a PredicateRegistry, store: &'a dyn SessionStore) -> Self {
        Self { predicates, store }
    }

    /// Evaluate one gate, mutating its state within `session`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Template` if a message references an unknown placeholder.
    /// Predicate failures never surface here.
    pub fn evaluate(
        &self,
        config: &GateConfig,
        ctx: &HookContext,
        session: &mut SessionState,
    ) -> Result<Option<GateResult>> {
        let mut gate = session.take_gate(config);
        let result = self.evaluate_gate(config, ctx, &mut gate, session);
        session.put_gate(&config.name, gate);
        result
    }

    fn evaluate_gate(
        &self,
        config: &GateConfig,
        ctx: &HookContext,
        gate: &mut GateState,
        session: &SessionState,
    ) -> Result<Option<GateResult>> {
        let trigger_messages = self.apply_triggers(config, ctx, gate, session)?;
        let trigger_result = (!trigger_messages.is_empty()).then(|| {
            GateResult::new(Verdict::Allow, &config.name, ResultKind::Trigger)
                .with_system_message(trigger_messages.join("\n\n"))
        });

        if gate.blocked {
            let reason = gate
                .block_reason
                .clone()
                .unwrap_or_else(|| format!("Gate '{}' is blocked.", config.name));
            info!(gate = %config.name, event = %ctx.hook_event, "Denied by explicit block");
            return Ok(Some(
                GateResult::new(Verdict::Deny, &config.name, ResultKind::Blocked)
                    .with_system_message(reason.clone())
                    .with_context(reason),
            ));
        }

        if config.main_agent_only && ctx.is_subagent {
            return Ok(trigger_result);
        }

        for (index, policy) in config.policies.iter().enumerate() {
            if self.predicates.evaluate(&policy.condition, ctx, gate, session) {
                let tpl = &policy.message_template;
                let message = template::render(tpl, &self.vars(tpl, config, ctx, gate, session))?;
                let result = apply_policy(config, policy, ctx, gate, message);
                return Ok(Some(result.with_metadata("policy", Value::from(index))));
            }
        }

        if let Some(countdown) = &config.countdown {
            if let Some(result) = self.countdown(config, countdown, ctx, gate, session)? {
                return Ok(Some(result));
            }
        }

        Ok(trigger_result)
    }

    /// Run triggers; returns the rendered messages of those that fired.
    fn apply_triggers(
        &self,
        config: &GateConfig,
        ctx: &HookContext,
        gate: &mut GateState,
        session: &SessionState,
    ) -> Result<Vec<String>> {
        let mut fired = false;
        let mut messages = Vec::new();

        for trigger in &config.triggers {
            if !self.predicates.evaluate(&trigger.condition, ctx, gate, session) {
                continue;
            }
            fired = true;
            let from = gate.status;
            let to = trigger.transition.target_status;
            gate.transition(to);
            if to == GateStatus::Open {
                circuit_breaker::reset(gate);
            }
            debug!(gate = %config.name, event = %ctx.hook_event, ?from, ?to, "Trigger fired");

            if let Some(tpl) = &trigger.transition.message_template {
                messages.push(template::render(tpl, &self.vars(tpl, config, ctx, gate, session))?);
            }
        }

        if !fired && ctx.hook_event == HookEvent::AfterTool && gate.status == GateStatus::Open {
            gate.ops_since_open = gate.ops_since_open.saturating_add(1);
        }

        Ok(messages)
    }

    fn countdown(
        &self,
        config: &GateConfig,
        countdown: &CountdownConfig,
        ctx: &HookContext,
        gate: &GateState,
        session: &SessionState,
    ) -> Result<Option<GateResult>> {
        let value = if countdown.metric == OPS_METRIC {
            u64::from(gate.ops_since_open)
        } else {
            gate.counter(&countdown.metric)
        };
        let Some(remaining) = countdown.remaining(value) else {
            return Ok(None);
        };

        let mut vars = self.vars(&countdown.message_template, config, ctx, gate, session);
        vars.insert("remaining".into(), remaining.to_string());
        vars.insert("threshold".into(), countdown.threshold.to_string());

        let message = template::render(&countdown.message_template, &vars)?;
        Ok(Some(
            GateResult::new(Verdict::Allow, &config.name, ResultKind::Countdown)
                .with_context(message)
                .with_metadata("remaining", Value::from(remaining)),
        ))
    }

    /// Placeholder values for `tpl`, writing the scratch file if it is referenced.
    fn vars(
        &self,
        tpl: &str,
        config: &GateConfig,
        ctx: &HookContext,
        gate: &GateState,
        session: &SessionState,
    ) -> TemplateVars {
        let mut vars = template_vars(config, ctx, gate);
        if !vars.contains_key(TEMP_PATH) && template::placeholders(tpl).contains(&TEMP_PATH) {
            let path = self.write_scratch(config, ctx, gate, session);
            vars.insert(TEMP_PATH.into(), path);
        }
        vars
    }

    fn write_scratch(
        &self,
        config: &GateConfig,
        ctx: &HookContext,
        gate: &GateState,
        session: &SessionState,
    ) -> String {
        let doc = audit::render(config, ctx, gate, session);
        let path = self
            .store
            .write_gate_file(&ctx.session_id, &config.name, &doc)
            .unwrap_or_else(|e| {
                warn!(gate = %config.name, error = %e, "Scratch file not written");
                self.store.gate_file_path(&ctx.session_id, &config.name)
            });
        path.display().to_string()
    }
}

fn apply_policy(
    config: &GateConfig,
    policy: &GatePolicy,
    ctx: &HookContext,
    gate: &mut GateState,
    message: String,
) -> GateResult {
    let mut verdict = policy.verdict;
    let mut breaker_open = false;

    if verdict == Verdict::Deny && config.mode == EnforcementMode::Warn {
        verdict = Verdict::Warn;
    }
    if verdict == Verdict::Deny && ctx.hook_event == HookEvent::Stop {
        if let Some(max) = config.max_stop_denials {
            if circuit_breaker::is_tripped(gate) {
                verdict = Verdict::Warn;
                breaker_open = true;
            } else {
                circuit_breaker::record_denial(gate, &config.name, max);
            }
        }
    }

    if verdict == Verdict::Deny {
        info!(
            gate = %config.name,
            event = %ctx.hook_event,
            tool = ctx.tool_name.as_deref().unwrap_or(""),
            "Denied by policy"
        );
    }

    let mut result = GateResult::new(verdict, &config.name, ResultKind::Policy)
        .with_system_message(message.clone());
    if verdict != Verdict::Allow {
        result = result.with_context(message);
    }
    if breaker_open {
        result = result.with_metadata(circuit_breaker::TRIPPED, Value::Bool(true));
    }
    result
}

/// Placeholder values for a gate's messages.
///
/// Built-in names first, then scalar metadata, then metrics, each layer
/// overriding the previous one.
fn template_vars(config: &GateConfig, ctx: &HookContext, gate: &GateState) -> TemplateVars {
    let mut vars = TemplateVars::new();
    vars.insert("gate".into(), config.name.clone());
    vars.insert("description".into(), config.description.clone());
    vars.insert("session_id".into(), ctx.session_id.clone());
    vars.insert("hook_event".into(), ctx.hook_event.to_string());
    vars.insert("tool_name".into(), ctx.tool_name.clone().unwrap_or_default());
    vars.insert(
        "tool_category".into(),
        ctx.tool_category()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default(),
    );
    vars.insert("ops_since_open".into(), gate.ops_since_open.to_string());
    vars.insert(
        "block_reason".into(),
        gate.block_reason.clone().unwrap_or_default(),
    );

    for (key, value) in &gate.metadata {
        if value.is_array() || value.is_object() {
            continue;
        }
        if let Some(text) = template::value_text(value) {
            vars.insert(key.clone(), text);
        }
    }
    for (key, value) in &gate.metrics {
        if let Some(text) = template::value_text(value) {
            vars.insert(key.clone(), text);
        }
    }
    vars
}
