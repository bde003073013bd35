//! The built-in gates.
//!
//! Each gate is plain data for the evaluator. Registration order is the
//! order messages appear in when several gates speak on one event.

use crate::config::GatesConfig;
use crate::core::event::HookEvent;
use crate::core::schema::{
    CountdownConfig, GateCondition, GateConfig, GatePolicy, GateSet, GateTrigger, Pattern, Verdict,
};
use crate::core::state::GateStatus;
use crate::core::tools::ToolCategory;
use crate::error::Result;

pub const HYDRATION: &str = "hydration";
pub const TASK: &str = "task";
pub const CRITIC: &str = "critic";
pub const CUSTODIET: &str = "custodiet";
pub const HANDOVER: &str = "handover";
pub const QA: &str = "qa";

/// Built-in gate names in registration order.
pub const GATE_NAMES: [&str; 6] = [HYDRATION, TASK, CRITIC, CUSTODIET, HANDOVER, QA];

/// Tool categories that never count as work.
const NON_WORK: &[ToolCategory] = &[ToolCategory::AlwaysAvailable, ToolCategory::ReadOnly];

/// Events on which an agent invocation is visible.
const INVOCATION_EVENTS: [HookEvent; 3] = [
    HookEvent::BeforeTool,
    HookEvent::AfterTool,
    HookEvent::SubagentFinished,
];

/// Build every enabled built-in gate.
///
/// # Errors
///
/// Returns a configuration error if a gate definition is invalid.
pub fn builtin_gates(config: &GatesConfig) -> Result<GateSet> {
    let gates = [
        hydration_gate()?,
        task_gate()?,
        critic_gate(config)?,
        custodiet_gate(config)?,
        handover_gate(config)?,
        qa_gate(config)?,
    ];
    GateSet::new(
        gates
            .into_iter()
            .filter(|g| config.is_enabled(&g.name))
            .map(|g| {
                let mode = config.mode(&g.name);
                g.mode(mode)
            })
            .collect(),
    )
}

/// One trigger per invocation event, opening the gate when `agent` is invoked.
fn opens_on_invocation(gate: GateConfig, agent: &str) -> Result<GateConfig> {
    let pattern = Pattern::new(agent)?;
    Ok(INVOCATION_EVENTS.iter().fold(gate, |gate, event| {
        gate.trigger(GateTrigger::new(
            GateCondition::on(*event).subagent(pattern.clone()),
            GateStatus::Open,
        ))
    }))
}

/// Prime the agent with context before it acts on a prompt.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn hydration_gate() -> Result<GateConfig> {
    let gate = GateConfig::new(
        HYDRATION,
        "Hydrate the prompt before acting on it",
        GateStatus::Closed,
    )
    .main_agent_only();

    Ok(opens_on_invocation(gate, r"(?i)hydrator")?
        .trigger(GateTrigger::new(
            GateCondition::on(HookEvent::AfterResponse).custom("has_hydration_plan"),
            GateStatus::Open,
        ))
        .trigger(GateTrigger::new(
            GateCondition::on(HookEvent::PromptSubmitted).custom("is_hydratable"),
            GateStatus::Closed,
        ))
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::BeforeTool)
                .when(GateStatus::Closed)
                .custom("is_hydrator_file_read"),
            Verdict::Allow,
            "",
        ))
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::BeforeTool)
                .when(GateStatus::Closed)
                .excluding(&[ToolCategory::AlwaysAvailable]),
            Verdict::Deny,
            "⛔ Hydration required before using {tool_name}. \
             Spawn the prompt-hydrator agent with the Task tool, \
             passing the context in {temp_path}.",
        )))
}

/// Require a bound task before work starts.
///
/// The task tools that establish or release a binding are always allowed.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn task_gate() -> Result<GateConfig> {
    let binding_tools = Pattern::new(
        r"task_manager__(create_task|update_task|complete_tasks?|decompose_task|claim_next_task)$",
    )?;

    Ok(GateConfig::new(
        TASK,
        "Bind a task before modifying anything",
        GateStatus::Open,
    )
    .main_agent_only()
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::BeforeTool).tool(binding_tools),
        Verdict::Allow,
        "",
    ))
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::BeforeTool)
            .excluding(NON_WORK)
            .custom("missing_bound_task"),
        Verdict::Deny,
        "⛔ No task is bound to this session. Claim or create a task before using {tool_name}.",
    )))
}

/// Require a plan review before the first change of each prompt.
///
/// Also refuses a stop straight after hydration when nothing reviewed the
/// plan, unless the prompt bypassed gating.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn critic_gate(config: &GatesConfig) -> Result<GateConfig> {
    let gate = GateConfig::new(
        CRITIC,
        "Have the plan reviewed before changing anything",
        GateStatus::Closed,
    )
    .main_agent_only()
    .max_stop_denials(Some(config.max_stop_denials));

    Ok(opens_on_invocation(gate, r"(?i)critic")?
        .trigger(
            GateTrigger::new(
                GateCondition::on(HookEvent::AfterResponse).custom("has_plan_approval"),
                GateStatus::Open,
            )
            .with_message("✓ critic opened (plan approved in response)"),
        )
        .trigger(GateTrigger::new(
            GateCondition::on(HookEvent::PromptSubmitted),
            GateStatus::Closed,
        ))
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::BeforeTool)
                .when(GateStatus::Closed)
                .excluding(NON_WORK),
            Verdict::Deny,
            "⛔ Plan review required before using {tool_name}. \
             Spawn the critic agent with the plan context in {temp_path}.",
        ))
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::Stop)
                .when(GateStatus::Closed)
                .custom("needs_plan_review"),
            Verdict::Deny,
            "⛔ Immediate stop after hydration requires critic review. \
             Spawn the critic agent to review the plan in {temp_path}.",
        )))
}

/// Periodic compliance check every `custodiet_threshold` operations.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn custodiet_gate(config: &GatesConfig) -> Result<GateConfig> {
    let threshold = config.custodiet_threshold;
    let gate = GateConfig::new(
        CUSTODIET,
        "Periodic compliance check",
        GateStatus::Open,
    )
    .main_agent_only();

    let countdown = CountdownConfig {
        start_before: config.countdown_start_before,
        ..CountdownConfig::new(
            threshold,
            "Compliance check due in {remaining} operation(s). \
             Spawn the custodiet agent with the context in {temp_path}.",
        )
    };

    Ok(opens_on_invocation(gate, r"(?i)custodiet")?
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::BeforeTool)
                .min_ops(threshold)
                .excluding(NON_WORK),
            Verdict::Deny,
            &format!(
                "⛔ Compliance check required ({{ops_since_open}}/{threshold} operations). \
                 Spawn the custodiet agent with the context in {{temp_path}} \
                 before using {{tool_name}}."
            ),
        ))
        .countdown(countdown))
}

/// Clean shutdown: work must be committed and documented before stopping.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn handover_gate(config: &GatesConfig) -> Result<GateConfig> {
    let handover = Pattern::new(r"(?i)handover")?;

    Ok(GateConfig::new(
        HANDOVER,
        "Hand work over before stopping",
        GateStatus::Closed,
    )
    .main_agent_only()
    .max_stop_denials(Some(config.max_stop_denials))
    .trigger(GateTrigger::new(
        GateCondition::on(HookEvent::AfterTool).subagent(handover),
        GateStatus::Open,
    ))
    .trigger(
        GateTrigger::new(
            GateCondition::on(HookEvent::AfterResponse).custom("has_framework_reflection"),
            GateStatus::Open,
        )
        .with_message("Framework reflection recorded. Handover complete."),
    )
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::AfterResponse)
            .when(GateStatus::Closed)
            .custom("has_incomplete_reflection"),
        Verdict::Warn,
        "⚠️ Framework Reflection found but missing required fields: {missing_fields}. \
         Handover gate remains closed.",
    ))
    .trigger(
        GateTrigger::new(
            GateCondition::on(HookEvent::AfterTool)
                .when(GateStatus::Open)
                .excluding(NON_WORK),
            GateStatus::Closed,
        )
        .with_message("⚠️ Files changed after handover. Hand over again before stopping."),
    )
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::Stop)
            .when(GateStatus::Closed)
            .custom("has_uncommitted_work"),
        Verdict::Deny,
        "⛔ Cannot stop with uncommitted work: {block_reason}. \
         Invoke the handover skill to commit and document your work.",
    ))
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::Stop)
            .when(GateStatus::Closed)
            .custom("has_unfinished_task"),
        Verdict::Deny,
        "⛔ Task {task_id} is still in progress. \
         Invoke the handover skill to complete or release it before stopping.",
    ))
    .policy(GatePolicy::new(
        GateCondition::on(HookEvent::Stop)
            .when(GateStatus::Closed)
            .custom("has_meaningful_work"),
        Verdict::Warn,
        "⚠️ Handover not done. Consider invoking the handover skill before ending the session.",
    )))
}

/// Verification: work must be checked by QA before stopping.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn qa_gate(config: &GatesConfig) -> Result<GateConfig> {
    let gate = GateConfig::new(QA, "Verify work before stopping", GateStatus::Closed)
        .main_agent_only()
        .max_stop_denials(Some(config.max_stop_denials));

    Ok(opens_on_invocation(gate, r"(?i)\b(qa|verifier)\b")?
        .trigger(GateTrigger::new(
            GateCondition::on(HookEvent::PromptSubmitted),
            GateStatus::Closed,
        ))
        .policy(GatePolicy::new(
            GateCondition::on(HookEvent::Stop)
                .when(GateStatus::Closed)
                .custom("has_meaningful_work"),
            Verdict::Deny,
            "⛔ Work was done but not verified. Spawn the qa agent to verify it before stopping.",
        )))
}
