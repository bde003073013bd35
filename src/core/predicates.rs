//! Condition matching and the custom predicate registry.
//!
//! Declarative condition fields cover most gates. Checks they cannot express
//! are registered here by name and referenced from `custom_condition`.
//!
//! A predicate that fails resolves to a fixed fallback instead of erroring.
//! Negatively phrased names (`missing_*`, `not_*`, `no_*`, `lacks_*`) fall back
//! to `true` so that a broken check keeps its gate closed; all others fall back
//! to `false`.

use crate::core::event::HookContext;
use crate::core::schema::GateCondition;
use crate::core::state::{GateState, SessionState};
use crate::core::tools::{FILE_READERS, ToolCategory};
use crate::storage::paths;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Default wall-clock limit for predicates that run commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Heading that marks a framework reflection in agent output.
pub const REFLECTION_MARKER: &str = "## Framework Reflection";

/// Field labels a complete framework reflection carries.
const REFLECTION_FIELDS: &[&str] = &[
    "**Prompts**:",
    "**Guidance received**:",
    "**Followed**:",
    "**Outcome**:",
    "**Accomplishments**:",
    "**Friction points**:",
    "**Proposed changes**:",
    "**Next step**:",
];

/// Headings the hydrator emits with its plan.
static HYDRATION_PLAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:##\s*|\*\*)?(?:HYDRATION RESULT|Execution Plan|Execution Steps)").ok()
});

/// Workflow reference inside a hydration plan.
static HYDRATION_WORKFLOW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\*\*Workflows?\*\*:\s*\[\[workflows/([^\]]+)\]\]").ok()
});

/// Marker a reviewer leaves when it accepts a plan.
pub const APPROVAL_MARKER: &str = "APPROVED";

/// Workflows light enough to stop without a plan review.
const STREAMLINED_WORKFLOWS: &[&str] = &["interactive-followup", "simple-question", "direct-skill"];

/// Prompt prefixes that never need hydration.
const UNHYDRATABLE_PREFIXES: &[&str] = &["/", ".", "<agent-notification>", "<task-notification>"];

/// Failure inside a predicate. Never escapes the registry.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

/// Signature of a custom predicate.
///
/// Predicates may record presentation values in the gate's metrics.
pub type PredicateFn =
    dyn Fn(&HookContext, &mut GateState, &SessionState) -> Result<bool, PredicateError> + Send + Sync;

struct Entry {
    func: Box<PredicateFn>,
    fallback: bool,
}

/// Settings for the built-in predicates.
#[derive(Debug, Clone)]
pub struct PredicateSettings {
    /// Limit for predicates that spawn commands.
    pub command_timeout: Duration,
}

impl Default for PredicateSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Fallback value for a predicate that failed, derived from its name.
#[must_use]
pub fn fail_closed_value(name: &str) -> bool {
    name.contains("missing")
        || name.starts_with("not_")
        || name.starts_with("no_")
        || name.starts_with("lacks_")
}

/// Named predicates plus the condition matcher that consults them.
#[derive(Default)]
pub struct PredicateRegistry {
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("predicates", &names)
            .finish()
    }
}

impl PredicateRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in predicate.
    #[must_use]
    pub fn with_builtins(settings: &PredicateSettings) -> Self {
        let mut registry = Self::new();
        let timeout = settings.command_timeout;

        registry.register("is_hydratable", |ctx, _, _| Ok(is_hydratable(ctx)));
        registry.register("is_hydrator_file_read", |ctx, _, _| {
            Ok(is_hydrator_file_read(ctx))
        });
        registry.register("has_hydration_plan", |ctx, _, _| {
            Ok(ctx.response_text().is_some_and(is_hydration_plan))
        });
        registry.register("has_uncommitted_work", move |ctx, gate, _| {
            has_uncommitted_work(ctx, gate, timeout)
        });
        registry.register("has_unfinished_task", |_, gate, session| {
            match &session.main_agent.current_task {
                Some(task) => {
                    gate.metrics
                        .insert("task_id".to_string(), Value::from(task.as_str()));
                    Ok(true)
                }
                None => Ok(false),
            }
        });
        registry.register("missing_bound_task", |_, _, session| {
            Ok(session.main_agent.current_task.is_none())
        });
        registry.register("has_meaningful_work", |_, _, session| {
            Ok(session.main_agent.mutating_calls > 0)
        });
        registry.register("has_plan_approval", |ctx, _, _| {
            Ok(ctx.response_text().is_some_and(|t| t.contains(APPROVAL_MARKER)))
        });
        registry.register("needs_plan_review", |_, _, session| Ok(needs_plan_review(session)));
        registry.register("has_framework_reflection", |ctx, gate, _| {
            reflection(ctx, gate).map(|r| r == Reflection::Complete)
        });
        registry.register("missing_framework_reflection", |ctx, gate, _| {
            reflection(ctx, gate).map(|r| r != Reflection::Complete)
        });
        registry.register("has_incomplete_reflection", |ctx, gate, _| {
            reflection(ctx, gate).map(|r| r == Reflection::Incomplete)
        });

        registry
    }

    /// Register a predicate with the fallback derived from its name.
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&HookContext, &mut GateState, &SessionState) -> Result<bool, PredicateError>
            + Send
            + Sync
            + 'static,
    {
        self.register_with_fallback(name, fail_closed_value(name), func);
    }

    /// Register a predicate with an explicit fallback value.
    pub fn register_with_fallback<F>(&mut self, name: &str, fallback: bool, func: F)
    where
        F: Fn(&HookContext, &mut GateState, &SessionState) -> Result<bool, PredicateError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(
            name.to_string(),
            Entry {
                func: Box::new(func),
                fallback,
            },
        );
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Evaluate one named predicate. Unregistered names are `false`.
    pub fn evaluate_custom(
        &self,
        name: &str,
        ctx: &HookContext,
        gate: &mut GateState,
        session: &SessionState,
    ) -> bool {
        let Some(entry) = self.entries.get(name) else {
            debug!(predicate = name, "Unregistered predicate");
            return false;
        };
        match (entry.func)(ctx, gate, session) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    predicate = name,
                    error = %e,
                    fallback = entry.fallback,
                    "Predicate failed"
                );
                entry.fallback
            }
        }
    }

    /// Whether every present field of `condition` matches.
    ///
    /// Cheap declarative fields are checked before the custom predicate so a
    /// predicate only runs on events it could apply to.
    pub fn evaluate(
        &self,
        condition: &GateCondition,
        ctx: &HookContext,
        gate: &mut GateState,
        session: &SessionState,
    ) -> bool {
        if condition.hook_event.is_some_and(|e| e != ctx.hook_event) {
            return false;
        }
        if let Some(pattern) = &condition.tool_name_pattern {
            match ctx.tool_name.as_deref() {
                Some(tool) if pattern.is_match(tool) => {}
                _ => return false,
            }
        }
        if let Some(pattern) = &condition.subagent_pattern {
            match ctx.invoked_agent() {
                Some(agent) if pattern.is_match(agent) => {}
                _ => return false,
            }
        }
        if let Some(category) = ctx.tool_category() {
            if condition.excluded_categories.contains(&category) {
                return false;
            }
        }
        if condition.current_status.is_some_and(|s| s != gate.status) {
            return false;
        }
        if condition
            .min_ops_since_open
            .is_some_and(|min| gate.ops_since_open < min)
        {
            return false;
        }
        match &condition.custom_condition {
            Some(name) => self.evaluate_custom(name, ctx, gate, session),
            None => true,
        }
    }
}

/// Whether a submitted prompt should prime the agent with context.
#[must_use]
pub fn is_hydratable(ctx: &HookContext) -> bool {
    let Some(prompt) = ctx.prompt() else {
        return false;
    };
    let prompt = prompt.trim();
    !prompt.is_empty() && !UNHYDRATABLE_PREFIXES.iter().any(|p| prompt.starts_with(p))
}

/// Whether agent output contains a hydration plan.
#[must_use]
pub fn is_hydration_plan(text: &str) -> bool {
    HYDRATION_PLAN.as_ref().is_some_and(|re| re.is_match(text))
}

/// Workflow named by a hydration plan, if any.
#[must_use]
pub fn hydration_workflow(text: &str) -> Option<&str> {
    HYDRATION_WORKFLOW
        .as_ref()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str())
}

/// Whether a session is stopping straight after hydration with no review.
///
/// Waived by a bypass prompt and for streamlined workflows.
#[must_use]
pub fn needs_plan_review(session: &SessionState) -> bool {
    if session.gates_bypassed() || !session.subagents.is_empty() {
        return false;
    }
    session
        .hydration
        .hydrated_intent
        .as_deref()
        .is_some_and(|intent| !STREAMLINED_WORKFLOWS.contains(&intent))
}

/// File path a reading tool was pointed at.
fn read_target(ctx: &HookContext) -> Option<PathBuf> {
    let tool = ctx.tool_name.as_deref()?;
    if !FILE_READERS.contains(&tool) {
        return None;
    }
    ["file_path", "path", "absolute_path"]
        .iter()
        .find_map(|k| ctx.tool_input.get(*k).and_then(Value::as_str))
        .map(PathBuf::from)
}

/// Whether this is a read-only tool reading this session's hydration scratch file.
#[must_use]
pub fn is_hydrator_file_read(ctx: &HookContext) -> bool {
    if ctx.tool_category() != Some(ToolCategory::ReadOnly) {
        return false;
    }
    let Some(target) = read_target(ctx) else {
        return false;
    };
    // Root-relative tail, so any store root qualifies.
    let tail = paths::scratch_path(Path::new(""), &ctx.session_id, "hydration");
    target.ends_with(tail)
}

fn has_uncommitted_work(
    ctx: &HookContext,
    gate: &mut GateState,
    timeout: Duration,
) -> Result<bool, PredicateError> {
    let cwd = match &ctx.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };
    let mut cmd = Command::new("git");
    cmd.args(["status", "--porcelain"]).current_dir(&cwd);
    let Some(stdout) = run_command(&mut cmd, timeout)? else {
        debug!(cwd = %cwd.display(), "Not a git repository");
        return Ok(false);
    };
    let changed = stdout.lines().filter(|l| !l.trim().is_empty()).count();
    if changed == 0 {
        return Ok(false);
    }
    gate.metrics.insert(
        "block_reason".to_string(),
        Value::from(format!("{changed} uncommitted change(s) in {}", cwd.display())),
    );
    Ok(true)
}

/// Run a command with a wall-clock limit.
///
/// Returns `Ok(None)` when the command exits unsuccessfully. Stdout is drained
/// on a helper thread so a chatty child cannot block on a full pipe.
pub(crate) fn run_command(
    cmd: &mut Command,
    timeout: Duration,
) -> Result<Option<String>, PredicateError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PredicateError::Timeout(timeout));
        }
        thread::sleep(Duration::from_millis(10));
    };

    if !status.success() {
        return Ok(None);
    }
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| PredicateError::Failed("stdout reader panicked".into()))?
            .map(Some)
            .map_err(PredicateError::from),
        None => Ok(Some(String::new())),
    }
}

/// What the agent's latest output says about a framework reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reflection {
    Absent,
    Incomplete,
    Complete,
}

/// Scan for a framework reflection.
///
/// Looks at the response text first, then the transcript. When the heading is
/// present but fields are missing, records them in `metrics.missing_fields`.
fn reflection(ctx: &HookContext, gate: &mut GateState) -> Result<Reflection, PredicateError> {
    let text = match ctx.response_text() {
        Some(text) if text.contains(REFLECTION_MARKER) => text.to_string(),
        _ => match &ctx.transcript_path {
            Some(path) => std::fs::read_to_string(path)?,
            None => return Ok(Reflection::Absent),
        },
    };
    let Some(start) = text.rfind(REFLECTION_MARKER) else {
        return Ok(Reflection::Absent);
    };
    let section = text[start..].to_lowercase();
    let missing: Vec<&str> = REFLECTION_FIELDS
        .iter()
        .filter(|field| !section.contains(&field.to_lowercase()))
        .map(|field| field.trim_matches(|c| c == '*' || c == ':'))
        .collect();
    if missing.is_empty() {
        gate.metrics.remove("missing_fields");
        return Ok(Reflection::Complete);
    }
    gate.metrics
        .insert("missing_fields".to_string(), Value::from(missing.join(", ")));
    Ok(Reflection::Incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::HookEvent;
    use crate::core::schema::Pattern;
    use crate::core::state::GateStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn prompt_ctx(prompt: &str) -> HookContext {
        let mut ctx = HookContext::new("s", HookEvent::PromptSubmitted);
        ctx.raw_input = json!({ "prompt": prompt });
        ctx
    }

    fn full_reflection() -> String {
        let mut text = format!("done.\n\n{REFLECTION_MARKER}\n");
        for field in REFLECTION_FIELDS {
            text.push_str(&format!("{field} yes\n"));
        }
        text
    }

    #[test]
    fn fail_closed_naming() {
        assert!(fail_closed_value("missing_bound_task"));
        assert!(fail_closed_value("not_ready"));
        assert!(fail_closed_value("no_plan"));
        assert!(fail_closed_value("lacks_review"));
        assert!(!fail_closed_value("has_uncommitted_work"));
        assert!(!fail_closed_value("notable"));
    }

    #[test]
    fn unregistered_predicate_is_false() {
        let registry = PredicateRegistry::new();
        let mut gate = GateState::new(GateStatus::Open);
        let session = SessionState::new("s");
        let ctx = HookContext::new("s", HookEvent::Stop);
        assert!(!registry.evaluate_custom("nope", &ctx, &mut gate, &session));
        assert!(!registry.evaluate_custom("missing_nope", &ctx, &mut gate, &session));
    }

    #[test]
    fn failing_predicate_resolves_fail_closed() {
        let mut registry = PredicateRegistry::new();
        registry.register("missing_plan", |_, _, _| Err(PredicateError::Failed("boom".into())));
        registry.register("has_plan", |_, _, _| Err(PredicateError::Failed("boom".into())));
        registry.register_with_fallback("odd_check", true, |_, _, _| {
            Err(PredicateError::Timeout(Duration::from_millis(1)))
        });

        let mut gate = GateState::new(GateStatus::Open);
        let session = SessionState::new("s");
        let ctx = HookContext::new("s", HookEvent::Stop);
        assert!(registry.evaluate_custom("missing_plan", &ctx, &mut gate, &session));
        assert!(!registry.evaluate_custom("has_plan", &ctx, &mut gate, &session));
        assert!(registry.evaluate_custom("odd_check", &ctx, &mut gate, &session));
    }

    #[test]
    fn empty_condition_matches_everything() {
        let registry = PredicateRegistry::new();
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        for event in HookEvent::ALL {
            let ctx = HookContext::new("s", event);
            assert!(registry.evaluate(&GateCondition::any(), &ctx, &mut gate, &session));
        }
    }

    #[test]
    fn condition_fields_are_conjunctive() {
        let registry = PredicateRegistry::new();
        let session = SessionState::new("s");
        let mut gate = GateState::new(GateStatus::Open);
        gate.ops_since_open = 3;
        let cond = GateCondition::on(HookEvent::BeforeTool)
            .tool(Pattern::new("^Edit$").unwrap())
            .when(GateStatus::Open)
            .min_ops(3);

        let edit = HookContext::new("s", HookEvent::BeforeTool).with_tool("Edit", json!({}));
        assert!(registry.evaluate(&cond, &edit, &mut gate, &session));

        let read = HookContext::new("s", HookEvent::BeforeTool).with_tool("Read", json!({}));
        assert!(!registry.evaluate(&cond, &read, &mut gate, &session));

        let after = HookContext::new("s", HookEvent::AfterTool).with_tool("Edit", json!({}));
        assert!(!registry.evaluate(&cond, &after, &mut gate, &session));

        gate.ops_since_open = 2;
        assert!(!registry.evaluate(&cond, &edit, &mut gate, &session));
    }

    #[test]
    fn tool_pattern_without_tool_does_not_match() {
        let registry = PredicateRegistry::new();
        let session = SessionState::new("s");
        let mut gate = GateState::new(GateStatus::Open);
        let cond = GateCondition::any().tool(Pattern::new(".*").unwrap());
        let ctx = HookContext::new("s", HookEvent::Stop);
        assert!(!registry.evaluate(&cond, &ctx, &mut gate, &session));
    }

    #[test]
    fn excluded_categories() {
        let registry = PredicateRegistry::new();
        let session = SessionState::new("s");
        let mut gate = GateState::new(GateStatus::Open);
        let cond = GateCondition::on(HookEvent::BeforeTool)
            .excluding(&[ToolCategory::AlwaysAvailable, ToolCategory::ReadOnly]);

        let task = HookContext::new("s", HookEvent::BeforeTool).with_tool("Task", json!({}));
        let bash = HookContext::new("s", HookEvent::BeforeTool).with_tool("Bash", json!({}));
        assert!(!registry.evaluate(&cond, &task, &mut gate, &session));
        assert!(registry.evaluate(&cond, &bash, &mut gate, &session));
    }

    #[test]
    fn subagent_pattern_matches_invoked_agent() {
        let registry = PredicateRegistry::new();
        let session = SessionState::new("s");
        let mut gate = GateState::new(GateStatus::Closed);
        let cond = GateCondition::any().subagent(Pattern::new("critic").unwrap());

        let hit = HookContext::new("s", HookEvent::AfterTool)
            .with_tool("Task", json!({"subagent_type": "aops-core:critic"}));
        let miss = HookContext::new("s", HookEvent::AfterTool).with_tool("Task", json!({}));
        assert!(registry.evaluate(&cond, &hit, &mut gate, &session));
        assert!(!registry.evaluate(&cond, &miss, &mut gate, &session));
    }

    #[test]
    fn is_hydratable_skips_shortcuts() {
        assert!(is_hydratable(&prompt_ctx("fix the login bug")));
        assert!(!is_hydratable(&prompt_ctx("/commit")));
        assert!(!is_hydratable(&prompt_ctx(". just do it")));
        assert!(!is_hydratable(&prompt_ctx("  <agent-notification>done")));
        assert!(!is_hydratable(&prompt_ctx("<task-notification>built")));
        assert!(!is_hydratable(&prompt_ctx("   ")));
        assert!(!is_hydratable(&HookContext::new("s", HookEvent::PromptSubmitted)));
    }

    #[test]
    fn hydration_plan_detection() {
        assert!(is_hydration_plan("## HYDRATION RESULT\n..."));
        assert!(is_hydration_plan("**Execution Plan**\n1. do it"));
        assert!(is_hydration_plan("here are the execution steps"));
        assert!(!is_hydration_plan("I fixed the bug."));
    }

    #[test]
    fn hydration_workflow_extraction() {
        let text = "## HYDRATION RESULT\n**Workflow**: [[workflows/bugfix]]\n";
        assert_eq!(hydration_workflow(text), Some("bugfix"));
        assert_eq!(hydration_workflow("## HYDRATION RESULT"), None);
    }

    #[test]
    fn hydrator_file_read_detection() {
        let path = paths::scratch_path(Path::new("/home/u/.warden"), "s", "hydration");
        let read = HookContext::new("s", HookEvent::BeforeTool)
            .with_tool("Read", json!({"file_path": path.to_string_lossy()}));
        assert!(is_hydrator_file_read(&read));

        let other_session = HookContext::new("other", HookEvent::BeforeTool)
            .with_tool("Read", json!({"file_path": path.to_string_lossy()}));
        assert!(!is_hydrator_file_read(&other_session));

        let edit = HookContext::new("s", HookEvent::BeforeTool)
            .with_tool("Edit", json!({"file_path": path.to_string_lossy()}));
        assert!(!is_hydrator_file_read(&edit));

        let elsewhere = HookContext::new("s", HookEvent::BeforeTool)
            .with_tool("Read", json!({"file_path": "/etc/passwd"}));
        assert!(!is_hydrator_file_read(&elsewhere));
    }

    #[test]
    fn task_predicates() {
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let ctx = HookContext::new("s", HookEvent::Stop);
        let mut gate = GateState::new(GateStatus::Closed);
        let mut session = SessionState::new("s");

        assert!(registry.evaluate_custom("missing_bound_task", &ctx, &mut gate, &session));
        assert!(!registry.evaluate_custom("has_unfinished_task", &ctx, &mut gate, &session));

        session.main_agent.current_task = Some("task-42".into());
        assert!(!registry.evaluate_custom("missing_bound_task", &ctx, &mut gate, &session));
        assert!(registry.evaluate_custom("has_unfinished_task", &ctx, &mut gate, &session));
        assert_eq!(gate.metrics["task_id"], json!("task-42"));
    }

    #[test]
    fn meaningful_work_counts_mutations() {
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let ctx = HookContext::new("s", HookEvent::Stop);
        let mut gate = GateState::new(GateStatus::Closed);
        let mut session = SessionState::new("s");
        assert!(!registry.evaluate_custom("has_meaningful_work", &ctx, &mut gate, &session));
        session.main_agent.mutating_calls = 1;
        assert!(registry.evaluate_custom("has_meaningful_work", &ctx, &mut gate, &session));
    }

    #[test]
    fn uncommitted_work_outside_repository_is_false() {
        let dir = TempDir::new().unwrap();
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let mut ctx = HookContext::new("s", HookEvent::Stop);
        ctx.cwd = Some(dir.path().to_path_buf());
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        assert!(!registry.evaluate_custom("has_uncommitted_work", &ctx, &mut gate, &session));
        assert!(!gate.metrics.contains_key("block_reason"));
    }

    #[test]
    fn uncommitted_work_in_dirty_repository() {
        let dir = TempDir::new().unwrap();
        let init = Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        assert!(init.success());
        std::fs::write(dir.path().join("notes.txt"), "draft").unwrap();

        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let mut ctx = HookContext::new("s", HookEvent::Stop);
        ctx.cwd = Some(dir.path().to_path_buf());
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        assert!(registry.evaluate_custom("has_uncommitted_work", &ctx, &mut gate, &session));
        let reason = gate.metrics["block_reason"].as_str().unwrap();
        assert!(reason.starts_with("1 uncommitted change(s)"));
    }

    #[test]
    fn plan_approval_in_response() {
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        let mut ctx = HookContext::new("s", HookEvent::AfterResponse);
        ctx.raw_input = json!({ "prompt_response": "Review: APPROVED with notes" });
        assert!(registry.evaluate_custom("has_plan_approval", &ctx, &mut gate, &session));
        ctx.raw_input = json!({ "prompt_response": "Needs another pass." });
        assert!(!registry.evaluate_custom("has_plan_approval", &ctx, &mut gate, &session));
    }

    #[test]
    fn plan_review_after_hydration() {
        let mut session = SessionState::new("s");
        assert!(!needs_plan_review(&session));

        session.hydration.hydrated_intent = Some("feature-dev".into());
        assert!(needs_plan_review(&session));

        session.set_gates_bypassed(true);
        assert!(!needs_plan_review(&session));
        session.set_gates_bypassed(false);

        session.record_subagent("critic");
        assert!(!needs_plan_review(&session));
        session.subagents.clear();

        session.hydration.hydrated_intent = Some("simple-question".into());
        assert!(!needs_plan_review(&session));
    }

    #[test]
    fn run_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let result = run_command(&mut cmd, Duration::from_millis(50));
        assert!(matches!(result, Err(PredicateError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn run_command_captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let out = run_command(&mut cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(out.as_deref().map(str::trim), Some("hello"));
    }

    #[test]
    fn run_command_failure_is_none() {
        let mut cmd = Command::new("false");
        assert!(run_command(&mut cmd, Duration::from_secs(5)).unwrap().is_none());
    }

    #[test]
    fn framework_reflection_in_response() {
        let mut ctx = HookContext::new("s", HookEvent::AfterResponse);
        ctx.raw_input = json!({ "prompt_response": full_reflection() });
        let mut gate = GateState::new(GateStatus::Closed);
        assert_eq!(reflection(&ctx, &mut gate).unwrap(), Reflection::Complete);
    }

    #[test]
    fn incomplete_reflection_records_missing_fields() {
        let mut ctx = HookContext::new("s", HookEvent::AfterResponse);
        ctx.raw_input = json!({
            "prompt_response": format!("{REFLECTION_MARKER}\n**Prompts**: one\n")
        });
        let mut gate = GateState::new(GateStatus::Closed);
        assert_eq!(reflection(&ctx, &mut gate).unwrap(), Reflection::Incomplete);
        let missing = gate.metrics["missing_fields"].as_str().unwrap();
        assert!(missing.contains("Next step"));
        assert!(!missing.contains("Prompts"));
    }

    #[test]
    fn reflection_falls_back_to_transcript() {
        let dir = TempDir::new().unwrap();
        let transcript = dir.path().join("transcript.jsonl");
        std::fs::write(&transcript, full_reflection()).unwrap();

        let mut ctx = HookContext::new("s", HookEvent::Stop);
        ctx.transcript_path = Some(transcript);
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        assert!(registry.evaluate_custom("has_framework_reflection", &ctx, &mut gate, &session));
        assert!(!registry.evaluate_custom("missing_framework_reflection", &ctx, &mut gate, &session));
        assert!(!registry.evaluate_custom("has_incomplete_reflection", &ctx, &mut gate, &session));
    }

    #[test]
    fn unreadable_transcript_fails_closed() {
        let mut ctx = HookContext::new("s", HookEvent::Stop);
        ctx.transcript_path = Some(PathBuf::from("/nonexistent/transcript.jsonl"));
        let registry = PredicateRegistry::with_builtins(&PredicateSettings::default());
        let mut gate = GateState::new(GateStatus::Closed);
        let session = SessionState::new("s");
        assert!(!registry.evaluate_custom("has_framework_reflection", &ctx, &mut gate, &session));
        assert!(registry.evaluate_custom("missing_framework_reflection", &ctx, &mut gate, &session));
    }
}
