//! Scratch documents handed to review agents.
//!
//! When a gate message points an agent at `{temp_path}`, the evaluator writes
//! one of these to the gate's scratch file first.

use crate::core::event::HookContext;
use crate::core::schema::GateConfig;
use crate::core::state::{GateState, SessionState};
use std::fmt::Write;

const NONE: &str = "(none)";

/// Markdown summary of the session as one gate sees it.
#[must_use]
pub fn render(
    config: &GateConfig,
    ctx: &HookContext,
    gate: &GateState,
    session: &SessionState,
) -> String {
    let mut doc = String::new();
    // Writing to a String cannot fail.
    let _ = write_document(&mut doc, config, ctx, gate, session);
    doc
}

fn write_document(
    doc: &mut String,
    config: &GateConfig,
    ctx: &HookContext,
    gate: &GateState,
    session: &SessionState,
) -> std::fmt::Result {
    writeln!(doc, "# {} context", config.name)?;
    if !config.description.is_empty() {
        writeln!(doc, "\n{}", config.description)?;
    }
    writeln!(doc)?;
    writeln!(doc, "- Session: {}", session.session_id)?;
    writeln!(doc, "- Event: {}", ctx.hook_event)?;
    writeln!(doc, "- Tool: {}", ctx.tool_name.as_deref().unwrap_or(NONE))?;
    writeln!(doc, "- Status: {:?}", gate.status)?;
    writeln!(doc, "- Operations since open: {}", gate.ops_since_open)?;
    writeln!(doc, "- Mutating calls: {}", session.main_agent.mutating_calls)?;

    writeln!(doc, "\n## Prompt\n")?;
    writeln!(doc, "{}", session.hydration.original_prompt.as_deref().unwrap_or(NONE))?;

    writeln!(doc, "\n## Intent\n")?;
    writeln!(doc, "{}", session.hydration.hydrated_intent.as_deref().unwrap_or(NONE))?;

    writeln!(doc, "\n## Task\n")?;
    writeln!(doc, "{}", session.main_agent.current_task.as_deref().unwrap_or(NONE))?;
    let unchecked = session.main_agent.unchecked_criteria();
    if !unchecked.is_empty() {
        writeln!(doc, "\nOpen acceptance criteria:")?;
        for criterion in unchecked {
            writeln!(doc, "- [ ] {criterion}")?;
        }
    }

    writeln!(doc, "\n## Subagents\n")?;
    if session.subagents.is_empty() {
        writeln!(doc, "{NONE}")?;
    }
    for (name, record) in &session.subagents {
        writeln!(doc, "- {name}: {} invocation(s)", record.invocations)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::HookEvent;
    use crate::core::state::GateStatus;
    use serde_json::json;

    #[test]
    fn document_carries_session_context() {
        let config = GateConfig::new("custodiet", "Periodic compliance check", GateStatus::Open);
        let ctx = HookContext::new("s", HookEvent::BeforeTool).with_tool("Edit", json!({}));
        let mut gate = GateState::new(GateStatus::Open);
        gate.ops_since_open = 4;
        let mut session = SessionState::new("s");
        session.hydration.original_prompt = Some("tidy the parser".into());
        session.main_agent.current_task = Some("t-3".into());
        session.main_agent.set_criteria(vec!["tests pass".into()]);
        session.record_subagent("critic");

        let doc = render(&config, &ctx, &gate, &session);
        assert!(doc.starts_with("# custodiet context\n\nPeriodic compliance check\n"));
        assert!(doc.contains("- Tool: Edit"));
        assert!(doc.contains("- Operations since open: 4"));
        assert!(doc.contains("tidy the parser"));
        assert!(doc.contains("t-3"));
        assert!(doc.contains("- [ ] tests pass"));
        assert!(doc.contains("- critic: 1 invocation(s)"));
    }

    #[test]
    fn empty_session_renders_placeholders() {
        let config = GateConfig::new("hydration", "", GateStatus::Closed);
        let ctx = HookContext::new("s", HookEvent::Stop);
        let gate = GateState::new(GateStatus::Closed);
        let doc = render(&config, &ctx, &gate, &SessionState::new("s"));
        assert!(doc.contains("- Tool: (none)"));
        assert!(doc.contains("## Subagents\n\n(none)"));
        assert!(!doc.contains("acceptance criteria"));
    }
}
