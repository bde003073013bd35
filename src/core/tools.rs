//! Tool classification by side effect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tools that never need a gate: spawning agents, asking the user, planning.
const ALWAYS_AVAILABLE: &[&str] = &[
    "Task",
    "Skill",
    "TodoWrite",
    "AskUserQuestion",
    "EnterPlanMode",
    "ExitPlanMode",
    "KillShell",
    "activate_skill",
    "delegate_to_agent",
];

/// Tools without side effects.
const READ_ONLY: &[&str] = &[
    "Read",
    "Glob",
    "Grep",
    "WebFetch",
    "WebSearch",
    "ListMcpResourcesTool",
    "ReadMcpResourceTool",
    "TaskOutput",
    "read_file",
    "view_file",
    "list_dir",
    "find_by_name",
    "grep_search",
    "search_web",
    "read_url_content",
    "mcp__plugin_aops-core_memory__retrieve_memory",
    "mcp__plugin_aops-core_memory__recall_memory",
    "mcp__plugin_aops-core_memory__search_by_tag",
    "mcp__plugin_aops-core_memory__list_memories",
    "mcp__plugin_aops-core_memory__check_database_health",
    "mcp__plugin_aops-core_task_manager__get_task",
    "mcp__plugin_aops-core_task_manager__list_tasks",
    "mcp__plugin_aops-core_task_manager__search_tasks",
    "mcp__plugin_aops-core_task_manager__get_task_tree",
    "mcp__plugin_aops-core_task_manager__get_children",
    "mcp__plugin_aops-core_task_manager__get_dependencies",
    "mcp__plugin_aops-core_task_manager__get_blocked_tasks",
    "mcp__plugin_aops-core_task_manager__get_review_tasks",
    "mcp__plugin_aops-core_task_manager__get_tasks_with_topology",
    "mcp__plugin_aops-core_task_manager__get_task_neighborhood",
    "mcp__plugin_aops-core_task_manager__get_index_stats",
    "mcp__plugin_aops-core_task_manager__get_graph_metrics",
    "mcp__plugin_aops-core_task_manager__get_review_snapshot",
    "mcp__plugin_context7-plugin_context7__resolve-library-id",
    "mcp__plugin_context7-plugin_context7__query-docs",
];

/// Tools that read a file path from their input.
pub(crate) const FILE_READERS: &[&str] = &["Read", "read_file", "view_file"];

/// Category of a tool, by its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Never gated.
    AlwaysAvailable,
    /// No side effects.
    ReadOnly,
    /// Modifies files or external state. Unknown tools land here.
    Write,
}

impl ToolCategory {
    /// Classify a tool by exact name. Unknown tools are treated as `Write`.
    #[must_use]
    pub fn of(tool_name: &str) -> Self {
        if ALWAYS_AVAILABLE.contains(&tool_name) {
            Self::AlwaysAvailable
        } else if READ_ONLY.contains(&tool_name) {
            Self::ReadOnly
        } else {
            Self::Write
        }
    }

    /// Name used in message templates.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysAvailable => "always_available",
            Self::ReadOnly => "read_only",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tools_are_classified() {
        assert_eq!(ToolCategory::of("Task"), ToolCategory::AlwaysAvailable);
        assert_eq!(ToolCategory::of("Read"), ToolCategory::ReadOnly);
        assert_eq!(ToolCategory::of("Edit"), ToolCategory::Write);
        assert_eq!(ToolCategory::of("Bash"), ToolCategory::Write);
    }

    #[test]
    fn mcp_retrieval_tools_are_read_only() {
        for tool in [
            "mcp__plugin_aops-core_memory__check_database_health",
            "mcp__plugin_aops-core_task_manager__get_blocked_tasks",
            "mcp__plugin_aops-core_task_manager__get_review_snapshot",
            "mcp__plugin_context7-plugin_context7__query-docs",
        ] {
            assert_eq!(ToolCategory::of(tool), ToolCategory::ReadOnly, "{tool}");
        }
    }

    #[test]
    fn mcp_mutations_are_write() {
        for tool in [
            "mcp__plugin_aops-core_memory__store_memory",
            "mcp__plugin_aops-core_task_manager__create_task",
            "mcp__plugin_aops-core_task_manager__complete_tasks",
            "mcp__memory__retrieve_memory",
        ] {
            assert_eq!(ToolCategory::of(tool), ToolCategory::Write, "{tool}");
        }
    }

    #[test]
    fn unknown_tools_are_write() {
        assert_eq!(ToolCategory::of("mcp__weird__thing"), ToolCategory::Write);
        assert_eq!(ToolCategory::of(""), ToolCategory::Write);
    }

    #[test]
    fn category_serialization() {
        assert_eq!(
            serde_json::to_string(&ToolCategory::AlwaysAvailable).unwrap(),
            r#""always_available""#
        );
        assert_eq!(ToolCategory::ReadOnly.to_string(), "read_only");
    }
}
