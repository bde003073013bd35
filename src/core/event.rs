//! Lifecycle events and the per-invocation hook context.

use crate::core::tools::ToolCategory;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One discrete point in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Session started or resumed.
    SessionStart,
    /// User submitted a prompt.
    PromptSubmitted,
    /// A tool is about to run.
    BeforeTool,
    /// A tool finished.
    AfterTool,
    /// A subagent finished.
    SubagentFinished,
    /// The agent produced a response.
    AfterResponse,
    /// The session is stopping.
    Stop,
}

impl HookEvent {
    /// All events, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::SessionStart,
        Self::PromptSubmitted,
        Self::BeforeTool,
        Self::AfterTool,
        Self::SubagentFinished,
        Self::AfterResponse,
        Self::Stop,
    ];

    /// Kebab-case name used on the command line.
    #[must_use]
    pub fn cli_name(self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::PromptSubmitted => "prompt-submitted",
            Self::BeforeTool => "before-tool",
            Self::AfterTool => "after-tool",
            Self::SubagentFinished => "subagent-finished",
            Self::AfterResponse => "after-response",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for HookEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('_', "-").to_lowercase();
        Self::ALL
            .into_iter()
            .find(|event| event.cli_name() == normalized)
            .ok_or_else(|| Error::UnknownEvent(s.to_string()))
    }
}

/// Canonical context for one hook invocation.
///
/// Built once by the host adapter and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// Session identifier.
    pub session_id: String,

    /// Which lifecycle event this is.
    pub hook_event: HookEvent,

    /// Tool name (tool events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tool input payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tool_input: Value,

    /// Tool output payload (`AfterTool` only).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tool_output: Value,

    /// Subagent type (subagent events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subagent_type: Option<String>,

    /// Path to the host's transcript file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,

    /// Working directory of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Untouched host payload.
    #[serde(default)]
    pub raw_input: Value,

    /// Whether this event came from a subagent rather than the main agent.
    #[serde(default)]
    pub is_subagent: bool,
}

impl HookContext {
    /// Create a bare context for an event.
    #[must_use]
    pub fn new(session_id: &str, hook_event: HookEvent) -> Self {
        Self {
            session_id: session_id.to_string(),
            hook_event,
            tool_name: None,
            tool_input: Value::Null,
            tool_output: Value::Null,
            subagent_type: None,
            transcript_path: None,
            cwd: None,
            raw_input: Value::Null,
            is_subagent: false,
        }
    }

    /// Build a context from an untouched host payload.
    ///
    /// Understands the common field names (`tool_response` as an alias of
    /// `tool_output`, `agent_type` as an alias of `subagent_type`).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload has no `session_id`.
    pub fn from_raw(hook_event: HookEvent, raw: Value) -> Result<Self> {
        let str_field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| raw.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };
        let value_field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| raw.get(*k).filter(|v| !v.is_null()).cloned())
                .unwrap_or(Value::Null)
        };

        let session_id =
            str_field(&["session_id"]).ok_or_else(|| Error::MissingField("session_id".into()))?;
        let subagent_type = str_field(&["subagent_type", "agent_type"]);
        let is_subagent = raw
            .get("is_subagent")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            session_id,
            hook_event,
            tool_name: str_field(&["tool_name"]),
            tool_input: value_field(&["tool_input"]),
            tool_output: value_field(&["tool_output", "tool_response"]),
            subagent_type,
            transcript_path: str_field(&["transcript_path"]).map(PathBuf::from),
            cwd: str_field(&["cwd"]).map(PathBuf::from),
            is_subagent,
            raw_input: raw,
        })
    }

    /// Set the tool name and input.
    #[must_use]
    pub fn with_tool(mut self, name: &str, input: Value) -> Self {
        self.tool_name = Some(name.to_string());
        self.tool_input = input;
        self
    }

    /// Set the tool output.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.tool_output = output;
        self
    }

    /// Set the subagent type.
    #[must_use]
    pub fn with_subagent(mut self, subagent_type: &str) -> Self {
        self.subagent_type = Some(subagent_type.to_string());
        self
    }

    /// Category of the tool in this event, if any.
    #[must_use]
    pub fn tool_category(&self) -> Option<ToolCategory> {
        self.tool_name.as_deref().map(ToolCategory::of)
    }

    /// Name of the agent or skill this event concerns.
    ///
    /// The explicit `subagent_type` wins; otherwise the spawning tool's input
    /// fields are consulted.
    #[must_use]
    pub fn invoked_agent(&self) -> Option<&str> {
        if let Some(subagent) = self.subagent_type.as_deref().filter(|s| !s.is_empty()) {
            return Some(subagent);
        }
        ["subagent_type", "skill", "name", "agent_name"]
            .iter()
            .find_map(|k| self.tool_input.get(*k).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// User prompt for `PromptSubmitted` events.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.raw_input.get("prompt").and_then(Value::as_str)
    }

    /// Agent response text for `AfterResponse` events.
    #[must_use]
    pub fn response_text(&self) -> Option<&str> {
        self.raw_input
            .get("prompt_response")
            .and_then(Value::as_str)
    }
}
