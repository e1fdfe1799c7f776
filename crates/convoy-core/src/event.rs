//! The run-event protocol consumed from the external agent runtime.
//!
//! The upstream SDK emits loosely-shaped JSON events. All of that
//! shape uncertainty is absorbed here, once, into a closed tagged
//! union: unrecognized subtypes parse to `Unknown` variants that the
//! translators silently drop, and known-but-optional fields default
//! rather than fail. Translators downstream only ever see this union.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of the ordered event sequence produced by an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// Provider-level streaming data (deltas, response lifecycle).
    #[serde(rename = "raw_model_stream_event")]
    RawModel { data: ModelStreamData },

    /// A discrete completed-or-started run item.
    #[serde(rename = "run_item_stream_event")]
    RunItem { item: RunItem },

    /// The active agent changed (handoff).
    #[serde(rename = "agent_updated_stream_event")]
    AgentUpdated { agent: AgentInfo },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default)]
    pub name: Option<String>,
}

/// Inner payload of `raw_model_stream_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelStreamData {
    #[serde(rename = "response_started")]
    ResponseStarted,

    #[serde(rename = "response_done")]
    ResponseDone,

    #[serde(rename = "output_text_delta")]
    OutputTextDelta {
        #[serde(default)]
        delta: TextDelta,
    },

    /// Legacy wire name for the same text delta, kept for back-compat.
    #[serde(rename = "response.output_text.delta")]
    LegacyOutputTextDelta {
        #[serde(default)]
        delta: Option<String>,
    },

    /// Wrapped provider event (OpenAI Responses API surface).
    #[serde(rename = "model")]
    Model { event: ProviderEvent },

    #[serde(other)]
    Unknown,
}

/// Provider events carried inside `ModelStreamData::Model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderEvent {
    #[serde(rename = "response.reasoning_text.delta")]
    ReasoningTextDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(other)]
    Unknown,
}

/// A text delta arrives either as a raw string or wrapped in `{ text }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextDelta {
    Plain(String),
    Wrapped { text: String },
}

impl Default for TextDelta {
    fn default() -> Self {
        TextDelta::Plain(String::new())
    }
}

impl TextDelta {
    pub fn text(&self) -> &str {
        match self {
            TextDelta::Plain(s) => s,
            TextDelta::Wrapped { text } => text,
        }
    }
}

/// Inner payload of `run_item_stream_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunItem {
    #[serde(rename = "message_output_item")]
    MessageOutput {
        #[serde(default)]
        content: String,
    },

    #[serde(rename = "tool_call_item")]
    ToolCall {
        #[serde(rename = "rawItem")]
        raw_item: ToolCallRaw,
    },

    #[serde(rename = "tool_call_output_item")]
    ToolCallOutput {
        #[serde(rename = "rawItem")]
        raw_item: ToolOutputRaw,
        #[serde(default)]
        output: Value,
    },

    #[serde(rename = "tool_approval_item")]
    ToolApproval {
        #[serde(rename = "rawItem")]
        raw_item: ApprovalRaw,
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
    },

    #[serde(rename = "reasoning_item")]
    Reasoning {
        #[serde(rename = "rawItem")]
        raw_item: ReasoningRaw,
    },

    #[serde(other)]
    Unknown,
}

/// Raw tool-call item shapes, per call flavor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolCallRaw {
    #[serde(rename = "function_call")]
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(rename = "callId", default)]
        call_id: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },

    /// A provider-hosted tool; may arrive already completed with output.
    #[serde(rename = "hosted_tool_call")]
    HostedToolCall {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        output: Option<Value>,
        #[serde(default)]
        id: Option<String>,
    },

    #[serde(rename = "computer_call")]
    ComputerCall {
        #[serde(default)]
        action: Value,
        #[serde(rename = "callId", default)]
        call_id: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },

    #[serde(rename = "shell_call")]
    ShellCall {
        #[serde(default)]
        action: Value,
        #[serde(rename = "callId", default)]
        call_id: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },

    #[serde(rename = "apply_patch_call")]
    ApplyPatchCall {
        #[serde(default)]
        operation: Value,
        #[serde(rename = "callId", default)]
        call_id: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

impl ToolCallRaw {
    /// Tool name for display: the declared name, falling back to the
    /// wire type of the call.
    pub fn tool_name(&self) -> String {
        match self {
            ToolCallRaw::FunctionCall { name, .. } => name.clone(),
            ToolCallRaw::HostedToolCall { name, .. } => name
                .clone()
                .unwrap_or_else(|| "hosted_tool_call".to_string()),
            ToolCallRaw::ComputerCall { .. } => "computer_call".to_string(),
            ToolCallRaw::ShellCall { .. } => "shell_call".to_string(),
            ToolCallRaw::ApplyPatchCall { .. } => "apply_patch_call".to_string(),
            ToolCallRaw::Unknown => "tool".to_string(),
        }
    }

    /// The correlation id: `callId` when present, else the item `id`.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            ToolCallRaw::FunctionCall { call_id, id, .. }
            | ToolCallRaw::ComputerCall { call_id, id, .. }
            | ToolCallRaw::ShellCall { call_id, id, .. }
            | ToolCallRaw::ApplyPatchCall { call_id, id, .. } => {
                call_id.as_deref().or(id.as_deref())
            }
            ToolCallRaw::HostedToolCall { id, .. } => id.as_deref(),
            ToolCallRaw::Unknown => None,
        }
    }
}

/// Raw item of a `tool_call_output_item`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutputRaw {
    #[serde(rename = "callId", default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
}

impl ToolOutputRaw {
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref().or(self.id.as_deref())
    }
}

/// Raw item of a `tool_approval_item`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalRaw {
    #[serde(rename = "callId", default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Raw item of a `reasoning_item`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningRaw {
    #[serde(default)]
    pub content: Vec<ReasoningContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ReasoningRaw {
    /// Join `input_text` and `summary_text` entries with newlines.
    /// Returns `None` when nothing textual is present.
    pub fn joined_text(&self) -> Option<String> {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter(|c| c.kind == "input_text" || c.kind == "summary_text")
            .map(|c| c.text.as_str())
            .collect();
        let joined = text.join("\n");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_delta_string() {
        let raw = r#"{"type":"raw_model_stream_event","data":{"type":"output_text_delta","delta":"hi"}}"#;
        let event: RunEvent = serde_json::from_str(raw).unwrap();
        match event {
            RunEvent::RawModel {
                data: ModelStreamData::OutputTextDelta { delta },
            } => assert_eq!(delta.text(), "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_text_delta_wrapped_object() {
        let raw = r#"{"type":"raw_model_stream_event","data":{"type":"output_text_delta","delta":{"text":"hi"}}}"#;
        let event: RunEvent = serde_json::from_str(raw).unwrap();
        match event {
            RunEvent::RawModel {
                data: ModelStreamData::OutputTextDelta { delta },
            } => assert_eq!(delta.text(), "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_legacy_delta() {
        let raw = r#"{"type":"raw_model_stream_event","data":{"type":"response.output_text.delta","delta":"old"}}"#;
        let event: RunEvent = serde_json::from_str(raw).unwrap();
        match event {
            RunEvent::RawModel {
                data: ModelStreamData::LegacyOutputTextDelta { delta },
            } => assert_eq!(delta.as_deref(), Some("old")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_subtype_parses_to_unknown() {
        let raw = r#"{"type":"raw_model_stream_event","data":{"type":"response.created","whatever":1}}"#;
        let event: RunEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            event,
            RunEvent::RawModel {
                data: ModelStreamData::Unknown
            }
        ));
    }

    #[test]
    fn test_reasoning_join_filters_kinds() {
        let raw = ReasoningRaw {
            content: vec![
                ReasoningContent {
                    kind: "input_text".into(),
                    text: "think".into(),
                },
                ReasoningContent {
                    kind: "refusal".into(),
                    text: "nope".into(),
                },
                ReasoningContent {
                    kind: "summary_text".into(),
                    text: "summary".into(),
                },
            ],
        };
        assert_eq!(raw.joined_text().as_deref(), Some("think\nsummary"));
    }

    #[test]
    fn test_call_id_prefers_call_id_over_id() {
        let raw: ToolCallRaw = serde_json::from_str(
            r#"{"type":"function_call","name":"search","arguments":"{}","callId":"c1","id":"i1"}"#,
        )
        .unwrap();
        assert_eq!(raw.call_id(), Some("c1"));
        assert_eq!(raw.tool_name(), "search");
    }

    #[test]
    fn test_hosted_tool_call_defaults() {
        let raw: ToolCallRaw =
            serde_json::from_str(r#"{"type":"hosted_tool_call","id":"h1"}"#).unwrap();
        assert_eq!(raw.call_id(), Some("h1"));
        assert_eq!(raw.tool_name(), "hosted_tool_call");
    }
}
