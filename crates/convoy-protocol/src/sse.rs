//! Named-SSE frame encoding of run events.
//!
//! Stateless per event: one [`RunEvent`] maps to zero or more frames,
//! never blocks, never fails. Unmapped event subtypes encode to
//! nothing. Stream-level frames (`init`, `interruption`, `done`,
//! `error`) have dedicated constructors used by the gateway.

use serde_json::{json, Value};

use convoy_core::event::{
    ModelStreamData, ProviderEvent, RunEvent, RunItem, ToolCallRaw,
};
use convoy_core::history::{HistoryItem, PendingApproval};

/// One named SSE frame: `event: <name>\ndata: <json>\n\n` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: Value,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }

    pub fn init(conversation_id: &str) -> Self {
        Self::new("init", json!({ "conversationId": conversation_id }))
    }

    pub fn interruption(approvals: &[PendingApproval], history: &[HistoryItem]) -> Self {
        Self::new(
            "interruption",
            json!({ "approvals": approvals, "history": history }),
        )
    }

    pub fn done(response: Option<&str>, history: &[HistoryItem]) -> Self {
        Self::new("done", json!({ "response": response, "history": history }))
    }

    pub fn error(message: &str) -> Self {
        Self::new("error", json!({ "error": message }))
    }
}

fn frame(event: &str, data: Value) -> Vec<SseFrame> {
    vec![SseFrame::new(event, data)]
}

/// Raw argument string of a tool call, when the call flavor carries one.
fn raw_arguments(raw: &ToolCallRaw) -> Value {
    match raw {
        ToolCallRaw::FunctionCall { arguments, .. } => Value::String(arguments.clone()),
        ToolCallRaw::HostedToolCall { arguments, .. } => arguments
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        ToolCallRaw::ComputerCall { action, .. } | ToolCallRaw::ShellCall { action, .. } => {
            action.clone()
        }
        ToolCallRaw::ApplyPatchCall { operation, .. } => operation.clone(),
        ToolCallRaw::Unknown => Value::Null,
    }
}

/// Encode one run event into zero or more named SSE frames.
pub fn encode_run_event(event: &RunEvent) -> Vec<SseFrame> {
    match event {
        RunEvent::RawModel { data } => match data {
            ModelStreamData::Model { event } => match event {
                ProviderEvent::ReasoningTextDelta { delta }
                | ProviderEvent::ReasoningSummaryTextDelta { delta } => {
                    frame("reasoning_delta", json!({ "delta": delta }))
                }
                ProviderEvent::Unknown => vec![],
            },
            ModelStreamData::OutputTextDelta { delta } => {
                frame("text_delta", json!({ "delta": delta.text() }))
            }
            // Legacy wire name, same mapping.
            ModelStreamData::LegacyOutputTextDelta { delta } => frame(
                "text_delta",
                json!({ "delta": delta.clone().unwrap_or_default() }),
            ),
            ModelStreamData::ResponseStarted
            | ModelStreamData::ResponseDone
            | ModelStreamData::Unknown => vec![],
        },
        RunEvent::RunItem { item } => match item {
            RunItem::Reasoning { raw_item } => match raw_item.joined_text() {
                Some(text) => frame("reasoning_item", json!({ "text": text })),
                None => vec![],
            },
            RunItem::ToolCall { raw_item } => {
                let mut data = json!({
                    "name": raw_item.tool_name(),
                    "arguments": raw_arguments(raw_item),
                    "status": "in_progress",
                });
                // An absent id is left out of the frame, not sent as null.
                if let Some(call_id) = raw_item.call_id() {
                    data["callId"] = Value::String(call_id.to_string());
                }
                frame("tool_call", data)
            }
            RunItem::ToolCallOutput { raw_item, output } => {
                let mut data = json!({
                    "output": output,
                    "status": "completed",
                });
                if let Some(call_id) = raw_item.call_id() {
                    data["callId"] = Value::String(call_id.to_string());
                }
                frame("tool_output", data)
            }
            RunItem::MessageOutput { content } => frame(
                "message",
                json!({ "role": "assistant", "content": content }),
            ),
            RunItem::ToolApproval { .. } | RunItem::Unknown => vec![],
        },
        RunEvent::AgentUpdated { agent } => frame(
            "agent_update",
            json!({ "agent": agent.name.as_deref().unwrap_or("Unknown") }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::event::{AgentInfo, TextDelta, ToolOutputRaw};

    #[test]
    fn test_tool_call_then_output_roundtrip() {
        let call = RunEvent::RunItem {
            item: RunItem::ToolCall {
                raw_item: ToolCallRaw::FunctionCall {
                    name: "search".into(),
                    arguments: r#"{"q":"x"}"#.into(),
                    call_id: Some("c1".into()),
                    id: None,
                },
            },
        };
        let output = RunEvent::RunItem {
            item: RunItem::ToolCallOutput {
                raw_item: ToolOutputRaw {
                    call_id: Some("c1".into()),
                    id: None,
                    output: None,
                },
                output: Value::String("result".into()),
            },
        };

        let frames: Vec<SseFrame> = [call, output]
            .iter()
            .flat_map(encode_run_event)
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "tool_call");
        assert_eq!(frames[0].data["name"], "search");
        assert_eq!(frames[0].data["callId"], "c1");
        assert_eq!(frames[0].data["status"], "in_progress");
        assert_eq!(frames[1].event, "tool_output");
        assert_eq!(frames[1].data["callId"], "c1");
        assert_eq!(frames[1].data["output"], "result");
        assert_eq!(frames[1].data["status"], "completed");
    }

    #[test]
    fn test_tool_call_without_ids_omits_call_id_key() {
        let event = RunEvent::RunItem {
            item: RunItem::ToolCall {
                raw_item: ToolCallRaw::FunctionCall {
                    name: "search".into(),
                    arguments: "{}".into(),
                    call_id: None,
                    id: None,
                },
            },
        };
        let frames = encode_run_event(&event);
        assert!(frames[0].data.get("callId").is_none());
        assert_eq!(frames[0].data["name"], "search");
    }

    #[test]
    fn test_text_delta_variants_map_identically() {
        let current = RunEvent::RawModel {
            data: ModelStreamData::OutputTextDelta {
                delta: TextDelta::Wrapped { text: "hi".into() },
            },
        };
        let legacy = RunEvent::RawModel {
            data: ModelStreamData::LegacyOutputTextDelta {
                delta: Some("hi".into()),
            },
        };
        for event in [current, legacy] {
            let frames = encode_run_event(&event);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].event, "text_delta");
            assert_eq!(frames[0].data["delta"], "hi");
        }
    }

    #[test]
    fn test_unmapped_events_dropped() {
        let events = [
            RunEvent::RawModel {
                data: ModelStreamData::ResponseStarted,
            },
            RunEvent::RawModel {
                data: ModelStreamData::Unknown,
            },
            RunEvent::RunItem {
                item: RunItem::Unknown,
            },
        ];
        for event in &events {
            assert!(encode_run_event(event).is_empty());
        }
    }

    #[test]
    fn test_empty_reasoning_item_not_emitted() {
        let event = RunEvent::RunItem {
            item: RunItem::Reasoning {
                raw_item: Default::default(),
            },
        };
        assert!(encode_run_event(&event).is_empty());
    }

    #[test]
    fn test_agent_update_defaults_name() {
        let event = RunEvent::AgentUpdated {
            agent: AgentInfo { name: None },
        };
        let frames = encode_run_event(&event);
        assert_eq!(frames[0].data["agent"], "Unknown");
    }

    #[test]
    fn test_wire_format() {
        let frame = SseFrame::init("conv_abc");
        assert_eq!(
            frame.to_wire(),
            "event: init\ndata: {\"conversationId\":\"conv_abc\"}\n\n"
        );
    }
}
