//! Client-side stream reassembly.
//!
//! `DisplayState` is the pure reducer a chat client runs over parsed
//! SSE frames: transient typing/reasoning buffers while streaming, a
//! deduplicated tool-call view, and an authoritative history replace
//! on `done`/`interruption`. The bundled CLI chat command drives it;
//! it holds no I/O and no locks.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use convoy_core::history::{HistoryItem, PendingApproval};

/// A parsed frame of the conversation SSE protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Init {
        conversation_id: String,
    },
    TextDelta {
        delta: String,
    },
    ReasoningDelta {
        delta: String,
    },
    ReasoningItem {
        text: String,
    },
    ToolCall {
        name: String,
        arguments: String,
        call_id: String,
    },
    ToolOutput {
        call_id: String,
        output: Value,
    },
    Message {
        role: String,
        content: String,
    },
    AgentUpdate {
        agent: String,
    },
    Interruption {
        approvals: Vec<PendingApproval>,
        history: Vec<HistoryItem>,
    },
    Done {
        response: Option<String>,
        history: Vec<HistoryItem>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// Interpret a named SSE frame. Unrecognized names and frames whose
    /// payload does not match the expected shape yield `None`; a display
    /// client skips what it cannot read.
    pub fn parse(name: &str, data: &Value) -> Option<StreamEvent> {
        fn from<T: for<'de> Deserialize<'de>>(data: &Value) -> Option<T> {
            serde_json::from_value(data.clone()).ok()
        }

        match name {
            "init" => {
                #[derive(Deserialize)]
                struct Init {
                    #[serde(rename = "conversationId")]
                    conversation_id: String,
                }
                from::<Init>(data).map(|d| StreamEvent::Init {
                    conversation_id: d.conversation_id,
                })
            }
            "text_delta" => {
                #[derive(Deserialize)]
                struct Delta {
                    #[serde(default)]
                    delta: String,
                }
                from::<Delta>(data).map(|d| StreamEvent::TextDelta { delta: d.delta })
            }
            "reasoning_delta" => {
                #[derive(Deserialize)]
                struct Delta {
                    #[serde(default)]
                    delta: String,
                }
                from::<Delta>(data).map(|d| StreamEvent::ReasoningDelta { delta: d.delta })
            }
            "reasoning_item" => {
                #[derive(Deserialize)]
                struct Item {
                    #[serde(default)]
                    text: String,
                }
                from::<Item>(data).map(|d| StreamEvent::ReasoningItem { text: d.text })
            }
            "tool_call" => {
                #[derive(Deserialize)]
                struct Call {
                    name: String,
                    #[serde(default)]
                    arguments: String,
                    #[serde(rename = "callId")]
                    call_id: String,
                }
                from::<Call>(data).map(|d| StreamEvent::ToolCall {
                    name: d.name,
                    arguments: d.arguments,
                    call_id: d.call_id,
                })
            }
            "tool_output" => {
                #[derive(Deserialize)]
                struct Output {
                    #[serde(rename = "callId")]
                    call_id: String,
                    #[serde(default)]
                    output: Value,
                }
                from::<Output>(data).map(|d| StreamEvent::ToolOutput {
                    call_id: d.call_id,
                    output: d.output,
                })
            }
            "message" => {
                #[derive(Deserialize)]
                struct Message {
                    role: String,
                    #[serde(default)]
                    content: String,
                }
                from::<Message>(data).map(|d| StreamEvent::Message {
                    role: d.role,
                    content: d.content,
                })
            }
            "agent_update" => {
                #[derive(Deserialize)]
                struct Update {
                    agent: String,
                }
                from::<Update>(data).map(|d| StreamEvent::AgentUpdate { agent: d.agent })
            }
            "interruption" => {
                #[derive(Deserialize)]
                struct Interruption {
                    #[serde(default)]
                    approvals: Vec<PendingApproval>,
                    #[serde(default)]
                    history: Vec<HistoryItem>,
                }
                from::<Interruption>(data).map(|d| StreamEvent::Interruption {
                    approvals: d.approvals,
                    history: d.history,
                })
            }
            "done" => {
                #[derive(Deserialize)]
                struct Done {
                    #[serde(default)]
                    response: Option<String>,
                    #[serde(default)]
                    history: Vec<HistoryItem>,
                }
                from::<Done>(data).map(|d| StreamEvent::Done {
                    response: d.response,
                    history: d.history,
                })
            }
            "error" => {
                #[derive(Deserialize)]
                struct Error {
                    #[serde(default)]
                    error: String,
                }
                from::<Error>(data).map(|d| StreamEvent::Error { message: d.error })
            }
            _ => {
                tracing::debug!(frame = name, "ignoring unrecognized SSE frame");
                None
            }
        }
    }
}

/// The reassembled view of a streaming conversation.
#[derive(Debug, Default)]
pub struct DisplayState {
    pub conversation_id: Option<String>,
    pub history: Vec<HistoryItem>,
    pub approvals: Vec<PendingApproval>,
    pub agent_name: Option<String>,
    pub streaming: bool,
    pub last_error: Option<String>,
    streaming_text: String,
    reasoning_buffer: String,
    pending_tool_calls: HashSet<String>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-request transient state before a new streaming request.
    pub fn begin_request(&mut self) {
        self.streaming = true;
        self.streaming_text.clear();
        self.reasoning_buffer.clear();
        self.pending_tool_calls.clear();
        self.last_error = None;
    }

    /// Advance the state by one event. Processed strictly in arrival
    /// order; this is the whole concurrency story on the client side.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Init { conversation_id } => {
                self.conversation_id = Some(conversation_id);
            }
            StreamEvent::TextDelta { delta } => {
                self.streaming_text.push_str(&delta);
            }
            StreamEvent::ReasoningDelta { delta } => {
                self.reasoning_buffer.push_str(&delta);
            }
            StreamEvent::ReasoningItem { text } => {
                // The complete item supersedes any deltas buffered for it.
                self.reasoning_buffer.clear();
                if !text.is_empty() {
                    self.history.push(HistoryItem::Reasoning { content: text });
                }
            }
            StreamEvent::ToolCall {
                name,
                arguments,
                call_id,
            } => {
                let exists = self.history.iter().any(|item| {
                    matches!(item, HistoryItem::FunctionCall { call_id: c, .. } if *c == call_id)
                });
                if exists {
                    return;
                }
                self.flush_reasoning();
                self.history
                    .retain(|item| !item.is_empty_assistant_placeholder());
                self.pending_tool_calls.insert(call_id.clone());
                self.history.push(HistoryItem::FunctionCall {
                    name,
                    arguments,
                    call_id: call_id.clone(),
                    id: Some(call_id),
                });
            }
            StreamEvent::ToolOutput { call_id, output } => {
                self.pending_tool_calls.remove(&call_id);
                self.history
                    .push(HistoryItem::FunctionCallResult { call_id, output });
            }
            StreamEvent::Message { .. } => {
                // The final message also arrives inside the authoritative
                // history; only the typing buffer is affected here.
                self.streaming_text.clear();
            }
            StreamEvent::AgentUpdate { agent } => {
                self.agent_name = Some(agent);
            }
            StreamEvent::Interruption { approvals, history } => {
                self.replace_history(history);
                self.approvals = approvals;
            }
            StreamEvent::Done { history, .. } => {
                self.replace_history(history);
                self.approvals.clear();
            }
            StreamEvent::Error { message } => {
                self.last_error = Some(message);
                self.streaming = false;
                self.streaming_text.clear();
            }
        }
    }

    /// The history to render, with the in-progress assistant turn
    /// appended as a transient entry while streaming.
    pub fn display_history(&self) -> Vec<HistoryItem> {
        let mut items = self.history.clone();
        if self.streaming && !self.streaming_text.is_empty() {
            items.push(HistoryItem::Message {
                role: "assistant".into(),
                content: serde_json::json!([
                    { "type": "output_text", "text": self.streaming_text }
                ]),
                status: Some("in_progress".into()),
            });
        } else if self.streaming && self.pending_tool_calls.is_empty() {
            items.push(HistoryItem::Message {
                role: "assistant".into(),
                content: serde_json::json!([]),
                status: Some("in_progress".into()),
            });
        }
        items
    }

    pub fn streaming_text(&self) -> &str {
        &self.streaming_text
    }

    fn flush_reasoning(&mut self) {
        if !self.reasoning_buffer.is_empty() {
            self.history.push(HistoryItem::Reasoning {
                content: std::mem::take(&mut self.reasoning_buffer),
            });
        }
    }

    fn replace_history(&mut self, mut history: Vec<HistoryItem>) {
        self.reattach_reasoning(&mut history);
        self.history = history;
        self.streaming = false;
        self.streaming_text.clear();
        self.reasoning_buffer.clear();
        self.pending_tool_calls.clear();
    }

    /// Best-effort: the authoritative history may not carry reasoning
    /// text the client saw streamed. If it carries none at all, insert
    /// the buffered text before the last assistant message (appending
    /// when there is no assistant message to anchor on).
    fn reattach_reasoning(&mut self, history: &mut Vec<HistoryItem>) {
        if self.reasoning_buffer.is_empty() {
            return;
        }
        if history
            .iter()
            .any(|item| matches!(item, HistoryItem::Reasoning { .. }))
        {
            return;
        }
        let entry = HistoryItem::Reasoning {
            content: std::mem::take(&mut self.reasoning_buffer),
        };
        match history.iter().rposition(HistoryItem::is_assistant_message) {
            Some(pos) => history.insert(pos, entry),
            None => history.push(entry),
        }
    }
}
