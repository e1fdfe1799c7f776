//! UI message stream building.
//!
//! Translates the run-event sequence into the UI message chunk
//! protocol (`start` / `start-step` / `text-*` / `reasoning-*` /
//! `tool-*` / `finish-step` / `finish`) consumed by generic streaming
//! chat clients.
//!
//! The builder is single-shot: one instance per run, created at stream
//! start and discarded at stream end. It preserves the arrival order
//! of the underlying events — in particular reasoning chunks for a
//! turn stay ahead of that turn's tool chunks whenever the input
//! sequence orders them that way.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use convoy_core::event::{ModelStreamData, RunEvent, RunItem, ToolCallRaw};

/// One chunk of the UI message stream protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiChunk {
    #[serde(rename = "start")]
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    #[serde(rename = "start-step")]
    StartStep,

    #[serde(rename = "text-start")]
    TextStart { id: String },

    #[serde(rename = "text-delta")]
    TextDelta { id: String, delta: String },

    #[serde(rename = "text-end")]
    TextEnd { id: String },

    #[serde(rename = "reasoning-start")]
    ReasoningStart { id: String },

    #[serde(rename = "reasoning-delta")]
    ReasoningDelta { id: String, delta: String },

    #[serde(rename = "reasoning-end")]
    ReasoningEnd { id: String },

    #[serde(rename = "tool-input-start")]
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        dynamic: bool,
    },

    #[serde(rename = "tool-input-available")]
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
        dynamic: bool,
    },

    #[serde(rename = "tool-output-available")]
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        output: Value,
        dynamic: bool,
    },

    #[serde(rename = "tool-approval-request")]
    ToolApprovalRequest {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "approvalId")]
        approval_id: String,
    },

    #[serde(rename = "finish-step")]
    FinishStep,

    #[serde(rename = "finish")]
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: String,
    },
}

/// Generated-id source, injected so tests can be deterministic.
pub struct IdSource(Box<dyn FnMut(&str) -> String + Send>);

impl IdSource {
    /// UUID-backed ids: `<prefix>-<uuid>`.
    pub fn random() -> Self {
        Self(Box::new(|prefix| {
            format!("{prefix}-{}", uuid::Uuid::new_v4())
        }))
    }

    /// Sequential ids: `<prefix>-1`, `<prefix>-2`, ... (tests).
    pub fn sequential() -> Self {
        let mut counter = 0u64;
        Self(Box::new(move |prefix| {
            counter += 1;
            format!("{prefix}-{counter}")
        }))
    }

    pub fn generate(&mut self, prefix: &str) -> String {
        (self.0)(prefix)
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::random()
    }
}

/// Parse a JSON argument string, degrading to a `{ raw }` envelope.
fn parse_json_args(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw": raw }))
}

struct ToolInput {
    tool_call_id: String,
    tool_name: String,
    input: Value,
}

/// State machine translating run events to UI message chunks.
#[derive(Default)]
pub struct UiMessageBuilder {
    ids: IdSource,
    message_id: Option<String>,
    step_open: bool,
    pending_step_close: bool,
    response_has_text: bool,
    step_has_text_output: bool,
    text_open: bool,
    current_text_id: String,
    started_tool_calls: HashSet<String>,
    emitted_tool_outputs: HashSet<String>,
}

impl UiMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: IdSource) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    fn ensure_message_start(&mut self, out: &mut Vec<UiChunk>) {
        if self.message_id.is_none() {
            let id = self.ids.generate("message");
            self.message_id = Some(id.clone());
            out.push(UiChunk::Start { message_id: id });
        }
    }

    fn ensure_step_start(&mut self, out: &mut Vec<UiChunk>) {
        if !self.step_open {
            self.step_open = true;
            self.pending_step_close = false;
            self.step_has_text_output = false;
            out.push(UiChunk::StartStep);
        }
    }

    fn finish_step(&mut self, out: &mut Vec<UiChunk>) {
        if self.step_open {
            self.step_open = false;
            self.pending_step_close = false;
            out.push(UiChunk::FinishStep);
        }
    }

    fn close_text(&mut self, out: &mut Vec<UiChunk>) {
        if self.text_open {
            self.text_open = false;
            out.push(UiChunk::TextEnd {
                id: self.current_text_id.clone(),
            });
        }
    }

    fn resolve_call_id(&mut self, raw: &ToolCallRaw, tool_name: &str) -> String {
        raw.call_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{tool_name}-{}", self.ids.generate("call")))
    }

    fn extract_tool_input(&mut self, raw: &ToolCallRaw) -> Option<ToolInput> {
        let tool_name = raw.tool_name();
        let tool_call_id = self.resolve_call_id(raw, &tool_name);
        let input = match raw {
            ToolCallRaw::FunctionCall { arguments, .. } => parse_json_args(arguments),
            ToolCallRaw::HostedToolCall { arguments, .. } => arguments
                .as_deref()
                .map(parse_json_args)
                .unwrap_or_else(|| json!({})),
            ToolCallRaw::ComputerCall { action, .. }
            | ToolCallRaw::ShellCall { action, .. } => action.clone(),
            ToolCallRaw::ApplyPatchCall { operation, .. } => operation.clone(),
            ToolCallRaw::Unknown => return None,
        };
        Some(ToolInput {
            tool_call_id,
            tool_name,
            input,
        })
    }

    /// Translate one event into zero or more chunks.
    pub fn handle(&mut self, event: &RunEvent) -> Vec<UiChunk> {
        let mut out = Vec::new();
        match event {
            RunEvent::RawModel { data } => self.handle_model_data(data, &mut out),
            RunEvent::RunItem { item } => self.handle_run_item(item, &mut out),
            RunEvent::AgentUpdated { .. } => {}
        }
        out
    }

    fn handle_model_data(&mut self, data: &ModelStreamData, out: &mut Vec<UiChunk>) {
        match data {
            ModelStreamData::ResponseStarted => {
                self.ensure_message_start(out);
                self.response_has_text = false;
                self.ensure_step_start(out);
            }
            ModelStreamData::OutputTextDelta { delta } => {
                self.ensure_message_start(out);
                self.ensure_step_start(out);
                self.response_has_text = true;
                self.step_has_text_output = true;
                if !self.text_open {
                    self.current_text_id = self.ids.generate("text");
                    self.text_open = true;
                    out.push(UiChunk::TextStart {
                        id: self.current_text_id.clone(),
                    });
                }
                out.push(UiChunk::TextDelta {
                    id: self.current_text_id.clone(),
                    delta: delta.text().to_string(),
                });
            }
            ModelStreamData::ResponseDone => {
                self.close_text(out);
                if self.step_open {
                    // Closing is deferred until the step's text status is
                    // known: a message item materialized without deltas may
                    // still belong to this step.
                    if self.step_has_text_output {
                        self.finish_step(out);
                    } else {
                        self.pending_step_close = true;
                    }
                }
            }
            ModelStreamData::LegacyOutputTextDelta { .. }
            | ModelStreamData::Model { .. }
            | ModelStreamData::Unknown => {}
        }
    }

    fn handle_run_item(&mut self, item: &RunItem, out: &mut Vec<UiChunk>) {
        match item {
            RunItem::MessageOutput { content } => {
                self.ensure_message_start(out);
                if !self.response_has_text {
                    // Fallback path: the provider produced a complete
                    // message with no incremental deltas.
                    self.ensure_step_start(out);
                    if !content.is_empty() {
                        let id = self.ids.generate("text");
                        out.push(UiChunk::TextStart { id: id.clone() });
                        out.push(UiChunk::TextDelta {
                            id: id.clone(),
                            delta: content.clone(),
                        });
                        out.push(UiChunk::TextEnd { id });
                        self.step_has_text_output = true;
                        self.response_has_text = true;
                    }
                }
                if self.pending_step_close {
                    self.finish_step(out);
                }
            }
            RunItem::ToolCall { raw_item } => {
                self.ensure_message_start(out);
                let payload = self.extract_tool_input(raw_item);
                if let Some(payload) = &payload {
                    if self.started_tool_calls.insert(payload.tool_call_id.clone()) {
                        out.push(UiChunk::ToolInputStart {
                            tool_call_id: payload.tool_call_id.clone(),
                            tool_name: payload.tool_name.clone(),
                            dynamic: true,
                        });
                    }
                    out.push(UiChunk::ToolInputAvailable {
                        tool_call_id: payload.tool_call_id.clone(),
                        tool_name: payload.tool_name.clone(),
                        input: payload.input.clone(),
                        dynamic: true,
                    });
                }

                // A hosted tool can complete before any separate output
                // event arrives; both paths funnel into the same dedup set.
                if let ToolCallRaw::HostedToolCall { status, output, .. } = raw_item {
                    if status.as_deref() == Some("completed") {
                        if let Some(output) = output {
                            let tool_call_id = match &payload {
                                Some(p) => p.tool_call_id.clone(),
                                None => self.resolve_call_id(raw_item, &raw_item.tool_name()),
                            };
                            if self.emitted_tool_outputs.insert(tool_call_id.clone()) {
                                out.push(UiChunk::ToolOutputAvailable {
                                    tool_call_id,
                                    output: output.clone(),
                                    dynamic: true,
                                });
                            }
                        }
                    }
                }
            }
            RunItem::ToolCallOutput { raw_item, output } => {
                self.ensure_message_start(out);
                if let Some(call_id) = raw_item.call_id() {
                    let call_id = call_id.to_string();
                    let output = if output.is_null() {
                        raw_item.output.clone().unwrap_or(Value::Null)
                    } else {
                        output.clone()
                    };
                    if self.emitted_tool_outputs.insert(call_id.clone()) {
                        out.push(UiChunk::ToolOutputAvailable {
                            tool_call_id: call_id,
                            output,
                            dynamic: true,
                        });
                    }
                }
            }
            RunItem::ToolApproval {
                raw_item,
                tool_name,
            } => {
                self.ensure_message_start(out);
                let tool_call_id = raw_item
                    .call_id
                    .clone()
                    .or_else(|| raw_item.id.clone())
                    .unwrap_or_else(|| {
                        format!(
                            "{}-{}",
                            tool_name.as_deref().unwrap_or("tool"),
                            self.ids.generate("call")
                        )
                    });
                let approval_id = raw_item.id.clone().unwrap_or_else(|| tool_call_id.clone());
                out.push(UiChunk::ToolApprovalRequest {
                    tool_call_id,
                    approval_id,
                });
            }
            RunItem::Reasoning { raw_item } => {
                self.ensure_message_start(out);
                if let Some(text) = raw_item.joined_text() {
                    let id = self.ids.generate("reasoning");
                    out.push(UiChunk::ReasoningStart { id: id.clone() });
                    out.push(UiChunk::ReasoningDelta {
                        id: id.clone(),
                        delta: text,
                    });
                    out.push(UiChunk::ReasoningEnd { id });
                }
            }
            RunItem::Unknown => {}
        }
    }

    /// Flush at end of input: close any open text span and step, then
    /// emit the terminal `finish` chunk.
    pub fn finish(&mut self) -> Vec<UiChunk> {
        let mut out = Vec::new();
        self.close_text(&mut out);
        self.finish_step(&mut out);
        out.push(UiChunk::Finish {
            finish_reason: "stop".to_string(),
        });
        out
    }
}

struct StreamState<S> {
    events: Pin<Box<S>>,
    builder: UiMessageBuilder,
    pending: VecDeque<UiChunk>,
    finished: bool,
}

/// Wrap a run-event stream into a pull-driven UI chunk stream.
///
/// Upstream errors propagate as-is and terminate the stream without a
/// `finish` chunk.
pub fn ui_message_stream<S, E>(events: S) -> impl Stream<Item = Result<UiChunk, E>>
where
    S: Stream<Item = Result<RunEvent, E>> + Send,
{
    ui_message_stream_with(events, IdSource::random())
}

/// Like [`ui_message_stream`] with an explicit id source.
pub fn ui_message_stream_with<S, E>(
    events: S,
    ids: IdSource,
) -> impl Stream<Item = Result<UiChunk, E>>
where
    S: Stream<Item = Result<RunEvent, E>> + Send,
{
    let state = StreamState {
        events: Box::pin(events),
        builder: UiMessageBuilder::with_ids(ids),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.events.next().await {
                Some(Ok(event)) => {
                    state.pending.extend(state.builder.handle(&event));
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.pending.extend(state.builder.finish());
                    state.finished = true;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::event::{ReasoningContent, ReasoningRaw, TextDelta, ToolOutputRaw};
    use futures::TryStreamExt;

    fn builder() -> UiMessageBuilder {
        UiMessageBuilder::with_ids(IdSource::sequential())
    }

    fn text_delta(s: &str) -> RunEvent {
        RunEvent::RawModel {
            data: ModelStreamData::OutputTextDelta {
                delta: TextDelta::Plain(s.into()),
            },
        }
    }

    fn response_started() -> RunEvent {
        RunEvent::RawModel {
            data: ModelStreamData::ResponseStarted,
        }
    }

    fn response_done() -> RunEvent {
        RunEvent::RawModel {
            data: ModelStreamData::ResponseDone,
        }
    }

    fn function_call(call_id: &str) -> RunEvent {
        RunEvent::RunItem {
            item: RunItem::ToolCall {
                raw_item: ToolCallRaw::FunctionCall {
                    name: "search".into(),
                    arguments: r#"{"q":"x"}"#.into(),
                    call_id: Some(call_id.into()),
                    id: None,
                },
            },
        }
    }

    fn tool_output(call_id: &str) -> RunEvent {
        RunEvent::RunItem {
            item: RunItem::ToolCallOutput {
                raw_item: ToolOutputRaw {
                    call_id: Some(call_id.into()),
                    id: None,
                    output: None,
                },
                output: serde_json::json!("result"),
            },
        }
    }

    fn run(builder: &mut UiMessageBuilder, events: &[RunEvent]) -> Vec<UiChunk> {
        let mut chunks: Vec<UiChunk> = events.iter().flat_map(|e| builder.handle(e)).collect();
        chunks.extend(builder.finish());
        chunks
    }

    #[test]
    fn test_text_lifecycle() {
        let mut b = builder();
        let chunks = run(
            &mut b,
            &[
                response_started(),
                text_delta("Hel"),
                text_delta("lo"),
                response_done(),
            ],
        );

        assert_eq!(
            chunks,
            vec![
                UiChunk::Start {
                    message_id: "message-1".into()
                },
                UiChunk::StartStep,
                UiChunk::TextStart {
                    id: "text-2".into()
                },
                UiChunk::TextDelta {
                    id: "text-2".into(),
                    delta: "Hel".into()
                },
                UiChunk::TextDelta {
                    id: "text-2".into(),
                    delta: "lo".into()
                },
                UiChunk::TextEnd {
                    id: "text-2".into()
                },
                UiChunk::FinishStep,
                UiChunk::Finish {
                    finish_reason: "stop".into()
                },
            ]
        );
    }

    #[test]
    fn test_text_spans_never_overlap_and_always_close() {
        let mut b = builder();
        let chunks = run(
            &mut b,
            &[
                text_delta("a"),
                response_done(),
                response_started(),
                text_delta("b"),
            ],
        );

        let mut open: Option<String> = None;
        let mut spans = 0;
        for chunk in &chunks {
            match chunk {
                UiChunk::TextStart { id } => {
                    assert!(open.is_none(), "overlapping text spans");
                    open = Some(id.clone());
                    spans += 1;
                }
                UiChunk::TextEnd { id } => {
                    assert_eq!(open.take().as_deref(), Some(id.as_str()));
                }
                _ => {}
            }
        }
        assert!(open.is_none(), "unclosed text span at stream end");
        assert_eq!(spans, 2);
    }

    #[test]
    fn test_tool_input_start_once_and_before_available() {
        let mut b = builder();
        let chunks = run(&mut b, &[function_call("c1"), function_call("c1")]);

        let starts: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, UiChunk::ToolInputStart { .. }))
            .map(|(i, _)| i)
            .collect();
        let availables: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, UiChunk::ToolInputAvailable { .. }))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(starts.len(), 1);
        assert_eq!(availables.len(), 2);
        assert!(starts[0] < availables[0]);
    }

    #[test]
    fn test_tool_output_deduped_across_hosted_and_explicit_paths() {
        let hosted = RunEvent::RunItem {
            item: RunItem::ToolCall {
                raw_item: ToolCallRaw::HostedToolCall {
                    name: Some("browser".into()),
                    arguments: None,
                    status: Some("completed".into()),
                    output: Some(serde_json::json!("page text")),
                    id: Some("h1".into()),
                },
            },
        };

        let mut b = builder();
        let chunks = run(&mut b, &[hosted, tool_output("h1")]);

        let outputs: Vec<&UiChunk> = chunks
            .iter()
            .filter(|c| matches!(c, UiChunk::ToolOutputAvailable { .. }))
            .collect();
        assert_eq!(outputs.len(), 1);
        match outputs[0] {
            UiChunk::ToolOutputAvailable {
                tool_call_id,
                output,
                ..
            } => {
                assert_eq!(tool_call_id, "h1");
                assert_eq!(output, &serde_json::json!("page text"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_malformed_arguments_wrapped_as_raw() {
        let call = RunEvent::RunItem {
            item: RunItem::ToolCall {
                raw_item: ToolCallRaw::FunctionCall {
                    name: "search".into(),
                    arguments: "not json".into(),
                    call_id: Some("c1".into()),
                    id: None,
                },
            },
        };
        let mut b = builder();
        let chunks = b.handle(&call);
        let available = chunks
            .iter()
            .find_map(|c| match c {
                UiChunk::ToolInputAvailable { input, .. } => Some(input.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(available, serde_json::json!({ "raw": "not json" }));
    }

    #[test]
    fn test_step_close_deferred_until_text_status_known() {
        let mut b = builder();
        let mut chunks: Vec<UiChunk> = [response_started(), response_done()]
            .iter()
            .flat_map(|e| b.handle(e))
            .collect();
        // No text yet: the step must not close on response_done alone.
        assert!(!chunks.iter().any(|c| matches!(c, UiChunk::FinishStep)));

        // The message item materialized without deltas resolves it.
        chunks.extend(b.handle(&RunEvent::RunItem {
            item: RunItem::MessageOutput {
                content: "full message".into(),
            },
        }));
        let finish_pos = chunks
            .iter()
            .position(|c| matches!(c, UiChunk::FinishStep))
            .expect("step closed after fallback text");
        let text_end_pos = chunks
            .iter()
            .position(|c| matches!(c, UiChunk::TextEnd { .. }))
            .unwrap();
        assert!(text_end_pos < finish_pos);
    }

    #[test]
    fn test_message_output_after_streamed_text_not_duplicated() {
        let mut b = builder();
        let chunks = run(
            &mut b,
            &[
                response_started(),
                text_delta("streamed"),
                response_done(),
                RunEvent::RunItem {
                    item: RunItem::MessageOutput {
                        content: "streamed".into(),
                    },
                },
            ],
        );
        let text_starts = chunks
            .iter()
            .filter(|c| matches!(c, UiChunk::TextStart { .. }))
            .count();
        assert_eq!(text_starts, 1);
    }

    #[test]
    fn test_reasoning_precedes_tool_chunks() {
        let reasoning = RunEvent::RunItem {
            item: RunItem::Reasoning {
                raw_item: ReasoningRaw {
                    content: vec![ReasoningContent {
                        kind: "input_text".into(),
                        text: "thinking".into(),
                    }],
                },
            },
        };
        let mut b = builder();
        let chunks = run(&mut b, &[reasoning, function_call("c1")]);

        let reasoning_end = chunks
            .iter()
            .position(|c| matches!(c, UiChunk::ReasoningEnd { .. }))
            .unwrap();
        let tool_start = chunks
            .iter()
            .position(|c| matches!(c, UiChunk::ToolInputStart { .. }))
            .unwrap();
        assert!(reasoning_end < tool_start);
    }

    #[test]
    fn test_empty_reasoning_item_emits_nothing() {
        let reasoning = RunEvent::RunItem {
            item: RunItem::Reasoning {
                raw_item: ReasoningRaw { content: vec![] },
            },
        };
        let mut b = builder();
        // Only the message start may appear, no reasoning triple.
        let chunks = b.handle(&reasoning);
        assert!(chunks
            .iter()
            .all(|c| !matches!(c, UiChunk::ReasoningStart { .. })));
    }

    #[test]
    fn test_approval_request_ids_fall_back() {
        let approval = RunEvent::RunItem {
            item: RunItem::ToolApproval {
                raw_item: convoy_core::event::ApprovalRaw {
                    call_id: Some("c9".into()),
                    id: None,
                    name: None,
                    arguments: None,
                },
                tool_name: Some("getWeather".into()),
            },
        };
        let mut b = builder();
        let chunks = b.handle(&approval);
        assert!(chunks.contains(&UiChunk::ToolApprovalRequest {
            tool_call_id: "c9".into(),
            approval_id: "c9".into(),
        }));
    }

    #[test]
    fn test_replay_determinism_with_seeded_ids() {
        let events = vec![
            response_started(),
            text_delta("hi"),
            response_done(),
            function_call("c1"),
            tool_output("c1"),
        ];

        let mut first = builder();
        let mut second = builder();
        assert_eq!(run(&mut first, &events), run(&mut second, &events));
    }

    #[tokio::test]
    async fn test_stream_adapter_terminates_with_finish() {
        let events = futures::stream::iter(
            vec![
                Ok::<_, std::convert::Infallible>(response_started()),
                Ok(text_delta("hi")),
                Ok(response_done()),
            ]
            .into_iter(),
        );
        let chunks: Vec<UiChunk> = ui_message_stream_with(events, IdSource::sequential())
            .try_collect()
            .await
            .unwrap();
        assert!(matches!(
            chunks.last(),
            Some(UiChunk::Finish { finish_reason }) if finish_reason == "stop"
        ));
    }
}
