//! Deterministic runtimes: a fixed-script replay for tests and a
//! self-contained echo runtime so the gateway can run end-to-end
//! without the external SDK.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use convoy_core::event::{ModelStreamData, RunEvent, RunItem, TextDelta, ToolOutputRaw};
use convoy_core::history::HistoryItem;

use crate::{AgentRun, AgentRuntime, RunInput, RunOutcome};

/// Build an [`AgentRun`] that replays `events` and resolves `outcome`
/// once the stream is drained.
pub fn replay_run(events: Vec<RunEvent>, outcome: RunOutcome) -> AgentRun {
    let (tx, rx) = oneshot::channel();
    let stream = futures::stream::unfold(
        (events.into_iter(), Some((tx, outcome))),
        |(mut iter, mut fin)| async move {
            match iter.next() {
                Some(event) => Some((Ok(event), (iter, fin))),
                None => {
                    if let Some((tx, outcome)) = fin.take() {
                        let _ = tx.send(outcome);
                    }
                    None
                }
            }
        },
    );
    use futures::StreamExt;
    AgentRun::new(Box::pin(stream.fuse()), rx)
}

/// Replays one fixed event script regardless of input.
pub struct ScriptedRuntime {
    name: String,
    events: Vec<RunEvent>,
    outcome: RunOutcome,
}

impl ScriptedRuntime {
    pub fn new(name: impl Into<String>, events: Vec<RunEvent>, outcome: RunOutcome) -> Self {
        Self {
            name: name.into(),
            events,
            outcome,
        }
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_run(&self, _input: RunInput) -> anyhow::Result<AgentRun> {
        Ok(replay_run(self.events.clone(), self.outcome.clone()))
    }
}

/// Streams back a canned reply derived from the last user message.
pub struct EchoRuntime {
    name: String,
}

impl EchoRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

fn last_user_text(messages: &[HistoryItem]) -> Option<String> {
    messages.iter().rev().find_map(|item| match item {
        HistoryItem::Message { role, content, .. } if role == "user" => match content {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => {
                let text: String = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect();
                Some(text)
            }
            _ => None,
        },
        _ => None,
    })
}

fn text_delta_events(reply: &str) -> Vec<RunEvent> {
    let mut events = vec![RunEvent::RawModel {
        data: ModelStreamData::ResponseStarted,
    }];
    for piece in reply.split_inclusive(' ') {
        events.push(RunEvent::RawModel {
            data: ModelStreamData::OutputTextDelta {
                delta: TextDelta::Plain(piece.to_string()),
            },
        });
    }
    events.push(RunEvent::RawModel {
        data: ModelStreamData::ResponseDone,
    });
    events.push(RunEvent::RunItem {
        item: RunItem::MessageOutput {
            content: reply.to_string(),
        },
    });
    events
}

#[async_trait]
impl AgentRuntime for EchoRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_run(&self, input: RunInput) -> anyhow::Result<AgentRun> {
        match input {
            RunInput::Messages(mut messages) => {
                let prompt = last_user_text(&messages).unwrap_or_default();
                let reply = if prompt.is_empty() {
                    "Hello! How can I help?".to_string()
                } else {
                    format!("You said: {prompt}")
                };

                let events = text_delta_events(&reply);
                messages.push(HistoryItem::assistant_text(reply.clone()));
                Ok(replay_run(
                    events,
                    RunOutcome {
                        final_output: Some(reply),
                        history: messages,
                        interruptions: vec![],
                        state: None,
                    },
                ))
            }
            RunInput::Resume(state) => {
                let mut history = state.history.clone();
                let mut events = Vec::new();

                for pending in &state.pending {
                    let Some(decision) = pending.decision else {
                        continue;
                    };
                    let output = match decision {
                        convoy_core::history::Decision::Approved => "ok",
                        convoy_core::history::Decision::Rejected => "rejected by user",
                    };
                    events.push(RunEvent::RunItem {
                        item: RunItem::ToolCallOutput {
                            raw_item: ToolOutputRaw {
                                call_id: Some(pending.approval.call_id.clone()),
                                id: None,
                                output: Some(Value::String(output.into())),
                            },
                            output: Value::String(output.into()),
                        },
                    });
                    history.push(HistoryItem::FunctionCallResult {
                        call_id: pending.approval.call_id.clone(),
                        output: Value::String(output.into()),
                    });
                }

                let remaining = state.interruptions();
                if !remaining.is_empty() {
                    // Still waiting on undecided approvals: pause again.
                    return Ok(replay_run(
                        events,
                        RunOutcome {
                            final_output: None,
                            history: history.clone(),
                            interruptions: remaining,
                            state: Some(crate::RunState::new(history, state.interruptions())),
                        },
                    ));
                }

                let reply = "Done.".to_string();
                events.extend(text_delta_events(&reply));
                history.push(HistoryItem::assistant_text(reply.clone()));
                Ok(replay_run(
                    events,
                    RunOutcome {
                        final_output: Some(reply),
                        history,
                        interruptions: vec![],
                        state: None,
                    },
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_echo_streams_deltas_then_completes() {
        let runtime = EchoRuntime::new("Echo");
        let run = runtime
            .start_run(RunInput::Messages(vec![HistoryItem::user_text("hi")]))
            .await
            .unwrap();

        let mut run = run;
        let events: Vec<RunEvent> = (&mut run.events).try_collect().await.unwrap();
        assert!(matches!(
            events.first(),
            Some(RunEvent::RawModel {
                data: ModelStreamData::ResponseStarted
            })
        ));

        let outcome = run.completed().await.unwrap();
        assert_eq!(outcome.final_output.as_deref(), Some("You said: hi"));
        assert!(outcome.history.last().unwrap().is_assistant_message());
        assert!(!outcome.is_interrupted());
    }

    #[tokio::test]
    async fn test_scripted_replay_is_deterministic() {
        let script = text_delta_events("a b");
        let outcome = RunOutcome {
            final_output: Some("a b".into()),
            history: vec![],
            interruptions: vec![],
            state: None,
        };
        let runtime = ScriptedRuntime::new("Scripted", script, outcome);

        let mut frames = Vec::new();
        for _ in 0..2 {
            let run = runtime
                .start_run(RunInput::Messages(vec![]))
                .await
                .unwrap();
            let mut run = run;
            let events: Vec<RunEvent> = (&mut run.events).try_collect().await.unwrap();
            frames.push(serde_json::to_string(&events).unwrap());
        }
        assert_eq!(frames[0], frames[1]);
    }
}
