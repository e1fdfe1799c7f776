//! Request handlers.

pub mod agent;
pub mod basic;
pub mod chat;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use convoy_agent::init::AgentService;
use convoy_agent::{RunInput, RunState};
use convoy_core::history::{new_conversation_id, Decision, HistoryItem};
use convoy_core::ConvoyError;

use crate::state::GatewayState;

/// Request body shared by `/api/basic` and `/api/chat`.
#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<HistoryItem>,
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub decisions: Option<HashMap<String, Decision>>,
    #[serde(default)]
    pub stream: bool,
}

/// Clients may post bare `{role, content}` message items without the
/// `type` tag; those are accepted as messages, matching the upstream
/// SDK's lenient input shape.
fn deserialize_messages<'de, D>(deserializer: D) -> Result<Vec<HistoryItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|mut value| {
            if let Value::Object(map) = &mut value {
                if !map.contains_key("type") && map.contains_key("role") {
                    map.insert("type".into(), Value::String("message".into()));
                }
            }
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        })
        .collect()
}

/// A resolved request: the conversation id to answer under and the
/// input to hand the runtime.
pub struct PreparedRun {
    pub conversation_id: String,
    pub input: RunInput,
}

/// Resolve a request into run input.
///
/// A non-empty `decisions` map together with a client-sent conversation
/// id means the request resumes a paused run: the persisted state is
/// loaded (missing state is the distinct `ConversationNotFound`
/// condition), decisions are applied by call id, and the runtime resumes
/// from there. Anything else starts fresh from `messages`.
pub async fn prepare_run(
    state: &Arc<GatewayState>,
    request: &ConversationRequest,
) -> Result<PreparedRun, ConvoyError> {
    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(new_conversation_id);

    let decisions = request.decisions.clone().unwrap_or_default();
    let input = if !decisions.is_empty() && request.conversation_id.is_some() {
        let stored = state
            .store
            .get(&conversation_id)
            .await?
            .ok_or(ConvoyError::ConversationNotFound)?;
        let mut run_state = RunState::from_string(&stored)?;
        run_state.apply_decisions(&decisions);
        RunInput::Resume(run_state)
    } else {
        RunInput::Messages(request.messages.clone())
    };

    Ok(PreparedRun {
        conversation_id,
        input,
    })
}

/// Persist the pause point of an interrupted run. Last writer for a
/// conversation id wins; there is no concurrency check.
pub async fn persist_interruption(
    state: &Arc<GatewayState>,
    conversation_id: &str,
    run_state: &Option<RunState>,
) -> Result<(), ConvoyError> {
    if let Some(run_state) = run_state {
        state
            .store
            .set(conversation_id, run_state.to_string()?)
            .await?;
    }
    Ok(())
}

/// Warm and fetch the agent singleton.
pub async fn agent(state: &Arc<GatewayState>) -> Arc<AgentService> {
    state.agent().await
}
