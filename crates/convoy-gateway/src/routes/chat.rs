//! `POST /api/chat` — the conversation as a UI message stream.
//!
//! Same request body as `/api/basic`; the response renders each UI
//! chunk as an SSE data frame (`data: <json>`) and terminates with
//! `data: [DONE]`, advertised through the
//! `x-vercel-ai-ui-message-stream: v1` header.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::warn;

use convoy_agent::RunOutcome;
use convoy_core::ConvoyError;
use convoy_protocol::ui_stream::{ui_message_stream, UiChunk};

use crate::routes::{agent, persist_interruption, prepare_run, ConversationRequest};
use crate::state::GatewayState;

const STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

pub async fn handle(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<ConversationRequest>,
) -> Response {
    let service = agent(&state).await;

    let prepared = match prepare_run(&state, &request).await {
        Ok(prepared) => prepared,
        Err(ConvoyError::ConversationNotFound) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Conversation not found" })),
            )
                .into_response();
        }
        Err(e) => {
            warn!(%e, "chat request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };
    let conversation_id = prepared.conversation_id;

    let run = match service.runtime.start_run(prepared.input).await {
        Ok(run) => run,
        Err(e) => {
            warn!(%e, "agent run failed to start");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };
    let (events, outcome) = run.into_parts();

    let session = ChatSession {
        state,
        conversation_id,
        chunks: Box::pin(ui_message_stream(events)),
        outcome: Some(outcome),
        pending: VecDeque::new(),
        phase: Phase::Chunks,
    };

    let frames = futures::stream::unfold(session, |mut session| async move {
        loop {
            if let Some(frame) = session.pending.pop_front() {
                return Some((Ok::<_, std::convert::Infallible>(frame), session));
            }
            match session.phase {
                Phase::Chunks => match session.chunks.next().await {
                    Some(Ok(chunk)) => session.push_chunk(&chunk),
                    Some(Err(e)) => {
                        // Upstream failure truncates the stream: no
                        // finish chunk, no terminator.
                        warn!(%e, "agent event stream failed");
                        session.phase = Phase::Closed;
                    }
                    None => session.phase = Phase::Settle,
                },
                Phase::Settle => {
                    session.settle().await;
                    session.pending.push_back("data: [DONE]\n\n".to_string());
                    session.phase = Phase::Closed;
                }
                Phase::Closed => return None,
            }
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(STREAM_HEADER, "v1")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

enum Phase {
    Chunks,
    Settle,
    Closed,
}

struct ChatSession {
    state: Arc<GatewayState>,
    conversation_id: String,
    chunks: Pin<Box<dyn Stream<Item = anyhow::Result<UiChunk>> + Send>>,
    outcome: Option<oneshot::Receiver<RunOutcome>>,
    pending: VecDeque<String>,
    phase: Phase,
}

impl ChatSession {
    fn push_chunk(&mut self, chunk: &UiChunk) {
        match serde_json::to_string(chunk) {
            Ok(json) => self.pending.push_back(format!("data: {json}\n\n")),
            Err(e) => warn!(%e, "unserializable UI chunk dropped"),
        }
    }

    /// Persist the pause point when the run ended interrupted, so a
    /// later `/api/basic` decisions request can resume it.
    async fn settle(&mut self) {
        let Some(rx) = self.outcome.take() else {
            return;
        };
        let Ok(outcome) = rx.await else {
            return;
        };
        if outcome.is_interrupted() {
            if let Err(e) =
                persist_interruption(&self.state, &self.conversation_id, &outcome.state).await
            {
                warn!(%e, "failed to persist interrupted run state");
            }
        }
    }
}
