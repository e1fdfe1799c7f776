//! `POST /api/basic` — the conversation endpoint.
//!
//! Streaming mode answers with named SSE frames (`init`, encoder
//! frames per run event, then `interruption`/`done`/`error`).
//! Non-streaming mode runs to completion and answers with a single
//! JSON body.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::error;

use convoy_agent::{EventStream, RunInput, RunOutcome};
use convoy_core::ConvoyError;
use convoy_protocol::sse::{encode_run_event, SseFrame};

use crate::routes::{agent, persist_interruption, prepare_run, ConversationRequest};
use crate::state::GatewayState;

pub async fn handle(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<ConversationRequest>,
) -> Response {
    if request.stream {
        handle_streaming(state, request).await
    } else {
        handle_blocking(state, request).await
    }
}

async fn handle_blocking(state: Arc<GatewayState>, request: ConversationRequest) -> Response {
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
        Err(e) => return internal_error(e.to_string()),
    };
    let conversation_id = prepared.conversation_id;

    let outcome = match service.runtime.start_run(prepared.input).await {
        Ok(run) => match run.completed().await {
            Ok(outcome) => outcome,
            Err(e) => return internal_error(e.to_string()),
        },
        Err(e) => return internal_error(e.to_string()),
    };

    if outcome.is_interrupted() {
        if let Err(e) = persist_interruption(&state, &conversation_id, &outcome.state).await {
            return internal_error(e.to_string());
        }
        return Json(json!({
            "conversationId": conversation_id,
            "approvals": outcome.interruptions,
            "history": outcome.history,
        }))
        .into_response();
    }

    Json(json!({
        "response": outcome.final_output,
        "history": outcome.history,
        "conversationId": conversation_id,
    }))
    .into_response()
}

fn internal_error(message: String) -> Response {
    error!(%message, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

enum Phase {
    Start,
    Events,
    Finalize,
    Closed,
}

struct SseSession {
    state: Arc<GatewayState>,
    request: ConversationRequest,
    conversation_id: String,
    events: Option<EventStream>,
    outcome: Option<oneshot::Receiver<RunOutcome>>,
    pending: VecDeque<SseFrame>,
    phase: Phase,
}

async fn handle_streaming(state: Arc<GatewayState>, request: ConversationRequest) -> Response {
    let session = SseSession {
        state,
        request,
        conversation_id: String::new(),
        events: None,
        outcome: None,
        pending: VecDeque::new(),
        phase: Phase::Start,
    };

    // Pull-driven: the next run event is only consumed once the HTTP
    // sink has accepted the previous frame. Dropping the body (client
    // abort) drops the event stream, which is the best-effort cancel.
    let frames = futures::stream::unfold(session, |mut session| async move {
        loop {
            if let Some(frame) = session.pending.pop_front() {
                return Some((
                    Ok::<_, std::convert::Infallible>(frame.to_wire()),
                    session,
                ));
            }
            match session.phase {
                Phase::Start => {
                    if let Err(frame) = session.start().await {
                        session.pending.push_back(frame);
                        session.phase = Phase::Closed;
                    } else {
                        session.phase = Phase::Events;
                    }
                }
                Phase::Events => match session.next_event().await {
                    Some(Ok(event)) => session.pending.extend(encode_run_event(&event)),
                    Some(Err(e)) => {
                        session.pending.push_back(SseFrame::error(&e.to_string()));
                        session.phase = Phase::Closed;
                    }
                    None => session.phase = Phase::Finalize,
                },
                Phase::Finalize => {
                    let frame = session.finalize().await;
                    session.pending.push_back(frame);
                    session.phase = Phase::Closed;
                }
                Phase::Closed => return None,
            }
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

impl SseSession {
    /// Emit `init`, resolve the input, and start the run. The id frame
    /// goes out before the not-found check, so a failed resume still
    /// reaches the client as an `error` frame on an open stream.
    async fn start(&mut self) -> Result<(), SseFrame> {
        let service = agent(&self.state).await;

        let prepared = prepare_run(&self.state, &self.request)
            .await
            .map_err(|e| match e {
                ConvoyError::ConversationNotFound => SseFrame::error("Conversation not found"),
                other => SseFrame::error(&other.to_string()),
            });

        // The minted id is known even when preparation failed on a
        // client-sent one.
        self.conversation_id = match &prepared {
            Ok(p) => p.conversation_id.clone(),
            Err(_) => self.request.conversation_id.clone().unwrap_or_default(),
        };
        self.pending.push_front(SseFrame::init(&self.conversation_id));

        let input: RunInput = prepared?.input;
        let run = service
            .runtime
            .start_run(input)
            .await
            .map_err(|e| SseFrame::error(&e.to_string()))?;
        let (events, outcome) = run.into_parts();
        self.events = Some(events);
        self.outcome = Some(outcome);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<anyhow::Result<convoy_core::event::RunEvent>> {
        self.events.as_mut()?.next().await
    }

    /// The run's terminal frame. The persistence write for an
    /// interruption is awaited before the frame is released; a slow
    /// store back-pressures the stream by design of the contract.
    async fn finalize(&mut self) -> SseFrame {
        let outcome = match self.outcome.take() {
            Some(rx) => rx.await,
            None => return SseFrame::error("agent run ended without an outcome"),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => return SseFrame::error("agent run ended without an outcome"),
        };

        if outcome.is_interrupted() {
            if let Err(e) =
                persist_interruption(&self.state, &self.conversation_id, &outcome.state).await
            {
                return SseFrame::error(&e.to_string());
            }
            SseFrame::interruption(&outcome.interruptions, &outcome.history)
        } else {
            SseFrame::done(outcome.final_output.as_deref(), &outcome.history)
        }
    }
}
