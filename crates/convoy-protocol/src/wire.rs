//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts any byte-chunk stream into a `Stream<Item = SseMessage>`.
//! Transport-agnostic on purpose: the gateway tests feed it captured
//! bodies and the CLI feeds it `reqwest` response chunks.

use std::pin::Pin;

use futures::{Stream, StreamExt};

/// A parsed SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

struct ParseState<S> {
    chunks: Pin<Box<S>>,
    // Raw bytes, decoded only at line granularity: a multi-byte
    // character split across two chunks stays intact in the buffer
    // until its line completes.
    buffer: Vec<u8>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
}

impl<S> ParseState<S> {
    fn dispatch(&mut self) -> Option<SseMessage> {
        if self.current_data.is_empty() {
            return None;
        }
        let message = SseMessage {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(message)
    }
}

/// Parse a stream of byte chunks as SSE messages.
///
/// Partial lines are accumulated across chunk boundaries; CRLF line
/// endings, `:` comment lines, and multi-line `data:` fields follow
/// the SSE wire format. A message with buffered data but no trailing
/// blank line is still dispatched when the input ends.
pub fn parse_sse_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<SseMessage, E>>
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]>,
{
    let state = ParseState {
        chunks: Box::pin(chunks),
        buffer: Vec::new(),
        current_event: None,
        current_data: Vec::new(),
        current_id: None,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            // Drain complete lines out of the buffer first.
            if let Some(newline_pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let mut raw: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                raw.pop();
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                let line = String::from_utf8_lossy(&raw).into_owned();

                if line.is_empty() {
                    if let Some(message) = state.dispatch() {
                        return Some((Ok(message), state));
                    }
                    continue;
                }

                if line.starts_with(':') {
                    continue;
                }

                if let Some(value) = line.strip_prefix("event:") {
                    state.current_event = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    state.current_data.push(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("id:") {
                    state.current_id = Some(value.trim_start().to_string());
                }
                // Unknown fields are ignored.
                continue;
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                }
                Some(Err(e)) => return Some((Err(e), state)),
                None => {
                    return state.dispatch().map(|message| (Ok(message), state));
                }
            }
        }
    })
}
