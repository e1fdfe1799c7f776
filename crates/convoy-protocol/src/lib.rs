//! Streaming protocol adapters.
//!
//! Two producers translate the run-event sequence of an agent run into
//! wire protocols — named SSE frames ([`sse`]) and the UI message
//! chunk protocol ([`ui_stream`]) — and two consumers go the other
//! way: a generic SSE byte-stream parser ([`wire`]) and a pure reducer
//! that folds parsed frames into display state ([`reassembler`]).

pub mod reassembler;
pub mod sse;
pub mod ui_stream;
pub mod wire;

pub use sse::{encode_run_event, SseFrame};
pub use ui_stream::{ui_message_stream, IdSource, UiChunk, UiMessageBuilder};
