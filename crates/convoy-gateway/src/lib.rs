//! HTTP gateway exposing agent runs as conversation streams.
//!
//! One logical flow per request: resolve the input (fresh messages or
//! a resumed pause point), start a run, translate its event sequence
//! onto the wire, persist the pause point when the run interrupts.
//! The only cross-request state is the memoized agent singleton and
//! the external run-state store.

pub mod routes;
pub mod server;
pub mod state;

pub use server::{router, start_gateway};
pub use state::GatewayState;
