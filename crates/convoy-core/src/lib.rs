//! Core types, config, errors, run-event model, and state store for Convoy.

pub mod config;
pub mod error;
pub mod event;
pub mod history;
pub mod store;

pub use error::{ConvoyError, Result};
pub use history::new_conversation_id;
