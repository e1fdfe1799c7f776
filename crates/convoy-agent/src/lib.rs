//! The agent-runtime seam.
//!
//! The actual planning loop, model invocation, and tool dispatch live
//! in an external runtime consumed through the [`AgentRuntime`] trait:
//! one call starts a run, the run yields an ordered stream of
//! [`RunEvent`]s, and once the stream is exhausted a [`RunOutcome`]
//! describes how the run ended (final output, authoritative history,
//! and any pending tool approvals).

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;

use convoy_core::event::RunEvent;
use convoy_core::history::{HistoryItem, PendingApproval};

pub mod init;
pub mod scripted;
pub mod state;

pub use state::RunState;

/// The ordered event sequence of one agent run.
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<RunEvent>> + Send>>;

/// Input to a run: fresh messages, or a resumed pause point.
#[derive(Debug, Clone)]
pub enum RunInput {
    Messages(Vec<HistoryItem>),
    Resume(RunState),
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final assistant output text, when the run completed.
    pub final_output: Option<String>,
    /// Authoritative full history after this run.
    pub history: Vec<HistoryItem>,
    /// Tool calls paused on approval. Non-empty means the run is
    /// interrupted, and `state` carries the resumable pause point.
    pub interruptions: Vec<PendingApproval>,
    pub state: Option<RunState>,
}

impl RunOutcome {
    pub fn is_interrupted(&self) -> bool {
        !self.interruptions.is_empty()
    }
}

/// A started run: an event stream plus its eventual outcome.
///
/// The outcome resolves only after the event stream has been fully
/// consumed. Dropping the stream early is the cancellation path; the
/// runtime stops producing on a best-effort basis.
pub struct AgentRun {
    pub events: EventStream,
    outcome: oneshot::Receiver<RunOutcome>,
}

impl AgentRun {
    pub fn new(events: EventStream, outcome: oneshot::Receiver<RunOutcome>) -> Self {
        Self { events, outcome }
    }

    /// Split into the event stream and the outcome receiver, for
    /// callers that forward events incrementally.
    pub fn into_parts(self) -> (EventStream, oneshot::Receiver<RunOutcome>) {
        (self.events, self.outcome)
    }

    /// Drain any remaining events and wait for the outcome.
    pub async fn completed(mut self) -> anyhow::Result<RunOutcome> {
        while let Some(event) = self.events.next().await {
            event?;
        }
        self.outcome
            .await
            .map_err(|_| anyhow::anyhow!("agent run ended without an outcome"))
    }
}

/// The external agent runtime, consumed as a black box.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runtime display name (reported in `agent_update` frames).
    fn name(&self) -> &str;

    /// Start one run. Each run gets its own event stream and outcome;
    /// nothing is shared between runs.
    async fn start_run(&self, input: RunInput) -> anyhow::Result<AgentRun>;
}
