//! Serialized run state for interrupted runs.
//!
//! When a run pauses on tool approvals, its resumable pause point is
//! serialized and persisted under the conversation id. A follow-up
//! request carrying decisions loads it, applies each decision against
//! the pending approvals by `callId`, and resumes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use convoy_core::error::{ConvoyError, Result};
use convoy_core::history::{Decision, HistoryItem, PendingApproval};

/// A pending approval together with its (eventual) decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecision {
    #[serde(flatten)]
    pub approval: PendingApproval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

/// The resumable pause point of an interrupted run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub pending: Vec<PendingDecision>,
}

impl RunState {
    pub fn new(history: Vec<HistoryItem>, approvals: Vec<PendingApproval>) -> Self {
        Self {
            history,
            pending: approvals
                .into_iter()
                .map(|approval| PendingDecision {
                    approval,
                    decision: None,
                })
                .collect(),
        }
    }

    pub fn from_string(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(ConvoyError::Json)
    }

    pub fn to_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ConvoyError::Json)
    }

    /// The approvals still awaiting a decision.
    pub fn interruptions(&self) -> Vec<PendingApproval> {
        self.pending
            .iter()
            .filter(|p| p.decision.is_none())
            .map(|p| p.approval.clone())
            .collect()
    }

    /// Apply client decisions, matching by `callId`. Unknown ids are
    /// ignored; a decision never overrides one already recorded.
    pub fn apply_decisions(&mut self, decisions: &HashMap<String, Decision>) {
        for pending in &mut self.pending {
            if pending.decision.is_some() {
                continue;
            }
            if let Some(decision) = decisions.get(&pending.approval.call_id) {
                pending.decision = Some(*decision);
            }
        }
    }
}
