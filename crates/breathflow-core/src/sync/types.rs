//! Core types for session synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current sync status, derived from the store on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// Sessions not yet accepted by the remote store, failed ones included.
    pub pending_count: usize,
    /// The part of `pending_count` past the rejection limit, retried last.
    pub failed_count: usize,
    /// Whether a sync pass is currently in progress.
    pub in_progress: bool,
    /// Last completed sync pass.
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Remote verdict for a single pushed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PushResult {
    Accepted,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub session_id: String,
    #[serde(flatten)]
    pub result: PushResult,
}

impl PushOutcome {
    pub fn accepted(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            result: PushResult::Accepted,
        }
    }

    pub fn rejected(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            result: PushResult::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.result, PushResult::Accepted)
    }
}

/// Summary of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub rejected: usize,
    /// Rejections that pushed a session over the rejection limit.
    pub newly_failed: usize,
    /// The pass was skipped because another one was running.
    pub skipped: bool,
}
