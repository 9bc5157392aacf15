use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::{Feature, FeatureMap, FeatureStatus};
use crate::pattern::PhaseName;
use crate::session::SessionState;

/// Every session state change produces an Event.
/// The presentation layer renders them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Initializing {
        pattern_id: String,
        at: DateTime<Utc>,
    },
    Ready {
        features: FeatureMap,
        warnings: Vec<String>,
        at: DateTime<Utc>,
    },
    Started {
        phase: PhaseName,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        phase: PhaseName,
        phase_index: usize,
        duration_ms: u64,
        cycle_count: u32,
        at: DateTime<Utc>,
    },
    CycleCompleted {
        cycle_count: u32,
        at: DateTime<Utc>,
    },
    Paused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// A feature changed status after negotiation (e.g. camera revoked).
    FeatureChanged {
        feature: Feature,
        status: FeatureStatus,
        at: DateTime<Utc>,
    },
    Completed {
        cycle_count: u32,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: SessionState,
        remaining_ms: Option<u64>,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Tag used when the event is serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Initializing { .. } => "Initializing",
            SessionEvent::Ready { .. } => "Ready",
            SessionEvent::Started { .. } => "Started",
            SessionEvent::PhaseChanged { .. } => "PhaseChanged",
            SessionEvent::CycleCompleted { .. } => "CycleCompleted",
            SessionEvent::Paused { .. } => "Paused",
            SessionEvent::Resumed { .. } => "Resumed",
            SessionEvent::FeatureChanged { .. } => "FeatureChanged",
            SessionEvent::Completed { .. } => "Completed",
            SessionEvent::Failed { .. } => "Failed",
            SessionEvent::StateSnapshot { .. } => "StateSnapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = SessionEvent::CycleCompleted {
            cycle_count: 3,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["cycle_count"], 3);
    }
}
