use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    /// Rejected `max_attempts` times. Still unacknowledged and still
    /// retried, after the other pending sessions.
    Failed,
}

/// A finished session, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub pattern_id: String,
    pub pattern_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub cycle_count: u32,
    pub breath_hold_time_ms: u64,
    pub restlessness_score: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    pub pattern_id: String,
    pub pattern_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub cycle_count: u32,
    pub breath_hold_time_ms: u64,
    pub restlessness_score: f64,
    pub completed: bool,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl StoredSession {
    pub fn from_new(id: String, session: NewSession) -> Self {
        Self {
            id,
            pattern_id: session.pattern_id,
            pattern_name: session.pattern_name,
            start_time: session.start_time,
            end_time: session.end_time,
            duration_ms: session.duration_ms,
            cycle_count: session.cycle_count,
            breath_hold_time_ms: session.breath_hold_time_ms,
            // JSON has no NaN; a non-finite score would make the row unreadable.
            restlessness_score: if session.restlessness_score.is_finite() {
                session.restlessness_score
            } else {
                0.0
            },
            completed: session.completed,
            sync_state: SyncState::Pending,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_records_start_pending() {
        let now = Utc::now();
        let record = StoredSession::from_new(
            "abc".into(),
            NewSession {
                pattern_id: "box".into(),
                pattern_name: "Box Breathing".into(),
                start_time: now,
                end_time: now,
                duration_ms: 32_000,
                cycle_count: 2,
                breath_hold_time_ms: 8_000,
                restlessness_score: 0.0,
                completed: true,
            },
        );
        assert_eq!(record.sync_state, SyncState::Pending);
        assert_eq!(record.duration_secs(), 32.0);
    }

    #[test]
    fn missing_sync_state_defaults_to_pending() {
        let json = serde_json::json!({
            "id": "x",
            "pattern_id": "box",
            "pattern_name": "Box",
            "start_time": "2025-02-25T12:00:00Z",
            "end_time": "2025-02-25T12:00:32Z",
            "duration_ms": 32000,
            "cycle_count": 2,
            "breath_hold_time_ms": 0,
            "restlessness_score": 0.0,
            "completed": true
        });
        let record: StoredSession = serde_json::from_value(json).unwrap();
        assert_eq!(record.sync_state, SyncState::Pending);
    }
}
