use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FeatureMap;
use crate::pattern::PhaseName;

/// Lifecycle of one session.
///
/// ```text
/// Setup -> Initializing -> Ready -> Active <-> Paused -> Complete
///                  \______________________________\----> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Setup,
    Initializing,
    Ready,
    Active,
    Paused,
    Complete,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Error)
    }

    /// Active or paused.
    pub fn is_running(&self) -> bool {
        matches!(self, SessionPhase::Active | SessionPhase::Paused)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Setup => "setup",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Ready => "ready",
            SessionPhase::Active => "active",
            SessionPhase::Paused => "paused",
            SessionPhase::Complete => "complete",
            SessionPhase::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub current_phase: Option<PhaseName>,
    pub cycle_count: u32,
    /// Active time only; paused intervals never count.
    pub duration_ms: u64,
}

impl SessionData {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session_data: SessionData,
    pub features: FeatureMap,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}
