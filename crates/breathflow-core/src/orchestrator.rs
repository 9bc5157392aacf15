//! Session orchestration: variant selection, feature constraints, target
//! cycles and end-of-session metrics.
//!
//! The orchestrator wraps one `SessionMachine` and is the surface a
//! presentation layer talks to. It never renders anything; callers poll
//! `tick()` and render the returned events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::TimeSource;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::features::{probe_capabilities, CapabilityProbe, Feature, FeatureRequest, FeatureStatus};
use crate::pattern::BreathingPattern;
use crate::session::{SessionMachine, SessionPhase, SessionState};
use crate::store::{NewSession, OfflineSessionStore};
use crate::vision::{FrameMetrics, VisionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionVariant {
    /// Timer and audio only.
    Classic,
    /// Camera and AI feedback allowed.
    Enhanced,
    /// Touch-first interface; camera allowed, no AI feedback.
    Mobile,
}

impl std::fmt::Display for SessionVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionVariant::Classic => "classic",
            SessionVariant::Enhanced => "enhanced",
            SessionVariant::Mobile => "mobile",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SessionVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(SessionVariant::Classic),
            "enhanced" => Ok(SessionVariant::Enhanced),
            "mobile" => Ok(SessionVariant::Mobile),
            other => Err(format!("unknown session variant '{other}'")),
        }
    }
}

impl SessionVariant {
    /// Restrict a feature request to what this variant supports.
    /// Returns the narrowed request and an advisory per dropped feature.
    pub fn constrain(&self, request: FeatureRequest) -> (FeatureRequest, Vec<String>) {
        let mut warnings = Vec::new();
        let constrained = match self {
            SessionVariant::Enhanced => request,
            SessionVariant::Mobile => {
                if request.ai {
                    warnings.push("AI feedback is not available in the mobile session".to_string());
                }
                FeatureRequest {
                    ai: false,
                    ..request
                }
            }
            SessionVariant::Classic => {
                if request.camera || request.ai {
                    warnings.push(
                        "camera and AI feedback are not available in the classic session"
                            .to_string(),
                    );
                }
                FeatureRequest {
                    camera: false,
                    ai: false,
                    audio: request.audio,
                }
            }
        };
        (constrained, warnings)
    }
}

/// How the presentation layer should lay the session out. Carried through
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Standard,
    Minimal,
    Immersive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub pattern: BreathingPattern,
    pub features: FeatureRequest,
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Stop automatically after this many cycles.
    #[serde(default)]
    pub target_cycles: Option<u32>,
}

impl SessionConfig {
    pub fn new(pattern: BreathingPattern) -> Self {
        Self {
            pattern,
            features: FeatureRequest::none(),
            display_mode: DisplayMode::default(),
            target_cycles: None,
        }
    }
}

/// Inputs to variant selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlow {
    pub requested: Option<SessionVariant>,
    pub allow_mobile: bool,
    pub touch_capable: bool,
}

/// Explicit enhanced wins, then mobile on touch devices, then classic.
pub fn select_variant(flow: &SessionFlow) -> SessionVariant {
    match flow.requested {
        Some(SessionVariant::Enhanced) => SessionVariant::Enhanced,
        requested
            if (requested == Some(SessionVariant::Mobile) || flow.allow_mobile)
                && flow.touch_capable =>
        {
            SessionVariant::Mobile
        }
        _ => SessionVariant::Classic,
    }
}

/// End-of-session figures. Variants without camera or AI report neutral
/// values rather than omitting fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub breath_hold_time_ms: u64,
    /// 0 ..= 100; 0 when the camera was not used.
    pub restlessness_score: f64,
    pub cycle_count: u32,
    pub elapsed_ms: u64,
    pub session_type: SessionVariant,
    pub camera_used: bool,
    pub ai_used: bool,
}

pub struct SessionOrchestrator<T: TimeSource> {
    config: SessionConfig,
    variant: SessionVariant,
    machine: SessionMachine<T>,
    vision: VisionTracker,
    camera_used: bool,
    ai_used: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    saved_id: Option<String>,
}

impl<T: TimeSource> SessionOrchestrator<T> {
    pub fn new(config: SessionConfig, flow: SessionFlow, time: T) -> Self {
        let variant = select_variant(&flow);
        tracing::debug!(%variant, ?flow, "session variant selected");
        Self {
            config,
            variant,
            machine: SessionMachine::new(time),
            vision: VisionTracker::new(),
            camera_used: false,
            ai_used: false,
            started_at: None,
            ended_at: None,
            saved_id: None,
        }
    }

    pub fn variant(&self) -> SessionVariant {
        self.variant
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn machine(&self) -> &SessionMachine<T> {
        &self.machine
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub fn snapshot_event(&self) -> SessionEvent {
        self.machine.snapshot_event()
    }

    /// Initialize the session: narrow the request to the variant, probe the
    /// remaining features and negotiate. Ends `Ready` (or `Error`).
    pub async fn prepare(
        &mut self,
        probe: &dyn CapabilityProbe,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let (request, advisories) = self.variant.constrain(self.config.features);
        let initializing = self.machine.initialize(self.config.pattern.clone(), request)?;
        for advisory in advisories {
            self.machine.note_warning(advisory);
        }
        self.vision = VisionTracker::new();
        self.camera_used = false;
        self.ai_used = false;
        self.started_at = None;
        self.ended_at = None;
        self.saved_id = None;

        let caps = probe_capabilities(probe, &request).await;
        let ready = self.machine.finish_initialization(&caps)?;
        Ok(vec![initializing, ready])
    }

    pub fn start(&mut self) -> Result<SessionEvent, SessionError> {
        self.machine.set_cycle_limit(self.config.target_cycles);
        let event = self.machine.start()?;
        let features = self.machine.state().features;
        self.camera_used = features.is_active(Feature::Camera);
        self.ai_used = features.is_active(Feature::Ai);
        self.started_at = Some(Utc::now());
        Ok(event)
    }

    /// Advance the session. It completes on its own at the target cycle
    /// count, ending at that cycle's deadline even if this call is late.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let events = self.machine.tick();
        self.note_end();
        events
    }

    pub fn pause(&mut self) -> Vec<SessionEvent> {
        let events = self.machine.pause();
        self.note_end();
        events
    }

    pub fn resume(&mut self) -> Option<SessionEvent> {
        let event = self.machine.resume();
        self.note_end();
        event
    }

    pub fn stop(&mut self) -> Vec<SessionEvent> {
        let events = self.machine.stop();
        self.note_end();
        events
    }

    pub fn report_feature_failure(
        &mut self,
        feature: Feature,
        reason: impl Into<String>,
    ) -> Option<SessionEvent> {
        self.machine.report_feature_failure(feature, reason)
    }

    /// Feed one camera frame. Ignored unless the camera is active and the
    /// session is running.
    pub fn record_frame(&mut self, frame: FrameMetrics) -> bool {
        let accepting = self.machine.phase() == SessionPhase::Active
            && self.machine.state().features.get(Feature::Camera) == FeatureStatus::Active;
        if accepting {
            self.vision.record(frame);
        }
        accepting
    }

    pub fn vision(&self) -> &VisionTracker {
        &self.vision
    }

    pub fn target_reached(&self) -> bool {
        let cycles = self.machine.state().session_data.cycle_count;
        self.config.target_cycles.is_some_and(|target| cycles >= target)
    }

    pub fn metrics(&self) -> SessionMetrics {
        let snapshot = self.machine.snapshot();
        let restlessness_score = if self.camera_used && !self.vision.is_empty() {
            self.vision.summary().restlessness_score
        } else {
            0.0
        };
        SessionMetrics {
            breath_hold_time_ms: self.machine.breath_hold_ms(),
            restlessness_score,
            cycle_count: snapshot.session_data.cycle_count,
            elapsed_ms: snapshot.session_data.duration_ms,
            session_type: self.variant,
            camera_used: self.camera_used,
            ai_used: self.ai_used,
        }
    }

    /// The record to persist, once the session is complete.
    pub fn stored_session(&self) -> Option<NewSession> {
        if self.machine.phase() != SessionPhase::Complete {
            return None;
        }
        let metrics = self.metrics();
        let end_time = self.ended_at.unwrap_or_else(Utc::now);
        let start_time = self.started_at.unwrap_or(end_time);
        let completed = match self.config.target_cycles {
            Some(target) => metrics.cycle_count >= target,
            None => metrics.cycle_count >= 1,
        };
        Some(NewSession {
            pattern_id: self.config.pattern.id.clone(),
            pattern_name: self.config.pattern.name.clone(),
            start_time,
            end_time,
            duration_ms: metrics.elapsed_ms,
            cycle_count: metrics.cycle_count,
            breath_hold_time_ms: metrics.breath_hold_time_ms,
            restlessness_score: metrics.restlessness_score,
            completed,
        })
    }

    /// Persist the completed session. Saving twice returns the first id.
    /// Does not wait for sync.
    pub fn save_to(&mut self, store: &OfflineSessionStore) -> Option<String> {
        if let Some(id) = &self.saved_id {
            return Some(id.clone());
        }
        let record = self.stored_session()?;
        let id = store.save_session(record);
        self.saved_id = Some(id.clone());
        Some(id)
    }

    fn note_end(&mut self) {
        if self.ended_at.is_none() && self.machine.phase().is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }
}
