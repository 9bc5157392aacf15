//! Session state machine.
//!
//! Owns the `SessionState` of exactly one breathing session and is the only
//! thing that mutates it. Like the phase clock it drives, it has no internal
//! thread: the owner calls `tick()` periodically and receives the events
//! produced since the last call.
//!
//! ## Usage
//!
//! ```ignore
//! let mut machine = SessionMachine::new(SystemTimeSource::new());
//! machine.initialize(pattern, FeatureRequest::none())?;
//! machine.finish_initialization(&caps)?;
//! machine.start()?;
//! // In a loop:
//! for event in machine.tick() { /* render */ }
//! machine.stop();
//! ```

use chrono::Utc;

use super::state::{SessionPhase, SessionState};
use crate::clock::{PhaseClock, PhaseCompletion, TimeSource};
use crate::error::{ClockFault, SessionError};
use crate::events::SessionEvent;
use crate::features::{
    negotiate, Feature, FeatureRequest, FeatureResource, FeatureStatus, RuntimeCapabilities,
};
use crate::pattern::{BreathingPattern, Phase, PhaseName};

pub struct SessionMachine<T: TimeSource> {
    clock: PhaseClock<T>,
    pattern: Option<BreathingPattern>,
    request: FeatureRequest,
    state: SessionState,
    phase_index: usize,
    /// Active time accumulated before the current run segment.
    active_ms: u64,
    /// Reading at which the current active segment began; `None` unless active.
    active_since_ms: Option<u64>,
    hold_ms: u64,
    /// Cycle count at which the session completes on its own.
    cycle_limit: Option<u32>,
    resources: Vec<Box<dyn FeatureResource>>,
}

impl<T: TimeSource> SessionMachine<T> {
    pub fn new(time: T) -> Self {
        Self {
            clock: PhaseClock::new(time),
            pattern: None,
            request: FeatureRequest::none(),
            state: SessionState::default(),
            phase_index: 0,
            active_ms: 0,
            active_since_ms: None,
            hold_ms: 0,
            cycle_limit: None,
            resources: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn pattern(&self) -> Option<&BreathingPattern> {
        self.pattern.as_ref()
    }

    pub fn requested_features(&self) -> FeatureRequest {
        self.request
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn cycle_limit(&self) -> Option<u32> {
        self.cycle_limit
    }

    /// Remaining time in the current phase, if one is being timed.
    pub fn remaining_ms(&self) -> Option<u64> {
        self.clock.remaining_ms().ok().flatten()
    }

    /// Time spent in hold phases, including a partial hold at stop.
    pub fn breath_hold_ms(&self) -> u64 {
        self.hold_ms
    }

    /// State clone with the elapsed duration brought up to date.
    pub fn snapshot(&self) -> SessionState {
        let mut state = self.state.clone();
        if let Some(since) = self.active_since_ms {
            if let Ok(now) = self.clock.time_source().now_ms() {
                state.session_data.duration_ms =
                    self.active_ms + now.saturating_sub(since);
            }
        }
        state
    }

    pub fn snapshot_event(&self) -> SessionEvent {
        SessionEvent::StateSnapshot {
            state: self.snapshot(),
            remaining_ms: self.remaining_ms(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Complete the session as soon as `limit` cycles have finished. Phases
    /// that ran out after that boundary are never counted, however late the
    /// next tick arrives. `None` or zero means no limit. Survives `initialize`.
    pub fn set_cycle_limit(&mut self, limit: Option<u32>) {
        self.cycle_limit = limit.filter(|n| *n > 0);
    }

    /// Validate the pattern and record the requested features.
    ///
    /// Allowed from `Setup` or `Error` only; an invalid pattern moves the
    /// session to `Error`.
    ///
    /// # Errors
    /// `InvalidTransition` from any other phase (state untouched), or
    /// `InvalidPattern`.
    pub fn initialize(
        &mut self,
        pattern: BreathingPattern,
        features: FeatureRequest,
    ) -> Result<SessionEvent, SessionError> {
        match self.state.phase {
            SessionPhase::Setup | SessionPhase::Error => {}
            from => {
                return Err(SessionError::InvalidTransition {
                    from,
                    action: "initialize",
                })
            }
        }

        if let Err(e) = pattern.validate() {
            self.enter_error(format!("invalid breathing pattern: {e}"));
            return Err(e.into());
        }

        self.reset();
        self.state.phase = SessionPhase::Initializing;
        self.request = features;
        let pattern_id = pattern.id.clone();
        self.pattern = Some(pattern);
        tracing::debug!(pattern = %pattern_id, ?features, "session initializing");
        Ok(SessionEvent::Initializing {
            pattern_id,
            at: Utc::now(),
        })
    }

    /// Apply capability probe results and become `Ready`.
    ///
    /// # Errors
    /// `InvalidTransition` outside `Initializing`; `Clock` if the time
    /// source is unusable (the session moves to `Error`).
    pub fn finish_initialization(
        &mut self,
        caps: &RuntimeCapabilities,
    ) -> Result<SessionEvent, SessionError> {
        if self.state.phase != SessionPhase::Initializing {
            return Err(SessionError::InvalidTransition {
                from: self.state.phase,
                action: "finish initialization",
            });
        }
        if let Err(fault) = self.clock.now_ms() {
            self.enter_error(format!("timing fault: {fault}"));
            return Err(fault.into());
        }

        let negotiation = negotiate(&self.request, caps);
        self.state.features = negotiation.features;
        self.state.warnings.extend(negotiation.warnings);
        self.state.session_data.current_phase =
            self.pattern.as_ref().and_then(|p| p.first_phase()).map(|p| p.name);
        self.state.phase = SessionPhase::Ready;
        tracing::info!(features = ?self.state.features, "session ready");

        Ok(SessionEvent::Ready {
            features: self.state.features,
            warnings: self.state.warnings.clone(),
            at: Utc::now(),
        })
    }

    /// Begin the first phase.
    ///
    /// # Errors
    /// `InvalidTransition` outside `Ready` (state untouched); `Clock` on a
    /// timing fault (the session moves to `Error`).
    pub fn start(&mut self) -> Result<SessionEvent, SessionError> {
        if self.state.phase != SessionPhase::Ready {
            return Err(SessionError::InvalidTransition {
                from: self.state.phase,
                action: "start",
            });
        }
        let Some(first) = self.pattern.as_ref().and_then(|p| p.first_phase()).copied() else {
            return Err(SessionError::InvalidTransition {
                from: self.state.phase,
                action: "start",
            });
        };
        let now = match self.clock.now_ms() {
            Ok(now) => now,
            Err(fault) => {
                self.enter_error(format!("timing fault: {fault}"));
                return Err(fault.into());
            }
        };

        self.clock.start_at(first, now);
        self.active_since_ms = Some(now);
        self.phase_index = 0;
        for feature in Feature::ALL {
            if self.state.features.get(feature) == FeatureStatus::Available {
                self.state.features.set(feature, FeatureStatus::Active);
            }
        }
        self.state.phase = SessionPhase::Active;
        self.state.session_data.current_phase = Some(first.name);
        tracing::info!(phase = %first.name, "session started");

        Ok(SessionEvent::Started {
            phase: first.name,
            duration_ms: first.duration_ms,
            at: Utc::now(),
        })
    }

    /// Call periodically while active. Returns the events produced by every
    /// phase that finished since the last call, in order.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state.phase != SessionPhase::Active {
            return events;
        }
        if let Err(fault) = self.drain_completions(&mut events) {
            events.push(self.enter_error(format!("timing fault: {fault}")));
        }
        events
    }

    /// Freeze the session. A second call is a no-op.
    pub fn pause(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state.phase != SessionPhase::Active {
            return events;
        }
        let paused = match self.drain_completions(&mut events) {
            Ok(true) => return events,
            Ok(false) => self
                .clock
                .pause()
                .and_then(|_| self.close_active_segment()),
            Err(fault) => Err(fault),
        };
        match paused {
            Ok(()) => {
                self.state.phase = SessionPhase::Paused;
                let remaining_ms = self.remaining_ms().unwrap_or(0);
                tracing::debug!(remaining_ms, "session paused");
                events.push(SessionEvent::Paused {
                    remaining_ms,
                    at: Utc::now(),
                });
            }
            Err(fault) => events.push(self.enter_error(format!("timing fault: {fault}"))),
        }
        events
    }

    pub fn resume(&mut self) -> Option<SessionEvent> {
        if self.state.phase != SessionPhase::Paused {
            return None;
        }
        let resumed = self
            .clock
            .resume()
            .and_then(|_| self.clock.now_ms());
        match resumed {
            Ok(now) => {
                self.active_since_ms = Some(now);
                self.state.phase = SessionPhase::Active;
                let remaining_ms = self.remaining_ms().unwrap_or(0);
                tracing::debug!(remaining_ms, "session resumed");
                Some(SessionEvent::Resumed {
                    remaining_ms,
                    at: Utc::now(),
                })
            }
            Err(fault) => Some(self.enter_error(format!("timing fault: {fault}"))),
        }
    }

    /// Finish the session with whatever data has accumulated.
    ///
    /// Idempotent: outside `Active`/`Paused` it returns no events and
    /// changes nothing.
    pub fn stop(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.state.phase.is_running() {
            return events;
        }
        if self.state.phase == SessionPhase::Active {
            match self.drain_completions(&mut events) {
                Ok(true) => return events,
                Ok(false) => {}
                Err(fault) => {
                    events.push(self.enter_error(format!("timing fault: {fault}")));
                    return events;
                }
            }
        }

        if let Some(phase) = self.clock.current_phase() {
            if phase.name == PhaseName::Hold {
                let remaining = self.remaining_ms().unwrap_or(phase.duration_ms);
                self.hold_ms += phase.duration_ms.saturating_sub(remaining);
            }
        }
        // Stopping must succeed even on a broken clock; keep the last flushed duration.
        if self.close_active_segment().is_err() {
            self.active_since_ms = None;
        }
        self.complete(&mut events);
        events
    }

    /// Record a feature that failed after negotiation. Other features keep
    /// their status.
    pub fn report_feature_failure(
        &mut self,
        feature: Feature,
        reason: impl Into<String>,
    ) -> Option<SessionEvent> {
        if self.state.phase.is_terminal() {
            return None;
        }
        match self.state.features.get(feature) {
            FeatureStatus::Disabled | FeatureStatus::Error => return None,
            FeatureStatus::Available | FeatureStatus::Active => {}
        }
        let reason = reason.into();
        tracing::warn!(%feature, %reason, "feature failed mid-session");
        self.state.features.set(feature, FeatureStatus::Error);
        self.state.warnings.push(format!("{feature} stopped working: {reason}"));
        self.release_resources_for(feature);
        Some(SessionEvent::FeatureChanged {
            feature,
            status: FeatureStatus::Error,
            at: Utc::now(),
        })
    }

    /// Unrecoverable fault from outside the engine.
    pub fn fault(&mut self, reason: impl Into<String>) -> Option<SessionEvent> {
        if self.state.phase.is_terminal() {
            return None;
        }
        Some(self.enter_error(reason.into()))
    }

    /// Hand a live feature resource to the session; it is released when the
    /// session ends.
    pub fn attach_resource(&mut self, mut resource: Box<dyn FeatureResource>) {
        let usable = matches!(
            self.state.features.get(resource.feature()),
            FeatureStatus::Available | FeatureStatus::Active
        );
        if self.state.phase.is_terminal() || !usable {
            resource.release();
            return;
        }
        self.resources.push(resource);
    }

    // ── Internal ─────────────────────────────────────────────────────

    pub(crate) fn note_warning(&mut self, warning: impl Into<String>) {
        self.state.warnings.push(warning.into());
    }

    /// Process every phase that ran out. Returns `true` if the cycle limit
    /// was hit, in which case the session is already complete.
    fn drain_completions(&mut self, events: &mut Vec<SessionEvent>) -> Result<bool, ClockFault> {
        while let Some(done) = self.clock.tick()? {
            self.advance(done, events);
            if self.cycle_limit_reached() {
                // Active time ends at the boundary deadline, not at this tick.
                if let Some(since) = self.active_since_ms.take() {
                    self.active_ms += done.completed_at_ms.saturating_sub(since);
                }
                tracing::info!(limit = ?self.cycle_limit, "cycle limit reached");
                self.complete(events);
                return Ok(true);
            }
        }
        let now = self.clock.now_ms()?;
        if let Some(since) = self.active_since_ms {
            self.state.session_data.duration_ms = self.active_ms + now.saturating_sub(since);
        }
        Ok(false)
    }

    fn cycle_limit_reached(&self) -> bool {
        self.cycle_limit
            .is_some_and(|limit| self.state.session_data.cycle_count >= limit)
    }

    /// Enter `Complete`. The active segment must already be closed.
    fn complete(&mut self, events: &mut Vec<SessionEvent>) {
        self.clock.cancel();
        self.release_resources();
        self.state.phase = SessionPhase::Complete;
        self.state.session_data.duration_ms = self.active_ms;

        let data = self.state.session_data;
        tracing::info!(
            cycles = data.cycle_count,
            duration_ms = data.duration_ms,
            "session complete"
        );
        events.push(SessionEvent::Completed {
            cycle_count: data.cycle_count,
            duration_ms: data.duration_ms,
            at: Utc::now(),
        });
    }

    fn advance(&mut self, done: PhaseCompletion, events: &mut Vec<SessionEvent>) {
        let Some(pattern) = self.pattern.as_ref() else {
            return;
        };
        let next_index = (self.phase_index + 1) % pattern.phases.len();
        let next: Phase = pattern.phases[next_index];

        if done.phase.name == PhaseName::Hold {
            self.hold_ms += done.phase.duration_ms;
        }
        if next_index == 0 {
            self.state.session_data.cycle_count += 1;
            events.push(SessionEvent::CycleCompleted {
                cycle_count: self.state.session_data.cycle_count,
                at: Utc::now(),
            });
        }
        self.phase_index = next_index;
        self.state.session_data.current_phase = Some(next.name);
        self.clock.start_at(next, done.completed_at_ms);
        events.push(SessionEvent::PhaseChanged {
            phase: next.name,
            phase_index: next_index,
            duration_ms: next.duration_ms,
            cycle_count: self.state.session_data.cycle_count,
            at: Utc::now(),
        });
    }

    fn close_active_segment(&mut self) -> Result<(), ClockFault> {
        if let Some(since) = self.active_since_ms {
            let now = self.clock.now_ms()?;
            self.active_ms += now.saturating_sub(since);
            self.active_since_ms = None;
            self.state.session_data.duration_ms = self.active_ms;
        }
        Ok(())
    }

    fn enter_error(&mut self, reason: String) -> SessionEvent {
        tracing::error!(%reason, "session failed");
        if self.close_active_segment().is_err() {
            self.active_since_ms = None;
        }
        self.clock.cancel();
        self.release_resources();
        self.state.phase = SessionPhase::Error;
        self.state.error = Some(reason.clone());
        SessionEvent::Failed {
            reason,
            at: Utc::now(),
        }
    }

    fn release_resources(&mut self) {
        for mut resource in self.resources.drain(..) {
            tracing::debug!(feature = %resource.feature(), "releasing feature resource");
            resource.release();
        }
    }

    fn release_resources_for(&mut self, feature: Feature) {
        let (mut released, kept): (Vec<_>, Vec<_>) = self
            .resources
            .drain(..)
            .partition(|r| r.feature() == feature);
        self.resources = kept;
        for resource in released.iter_mut() {
            resource.release();
        }
    }

    fn reset(&mut self) {
        self.clock.cancel();
        self.release_resources();
        self.state = SessionState::default();
        self.phase_index = 0;
        self.active_ms = 0;
        self.active_since_ms = None;
        self.hold_ms = 0;
    }
}
