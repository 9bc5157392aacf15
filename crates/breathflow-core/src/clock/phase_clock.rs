//! Phase clock.
//!
//! Times one breathing phase at a time. Like the rest of the engine it has no
//! internal thread: the owner calls `tick()` and receives a `PhaseCompletion`
//! once the phase's duration has elapsed.
//!
//! ```text
//! Idle -> Running -> (Paused -> Running)* -> Idle
//!                 \-> cancel() -> Idle     (no completion)
//! ```

use crate::error::ClockFault;
use crate::pattern::Phase;

use super::source::TimeSource;

/// A finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCompletion {
    pub phase: Phase,
    /// Exact instant the phase ran out, which may precede the tick that observed it.
    pub completed_at_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct RunningPhase {
    phase: Phase,
    remaining_ms: u64,
    /// Last reading remaining time was flushed against; `None` while paused.
    last_flush_ms: Option<u64>,
}

#[derive(Debug)]
pub struct PhaseClock<T: TimeSource> {
    time: T,
    running: Option<RunningPhase>,
    last_reading_ms: Option<u64>,
}

impl<T: TimeSource> PhaseClock<T> {
    pub fn new(time: T) -> Self {
        Self {
            time,
            running: None,
            last_reading_ms: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn time_source(&self) -> &T {
        &self.time
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.running, Some(RunningPhase { last_flush_ms: None, .. }))
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.running.map(|r| r.phase)
    }

    /// Remaining time without flushing; paused phases report their frozen value.
    ///
    /// # Errors
    /// Returns a `ClockFault` if the time source cannot be read.
    pub fn remaining_ms(&self) -> Result<Option<u64>, ClockFault> {
        let Some(running) = self.running else {
            return Ok(None);
        };
        match running.last_flush_ms {
            Some(last) => {
                let now = self.time.now_ms()?;
                Ok(Some(running.remaining_ms.saturating_sub(now.saturating_sub(last))))
            }
            None => Ok(Some(running.remaining_ms)),
        }
    }

    /// Read the time source, rejecting readings that go backwards.
    ///
    /// # Errors
    /// Returns a `ClockFault` on an unavailable or regressing source.
    pub fn now_ms(&mut self) -> Result<u64, ClockFault> {
        let now = self.time.now_ms()?;
        if let Some(previous) = self.last_reading_ms {
            if now < previous {
                return Err(ClockFault::Regressed {
                    previous_ms: previous,
                    now_ms: now,
                });
            }
        }
        self.last_reading_ms = Some(now);
        Ok(now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin timing `phase` now. Returns `Ok(false)` and leaves the running
    /// phase untouched if one is already in progress.
    ///
    /// # Errors
    /// Returns a `ClockFault` if the time source cannot be read.
    pub fn start(&mut self, phase: Phase) -> Result<bool, ClockFault> {
        if self.running.is_some() {
            return Ok(false);
        }
        let now = self.now_ms()?;
        self.begin(phase, now);
        Ok(true)
    }

    /// Begin timing `phase` from an earlier instant, typically the deadline
    /// of the phase before it.
    pub(crate) fn start_at(&mut self, phase: Phase, at_ms: u64) -> bool {
        if self.running.is_some() {
            return false;
        }
        self.begin(phase, at_ms);
        true
    }

    /// Freeze remaining time. Returns `Ok(false)` if nothing is running or
    /// the phase is already paused.
    ///
    /// # Errors
    /// Returns a `ClockFault` if the time source cannot be read.
    pub fn pause(&mut self) -> Result<bool, ClockFault> {
        if !self.is_running() || self.is_paused() {
            return Ok(false);
        }
        let now = self.now_ms()?;
        if let Some(running) = self.running.as_mut() {
            // A phase that ran out but was not ticked yet stays at zero and
            // completes on the first tick after resume.
            let elapsed = running
                .last_flush_ms
                .map_or(0, |last| now.saturating_sub(last));
            running.remaining_ms = running.remaining_ms.saturating_sub(elapsed);
            running.last_flush_ms = None;
        }
        Ok(true)
    }

    /// Unfreeze remaining time.
    ///
    /// # Errors
    /// Returns a `ClockFault` if the time source cannot be read.
    pub fn resume(&mut self) -> Result<bool, ClockFault> {
        if !self.is_paused() {
            return Ok(false);
        }
        let now = self.now_ms()?;
        if let Some(running) = self.running.as_mut() {
            running.last_flush_ms = Some(now);
        }
        Ok(true)
    }

    /// Stop timing without reporting a completion.
    pub fn cancel(&mut self) -> Option<Phase> {
        self.running.take().map(|r| r.phase)
    }

    /// Call periodically. Returns the completion when the running phase finishes.
    ///
    /// # Errors
    /// Returns a `ClockFault` if the time source cannot be read.
    pub fn tick(&mut self) -> Result<Option<PhaseCompletion>, ClockFault> {
        if !self.is_running() || self.is_paused() {
            return Ok(None);
        }
        self.flush()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn begin(&mut self, phase: Phase, at_ms: u64) {
        self.running = Some(RunningPhase {
            phase,
            remaining_ms: phase.duration_ms,
            last_flush_ms: Some(at_ms),
        });
    }

    /// Subtract elapsed time; completes the phase when nothing remains.
    fn flush(&mut self) -> Result<Option<PhaseCompletion>, ClockFault> {
        let now = self.now_ms()?;
        let Some(running) = self.running.as_mut() else {
            return Ok(None);
        };
        let Some(last) = running.last_flush_ms else {
            return Ok(None);
        };
        let elapsed = now.saturating_sub(last);
        if elapsed >= running.remaining_ms {
            let completion = PhaseCompletion {
                phase: running.phase,
                completed_at_ms: last + running.remaining_ms,
            };
            self.running = None;
            return Ok(Some(completion));
        }
        running.remaining_ms -= elapsed;
        running.last_flush_ms = Some(now);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::pattern::PhaseName;

    fn inhale(ms: u64) -> Phase {
        Phase::new(PhaseName::Inhale, ms)
    }

    #[test]
    fn completes_after_duration() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        assert!(clock.start(inhale(4_000)).unwrap());

        time.advance(3_999);
        assert_eq!(clock.tick().unwrap(), None);

        time.advance(1);
        let done = clock.tick().unwrap().unwrap();
        assert_eq!(done.phase.name, PhaseName::Inhale);
        assert_eq!(done.completed_at_ms, 4_000);
        assert!(!clock.is_running());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(1_000)).unwrap();
        time.advance(5_000);
        assert!(clock.tick().unwrap().is_some());
        assert!(clock.tick().unwrap().is_none());
    }

    #[test]
    fn start_while_running_is_a_noop() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(4_000)).unwrap();
        time.advance(1_000);
        assert!(!clock.start(Phase::new(PhaseName::Exhale, 9_000)).unwrap());
        assert_eq!(clock.current_phase().unwrap().name, PhaseName::Inhale);
        assert_eq!(clock.remaining_ms().unwrap(), Some(3_000));
    }

    #[test]
    fn pause_preserves_remaining_time() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(4_000)).unwrap();

        time.advance(1_500);
        assert!(clock.pause().unwrap());
        assert!(!clock.pause().unwrap());

        time.advance(60_000);
        assert_eq!(clock.tick().unwrap(), None);
        assert_eq!(clock.remaining_ms().unwrap(), Some(2_500));

        assert!(clock.resume().unwrap());
        time.advance(2_499);
        assert_eq!(clock.tick().unwrap(), None);
        time.advance(1);
        assert!(clock.tick().unwrap().is_some());
    }

    #[test]
    fn overdue_phase_paused_before_tick_still_completes() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(1_000)).unwrap();
        time.advance(1_200);
        assert!(clock.pause().unwrap());
        assert!(clock.is_running());
        time.advance(500);
        clock.resume().unwrap();
        let done = clock.tick().unwrap().unwrap();
        assert_eq!(done.completed_at_ms, 1_700);
    }

    #[test]
    fn cancel_suppresses_completion() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(1_000)).unwrap();
        assert_eq!(clock.cancel().map(|p| p.name), Some(PhaseName::Inhale));
        time.advance(10_000);
        assert!(clock.tick().unwrap().is_none());
    }

    #[test]
    fn regressing_source_is_a_fault() {
        let time = ManualTimeSource::starting_at(10_000);
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(1_000)).unwrap();
        time.set(5_000);
        assert!(matches!(
            clock.tick(),
            Err(ClockFault::Regressed { previous_ms: 10_000, now_ms: 5_000 })
        ));
    }

    #[test]
    fn start_at_chains_from_deadline() {
        let time = ManualTimeSource::new();
        let mut clock = PhaseClock::new(time.clone());
        clock.start(inhale(1_000)).unwrap();
        time.advance(1_700);
        let done = clock.tick().unwrap().unwrap();
        assert!(clock.start_at(Phase::new(PhaseName::Exhale, 1_000), done.completed_at_ms));
        assert_eq!(clock.remaining_ms().unwrap(), Some(300));
    }
}
