//! Time sources for the phase clock.
//!
//! Readings are milliseconds on an arbitrary monotonic origin; only
//! differences between readings are meaningful.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::ClockFault;

pub trait TimeSource: Send + Sync {
    /// Current reading in milliseconds.
    ///
    /// # Errors
    /// Returns a `ClockFault` when the environment cannot provide time.
    fn now_ms(&self) -> Result<u64, ClockFault>;
}

/// Wall-clock source backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> Result<u64, ClockFault> {
        Ok(self.origin.elapsed().as_millis() as u64)
    }
}

/// Manually advanced source for simulations and tests.
///
/// Clones share the same reading, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<AtomicU64>,
    faulted: Arc<AtomicBool>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u64) -> Self {
        let source = Self::default();
        source.set(ms);
        source
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Make every subsequent reading fail until cleared.
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> Result<u64, ClockFault> {
        if self.faulted.load(Ordering::SeqCst) {
            return Err(ClockFault::Unavailable("manual time source faulted".into()));
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clones_share_reading() {
        let a = ManualTimeSource::starting_at(10);
        let b = a.clone();
        a.advance(5);
        assert_eq!(b.now_ms().unwrap(), 15);
    }

    #[test]
    fn manual_fault_is_reported() {
        let source = ManualTimeSource::new();
        source.set_faulted(true);
        assert!(source.now_ms().is_err());
        source.set_faulted(false);
        assert_eq!(source.now_ms().unwrap(), 0);
    }

    #[test]
    fn system_source_is_monotonic() {
        let source = SystemTimeSource::new();
        let a = source.now_ms().unwrap();
        let b = source.now_ms().unwrap();
        assert!(b >= a);
    }
}
