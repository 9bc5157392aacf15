//! Camera frame metrics aggregated into per-session figures.
//!
//! Histories are bounded so a long session keeps a rolling window rather
//! than every frame.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const FRAME_HISTORY: usize = 50;
const BREATHING_HISTORY: usize = 100;
/// Movement below this level counts as "still".
const STILLNESS_THRESHOLD: f64 = 0.2;
const MIN_CONSISTENCY_SAMPLES: usize = 5;

/// Metrics extracted from one camera frame. Scores are 0.0 ..= 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub confidence: f64,
    pub posture: f64,
    pub movement: f64,
    /// Breaths per minute, when the frame allowed an estimate.
    #[serde(default)]
    pub breathing_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionSummary {
    pub frames: usize,
    pub avg_confidence: f64,
    pub avg_posture: f64,
    pub avg_movement: f64,
    pub avg_breathing_rate: Option<f64>,
    /// 0 ..= 100
    pub stillness_pct: f64,
    /// 0 ..= 100, higher means a steadier breathing rate.
    pub consistency_score: f64,
    /// 0 ..= 100, higher means more movement.
    pub restlessness_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VisionTracker {
    confidence: VecDeque<f64>,
    posture: VecDeque<f64>,
    movement: VecDeque<f64>,
    breathing: VecDeque<f64>,
    frames: usize,
}

impl VisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite scores are dropped; the rest of the frame still counts.
    pub fn record(&mut self, frame: FrameMetrics) {
        if let Some(confidence) = unit_score(frame.confidence) {
            push_bounded(&mut self.confidence, confidence, FRAME_HISTORY);
        }
        if let Some(posture) = unit_score(frame.posture) {
            push_bounded(&mut self.posture, posture, FRAME_HISTORY);
        }
        if let Some(movement) = unit_score(frame.movement) {
            push_bounded(&mut self.movement, movement, FRAME_HISTORY);
        }
        if let Some(rate) = frame.breathing_rate.filter(|r| r.is_finite() && *r >= 0.0) {
            push_bounded(&mut self.breathing, rate, BREATHING_HISTORY);
        }
        self.frames += 1;
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn summary(&self) -> VisionSummary {
        let avg_movement = mean(&self.movement).unwrap_or(0.0);
        let stillness_pct = if self.movement.is_empty() {
            0.0
        } else {
            let still = self
                .movement
                .iter()
                .filter(|m| **m < STILLNESS_THRESHOLD)
                .count();
            still as f64 / self.movement.len() as f64 * 100.0
        };

        VisionSummary {
            frames: self.frames,
            avg_confidence: mean(&self.confidence).unwrap_or(0.0),
            avg_posture: mean(&self.posture).unwrap_or(0.0),
            avg_movement,
            avg_breathing_rate: mean(&self.breathing),
            stillness_pct,
            consistency_score: self.consistency_score(),
            restlessness_score: (avg_movement * 100.0).clamp(0.0, 100.0),
        }
    }

    fn consistency_score(&self) -> f64 {
        if self.breathing.len() < MIN_CONSISTENCY_SAMPLES {
            return 0.0;
        }
        let Some(avg) = mean(&self.breathing) else {
            return 0.0;
        };
        let variance = self
            .breathing
            .iter()
            .map(|r| (r - avg).powi(2))
            .sum::<f64>()
            / self.breathing.len() as f64;
        (100.0 - variance * 10.0).clamp(0.0, 100.0)
    }
}

fn unit_score(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64, cap: usize) {
    if history.len() == cap {
        history.pop_front();
    }
    history.push_back(value);
}

fn mean(values: &VecDeque<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(movement: f64, rate: Option<f64>) -> FrameMetrics {
        FrameMetrics {
            confidence: 0.9,
            posture: 0.8,
            movement,
            breathing_rate: rate,
        }
    }

    #[test]
    fn empty_tracker_is_neutral() {
        let summary = VisionTracker::new().summary();
        assert_eq!(summary, VisionSummary::default());
    }

    #[test]
    fn restlessness_follows_movement() {
        let mut tracker = VisionTracker::new();
        tracker.record(frame(0.1, None));
        tracker.record(frame(0.3, None));
        let summary = tracker.summary();
        assert!((summary.restlessness_score - 20.0).abs() < 1e-9);
        assert!((summary.stillness_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn consistency_needs_five_samples() {
        let mut tracker = VisionTracker::new();
        for _ in 0..4 {
            tracker.record(frame(0.0, Some(6.0)));
        }
        assert_eq!(tracker.summary().consistency_score, 0.0);
        tracker.record(frame(0.0, Some(6.0)));
        assert_eq!(tracker.summary().consistency_score, 100.0);
    }

    #[test]
    fn consistency_drops_with_variance() {
        let mut tracker = VisionTracker::new();
        for rate in [4.0, 8.0, 4.0, 8.0, 4.0, 8.0] {
            tracker.record(frame(0.0, Some(rate)));
        }
        // variance 4.0 -> 100 - 40
        assert!((tracker.summary().consistency_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_scores_are_dropped() {
        let mut tracker = VisionTracker::new();
        tracker.record(frame(0.4, None));
        tracker.record(FrameMetrics {
            confidence: f64::INFINITY,
            posture: 0.8,
            movement: f64::NAN,
            breathing_rate: Some(f64::NAN),
        });
        let summary = tracker.summary();
        assert_eq!(summary.frames, 2);
        assert!((summary.restlessness_score - 40.0).abs() < 1e-9);
        assert!((summary.avg_confidence - 0.9).abs() < 1e-9);
        assert!((summary.avg_posture - 0.8).abs() < 1e-9);
        assert!(summary.avg_breathing_rate.is_none());
        assert!(serde_json::to_string(&summary).is_ok());
    }

    #[test]
    fn history_is_bounded() {
        let mut tracker = VisionTracker::new();
        for _ in 0..FRAME_HISTORY {
            tracker.record(frame(1.0, None));
        }
        for _ in 0..FRAME_HISTORY {
            tracker.record(frame(0.0, None));
        }
        let summary = tracker.summary();
        assert_eq!(summary.frames, FRAME_HISTORY * 2);
        assert_eq!(summary.restlessness_score, 0.0);
    }
}
