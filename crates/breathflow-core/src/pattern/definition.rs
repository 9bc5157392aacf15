use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseName {
    Inhale,
    Hold,
    Exhale,
    Rest,
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PhaseName::Inhale => "inhale",
            PhaseName::Hold => "hold",
            PhaseName::Exhale => "exhale",
            PhaseName::Rest => "rest",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: PhaseName,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Phase {
    pub fn new(name: PhaseName, duration_ms: u64) -> Self {
        Self { name, duration_ms }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// A named breathing pattern. Pure data; timing lives in the phase clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathingPattern {
    pub id: String,
    pub name: String,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl BreathingPattern {
    pub fn new(id: impl Into<String>, name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phases,
            benefits: Vec::new(),
        }
    }

    pub fn with_benefits<I, S>(mut self, benefits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.benefits = benefits.into_iter().map(Into::into).collect();
        self
    }

    /// Box breathing: four equal 4s phases.
    pub fn box_breathing() -> Self {
        Self::new(
            "box",
            "Box Breathing",
            vec![
                Phase::new(PhaseName::Inhale, 4_000),
                Phase::new(PhaseName::Hold, 4_000),
                Phase::new(PhaseName::Exhale, 4_000),
                Phase::new(PhaseName::Rest, 4_000),
            ],
        )
        .with_benefits(["Focus", "Stress control"])
    }

    /// Check the pattern can drive a session: at least one phase, every
    /// phase strictly positive.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.phases.is_empty() {
            return Err(ValidationError::EmptyCollection(format!(
                "pattern '{}' has no phases",
                self.id
            )));
        }
        if let Some((index, phase)) = self
            .phases
            .iter()
            .enumerate()
            .find(|(_, p)| p.duration_ms == 0)
        {
            return Err(ValidationError::InvalidValue {
                field: format!("phases[{index}].duration_ms"),
                message: format!("{} phase must last longer than 0ms", phase.name),
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn first_phase(&self) -> Option<&Phase> {
        self.phases.first()
    }

    /// Sum of all phase durations.
    pub fn cycle_duration_ms(&self) -> u64 {
        self.phases
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.duration_ms))
    }

    pub fn breaths_per_minute(&self) -> f64 {
        let cycle = self.cycle_duration_ms();
        if cycle == 0 {
            return 0.0;
        }
        60_000.0 / cycle as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_breathing_cycle_is_16_seconds() {
        let p = BreathingPattern::box_breathing();
        assert_eq!(p.cycle_duration_ms(), 16_000);
        assert!((p.breaths_per_minute() - 3.75).abs() < f64::EPSILON);
        assert!(p.is_valid());
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let p = BreathingPattern::new("empty", "Empty", vec![]);
        assert!(matches!(
            p.validate(),
            Err(ValidationError::EmptyCollection(_))
        ));
    }

    #[test]
    fn zero_duration_phase_is_rejected() {
        let p = BreathingPattern::new(
            "bad",
            "Bad",
            vec![
                Phase::new(PhaseName::Inhale, 4_000),
                Phase::new(PhaseName::Hold, 0),
            ],
        );
        match p.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "phases[1].duration_ms");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn phase_names_serialize_lowercase() {
        let json = serde_json::to_string(&Phase::new(PhaseName::Exhale, 1)).unwrap();
        assert_eq!(json, r#"{"name":"exhale","duration_ms":1}"#);
    }
}
