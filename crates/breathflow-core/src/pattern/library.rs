//! Built-in breathing pattern registry.
//!
//! Patterns with a zero-length phase in their classic notation (e.g. 4-7-8
//! has no rest) simply omit that phase.

use super::definition::{BreathingPattern, Phase, PhaseName};

/// Read-only provider of breathing patterns keyed by id.
pub trait PatternSource {
    fn pattern(&self, id: &str) -> Option<BreathingPattern>;

    fn patterns(&self) -> Vec<BreathingPattern>;
}

/// In-memory pattern library: the built-ins plus any user patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    patterns: Vec<BreathingPattern>,
}

impl PatternLibrary {
    pub fn builtin() -> Self {
        use PhaseName::*;

        let p = |name: PhaseName, secs: u64| Phase::new(name, secs * 1_000);
        Self {
            patterns: vec![
                BreathingPattern::box_breathing(),
                BreathingPattern::new(
                    "4-7-8",
                    "Tranquility",
                    vec![p(Inhale, 4), p(Hold, 7), p(Exhale, 8)],
                )
                .with_benefits(["Sleep", "Anxiety relief"]),
                BreathingPattern::new("coherence", "Coherence", vec![p(Inhale, 6), p(Exhale, 6)])
                    .with_benefits(["Heart rate variability", "Balance"]),
                BreathingPattern::new("deep-relax", "Deep Rest", vec![p(Inhale, 4), p(Exhale, 8)])
                    .with_benefits(["Stress relief"]),
                BreathingPattern::new("7-11", "Deep Calm", vec![p(Inhale, 7), p(Exhale, 11)])
                    .with_benefits(["Panic relief"]),
                BreathingPattern::new("awake", "Energize", vec![p(Inhale, 4), p(Exhale, 2)])
                    .with_benefits(["Alertness"]),
                BreathingPattern::new(
                    "triangle",
                    "Triangle",
                    vec![p(Inhale, 4), p(Hold, 4), p(Exhale, 4)],
                )
                .with_benefits(["Emotional stability"]),
            ],
        }
    }

    /// Built-ins plus `custom`; a custom pattern replaces a built-in with the same id.
    pub fn with_custom(custom: impl IntoIterator<Item = BreathingPattern>) -> Self {
        let mut library = Self::builtin();
        for pattern in custom {
            library.insert(pattern);
        }
        library
    }

    pub fn insert(&mut self, pattern: BreathingPattern) {
        match self.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(existing) => *existing = pattern,
            None => self.patterns.push(pattern),
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl PatternSource for PatternLibrary {
    fn pattern(&self, id: &str) -> Option<BreathingPattern> {
        self.patterns.iter().find(|p| p.id == id).cloned()
    }

    fn patterns(&self) -> Vec<BreathingPattern> {
        self.patterns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_all_valid() {
        let lib = PatternLibrary::builtin();
        assert_eq!(lib.len(), 7);
        for pattern in lib.patterns() {
            assert!(pattern.is_valid(), "{} should be valid", pattern.id);
        }
    }

    #[test]
    fn lookup_by_id() {
        let lib = PatternLibrary::builtin();
        let p = lib.pattern("4-7-8").unwrap();
        assert_eq!(p.cycle_duration_ms(), 19_000);
        assert!(lib.pattern("missing").is_none());
    }

    #[test]
    fn custom_pattern_overrides_builtin() {
        let custom = BreathingPattern::new(
            "box",
            "Short Box",
            vec![Phase::new(PhaseName::Inhale, 2_000), Phase::new(PhaseName::Exhale, 2_000)],
        );
        let lib = PatternLibrary::with_custom([custom]);
        assert_eq!(lib.len(), 7);
        assert_eq!(lib.pattern("box").unwrap().name, "Short Box");
    }
}
