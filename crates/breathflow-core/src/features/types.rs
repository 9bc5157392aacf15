use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Camera,
    Ai,
    Audio,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Camera, Feature::Ai, Feature::Audio];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Feature::Camera => "camera",
            Feature::Ai => "ai",
            Feature::Audio => "audio",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    #[default]
    Disabled,
    /// Negotiated and ready; becomes `Active` when the session starts.
    Available,
    Active,
    Error,
}

/// Per-feature status for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureMap {
    pub camera: FeatureStatus,
    pub ai: FeatureStatus,
    pub audio: FeatureStatus,
}

impl FeatureMap {
    pub fn get(&self, feature: Feature) -> FeatureStatus {
        match feature {
            Feature::Camera => self.camera,
            Feature::Ai => self.ai,
            Feature::Audio => self.audio,
        }
    }

    pub fn set(&mut self, feature: Feature, status: FeatureStatus) {
        match feature {
            Feature::Camera => self.camera = status,
            Feature::Ai => self.ai = status,
            Feature::Audio => self.audio = status,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, FeatureStatus)> + '_ {
        Feature::ALL.into_iter().map(|f| (f, self.get(f)))
    }

    pub fn is_active(&self, feature: Feature) -> bool {
        self.get(feature) == FeatureStatus::Active
    }
}

/// Features the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureRequest {
    #[serde(default)]
    pub camera: bool,
    #[serde(default)]
    pub ai: bool,
    #[serde(default)]
    pub audio: bool,
}

impl FeatureRequest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_requested(&self, feature: Feature) -> bool {
        match feature {
            Feature::Camera => self.camera,
            Feature::Ai => self.ai,
            Feature::Audio => self.audio,
        }
    }
}

/// Outcome of probing one capability.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Capability {
    Available,
    Unavailable(String),
    #[default]
    NotProbed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeCapabilities {
    pub camera: Capability,
    pub ai: Capability,
    pub audio: Capability,
}

impl RuntimeCapabilities {
    pub fn all_available() -> Self {
        Self {
            camera: Capability::Available,
            ai: Capability::Available,
            audio: Capability::Available,
        }
    }

    pub fn get(&self, feature: Feature) -> &Capability {
        match feature {
            Feature::Camera => &self.camera,
            Feature::Ai => &self.ai,
            Feature::Audio => &self.audio,
        }
    }
}

/// A live resource backing a feature (camera stream, audio output, ...).
/// Released exactly once when the session stops, completes or fails.
pub trait FeatureResource: Send {
    fn feature(&self) -> Feature;

    fn release(&mut self);
}
