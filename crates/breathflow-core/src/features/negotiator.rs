//! Feature negotiation.
//!
//! Pure function of what was requested and what the device reported. Runs
//! once per session at initialization; later failures are reported per
//! feature by the session machine without re-running negotiation.

use serde::{Deserialize, Serialize};

use super::types::{Capability, Feature, FeatureMap, FeatureRequest, FeatureStatus, RuntimeCapabilities};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Negotiation {
    pub features: FeatureMap,
    pub warnings: Vec<String>,
}

pub fn negotiate(request: &FeatureRequest, caps: &RuntimeCapabilities) -> Negotiation {
    let mut out = Negotiation::default();

    let camera = resolve_device(Feature::Camera, request, caps, &mut out.warnings);
    out.features.camera = camera;
    out.features.audio = resolve_device(Feature::Audio, request, caps, &mut out.warnings);

    out.features.ai = if !request.ai {
        FeatureStatus::Disabled
    } else if !request.camera {
        out.warnings
            .push("AI feedback requires the camera; AI feedback has been disabled".into());
        FeatureStatus::Disabled
    } else if camera != FeatureStatus::Available {
        out.warnings
            .push("AI feedback disabled because the camera is unavailable".into());
        FeatureStatus::Disabled
    } else {
        resolve_device(Feature::Ai, request, caps, &mut out.warnings)
    };

    tracing::debug!(
        camera = ?out.features.camera,
        ai = ?out.features.ai,
        audio = ?out.features.audio,
        warnings = out.warnings.len(),
        "features negotiated"
    );
    out
}

fn resolve_device(
    feature: Feature,
    request: &FeatureRequest,
    caps: &RuntimeCapabilities,
    warnings: &mut Vec<String>,
) -> FeatureStatus {
    if !request.is_requested(feature) {
        return FeatureStatus::Disabled;
    }
    match caps.get(feature) {
        Capability::Available => FeatureStatus::Available,
        Capability::Unavailable(reason) => {
            warnings.push(format!("{feature} unavailable: {reason}"));
            FeatureStatus::Error
        }
        Capability::NotProbed => {
            warnings.push(format!("{feature} availability could not be determined"));
            FeatureStatus::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(camera: bool, ai: bool, audio: bool) -> FeatureRequest {
        FeatureRequest { camera, ai, audio }
    }

    #[test]
    fn nothing_requested_is_all_disabled() {
        let n = negotiate(&FeatureRequest::none(), &RuntimeCapabilities::all_available());
        assert_eq!(n.features, FeatureMap::default());
        assert!(n.warnings.is_empty());
    }

    #[test]
    fn ai_without_camera_is_disabled_with_one_warning() {
        let n = negotiate(&request(false, true, false), &RuntimeCapabilities::all_available());
        assert_eq!(n.features.ai, FeatureStatus::Disabled);
        assert_eq!(n.warnings.len(), 1);
        assert!(n.warnings[0].contains("camera"));
    }

    #[test]
    fn camera_failure_disables_ai() {
        let caps = RuntimeCapabilities {
            camera: Capability::Unavailable("permission denied".into()),
            ..RuntimeCapabilities::all_available()
        };
        let n = negotiate(&request(true, true, false), &caps);
        assert_eq!(n.features.camera, FeatureStatus::Error);
        assert_eq!(n.features.ai, FeatureStatus::Disabled);
        assert_eq!(n.warnings.len(), 2);
        assert!(n.warnings[0].contains("permission denied"));
    }

    #[test]
    fn audio_failure_is_isolated() {
        let caps = RuntimeCapabilities {
            audio: Capability::Unavailable("no output device".into()),
            ..RuntimeCapabilities::all_available()
        };
        let n = negotiate(&request(true, true, true), &caps);
        assert_eq!(n.features.audio, FeatureStatus::Error);
        assert_eq!(n.features.camera, FeatureStatus::Available);
        assert_eq!(n.features.ai, FeatureStatus::Available);
    }

    #[test]
    fn ai_service_failure_is_an_ai_error() {
        let caps = RuntimeCapabilities {
            ai: Capability::Unavailable("quota exceeded".into()),
            ..RuntimeCapabilities::all_available()
        };
        let n = negotiate(&request(true, true, false), &caps);
        assert_eq!(n.features.ai, FeatureStatus::Error);
        assert_eq!(n.features.camera, FeatureStatus::Available);
    }

    #[test]
    fn unprobed_request_is_an_error() {
        let n = negotiate(&request(true, false, false), &RuntimeCapabilities::default());
        assert_eq!(n.features.camera, FeatureStatus::Error);
        assert_eq!(n.warnings.len(), 1);
    }
}
