//! Runtime capability probes.
//!
//! Probes are black boxes (permission prompts, device enumeration, an AI
//! health check). Their errors never propagate past this module: each one
//! becomes a `Capability::Unavailable` for the negotiator.

use async_trait::async_trait;

use super::types::{Capability, FeatureRequest, RuntimeCapabilities};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn camera(&self) -> Result<(), ProbeError>;

    async fn audio(&self) -> Result<(), ProbeError>;

    /// Health of the AI feedback service. Only probed when the camera is.
    async fn ai_service(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// Probe only what was requested.
pub async fn probe_capabilities(
    probe: &dyn CapabilityProbe,
    request: &FeatureRequest,
) -> RuntimeCapabilities {
    let mut caps = RuntimeCapabilities::default();
    if request.camera {
        caps.camera = to_capability("camera", probe.camera().await);
        if request.ai && caps.camera == Capability::Available {
            caps.ai = to_capability("ai", probe.ai_service().await);
        }
    }
    if request.audio {
        caps.audio = to_capability("audio", probe.audio().await);
    }
    caps
}

fn to_capability(name: &str, result: Result<(), ProbeError>) -> Capability {
    match result {
        Ok(()) => Capability::Available,
        Err(e) => {
            tracing::warn!(feature = name, error = %e, "capability probe failed");
            Capability::Unavailable(e.to_string())
        }
    }
}

/// Probe with fixed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe {
    pub camera: bool,
    pub audio: bool,
    pub ai: bool,
}

impl StaticProbe {
    pub fn all_available() -> Self {
        Self {
            camera: true,
            audio: true,
            ai: true,
        }
    }

    pub fn headless() -> Self {
        Self {
            camera: false,
            audio: true,
            ai: true,
        }
    }
}

#[async_trait]
impl CapabilityProbe for StaticProbe {
    async fn camera(&self) -> Result<(), ProbeError> {
        if self.camera {
            Ok(())
        } else {
            Err(ProbeError::NotFound("no camera attached".into()))
        }
    }

    async fn audio(&self) -> Result<(), ProbeError> {
        if self.audio {
            Ok(())
        } else {
            Err(ProbeError::NotFound("no audio output".into()))
        }
    }

    async fn ai_service(&self) -> Result<(), ProbeError> {
        if self.ai {
            Ok(())
        } else {
            Err(ProbeError::Failed("AI feedback service unreachable".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CapabilityProbe for CountingProbe {
        async fn camera(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProbeError::PermissionDenied("user declined".into()))
        }

        async fn audio(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn ai_service(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn unrequested_features_are_not_probed() {
        let probe = CountingProbe::default();
        let caps = probe_capabilities(&probe, &FeatureRequest::none()).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert_eq!(caps, RuntimeCapabilities::default());
    }

    #[tokio::test]
    async fn ai_is_skipped_when_camera_fails() {
        let probe = CountingProbe::default();
        let request = FeatureRequest {
            camera: true,
            ai: true,
            audio: false,
        };
        let caps = probe_capabilities(&probe, &request).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            caps.camera,
            Capability::Unavailable("permission denied: user declined".into())
        );
        assert_eq!(caps.ai, Capability::NotProbed);
    }

    #[tokio::test]
    async fn static_probe_reports_headless_device() {
        let request = FeatureRequest {
            camera: true,
            ai: false,
            audio: true,
        };
        let caps = probe_capabilities(&StaticProbe::headless(), &request).await;
        assert!(matches!(caps.camera, Capability::Unavailable(_)));
        assert_eq!(caps.audio, Capability::Available);
    }
}
