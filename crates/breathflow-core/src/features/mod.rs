//! Optional session features (camera, AI feedback, audio) and the rules
//! that decide which of them a session actually gets.

mod negotiator;
mod probe;
mod types;

pub use negotiator::{negotiate, Negotiation};
pub use probe::{probe_capabilities, CapabilityProbe, ProbeError, StaticProbe};
pub use types::{
    Capability, Feature, FeatureMap, FeatureRequest, FeatureResource, FeatureStatus,
    RuntimeCapabilities,
};
