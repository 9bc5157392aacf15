//! # Breathflow Core Library
//!
//! This library provides the core logic for the Breathflow guided-breathing
//! engine. Every operation is available through the standalone CLI binary;
//! any graphical front end is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Phase Clock**: a tick-driven timer that reports each finished phase
//!   exactly once and chains the next phase from the previous deadline
//! - **Session Machine**: the single owner of session state; every command
//!   returns the events it produced
//! - **Feature Negotiation**: camera, AI feedback and audio resolved against
//!   probed capabilities and their dependency rules
//! - **Offline Store**: SQLite-backed session log with a background sync
//!   queue to a remote store
//!
//! ## Key Components
//!
//! - [`SessionOrchestrator`]: variant selection, target cycles, metrics
//! - [`SessionMachine`]: session state machine
//! - [`PhaseClock`]: phase timing
//! - [`OfflineSessionStore`]: offline-first persistence and sync bookkeeping
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod features;
pub mod orchestrator;
pub mod pattern;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;
pub mod vision;

pub use clock::{ManualTimeSource, PhaseClock, PhaseCompletion, SystemTimeSource, TimeSource};
pub use error::{
    ClockFault, ConfigError, CoreError, SessionError, StoreError, SyncError, ValidationError,
};
pub use events::SessionEvent;
pub use features::{
    CapabilityProbe, Feature, FeatureMap, FeatureRequest, FeatureStatus, RuntimeCapabilities,
    StaticProbe,
};
pub use orchestrator::{
    select_variant, DisplayMode, SessionConfig, SessionFlow, SessionMetrics, SessionOrchestrator,
    SessionVariant,
};
pub use pattern::{BreathingPattern, PatternLibrary, PatternSource, Phase, PhaseName};
pub use session::{SessionData, SessionMachine, SessionPhase, SessionState};
pub use storage::{data_dir, Config};
pub use store::{NewSession, OfflineSessionStore, StoreOptions, StoredSession, SyncState};
pub use sync::{HttpSessionSink, RemoteSessionSink, SyncStatus, SyncWorker};
pub use vision::{FrameMetrics, VisionSummary, VisionTracker};
