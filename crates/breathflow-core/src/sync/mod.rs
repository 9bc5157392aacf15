//! Background synchronization of locally stored sessions.
//!
//! The offline store owns the queue; this module provides the remote side
//! (`RemoteSessionSink`, with an HTTP implementation) and the worker that
//! drives sync passes on an interval or when connectivity returns.

pub mod remote;
pub mod types;
pub mod worker;


pub use remote::{HttpSessionSink, RemoteSessionSink};
pub use types::{PushOutcome, PushResult, SyncReport, SyncStatus};
pub use worker::{SyncWorker, SyncWorkerHandle};
