//! Offline-first session persistence.
//!
//! Completed sessions are written locally first and pushed to the remote
//! store later. Local rows are append-only; sync progress lives in a
//! separate append-only log plus a monotonically advancing cursor.

pub mod migrations;
mod offline;
mod record;

pub use offline::{OfflineSessionStore, StoreOptions};
pub use record::{NewSession, StoredSession, SyncState};
