pub mod config;
pub mod history;
pub mod patterns;
pub mod session;
pub mod sync;

use breathflow_core::{Config, OfflineSessionStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Single-threaded runtime for commands that talk to async collaborators.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

pub fn open_store(config: &Config) -> Result<OfflineSessionStore, Box<dyn std::error::Error>> {
    Ok(OfflineSessionStore::open_default(config.store_options())?)
}
