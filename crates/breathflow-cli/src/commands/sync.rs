//! Sync subcommand for pushing stored sessions to the remote store.

use breathflow_core::{Config, HttpSessionSink};
use clap::Subcommand;

use super::{open_store, runtime, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Show the sync queue state as JSON
    Status,
    /// Push pending sessions until the queue is empty or a pass fails
    Run,
    /// Move failed sessions back to their creation-order place in the queue
    Requeue,
}

pub fn run(action: SyncAction) -> CliResult {
    let config = Config::load()?;
    let store = open_store(&config)?;
    match action {
        SyncAction::Status => {
            println!("{}", serde_json::to_string_pretty(&store.sync_status())?);
        }
        SyncAction::Run => {
            let endpoint = config
                .sync
                .endpoint
                .as_deref()
                .ok_or("sync.endpoint is not configured")?;
            let mut sink = HttpSessionSink::new(endpoint)?;
            if let Some(key) = &config.sync.api_key {
                sink = sink.with_api_key(key.clone());
            }

            let rt = runtime()?;
            let mut synced = 0;
            rt.block_on(async {
                loop {
                    let report = store.sync_once(&sink).await?;
                    synced += report.synced;
                    // Stop once a pass makes no progress.
                    if report.attempted == 0 || report.synced == 0 {
                        return Ok::<_, breathflow_core::SyncError>(());
                    }
                }
            })?;
            let status = store.sync_status();
            println!(
                "{}",
                serde_json::json!({
                    "synced": synced,
                    "pending": status.pending_count,
                    "failed": status.failed_count,
                })
            );
        }
        SyncAction::Requeue => {
            let count = store.requeue_failed()?;
            println!("requeued {count} session(s)");
        }
    }
    Ok(())
}
