//! Background sync loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::remote::RemoteSessionSink;
use crate::error::SyncError;
use crate::store::OfflineSessionStore;

/// Runs a sync pass on every interval tick and whenever connectivity
/// returns. Failures are logged and retried on the next pass.
pub struct SyncWorker {
    store: Arc<OfflineSessionStore>,
    remote: Arc<dyn RemoteSessionSink>,
    interval: Duration,
}

pub struct SyncWorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<OfflineSessionStore>,
        remote: Arc<dyn RemoteSessionSink>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    /// Spawn onto the current tokio runtime.
    pub fn spawn(self) -> SyncWorkerHandle {
        let (tx, rx) = oneshot::channel();
        let join = tokio::spawn(self.run(rx));
        SyncWorkerHandle {
            shutdown: Some(tx),
            join,
        }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "sync worker started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
                _ = self.store.connectivity_restored() => {
                    tracing::debug!("sync triggered by reconnect");
                }
            }
            self.pass().await;
        }
        tracing::debug!("sync worker stopped");
    }

    async fn pass(&self) {
        if !self.store.is_online() {
            return;
        }
        match self.store.sync_once(self.remote.as_ref()).await {
            Ok(report) if report.attempted > 0 => {
                tracing::debug!(synced = report.synced, rejected = report.rejected, "sync pass");
            }
            Ok(_) => {}
            Err(SyncError::Offline) => {}
            Err(e) => tracing::warn!(error = %e, "sync pass failed, will retry"),
        }
    }
}

impl SyncWorkerHandle {
    /// Stop the worker and wait for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sync worker ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewSession, StoreOptions, StoredSession};
    use crate::sync::PushOutcome;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct AcceptAll {
        pushes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteSessionSink for AcceptAll {
        async fn push_batch(
            &self,
            sessions: &[StoredSession],
        ) -> Result<Vec<PushOutcome>, SyncError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(sessions.iter().map(|s| PushOutcome::accepted(&s.id)).collect())
        }
    }

    fn session() -> NewSession {
        let now = Utc::now();
        NewSession {
            pattern_id: "box".into(),
            pattern_name: "Box Breathing".into(),
            start_time: now,
            end_time: now,
            duration_ms: 16_000,
            cycle_count: 1,
            breath_hold_time_ms: 4_000,
            restlessness_score: 0.0,
            completed: true,
        }
    }

    async fn wait_for_empty_queue(store: &OfflineSessionStore) -> bool {
        for _ in 0..100 {
            if store.sync_status().pending_count == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn worker_drains_pending_sessions() {
        let store = Arc::new(OfflineSessionStore::open_in_memory(StoreOptions::default()).unwrap());
        store.save_session(session());
        store.save_session(session());
        let remote = Arc::new(AcceptAll::default());

        let handle = SyncWorker::new(store.clone(), remote.clone(), Duration::from_millis(20)).spawn();
        assert!(wait_for_empty_queue(&store).await);
        handle.shutdown().await;

        assert!(remote.pushes.load(Ordering::SeqCst) >= 1);
        assert!(store.sync_status().last_sync_at.is_some());
    }

    #[tokio::test]
    async fn reconnect_triggers_a_pass() {
        let store = Arc::new(OfflineSessionStore::open_in_memory(StoreOptions::default()).unwrap());
        store.set_online(false);
        store.save_session(session());
        let remote = Arc::new(AcceptAll::default());

        // Long interval so only the reconnect can drive the second pass.
        let handle = SyncWorker::new(store.clone(), remote.clone(), Duration::from_secs(3600)).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(remote.pushes.load(Ordering::SeqCst), 0);

        store.set_online(true);
        assert!(wait_for_empty_queue(&store).await);
        handle.shutdown().await;
    }
}
