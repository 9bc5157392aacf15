//! Remote session store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::types::PushOutcome;
use crate::error::{ConfigError, SyncError};
use crate::store::StoredSession;

/// Destination for locally stored sessions.
///
/// A transport failure is an `Err` and records nothing locally. Per-session
/// rejections come back as `PushOutcome`s. Sessions missing from the
/// returned list stay pending.
#[async_trait]
pub trait RemoteSessionSink: Send + Sync {
    async fn push_batch(&self, sessions: &[StoredSession]) -> Result<Vec<PushOutcome>, SyncError>;
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    sessions: &'a [StoredSession],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    results: Vec<BatchResult>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    id: String,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Pushes batches as JSON to `{endpoint}/sessions/batch`.
#[derive(Debug, Clone)]
pub struct HttpSessionSink {
    client: reqwest::Client,
    batch_url: Url,
    api_key: Option<String>,
}

impl HttpSessionSink {
    pub fn new(endpoint: &str) -> Result<Self, ConfigError> {
        let mut base = Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "sync.endpoint".into(),
            message: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let batch_url = base.join("sessions/batch").map_err(|e| ConfigError::InvalidValue {
            key: "sync.endpoint".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            batch_url,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }
}

#[async_trait]
impl RemoteSessionSink for HttpSessionSink {
    async fn push_batch(&self, sessions: &[StoredSession]) -> Result<Vec<PushOutcome>, SyncError> {
        let mut request = self
            .client
            .post(self.batch_url.clone())
            .json(&BatchRequest { sessions });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: BatchResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            pushed = sessions.len(),
            answered = parsed.results.len(),
            "remote batch response"
        );

        Ok(parsed
            .results
            .into_iter()
            .map(|r| {
                if r.ok {
                    PushOutcome::accepted(r.id)
                } else {
                    let reason = r.error.unwrap_or_else(|| "rejected by remote".into());
                    PushOutcome::rejected(r.id, reason)
                }
            })
            .collect())
    }
}
