//! HTTP implementation of the remote sync client

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::{
    ResolveFinalRequest, ResolveFinalResponse, StepSubmitRequest, StepSubmitResponse, SyncClient,
    SyncError,
};
use crate::config::RemoteConfig;
use crate::profile::FieldMap;

const CLIENT_NAME: &str = "http";

/// JSON-over-HTTP client of the scoring service
pub struct HttpSyncClient {
    base_url: String,
    client: Client,
    /// Maximum retry attempts for transient failures
    max_retries: usize,
    /// Base delay for exponential backoff
    base_delay: Duration,
    /// Maximum delay between retries
    max_delay: Duration,
}

impl HttpSyncClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        })
    }

    /// Create from the `[remote]` config section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, SyncError> {
        Ok(Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?
            .with_retry_config(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
                Duration::from_millis(config.retry_max_delay_ms),
            ))
    }

    /// Override retry settings
    pub fn with_retry_config(
        mut self,
        max_retries: usize,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the retry strategy
    fn retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }

    /// POST a JSON body and decode the JSON answer
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SyncError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_status(status.as_u16(), body, retry_after));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::invalid_response(format!("Parse error: {}", e)))
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    fn name(&self) -> &str {
        CLIENT_NAME
    }

    #[instrument(skip(self, fields))]
    async fn submit_step(
        &self,
        fields: &FieldMap,
        session_id: Option<&str>,
    ) -> Result<StepSubmitResponse, SyncError> {
        let request = StepSubmitRequest {
            session_id: session_id.map(str::to_string),
            fields: fields.clone(),
        };

        let op = || async {
            self.post_json::<_, StepSubmitResponse>("steps", &request)
                .await
        };

        // A create may have landed before the failure surfaced; only updates are replayed
        op.retry(self.retry_strategy())
            .when(|err| session_id.is_some() && err.is_transient())
            .notify(|err, dur| {
                warn!("Retrying submit_step after {:?}: {}", dur, err);
            })
            .await
    }

    #[instrument(skip(self))]
    async fn resolve_final(&self, session_id: &str) -> Result<String, SyncError> {
        let request = ResolveFinalRequest {
            session_id: session_id.to_string(),
        };

        let op = || async {
            self.post_json::<_, ResolveFinalResponse>("resolve", &request)
                .await
        };

        let response = op
            .retry(self.retry_strategy())
            .when(SyncError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying resolve_final after {:?}: {}", dur, err);
            })
            .await?;

        if response.record_id.trim().is_empty() {
            return Err(SyncError::invalid_response("empty record id"));
        }
        Ok(response.record_id)
    }
}
