use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use smpdb_core::{CanonicalRecord, Platform};

use crate::error::ProviderError;
use crate::normalize::normalize_records;
use crate::types::{ProgressResponse, ProviderInput, SnapshotHandle, SnapshotStatus, TriggerResponse};

/// Settings for [`ProviderClient`], sourced from `AppConfig` in the binaries.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base: String,
    pub token: String,
    pub dataset_instagram: Option<String>,
    pub dataset_tiktok: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

/// HTTP client for the provider's dataset-snapshot API.
///
/// Drives the trigger → poll → download protocol: a trigger request starts
/// an asynchronous collection and returns a snapshot id; the snapshot
/// endpoint reports `{"status": ...}` while the collection runs and the
/// raw result array once it is ready.
///
/// Only [`ProviderClient::await_completion`] carries an explicit timeout.
/// Trigger and download requests rely on the transport-level request
/// timeout; operators should size worker concurrency with that in mind.
pub struct ProviderClient {
    client: Client,
    api_base: String,
    token: String,
    dataset_instagram: Option<String>,
    dataset_tiktok: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ProviderClient {
    /// Creates a `ProviderClient` with the configured timeout and datasets.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_owned(),
            token: settings.token,
            dataset_instagram: settings.dataset_instagram,
            dataset_tiktok: settings.dataset_tiktok,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            max_wait: Duration::from_secs(settings.max_wait_secs),
        })
    }

    fn dataset_for(&self, platform: Platform) -> Result<&str, ProviderError> {
        let dataset = match platform {
            Platform::Instagram => self.dataset_instagram.as_deref(),
            Platform::Tiktok => self.dataset_tiktok.as_deref(),
        };
        dataset.ok_or_else(|| ProviderError::Configuration {
            platform: platform.to_string(),
        })
    }

    fn snapshot_url(&self, snapshot_id: &str) -> String {
        format!(
            "{}/datasets/v3/snapshot/{snapshot_id}?format=json",
            self.api_base
        )
    }

    /// Starts an asynchronous collection for the given inputs.
    ///
    /// One input per logical target; targets are not deduplicated here, the
    /// caller owns that and the positional alignment with sheet rows.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Configuration`] — no dataset configured for `platform`.
    /// - [`ProviderError::Http`] / [`ProviderError::UnexpectedStatus`] — transport
    ///   or non-2xx response.
    /// - [`ProviderError::Deserialize`] — response body is not a trigger response.
    pub async fn trigger(
        &self,
        platform: Platform,
        inputs: &[ProviderInput],
    ) -> Result<SnapshotHandle, ProviderError> {
        let dataset_id = self.dataset_for(platform)?;
        let url = format!(
            "{}/datasets/v3/trigger?dataset_id={dataset_id}&include_errors=true",
            self.api_base
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&inputs)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let trigger: TriggerResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
                context: format!("trigger response for {platform}"),
                source: e,
            })?;

        tracing::debug!(
            snapshot_id = %trigger.snapshot_id,
            %platform,
            inputs = inputs.len(),
            "snapshot triggered"
        );

        Ok(SnapshotHandle {
            snapshot_id: trigger.snapshot_id,
            platform,
        })
    }

    /// One synchronous status check — no internal retry or waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`], [`ProviderError::UnexpectedStatus`],
    /// or [`ProviderError::Deserialize`] on transport/shape failures.
    pub async fn poll_status(&self, handle: &SnapshotHandle) -> Result<SnapshotStatus, ProviderError> {
        let url = self.snapshot_url(&handle.snapshot_id);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
            context: format!("snapshot {} status", handle.snapshot_id),
            source: e,
        })?;

        // A ready snapshot answers with the result array itself; anything
        // still in flight answers with a {"status": ...} object.
        if value.is_array() {
            return Ok(SnapshotStatus::Ready);
        }

        let progress: ProgressResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Deserialize {
                context: format!("snapshot {} status", handle.snapshot_id),
                source: e,
            })?;

        match progress.status.as_str() {
            "ready" | "done" => Ok(SnapshotStatus::Ready),
            "failed" | "error" => Ok(SnapshotStatus::Failed),
            _ => Ok(SnapshotStatus::Running),
        }
    }

    /// Downloads the full decoded result set of a ready snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Deserialize`] when the body is not yet the
    /// result array (snapshot still running), plus the usual transport
    /// failures.
    pub async fn fetch_results(&self, handle: &SnapshotHandle) -> Result<Vec<Value>, ProviderError> {
        let url = self.snapshot_url(&handle.snapshot_id);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| ProviderError::Deserialize {
            context: format!("snapshot {} results", handle.snapshot_id),
            source: e,
        })
    }

    /// Polls at a fixed interval until the snapshot is ready, then downloads
    /// and normalizes the results.
    ///
    /// The interval is deliberately constant rather than backed off: the
    /// provider's own job routinely takes minutes, and a fixed cadence keeps
    /// the worst-case detection latency at one interval.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Timeout`] — still running after the configured max wait.
    /// - [`ProviderError::Failed`] — provider reported the snapshot as failed.
    /// - Any error from [`Self::poll_status`] / [`Self::fetch_results`].
    pub async fn await_completion(
        &self,
        handle: &SnapshotHandle,
    ) -> Result<Vec<CanonicalRecord>, ProviderError> {
        let started = Instant::now();

        loop {
            match self.poll_status(handle).await? {
                SnapshotStatus::Ready => {
                    let raws = self.fetch_results(handle).await?;
                    tracing::debug!(
                        snapshot_id = %handle.snapshot_id,
                        rows = raws.len(),
                        "snapshot ready"
                    );
                    return Ok(normalize_records(&raws));
                }
                SnapshotStatus::Failed => {
                    return Err(ProviderError::Failed {
                        snapshot_id: handle.snapshot_id.clone(),
                    });
                }
                SnapshotStatus::Running => {
                    let waited = started.elapsed();
                    if waited >= self.max_wait {
                        return Err(ProviderError::Timeout {
                            snapshot_id: handle.snapshot_id.clone(),
                            waited_secs: waited.as_secs(),
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
