//! Wire types for the dataset-snapshot provider protocol.

use serde::{Deserialize, Serialize};
use smpdb_core::Platform;

/// One trigger input object. The provider expects exactly one key per
/// object, so each variant serializes to a single-field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProviderInput {
    Url { url: String },
    Username { username: String },
    Hashtag { hashtag: String },
    Keyword { keyword: String },
}

/// Opaque handle for one in-flight snapshot request.
///
/// Lives only for the duration of one job; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub snapshot_id: String,
    pub platform: Platform,
}

/// Snapshot lifecycle as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Running,
    Ready,
    Failed,
}

/// Trigger response body: `{"snapshot_id": "...", "status": "running"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct TriggerResponse {
    pub snapshot_id: String,
    #[allow(dead_code)] // present on the wire; the id alone drives polling
    pub status: Option<String>,
}

/// Poll response body while a snapshot is not yet ready.
#[derive(Debug, Deserialize)]
pub(crate) struct ProgressResponse {
    pub status: String,
}
