//! Domain types shared across the workspace: platforms, work items,
//! collection jobs, and the canonical scraped-record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown job kind: {0}")]
    UnknownJobKind(String),

    #[error("targets/rows length mismatch: {targets} targets, {rows} rows")]
    SheetRowMismatch { targets: usize, rows: usize },
}

/// Social platform a work item or job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    /// All platforms, in the order batches are split by the scheduler.
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::Tiktok];
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instagram" | "ig" => Ok(Platform::Instagram),
            "tiktok" | "tt" => Ok(Platform::Tiktok),
            other => Err(CoreError::UnknownPlatform(other.to_owned())),
        }
    }
}

/// What a collection job scrapes: a profile's posts, a hashtag, or a
/// free-text keyword search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Profile,
    Hashtag,
    Keyword,
}

impl JobKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Profile => "profile",
            JobKind::Hashtag => "hashtag",
            JobKind::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "profile" => Ok(JobKind::Profile),
            "hashtag" => Ok(JobKind::Hashtag),
            "keyword" => Ok(JobKind::Keyword),
            other => Err(CoreError::UnknownJobKind(other.to_owned())),
        }
    }
}

/// Normalizes a raw handle cell: trims whitespace and strips one leading `@`.
///
/// Comparison of identifiers is always done case-insensitively; this helper
/// preserves the original casing for display and URL building.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed).to_owned()
}

/// One row of a tracked spreadsheet, re-derived on every read.
///
/// Exactly one of {not-started, collected, collecting, uncollectable}
/// holds per item. `collecting` and `uncollectable` are explicit markers
/// layered over the raw collected count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based sheet row, stable for the duration of one cycle.
    pub row: u32,
    /// Normalized handle (no leading `@`).
    pub identifier: String,
    pub platform: Platform,
    pub profile_url: Option<String>,
    pub followers: Option<i64>,
    pub collected_count: u32,
    pub collecting: bool,
    pub uncollectable: bool,
}

impl WorkItem {
    #[must_use]
    pub fn is_collected(&self) -> bool {
        self.collected_count > 0
    }

    /// Eligible for scheduling: not collected, not in flight, not
    /// permanently failed.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_collected() && !self.collecting && !self.uncollectable
    }
}

/// Sheet provenance carried by a job so the processor can reconcile
/// per-target outcomes back into the source.
///
/// `rows[i]` is the sheet row of `targets[i]` on the owning job; the
/// alignment is enforced by [`CollectionJob::with_sheet_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub source_id: String,
    pub sheet_name: String,
    pub rows: Vec<u32>,
}

/// Unit of work submitted to the durable queue: one provider snapshot
/// covering an ordered list of targets on a single platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionJob {
    pub kind: JobKind,
    pub platform: Platform,
    pub targets: Vec<String>,
    pub items_per_target: u32,
    pub group_id: Option<Uuid>,
    pub sheet_info: Option<SheetInfo>,
}

impl CollectionJob {
    /// A job with no sheet provenance (manual CLI collection).
    #[must_use]
    pub fn new(
        kind: JobKind,
        platform: Platform,
        targets: Vec<String>,
        items_per_target: u32,
    ) -> Self {
        Self {
            kind,
            platform,
            targets,
            items_per_target,
            group_id: None,
            sheet_info: None,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group_id: Option<Uuid>) -> Self {
        self.group_id = group_id;
        self
    }

    /// Attaches sheet provenance, enforcing the positional alignment
    /// between `targets` and `sheet_info.rows`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SheetRowMismatch`] if the lengths differ.
    pub fn with_sheet_info(mut self, sheet_info: SheetInfo) -> Result<Self, CoreError> {
        if self.targets.len() != sheet_info.rows.len() {
            return Err(CoreError::SheetRowMismatch {
                targets: self.targets.len(),
                rows: sheet_info.rows.len(),
            });
        }
        self.sheet_info = Some(sheet_info);
        Ok(self)
    }
}

/// Author identity attached to a canonical record.
///
/// Absence of any field means the provider did not supply it — never zero
/// or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAuthor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub followers: Option<i64>,
    pub following: Option<i64>,
}

impl RecordAuthor {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.name.is_none()
            && self.username.is_none()
            && self.profile_url.is_none()
            && self.avatar_url.is_none()
            && self.followers.is_none()
            && self.following.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContent {
    pub content_type: Option<String>,
    pub caption: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
}

impl RecordContent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content_type.is_none()
            && self.caption.is_none()
            && self.thumbnail_url.is_none()
            && self.video_url.is_none()
    }
}

/// Cumulative public counters observed at scrape time.
///
/// A counter the provider omitted normalizes to 0; the persistence layer's
/// max-merge rule keeps a previously observed higher value (see
/// `smpdb-db::posts`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetrics {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

/// Normalized, provider-agnostic representation of one scraped content item.
///
/// `source_url` is the stable natural key used for persistence upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: Option<String>,
    pub source_url: String,
    /// Provider-side collection timestamp, when supplied.
    pub collected_at: Option<DateTime<Utc>>,
    pub author: Option<RecordAuthor>,
    pub content: Option<RecordContent>,
    pub metrics: Option<RecordMetrics>,
    pub posted_at: Option<DateTime<Utc>>,
    /// Full provider payload, kept for fields not yet modeled.
    pub raw: serde_json::Value,
}

/// Result of a persistence upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
}

/// Control command pushed back by the monitoring endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
    Trigger,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
