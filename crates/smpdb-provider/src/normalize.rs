//! Normalization from raw provider payloads to [`smpdb_core::CanonicalRecord`].
//!
//! Provider payloads use inconsistent field names across platforms and even
//! across response variants for the same platform. Every canonical field is
//! resolved through an ordered candidate list: the first present, non-null
//! value wins. New provider variants are handled by extending the tables —
//! control flow never changes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use smpdb_core::{CanonicalRecord, RecordAuthor, RecordContent, RecordMetrics};

// ---------------------------------------------------------------------------
// Field candidate tables, first match wins
// ---------------------------------------------------------------------------

const URL_FIELDS: &[&str] = &["url", "post_url", "share_url", "link", "input_url"];
const ID_FIELDS: &[&str] = &["id", "post_id", "item_id", "shortcode", "video_id"];

const AUTHOR_ID_FIELDS: &[&str] = &["user_id", "author_id", "owner_id", "profile_id"];
const AUTHOR_NAME_FIELDS: &[&str] = &["full_name", "profile_name", "author_name", "nickname"];
const AUTHOR_USERNAME_FIELDS: &[&str] = &[
    "username",
    "user_posted",
    "account",
    "author_username",
    "unique_id",
];
const AUTHOR_PROFILE_URL_FIELDS: &[&str] = &["profile_url", "user_url", "author_url"];
const AUTHOR_AVATAR_FIELDS: &[&str] = &[
    "profile_image_link",
    "avatar_url",
    "profile_pic_url",
    "user_avatar",
];
const AUTHOR_FOLLOWERS_FIELDS: &[&str] = &["followers", "follower_count", "followers_count"];
const AUTHOR_FOLLOWING_FIELDS: &[&str] = &["following", "following_count"];

const CONTENT_TYPE_FIELDS: &[&str] = &["content_type", "media_type", "post_type"];
const CAPTION_FIELDS: &[&str] = &["caption", "description", "post_text", "title", "desc"];
const THUMBNAIL_FIELDS: &[&str] = &[
    "thumbnail",
    "thumbnail_url",
    "display_url",
    "preview_image",
    "cover_url",
];
const VIDEO_URL_FIELDS: &[&str] = &["video_url", "video_play_url", "media_url"];

const VIEWS_FIELDS: &[&str] = &[
    "video_view_count",
    "views",
    "view_count",
    "play_count",
    "video_play_count",
];
const LIKES_FIELDS: &[&str] = &["like_count", "likes", "digg_count", "likes_count"];
const COMMENTS_FIELDS: &[&str] = &["comment_count", "comments", "comments_count"];
const SHARES_FIELDS: &[&str] = &["share_count", "shares", "repost_count"];

/// `posted_at` resolution order: epoch-seconds fields, then formatted date
/// strings, then the generic timestamp the provider stamps on every row.
const POSTED_AT_EPOCH_FIELDS: &[&str] = &["taken_at_timestamp", "create_time"];
const POSTED_AT_DATE_FIELDS: &[&str] = &["date_posted", "created_at", "posted_at"];
const POSTED_AT_GENERIC_FIELDS: &[&str] = &["timestamp"];

const COLLECTED_AT_FIELDS: &[&str] = &["timestamp"];

// ---------------------------------------------------------------------------
// Candidate resolution
// ---------------------------------------------------------------------------

/// First candidate field holding a non-empty string or a number.
///
/// Numbers are stringified — providers flip-flop between string and numeric
/// ids across payload variants.
fn first_string(raw: &Value, fields: &[&str]) -> Option<String> {
    for field in fields {
        match raw.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First candidate field holding an integer, a float, or a numeric string.
fn first_integer(raw: &Value, fields: &[&str]) -> Option<i64> {
    for field in fields {
        match raw.get(field) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
                #[allow(clippy::cast_possible_truncation)]
                if let Some(f) = n.as_f64() {
                    return Some(f as i64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a provider date string: RFC 3339 first, then the bare formats
/// observed in snapshot payloads.
fn parse_date_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn first_datetime(raw: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    first_string(raw, fields).and_then(|s| parse_date_string(&s))
}

/// Resolves `posted_at`: epoch-seconds candidates, then date strings, then
/// the generic timestamp field.
fn resolve_posted_at(raw: &Value) -> Option<DateTime<Utc>> {
    if let Some(epoch) = first_integer(raw, POSTED_AT_EPOCH_FIELDS) {
        if let Some(dt) = DateTime::from_timestamp(epoch, 0) {
            return Some(dt);
        }
    }
    if let Some(dt) = first_datetime(raw, POSTED_AT_DATE_FIELDS) {
        return Some(dt);
    }
    first_datetime(raw, POSTED_AT_GENERIC_FIELDS)
}

// ---------------------------------------------------------------------------
// Record normalization
// ---------------------------------------------------------------------------

/// Normalizes one raw provider object into a [`CanonicalRecord`].
///
/// Returns `None` when no source-URL candidate is present — a record
/// without its natural key cannot be persisted or merged.
///
/// Metric counters default to 0 when absent; author and content
/// sub-objects are omitted entirely when none of their candidates matched,
/// so "provider did not supply" stays distinguishable downstream.
#[must_use]
pub fn normalize_record(raw: &Value) -> Option<CanonicalRecord> {
    let source_url = first_string(raw, URL_FIELDS)?;

    let author = RecordAuthor {
        id: first_string(raw, AUTHOR_ID_FIELDS),
        name: first_string(raw, AUTHOR_NAME_FIELDS),
        username: first_string(raw, AUTHOR_USERNAME_FIELDS),
        profile_url: first_string(raw, AUTHOR_PROFILE_URL_FIELDS),
        avatar_url: first_string(raw, AUTHOR_AVATAR_FIELDS),
        followers: first_integer(raw, AUTHOR_FOLLOWERS_FIELDS),
        following: first_integer(raw, AUTHOR_FOLLOWING_FIELDS),
    };

    let content = RecordContent {
        content_type: first_string(raw, CONTENT_TYPE_FIELDS),
        caption: first_string(raw, CAPTION_FIELDS),
        thumbnail_url: first_string(raw, THUMBNAIL_FIELDS),
        video_url: first_string(raw, VIDEO_URL_FIELDS),
    };

    let metrics = RecordMetrics {
        views: first_integer(raw, VIEWS_FIELDS).unwrap_or(0),
        likes: first_integer(raw, LIKES_FIELDS).unwrap_or(0),
        comments: first_integer(raw, COMMENTS_FIELDS).unwrap_or(0),
        shares: first_integer(raw, SHARES_FIELDS).unwrap_or(0),
    };

    Some(CanonicalRecord {
        id: first_string(raw, ID_FIELDS),
        source_url,
        collected_at: first_datetime(raw, COLLECTED_AT_FIELDS),
        author: (!author.is_empty()).then_some(author),
        content: (!content.is_empty()).then_some(content),
        metrics: Some(metrics),
        posted_at: resolve_posted_at(raw),
        raw: raw.clone(),
    })
}

/// Normalizes a full snapshot result set.
///
/// Rows flagged by the provider as per-input errors (`include_errors=true`
/// surfaces them as objects with a top-level `error` key) and rows without
/// a usable source URL are skipped with a warning.
#[must_use]
pub fn normalize_records(raws: &[Value]) -> Vec<CanonicalRecord> {
    let mut records = Vec::with_capacity(raws.len());
    for raw in raws {
        if raw.get("error").is_some_and(|e| !e.is_null()) {
            tracing::warn!(
                error = %raw["error"],
                "skipping provider error row"
            );
            continue;
        }
        match normalize_record(raw) {
            Some(record) => records.push(record),
            None => {
                tracing::warn!("skipping provider row without a source URL");
            }
        }
    }
    records
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
