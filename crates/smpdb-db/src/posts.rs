//! Database operations for `posts` and `group_posts`.

use sqlx::PgPool;
use uuid::Uuid;

use smpdb_core::{CanonicalRecord, Platform, UpsertStats};

use crate::DbError;

/// Upserts a batch of canonical records, keyed by `source_url`.
///
/// The whole batch runs in one transaction: either all records apply or
/// none do, so a mid-batch failure cannot leave a half-written snapshot.
///
/// Insert path: unknown author identity defaults to the `'unknown'`
/// sentinel rather than failing the record. Merge path:
/// - string fields are replaced only by non-empty new values;
/// - cumulative counters (views/likes/comments/shares) take
///   `GREATEST(old, new)` — collection runs are cumulative observations of
///   monotonically-growing public counters, and a later partial scrape must
///   never regress a previously observed higher count. A genuinely-zero new
///   observation is therefore indistinguishable from "provider omitted the
///   field"; both leave an existing nonzero value in place, which is the
///   intended bias;
/// - `posted_at` is filled only when currently NULL.
///
/// Group linkage is best-effort enrichment: it runs after the batch
/// commits, and its failure is logged and swallowed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the transaction fails. Linkage failures
/// never propagate.
pub async fn upsert_posts(
    pool: &PgPool,
    platform: Platform,
    records: &[CanonicalRecord],
    group_id: Option<Uuid>,
) -> Result<UpsertStats, DbError> {
    let mut tx = pool.begin().await?;
    let mut stats = UpsertStats::default();
    let mut post_ids: Vec<i64> = Vec::with_capacity(records.len());

    for record in records {
        let (id, inserted) = upsert_post(&mut tx, platform, record).await?;
        post_ids.push(id);
        if inserted {
            stats.inserted += 1;
        } else {
            stats.updated += 1;
        }
    }

    tx.commit().await?;

    if let Some(group_id) = group_id {
        if let Err(e) = link_posts_to_group(pool, group_id, &post_ids).await {
            tracing::warn!(
                %group_id,
                error = %e,
                "group linkage failed; records persisted without links"
            );
        }
    }

    Ok(stats)
}

/// Upserts one record inside the batch transaction.
///
/// Returns the internal row id and whether the row was newly inserted
/// (`xmax = 0` discriminates insert from update on the conflict path).
async fn upsert_post(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    platform: Platform,
    record: &CanonicalRecord,
) -> Result<(i64, bool), DbError> {
    let author = record.author.clone().unwrap_or_default();
    let content = record.content.clone().unwrap_or_default();
    let metrics = record.metrics.unwrap_or_default();

    let row: (i64, bool) = sqlx::query_as(
        "INSERT INTO posts \
             (platform, source_url, source_item_id, author_id, author_username, \
              author_name, author_profile_url, author_avatar_url, author_followers, \
              content_type, caption, thumbnail_url, video_url, \
              views, likes, comments, shares, posted_at, raw) \
         VALUES ($1, $2, $3, $4, COALESCE(NULLIF($5, ''), 'unknown'), \
                 $6, $7, $8, $9, \
                 $10, $11, $12, $13, \
                 $14, $15, $16, $17, $18, $19::jsonb) \
         ON CONFLICT (source_url) DO UPDATE SET \
             source_item_id     = COALESCE(NULLIF(EXCLUDED.source_item_id, ''), posts.source_item_id), \
             author_id          = COALESCE(NULLIF(EXCLUDED.author_id, ''), posts.author_id), \
             author_username    = CASE WHEN EXCLUDED.author_username NOT IN ('', 'unknown') \
                                       THEN EXCLUDED.author_username ELSE posts.author_username END, \
             author_name        = COALESCE(NULLIF(EXCLUDED.author_name, ''), posts.author_name), \
             author_profile_url = COALESCE(NULLIF(EXCLUDED.author_profile_url, ''), posts.author_profile_url), \
             author_avatar_url  = COALESCE(NULLIF(EXCLUDED.author_avatar_url, ''), posts.author_avatar_url), \
             author_followers   = COALESCE(EXCLUDED.author_followers, posts.author_followers), \
             content_type       = COALESCE(NULLIF(EXCLUDED.content_type, ''), posts.content_type), \
             caption            = COALESCE(NULLIF(EXCLUDED.caption, ''), posts.caption), \
             thumbnail_url      = COALESCE(NULLIF(EXCLUDED.thumbnail_url, ''), posts.thumbnail_url), \
             video_url          = COALESCE(NULLIF(EXCLUDED.video_url, ''), posts.video_url), \
             views              = GREATEST(posts.views, EXCLUDED.views), \
             likes              = GREATEST(posts.likes, EXCLUDED.likes), \
             comments           = GREATEST(posts.comments, EXCLUDED.comments), \
             shares             = GREATEST(posts.shares, EXCLUDED.shares), \
             posted_at          = COALESCE(posts.posted_at, EXCLUDED.posted_at), \
             raw                = COALESCE(EXCLUDED.raw, posts.raw), \
             updated_at         = NOW() \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(platform.as_str())
    .bind(&record.source_url)
    .bind(&record.id)
    .bind(&author.id)
    .bind(author.username.as_deref().unwrap_or_default())
    .bind(&author.name)
    .bind(&author.profile_url)
    .bind(&author.avatar_url)
    .bind(author.followers)
    .bind(&content.content_type)
    .bind(&content.caption)
    .bind(&content.thumbnail_url)
    .bind(&content.video_url)
    .bind(metrics.views)
    .bind(metrics.likes)
    .bind(metrics.comments)
    .bind(metrics.shares)
    .bind(record.posted_at)
    .bind(&record.raw)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row)
}

/// Links posts to a group with insert-if-absent semantics.
///
/// Returns the number of links actually inserted. A missing group (or a
/// dropped linking table) surfaces as an error for the caller to swallow —
/// linkage must never fail the core upsert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn link_posts_to_group(
    pool: &PgPool,
    group_id: Uuid,
    post_ids: &[i64],
) -> Result<u64, DbError> {
    if post_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "INSERT INTO group_posts (group_id, post_id) \
         SELECT $1, UNNEST($2::bigint[]) \
         ON CONFLICT (group_id, post_id) DO NOTHING",
    )
    .bind(group_id)
    .bind(post_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
