//! Manual collection: builds and enqueues exactly one job, without sheet
//! provenance. Execution is left to a running worker.

use std::time::Duration;

use clap::Args;
use uuid::Uuid;

use smpdb_core::{normalize_identifier, CollectionJob, JobKind, Platform};

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Target platform (instagram, tiktok).
    #[arg(long)]
    pub platform: Platform,

    /// What to collect (profile, hashtag, keyword).
    #[arg(long, default_value = "profile")]
    pub kind: JobKind,

    /// Group to link persisted records to.
    #[arg(long)]
    pub group: Option<Uuid>,

    /// Requested results per target.
    #[arg(long, default_value_t = 12)]
    pub limit: u32,

    /// Target identifiers (handles, hashtags, or keywords).
    #[arg(required = true)]
    pub targets: Vec<String>,
}

/// Normalizes profile handles and drops duplicate targets while keeping
/// the original order. The provider contract forbids duplicate inputs in
/// one trigger.
fn prepare_targets(kind: JobKind, raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|target| match kind {
            JobKind::Profile => normalize_identifier(target),
            JobKind::Hashtag | JobKind::Keyword => target.trim().to_owned(),
        })
        .filter(|target| !target.is_empty())
        .filter(|target| seen.insert(target.to_lowercase()))
        .collect()
}

pub async fn run(args: CollectArgs) -> anyhow::Result<()> {
    let targets = prepare_targets(args.kind, &args.targets);
    if targets.is_empty() {
        anyhow::bail!("no usable targets after normalization");
    }

    let job = CollectionJob::new(args.kind, args.platform, targets, args.limit)
        .with_group(args.group);

    let pool = smpdb_db::connect_pool_from_env().await?;
    let max_attempts = read_max_attempts();
    let row = smpdb_db::enqueue_job(&pool, &job, Duration::ZERO, max_attempts).await?;

    println!(
        "enqueued job {} ({} {} target(s) on {})",
        row.public_id,
        job.targets.len(),
        job.kind,
        job.platform
    );
    Ok(())
}

fn read_max_attempts() -> u32 {
    std::env::var("SMPDB_JOB_MAX_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(3)
}
