//! Builds provider trigger inputs from a job's kind, platform, and targets.

use smpdb_core::{JobKind, Platform};

use crate::types::ProviderInput;

/// Canonical profile URL for a handle on a platform.
///
/// The provider's profile datasets key on the public profile URL, not the
/// bare handle.
#[must_use]
pub fn profile_url(platform: Platform, handle: &str) -> String {
    match platform {
        Platform::Instagram => format!("https://www.instagram.com/{handle}/"),
        Platform::Tiktok => format!("https://www.tiktok.com/@{handle}"),
    }
}

/// One input object per logical target, in target order.
///
/// No deduplication happens here: callers pre-deduplicate targets, and the
/// positional alignment with sheet rows must survive untouched.
#[must_use]
pub fn build_inputs(kind: JobKind, platform: Platform, targets: &[String]) -> Vec<ProviderInput> {
    targets
        .iter()
        .map(|target| match kind {
            JobKind::Profile => ProviderInput::Url {
                url: profile_url(platform, target),
            },
            JobKind::Hashtag => ProviderInput::Hashtag {
                hashtag: target.trim_start_matches('#').to_owned(),
            },
            JobKind::Keyword => ProviderInput::Keyword {
                keyword: target.clone(),
            },
        })
        .collect()
}
