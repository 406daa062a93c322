use preview_core::normalize_url_for_dedupe;

use crate::{FailureKind, FetchError};

/// Cache key for a bookmark URL. Shares its normalisation with bookmark
/// de-duplication so both agree on what counts as the same page.
pub fn cache_key(raw: &str) -> Result<String, FetchError> {
    normalize_url_for_dedupe(raw).ok_or_else(|| {
        FetchError::new(
            FailureKind::InvalidUrl,
            format!("not an http(s) url: {}", raw.trim()),
        )
    })
}
