use sha2::{Digest, Sha256};

/// Deterministic cache file name for a normalised cache key.
pub fn cache_file_name(key: &str) -> String {
    format!("{}.json", hex_digest(key, 16))
}

/// Output file name for the `index`-th preview of a batch: `{index:04}_{hash}.jpg`.
pub fn thumbnail_file_name(index: usize, url: &str) -> String {
    format!("{index:04}_{}.jpg", hex_digest(url, 12))
}

/// First `bytes` bytes of the SHA-256 of `input`, hex encoded.
pub(crate) fn hex_digest(input: &str, bytes: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(bytes * 2);
    for byte in digest.iter().take(bytes) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable_and_distinct() {
        let a = cache_file_name("https://example.com/");
        assert_eq!(a, cache_file_name("https://example.com/"));
        assert_ne!(a, cache_file_name("https://example.com/other"));
        assert_eq!(a.len(), 32 + ".json".len());
    }

    #[test]
    fn thumbnail_names_are_zero_padded() {
        let name = thumbnail_file_name(7, "https://example.com/");
        assert!(name.starts_with("0007_"));
        assert!(name.ends_with(".jpg"));
    }
}
