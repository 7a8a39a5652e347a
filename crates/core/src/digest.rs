//! Content digests used for generated ids and cache keys.

use sha2::{Digest, Sha256};

/// Collapse whitespace runs and trim, so cosmetic differences in spoken or
/// generated text map onto the same digest.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex-encoded SHA-256 over the given parts, each terminated by a NUL byte
/// so that `("ab", "c")` and `("a", "bc")` differ.
#[must_use]
pub fn content_digest<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
