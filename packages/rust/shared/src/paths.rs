//! Content hashing and blob path derivation.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Longest sanitized identifier used in a blob name.
const MAX_NAME_LEN: usize = 100;

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 ._\-]").expect("valid regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// SHA-256 hex digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reduce an identifier to a filesystem-safe name.
///
/// Keeps ASCII alphanumerics and ` ._-`, turns whitespace runs into `_`,
/// strips leading dots and caps the length. Never returns an empty string.
pub fn sanitize_identifier(identifier: &str) -> String {
    let kept = UNSAFE_CHARS_RE.replace_all(identifier.trim(), "");
    let joined = SPACES_RE.replace_all(kept.trim(), "_");
    let name: String = joined
        .trim_start_matches('.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();

    if name.is_empty() {
        "unnamed".into()
    } else {
        name
    }
}

/// Landing blob path: `<partition>/<safe-identifier>_<hash8>.<ext>`.
pub fn raw_blob_path(partition_label: &str, identifier: &str, hash: &str, ext: &str) -> String {
    let short = hash.get(..8).unwrap_or(hash);
    format!(
        "{partition_label}/{}_{short}.{ext}",
        sanitize_identifier(identifier)
    )
}

/// Processed blob path: `<partition>/<safe-identifier>_<hash8>.v<version>.<ext>`.
///
/// `hash` is the landing record's content hash, unique per identifier, so two
/// identifiers that sanitize to the same name still get distinct paths.
pub fn processed_blob_path(
    partition_label: &str,
    identifier: &str,
    hash: &str,
    transform_version: u32,
    ext: &str,
) -> String {
    let short = hash.get(..8).unwrap_or(hash);
    format!(
        "{partition_label}/{}_{short}.v{transform_version}.{ext}",
        sanitize_identifier(identifier)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"x").len(), 64);
    }

    #[test]
    fn sanitize_strips_separators_and_traversal() {
        assert_eq!(sanitize_identifier("ADJ-00012 / 2025"), "ADJ-00012_2025");
        assert_eq!(sanitize_identifier("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_identifier("  "), "unnamed");
        assert_eq!(sanitize_identifier("€€€"), "unnamed");
        assert_eq!(sanitize_identifier(&"a".repeat(250)).len(), 100);
    }

    #[test]
    fn blob_paths() {
        let hash = content_hash(b"doc");
        let raw = raw_blob_path("2025-02", "LCR 22/25", &hash, "html");
        assert_eq!(raw, format!("2025-02/LCR_2225_{}.html", &hash[..8]));

        let out = processed_blob_path("2025-02", "LCR 22/25", &hash, 3, "txt");
        assert_eq!(out, format!("2025-02/LCR_2225_{}.v3.txt", &hash[..8]));
    }

    #[test]
    fn identifiers_with_the_same_safe_name_get_distinct_processed_paths() {
        assert_eq!(sanitize_identifier("LCR 22/25"), sanitize_identifier("LCR_2225"));
        let a = processed_blob_path("2025-02", "LCR 22/25", &content_hash(b"first"), 1, "txt");
        let b = processed_blob_path("2025-02", "LCR_2225", &content_hash(b"second"), 1, "txt");
        assert_ne!(a, b);
    }
}
