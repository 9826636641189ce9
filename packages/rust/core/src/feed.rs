//! Discovery feeds: where `(metadata, raw bytes)` pairs come from.
//!
//! Crawling is someone else's job. A feed only hands over documents that are
//! already extracted, filtered to the run's scope.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docket_shared::{DateRange, DocketError, DocumentMetadata, Result, parse_published_date};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A discovered document ready for ingestion.
#[derive(Debug, Clone)]
pub struct DiscoveredDocument {
    pub metadata: DocumentMetadata,
    pub bytes: Vec<u8>,
}

/// Date range and optional body filter an ingestion run is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestScope {
    pub range: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl IngestScope {
    pub fn new(range: DateRange, body: Option<String>) -> Self {
        let body = body.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());
        Self { range, body }
    }

    /// Whether a document belongs to this scope.
    ///
    /// Bodies compare case-insensitively. A date that cannot be parsed is
    /// let through so the ingestor can reject and count it.
    pub fn admits<S: AsRef<str>>(&self, metadata: &DocumentMetadata, date_formats: &[S]) -> bool {
        if let Some(wanted) = &self.body {
            let matches = metadata
                .body
                .as_deref()
                .is_some_and(|b| b.trim().eq_ignore_ascii_case(wanted));
            if !matches {
                return false;
            }
        }

        match metadata.published_date.as_deref() {
            Some(raw) => match parse_published_date(raw, date_formats) {
                Ok(date) => self.range.contains(date),
                Err(_) => true,
            },
            None => true,
        }
    }
}

/// A source of discovered documents, consumed once per run.
#[async_trait]
pub trait DiscoveryFeed: Send {
    /// The next document, or `None` when the feed is exhausted.
    async fn next_document(&mut self) -> Result<Option<DiscoveredDocument>>;

    /// Number of documents still to come, when known.
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

// ---------------------------------------------------------------------------
// In-memory feed
// ---------------------------------------------------------------------------

/// A feed over documents already in memory.
#[derive(Debug, Default)]
pub struct VecFeed {
    docs: VecDeque<DiscoveredDocument>,
}

impl VecFeed {
    pub fn new(docs: impl IntoIterator<Item = DiscoveredDocument>) -> Self {
        Self {
            docs: docs.into_iter().collect(),
        }
    }
}

#[async_trait]
impl DiscoveryFeed for VecFeed {
    async fn next_document(&mut self) -> Result<Option<DiscoveredDocument>> {
        Ok(self.docs.pop_front())
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.docs.len())
    }
}

// ---------------------------------------------------------------------------
// Manifest feed
// ---------------------------------------------------------------------------

/// One line of a JSON-lines manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    /// Raw file, relative to the manifest's directory.
    pub file: PathBuf,
}

/// Reads documents listed in a JSON-lines manifest written by a crawler.
///
/// Entries outside the scope are dropped. Malformed lines and unreadable
/// files are logged and skipped.
pub struct ManifestFeed {
    base_dir: PathBuf,
    entries: VecDeque<ManifestEntry>,
    skipped: usize,
}

impl ManifestFeed {
    /// Load and filter the manifest at `path`.
    pub async fn open<S: AsRef<str>>(
        path: &Path,
        scope: &IngestScope,
        date_formats: &[S],
    ) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DocketError::io(path, e))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut entries = VecDeque::new();
        let mut skipped = 0;
        let mut out_of_scope = 0;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<ManifestEntry>(line) {
                Ok(entry) if scope.admits(&entry.metadata, date_formats) => {
                    entries.push_back(entry)
                }
                Ok(_) => out_of_scope += 1,
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping malformed manifest line");
                    skipped += 1;
                }
            }
        }

        debug!(
            path = %path.display(),
            in_scope = entries.len(),
            out_of_scope,
            skipped,
            "manifest loaded"
        );
        Ok(Self {
            base_dir,
            entries,
            skipped,
        })
    }

    /// Lines or files that could not be used.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl DiscoveryFeed for ManifestFeed {
    async fn next_document(&mut self) -> Result<Option<DiscoveredDocument>> {
        while let Some(entry) = self.entries.pop_front() {
            let file = self.base_dir.join(&entry.file);
            match tokio::fs::read(&file).await {
                Ok(bytes) => {
                    return Ok(Some(DiscoveredDocument {
                        metadata: entry.metadata,
                        bytes,
                    }));
                }
                Err(e) => {
                    warn!(
                        identifier = %entry.metadata.identifier,
                        file = %file.display(),
                        error = %e,
                        "skipping manifest entry with unreadable file"
                    );
                    self.skipped += 1;
                }
            }
        }
        Ok(None)
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_shared::DEFAULT_DATE_FORMATS;

    fn meta(id: &str, date: Option<&str>, body: Option<&str>) -> DocumentMetadata {
        DocumentMetadata {
            identifier: id.into(),
            published_date: date.map(Into::into),
            body: body.map(Into::into),
            ..Default::default()
        }
    }

    fn scope(body: Option<&str>) -> IngestScope {
        IngestScope::new(
            DateRange::parse("2025-01-01", "2025-03-01").unwrap(),
            body.map(Into::into),
        )
    }

    #[test]
    fn scope_filters_dates_and_bodies() {
        let s = scope(Some("  Labour Court "));
        let f = DEFAULT_DATE_FORMATS;
        assert!(s.admits(&meta("a", Some("2025-02-10"), Some("labour court")), f));
        assert!(!s.admits(&meta("b", Some("2025-02-10"), Some("Equality Tribunal")), f));
        assert!(!s.admits(&meta("c", Some("2025-02-10"), None), f));
        assert!(!s.admits(&meta("d", Some("2025-04-01"), Some("LABOUR COURT")), f));
        // Unparseable dates pass through to be rejected downstream.
        assert!(s.admits(&meta("e", Some("sometime"), Some("Labour Court")), f));
        assert!(scope(None).admits(&meta("f", None, None), f));
    }

    #[tokio::test]
    async fn manifest_feed_reads_in_scope_entries() {
        let dir = std::env::temp_dir().join(format!("docket_manifest_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("raw")).unwrap();
        std::fs::write(dir.join("raw/a.html"), "<p>A</p>").unwrap();
        std::fs::write(dir.join("raw/b.html"), "<p>B</p>").unwrap();
        let manifest = [
            r#"{"identifier":"A","published_date":"2025-02-10","body":"Labour Court","file":"raw/a.html"}"#,
            r#"{"identifier":"B","published_date":"2024-12-31","body":"Labour Court","file":"raw/b.html"}"#,
            r#"{"identifier":"C","published_date":"2025-02-11","file":"raw/missing.html"}"#,
            "not json",
            "",
        ]
        .join("\n");
        std::fs::write(dir.join("manifest.jsonl"), manifest).unwrap();

        let mut feed = ManifestFeed::open(&dir.join("manifest.jsonl"), &scope(None), DEFAULT_DATE_FORMATS)
            .await
            .expect("open manifest");
        assert_eq!(feed.remaining_hint(), Some(2));

        let first = feed.next_document().await.unwrap().expect("A");
        assert_eq!(first.metadata.identifier, "A");
        assert_eq!(first.bytes, b"<p>A</p>");
        assert!(feed.next_document().await.unwrap().is_none());
        assert_eq!(feed.skipped(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn vec_feed_drains_in_order() {
        let mut feed = VecFeed::new(vec![
            DiscoveredDocument { metadata: meta("1", None, None), bytes: vec![1] },
            DiscoveredDocument { metadata: meta("2", None, None), bytes: vec![2] },
        ]);
        assert_eq!(feed.next_document().await.unwrap().unwrap().metadata.identifier, "1");
        assert_eq!(feed.remaining_hint(), Some(1));
    }
}
