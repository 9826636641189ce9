//! Landing-zone ingestion: fingerprint, dedupe, partition, store.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use docket_shared::{
    DocketError, DocumentFailure, DocumentMetadata, DocumentRecord, FailureKind, Granularity,
    Phase, Result, RunRecord, content_hash, parse_published_date, raw_blob_path,
};
use docket_storage::{BlobStore, Storage};
use docket_transform::detect_format;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::feed::{DiscoveryFeed, IngestScope};
use crate::fingerprint::{FingerprintStore, Registration};
use crate::metrics::counters;
use crate::run::{IngestCounts, RunContext, RunSummary};

/// Settings the ingestor needs from the pipeline config.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub concurrency: usize,
    pub granularity: Granularity,
    pub date_formats: Vec<String>,
}

/// What happened to one discovered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New content, now visible in the landing zone.
    Stored { identifier: String },
    /// The same bytes were already ingested under `existing_identifier`.
    Duplicate { existing_identifier: String },
    /// Not ingested. `kind` is [`FailureKind::StorageFailure`] when a store
    /// refused the commit, otherwise the document itself was unacceptable.
    Rejected { kind: FailureKind, reason: String },
}

impl IngestOutcome {
    fn rejected(kind: FailureKind, detail: impl std::fmt::Display) -> Self {
        Self::Rejected {
            kind,
            reason: kind.reason(detail),
        }
    }

    /// Counter this outcome is tallied under.
    pub fn counter(&self) -> &'static str {
        match self {
            Self::Stored { .. } => counters::INGESTED,
            Self::Duplicate { .. } => counters::DUPLICATE,
            Self::Rejected {
                kind: FailureKind::StorageFailure,
                ..
            } => counters::FAILED,
            Self::Rejected { .. } => counters::REJECTED,
        }
    }
}

/// Accepts discovered documents into the landing zone.
///
/// The unit of atomicity is one document: a document is either fully stored
/// (fingerprint, raw bytes, landing record) or leaves nothing behind.
#[derive(Clone)]
pub struct LandingIngestor {
    fingerprints: Arc<dyn FingerprintStore>,
    storage: Arc<Storage>,
    blobs: Arc<dyn BlobStore>,
    settings: IngestSettings,
}

impl LandingIngestor {
    pub fn new(
        fingerprints: Arc<dyn FingerprintStore>,
        storage: Arc<Storage>,
        blobs: Arc<dyn BlobStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            fingerprints,
            storage,
            blobs,
            settings,
        }
    }

    /// Ingest one document.
    #[instrument(skip_all, fields(identifier = %metadata.identifier))]
    pub async fn ingest(&self, metadata: &DocumentMetadata, raw: &[u8]) -> IngestOutcome {
        // --- Validate before claiming anything ---
        let identifier = metadata.identifier.trim();
        if identifier.is_empty() {
            return IngestOutcome::rejected(FailureKind::InvalidMetadata, "missing identifier");
        }
        let Some(raw_date) = metadata.published_date.as_deref() else {
            return IngestOutcome::rejected(FailureKind::InvalidMetadata, "missing published date");
        };
        let published_date = match parse_published_date(raw_date, &self.settings.date_formats) {
            Ok(date) => date,
            Err(e) => return IngestOutcome::rejected(FailureKind::InvalidMetadata, e),
        };

        // --- Fingerprint ---
        let hash = content_hash(raw);
        match self.claim(&hash, identifier).await {
            Ok(Claim::Owned) => {}
            Ok(Claim::DuplicateOf(existing)) => {
                debug!(%existing, "duplicate content");
                return IngestOutcome::Duplicate {
                    existing_identifier: existing,
                };
            }
            Err(e) => return IngestOutcome::rejected(FailureKind::StorageFailure, e),
        }

        // From here on the claim must be released on every non-stored exit.
        match self.storage.get_landing(identifier, 0).await {
            Ok(None) => {}
            Ok(Some(existing)) => {
                self.release(&hash, identifier).await;
                return IngestOutcome::rejected(
                    FailureKind::IdentifierConflict,
                    format!(
                        "identifier already ingested with content {}",
                        &existing.content_hash[..existing.content_hash.len().min(12)]
                    ),
                );
            }
            Err(e) => {
                self.release(&hash, identifier).await;
                return IngestOutcome::rejected(FailureKind::StorageFailure, e);
            }
        }

        // --- Raw bytes ---
        let file_format = detect_format(raw, metadata.link.as_deref());
        let partition_date = self.settings.granularity.truncate(published_date);
        let partition_label = self.settings.granularity.label(published_date);
        let raw_storage_path =
            raw_blob_path(&partition_label, identifier, &hash, file_format.extension());

        if let Err(e) = self.blobs.write(&raw_storage_path, raw).await {
            self.release(&hash, identifier).await;
            return IngestOutcome::rejected(FailureKind::StorageFailure, e);
        }

        // --- Landing record: the document becomes visible here ---
        let record = DocumentRecord {
            identifier: identifier.to_string(),
            description: clean_optional(metadata.description.as_deref()),
            published_date,
            partition_date,
            source_body: clean_optional(metadata.body.as_deref()),
            source_link: clean_optional(metadata.link.as_deref()),
            raw_storage_path: raw_storage_path.clone(),
            content_hash: hash.clone(),
            file_format,
            raw_size: raw.len() as u64,
            ingested_at: Utc::now(),
            processed: false,
        };

        match self.storage.insert_landing(&record).await {
            Ok(true) => {
                debug!(path = %raw_storage_path, format = %file_format, "stored");
                IngestOutcome::Stored {
                    identifier: record.identifier,
                }
            }
            Ok(false) => {
                self.undo_blob(&raw_storage_path).await;
                self.release(&hash, identifier).await;
                IngestOutcome::rejected(
                    FailureKind::IdentifierConflict,
                    "identifier ingested concurrently with different content",
                )
            }
            Err(e) => {
                self.undo_blob(&raw_storage_path).await;
                self.release(&hash, identifier).await;
                IngestOutcome::rejected(FailureKind::StorageFailure, e)
            }
        }
    }

    /// Claim `hash`, or find out who already owns it.
    async fn claim(&self, hash: &str, identifier: &str) -> Result<Claim> {
        if let Some(existing) = self.fingerprints.lookup(hash).await? {
            return Ok(Claim::DuplicateOf(existing));
        }

        // A claim can be released between our register and lookup when the
        // owner's commit fails; one retry settles it.
        for _ in 0..2 {
            match self.fingerprints.register(hash, identifier).await? {
                Registration::Registered => return Ok(Claim::Owned),
                Registration::AlreadyExists => {
                    if let Some(existing) = self.fingerprints.lookup(hash).await? {
                        return Ok(Claim::DuplicateOf(existing));
                    }
                }
            }
        }
        Err(DocketError::Storage(
            "fingerprint ownership changed during registration".into(),
        ))
    }

    async fn release(&self, hash: &str, identifier: &str) {
        if let Err(e) = self.fingerprints.release(hash, identifier).await {
            warn!(%hash, %identifier, error = %e, "failed to release fingerprint");
        }
    }

    async fn undo_blob(&self, path: &str) {
        if let Err(e) = self.blobs.remove(path).await {
            warn!(%path, error = %e, "failed to remove orphaned blob");
        }
    }

    /// Ingest everything `feed` yields, `concurrency` documents at a time.
    ///
    /// Per-document problems are counted, never returned. Only an unreachable
    /// store (checked before the first document) or a broken feed ends the
    /// run with an error.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, range = %scope.range))]
    pub async fn ingest_run(
        &self,
        scope: &IngestScope,
        feed: &mut dyn DiscoveryFeed,
        ctx: &RunContext,
    ) -> Result<RunSummary<IngestCounts>> {
        let start = Instant::now();

        // --- Phase 1: Store health ---
        ctx.progress().phase("Checking stores");
        self.storage.health_check().await?;
        self.blobs.check().await?;

        let run = RunRecord {
            id: ctx.run_id,
            phase: Phase::Ingest,
            started_at: Utc::now(),
            finished_at: None,
            scope: serde_json::to_value(scope).map_err(DocketError::storage)?,
            stats: None,
        };
        self.storage.insert_run(&run).await?;
        ctx.metrics().start(ctx.run_id, Phase::Ingest);

        info!(
            concurrency = self.settings.concurrency,
            body = scope.body.as_deref().unwrap_or("*"),
            "starting ingest run"
        );

        // --- Phase 2: Ingest ---
        ctx.progress().phase("Ingesting documents");
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks: JoinSet<(String, IngestOutcome)> = JoinSet::new();
        let mut counts = IngestCounts::default();
        let mut failures = Vec::new();
        let mut completed = 0usize;
        let mut cancelled = false;
        let mut feed_error = None;

        loop {
            if ctx.is_cancelled() {
                cancelled = true;
                info!("cancellation requested, not starting further documents");
                break;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let doc = match feed.next_document().await {
                Ok(Some(doc)) => doc,
                Ok(None) => break,
                Err(e) => {
                    feed_error = Some(e);
                    break;
                }
            };

            let ingestor = self.clone();
            let task_ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let outcome = ingestor.ingest(&doc.metadata, &doc.bytes).await;
                task_ctx.count(outcome.counter());
                task_ctx.time(started.elapsed());
                (doc.metadata.identifier, outcome)
            });

            // Tally whatever already finished so memory stays bounded.
            while let Some(joined) = tasks.try_join_next() {
                completed += 1;
                tally(joined, &mut counts, &mut failures, completed, feed.remaining_hint(), ctx);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            tally(joined, &mut counts, &mut failures, completed, Some(0), ctx);
        }

        // --- Phase 3: Summary ---
        ctx.metrics().finish(ctx.run_id, Phase::Ingest);
        let summary = RunSummary {
            run_id: ctx.run_id,
            phase: Phase::Ingest,
            counts,
            cancelled,
            elapsed: start.elapsed(),
            failures,
        };
        match serde_json::to_value(&summary) {
            Ok(stats) => {
                if let Err(e) = self.storage.finish_run(ctx.run_id, &stats).await {
                    warn!(error = %e, "failed to persist run summary");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize run summary"),
        }

        if let Some(e) = feed_error {
            warn!(error = %e, "discovery feed failed, run aborted");
            return Err(e);
        }

        info!(
            ingested = counts.ingested,
            duplicate = counts.duplicate,
            rejected = counts.rejected,
            failed = counts.failed,
            cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "ingest run complete"
        );
        ctx.progress().done(&format!(
            "{} ingested, {} duplicate, {} rejected, {} failed",
            counts.ingested, counts.duplicate, counts.rejected, counts.failed
        ));

        Ok(summary)
    }
}

enum Claim {
    Owned,
    DuplicateOf(String),
}

fn tally(
    joined: std::result::Result<(String, IngestOutcome), tokio::task::JoinError>,
    counts: &mut IngestCounts,
    failures: &mut Vec<DocumentFailure>,
    completed: usize,
    remaining: Option<usize>,
    ctx: &RunContext,
) {
    let (identifier, outcome) = match joined {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "ingest task failed");
            counts.failed += 1;
            failures.push(DocumentFailure {
                identifier: "(unknown)".into(),
                kind: FailureKind::StorageFailure,
                detail: e.to_string(),
            });
            return;
        }
    };

    let label = outcome.counter();
    match outcome {
        IngestOutcome::Stored { .. } => counts.ingested += 1,
        IngestOutcome::Duplicate { .. } => counts.duplicate += 1,
        IngestOutcome::Rejected { kind, reason } => {
            warn!(%identifier, %reason, "document not ingested");
            if kind == FailureKind::StorageFailure {
                counts.failed += 1;
            } else {
                counts.rejected += 1;
            }
            failures.push(DocumentFailure {
                identifier: identifier.clone(),
                kind,
                detail: reason,
            });
        }
    }
    let total = remaining.map(|r| r + completed);
    ctx.progress().document(&identifier, label, completed, total);
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MemoryFingerprints;
    use docket_shared::{DEFAULT_DATE_FORMATS, FileFormat};
    use docket_storage::FsBlobStore;

    async fn ingestor() -> (LandingIngestor, Arc<Storage>, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("docket_ingest_{}", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&dir.join("docket.db")).await.expect("open"));
        let ingestor = LandingIngestor::new(
            Arc::new(MemoryFingerprints::new()),
            Arc::clone(&storage),
            Arc::new(FsBlobStore::new(dir.join("landing"))),
            IngestSettings {
                concurrency: 4,
                granularity: Granularity::Month,
                date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            },
        );
        (ingestor, storage, dir)
    }

    fn meta(id: &str, date: Option<&str>) -> DocumentMetadata {
        DocumentMetadata {
            identifier: id.into(),
            description: Some("  Decision  ".into()),
            published_date: date.map(Into::into),
            body: Some("Labour Court".into()),
            link: Some("https://example.org/decisions/x.html".into()),
        }
    }

    #[tokio::test]
    async fn stores_then_reports_duplicate() {
        let (ingestor, storage, dir) = ingestor().await;
        let html = b"<html><body><p>Decision text</p></body></html>";

        let first = ingestor.ingest(&meta("LCR-1", Some("10/02/2025")), html).await;
        assert_eq!(first, IngestOutcome::Stored { identifier: "LCR-1".into() });

        let second = ingestor.ingest(&meta("LCR-1-copy", Some("2025-02-11")), html).await;
        assert_eq!(
            second,
            IngestOutcome::Duplicate { existing_identifier: "LCR-1".into() }
        );

        let record = storage.get_landing("LCR-1", 1).await.unwrap().expect("stored");
        assert_eq!(record.partition_date.to_string(), "2025-02-01");
        assert_eq!(record.file_format, FileFormat::Html);
        assert_eq!(record.description.as_deref(), Some("Decision"));
        assert!(record.raw_storage_path.starts_with("2025-02/LCR-1_"));
        assert!(dir.join("landing").join(&record.raw_storage_path).exists());
        assert!(storage.get_landing("LCR-1-copy", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_bad_metadata_without_claiming_content() {
        let (ingestor, storage, _dir) = ingestor().await;
        let bytes = b"%PDF-1.4 body";

        for bad in [meta("X", Some("31/31/2025")), meta("X", None), meta("   ", Some("2025-01-01"))] {
            match ingestor.ingest(&bad, bytes).await {
                IngestOutcome::Rejected { kind, .. } => assert_eq!(kind, FailureKind::InvalidMetadata),
                other => panic!("expected reject, got {other:?}"),
            }
        }

        // The same bytes with good metadata are still new content.
        let ok = ingestor.ingest(&meta("X", Some("2025-01-05")), bytes).await;
        assert!(matches!(ok, IngestOutcome::Stored { .. }));
        let stats = storage.landing_stats(1).await.unwrap();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.by_format.get("PDF"), Some(&1));
    }

    #[tokio::test]
    async fn same_identifier_different_content_conflicts() {
        let (ingestor, storage, _dir) = ingestor().await;
        ingestor.ingest(&meta("A", Some("2025-01-05")), b"<p>one</p>").await;
        let outcome = ingestor.ingest(&meta("A", Some("2025-01-05")), b"<p>two</p>").await;
        match outcome {
            IngestOutcome::Rejected { kind, reason } => {
                assert_eq!(kind, FailureKind::IdentifierConflict);
                assert!(reason.starts_with("IDENTIFIER_CONFLICT"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // The losing content did not keep its fingerprint.
        assert!(ingestor.fingerprints.lookup(&content_hash(b"<p>two</p>")).await.unwrap().is_none());
        assert_eq!(storage.landing_stats(1).await.unwrap().total_documents, 1);
    }
}
