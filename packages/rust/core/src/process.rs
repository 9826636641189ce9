//! Processing-zone engine: landing records in, versioned transformed output out.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use docket_shared::{
    DateRange, DocketError, DocumentFailure, DocumentRecord, FailureKind, Granularity, Phase,
    ProcessStatus, ProcessedRecord, Result, RunRecord, content_hash, processed_blob_path,
};
use docket_storage::{BlobStore, Storage};
use docket_transform::{TransformFailure, TransformRegistry};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::metrics::counters;
use crate::run::{ProcessCounts, RunContext, RunSummary};

/// Settings the engine needs from the pipeline config.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub concurrency: usize,
    pub granularity: Granularity,
    /// Transform version used when a run does not name one.
    pub transform_version: u32,
}

/// What happened to one landing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Output written and a SUCCESS record stored.
    Succeeded { processed_storage_path: String },
    /// A SUCCESS record already exists for this transform version.
    Skipped,
    /// The attempt failed. `recorded` tells whether a FAILED record made it
    /// to the metadata store.
    Failed {
        kind: FailureKind,
        reason: String,
        recorded: bool,
    },
}

impl ProcessOutcome {
    pub fn counter(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => counters::SUCCEEDED,
            Self::Skipped => counters::SKIPPED,
            Self::Failed { .. } => counters::FAILED,
        }
    }
}

/// Applies the matching transform to landing documents and records lineage.
#[derive(Clone)]
pub struct ProcessingEngine {
    storage: Arc<Storage>,
    landing: Arc<dyn BlobStore>,
    processed: Arc<dyn BlobStore>,
    registry: Arc<TransformRegistry>,
    settings: ProcessSettings,
}

impl ProcessingEngine {
    pub fn new(
        storage: Arc<Storage>,
        landing: Arc<dyn BlobStore>,
        processed: Arc<dyn BlobStore>,
        registry: Arc<TransformRegistry>,
        settings: ProcessSettings,
    ) -> Self {
        Self {
            storage,
            landing,
            processed,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    /// Process one landing record at `transform_version`.
    #[instrument(skip_all, fields(identifier = %doc.identifier, version = transform_version))]
    pub async fn process_document(
        &self,
        doc: &DocumentRecord,
        transform_version: u32,
    ) -> ProcessOutcome {
        match self.storage.get_processed(&doc.identifier, transform_version).await {
            Ok(Some(existing)) if existing.status == ProcessStatus::Success => {
                return ProcessOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => {
                return ProcessOutcome::Failed {
                    kind: FailureKind::StorageFailure,
                    reason: FailureKind::StorageFailure.reason(e),
                    recorded: false,
                };
            }
        }

        let raw = match self.landing.read(&doc.raw_storage_path).await {
            Ok(raw) => raw,
            Err(e) => {
                let failure = TransformFailure::new(
                    FailureKind::StorageFailure,
                    format!("raw bytes unreadable: {e}"),
                );
                return self.record_failure(doc, transform_version, failure).await;
            }
        };

        let strategy = self.registry.dispatch(doc.file_format);
        let worker = Arc::clone(&strategy);
        let transformed = match tokio::task::spawn_blocking(move || worker.transform(&raw)).await {
            Ok(result) => result,
            Err(e) => Err(TransformFailure::malformed(format!("transform aborted: {e}"))),
        };
        let output = match transformed {
            Ok(output) => output,
            Err(failure) => return self.record_failure(doc, transform_version, failure).await,
        };

        let path = processed_blob_path(
            &self.settings.granularity.label(doc.partition_date),
            &doc.identifier,
            &doc.content_hash,
            transform_version,
            strategy.output_extension(doc.file_format),
        );
        if let Err(e) = self.processed.write(&path, &output.bytes).await {
            let failure = TransformFailure::new(
                FailureKind::StorageFailure,
                format!("processed bytes not written: {e}"),
            );
            return self.record_failure(doc, transform_version, failure).await;
        }

        let record = ProcessedRecord {
            id: Uuid::now_v7().to_string(),
            source_identifier: doc.identifier.clone(),
            transform_version,
            processed_storage_path: Some(path.clone()),
            processed_at: Utc::now(),
            status: ProcessStatus::Success,
            failure_reason: None,
            attempts: 1,
            content_hash: Some(content_hash(&output.bytes)),
            metadata: Some(output.metadata),
        };

        match self.storage.record_processed(&record).await {
            Ok(Some(attempts)) => {
                debug!(strategy = strategy.name(), %path, attempts, "processed");
                ProcessOutcome::Succeeded {
                    processed_storage_path: path,
                }
            }
            // Another worker recorded SUCCESS first; its output is at the same path.
            Ok(None) => ProcessOutcome::Skipped,
            Err(e) => {
                if let Err(remove_err) = self.processed.remove(&path).await {
                    warn!(%path, error = %remove_err, "failed to remove unrecorded output");
                }
                ProcessOutcome::Failed {
                    kind: FailureKind::StorageFailure,
                    reason: FailureKind::StorageFailure.reason(e),
                    recorded: false,
                }
            }
        }
    }

    async fn record_failure(
        &self,
        doc: &DocumentRecord,
        transform_version: u32,
        failure: TransformFailure,
    ) -> ProcessOutcome {
        let reason = failure.to_string();
        let record = ProcessedRecord {
            id: Uuid::now_v7().to_string(),
            source_identifier: doc.identifier.clone(),
            transform_version,
            processed_storage_path: None,
            processed_at: Utc::now(),
            status: ProcessStatus::Failed,
            failure_reason: Some(reason.clone()),
            attempts: 1,
            content_hash: None,
            metadata: None,
        };

        match self.storage.record_processed(&record).await {
            Ok(Some(_)) => ProcessOutcome::Failed {
                kind: failure.kind,
                reason,
                recorded: true,
            },
            Ok(None) => ProcessOutcome::Skipped,
            Err(e) => {
                warn!(identifier = %doc.identifier, error = %e, "failed to record failure");
                ProcessOutcome::Failed {
                    kind: failure.kind,
                    reason,
                    recorded: false,
                }
            }
        }
    }

    /// Process every landing record whose partition lies in `range`.
    ///
    /// Bounds are widened to whole partitions. Records that already have a
    /// SUCCESS at `transform_version` are skipped. Only an unreachable store
    /// ends the run with an error.
    #[instrument(skip_all, fields(run_id = %ctx.run_id, range = %range, version = transform_version))]
    pub async fn process_range(
        &self,
        range: DateRange,
        transform_version: u32,
        ctx: &RunContext,
    ) -> Result<RunSummary<ProcessCounts>> {
        let start = Instant::now();
        if transform_version == 0 {
            return Err(DocketError::validation("transform version starts at 1"));
        }

        // --- Phase 1: Store health ---
        ctx.progress().phase("Checking stores");
        self.storage.health_check().await?;
        self.landing.check().await?;
        self.processed.check().await?;

        let partitions = range.to_partitions(self.settings.granularity);
        let run = RunRecord {
            id: ctx.run_id,
            phase: Phase::Process,
            started_at: Utc::now(),
            finished_at: None,
            scope: serde_json::json!({
                "range": range,
                "partitions": partitions,
                "transform_version": transform_version,
            }),
            stats: None,
        };
        self.storage.insert_run(&run).await?;
        ctx.metrics().start(ctx.run_id, Phase::Process);

        // --- Phase 2: Scan ---
        ctx.progress().phase("Scanning landing zone");
        let docs = self
            .storage
            .scan_landing(partitions.start, partitions.end, transform_version)
            .await?;
        let total = docs.len();
        info!(
            documents = total,
            concurrency = self.settings.concurrency,
            "starting process run"
        );

        // --- Phase 3: Transform ---
        ctx.progress().phase("Processing documents");
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks: JoinSet<(String, ProcessOutcome)> = JoinSet::new();
        let mut counts = ProcessCounts::default();
        let mut failures = Vec::new();
        let mut completed = 0usize;
        let mut cancelled = false;

        for doc in docs {
            if ctx.is_cancelled() {
                cancelled = true;
                info!("cancellation requested, not starting further documents");
                break;
            }

            if doc.processed {
                counts.skipped += 1;
                completed += 1;
                ctx.count(counters::SKIPPED);
                ctx.progress()
                    .document(&doc.identifier, counters::SKIPPED, completed, Some(total));
                continue;
            }

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let engine = self.clone();
            let task_ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                let outcome = engine.process_document(&doc, transform_version).await;
                task_ctx.count(outcome.counter());
                task_ctx.time(started.elapsed());
                (doc.identifier, outcome)
            });

            while let Some(joined) = tasks.try_join_next() {
                completed += 1;
                tally(joined, &mut counts, &mut failures, completed, total, ctx);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            tally(joined, &mut counts, &mut failures, completed, total, ctx);
        }

        // --- Phase 4: Summary ---
        ctx.metrics().finish(ctx.run_id, Phase::Process);
        let summary = RunSummary {
            run_id: ctx.run_id,
            phase: Phase::Process,
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

        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            skipped = counts.skipped,
            cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "process run complete"
        );
        ctx.progress().done(&format!(
            "{} succeeded, {} failed, {} skipped",
            counts.succeeded, counts.failed, counts.skipped
        ));

        Ok(summary)
    }
}

fn tally(
    joined: std::result::Result<(String, ProcessOutcome), tokio::task::JoinError>,
    counts: &mut ProcessCounts,
    failures: &mut Vec<DocumentFailure>,
    completed: usize,
    total: usize,
    ctx: &RunContext,
) {
    let (identifier, outcome) = match joined {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "process task failed");
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
        ProcessOutcome::Succeeded { .. } => counts.succeeded += 1,
        ProcessOutcome::Skipped => counts.skipped += 1,
        ProcessOutcome::Failed { kind, reason, recorded } => {
            warn!(%identifier, %reason, recorded, "document failed processing");
            counts.failed += 1;
            failures.push(DocumentFailure {
                identifier: identifier.clone(),
                kind,
                detail: reason,
            });
        }
    }
    ctx.progress().document(&identifier, label, completed, Some(total));
}
