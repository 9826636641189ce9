//! Run-scoped state passed into pipeline runs, and what they return.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use docket_shared::{DocumentFailure, Phase, RunId};
use serde::Serialize;

use crate::metrics::MetricsCollector;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between a run and whoever may stop it.
///
/// Runs check the flag before starting each document; documents already in
/// flight finish their commit.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase of a run.
    fn phase(&self, name: &str);
    /// Called each time a document has been handled.
    fn document(&self, identifier: &str, outcome: &str, completed: usize, total: Option<usize>);
    /// Called when the run completes.
    fn done(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document(&self, _identifier: &str, _outcome: &str, _completed: usize, _total: Option<usize>) {}
    fn done(&self, _message: &str) {}
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Explicit per-run state: identity, metrics sink, cancellation and progress.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub phase: Phase,
    metrics: Arc<MetricsCollector>,
    cancel: CancelFlag,
    progress: Arc<dyn ProgressReporter>,
}

impl RunContext {
    pub fn new(phase: Phase, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            run_id: RunId::new(),
            phase,
            metrics,
            cancel: CancelFlag::new(),
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn progress(&self) -> &dyn ProgressReporter {
        self.progress.as_ref()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Bump a counter for this run.
    pub fn count(&self, counter: &str) {
        self.metrics.increment(self.run_id, self.phase, counter, 1);
    }

    /// Record one document's handling time for this run.
    pub fn time(&self, elapsed: Duration) {
        self.metrics.record_timing(self.run_id, self.phase, elapsed);
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Immutable result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<C> {
    pub run_id: RunId,
    pub phase: Phase,
    pub counts: C,
    /// The run stopped early on request.
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Per-document rejects and failures, in completion order.
    pub failures: Vec<DocumentFailure>,
}

/// Outcome tallies of an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    pub ingested: u64,
    pub duplicate: u64,
    pub rejected: u64,
    /// Documents whose commit hit a storage failure.
    pub failed: u64,
}

/// Outcome tallies of a processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::counters;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let ctx = RunContext::new(Phase::Ingest, Arc::new(MetricsCollector::new()))
            .with_cancel(flag.clone());
        assert!(!ctx.is_cancelled());
        flag.cancel();
        assert!(ctx.clone().is_cancelled());
    }

    #[test]
    fn context_counts_into_its_own_run() {
        let metrics = Arc::new(MetricsCollector::new());
        let a = RunContext::new(Phase::Process, Arc::clone(&metrics));
        let b = RunContext::new(Phase::Process, Arc::clone(&metrics));
        a.count(counters::SUCCEEDED);
        a.count(counters::SUCCEEDED);
        b.count(counters::FAILED);

        assert_eq!(metrics.snapshot(a.run_id, Phase::Process).unwrap().count(counters::SUCCEEDED), 2);
        assert_eq!(metrics.snapshot(b.run_id, Phase::Process).unwrap().count(counters::SUCCEEDED), 0);
    }

    #[test]
    fn summary_serializes_counts() {
        let summary = RunSummary {
            run_id: RunId::new(),
            phase: Phase::Ingest,
            counts: IngestCounts {
                ingested: 1,
                ..Default::default()
            },
            cancelled: false,
            elapsed: Duration::from_millis(12),
            failures: vec![],
        };
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["counts"]["ingested"], 1);
        assert_eq!(json["phase"], "ingest");
    }
}
