//! Per-run counters and timings.
//!
//! The collector is keyed by `(run, phase)` and lives only as long as the
//! process. It keeps a bounded number of finished runs; runs persist their
//! final summaries to the `runs` table themselves.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use docket_shared::{Phase, RunId};
use serde::Serialize;

/// Counter names used by the pipelines.
pub mod counters {
    pub const INGESTED: &str = "ingested";
    pub const DUPLICATE: &str = "duplicate";
    pub const REJECTED: &str = "rejected";
    pub const FAILED: &str = "failed";
    pub const SUCCEEDED: &str = "succeeded";
    pub const SKIPPED: &str = "skipped";
}

/// Counters that count as a success / failure when deriving the success rate.
const SUCCESS_COUNTERS: &[&str] = &[counters::INGESTED, counters::SUCCEEDED];
const FAILURE_COUNTERS: &[&str] = &[counters::REJECTED, counters::FAILED];

/// Finished runs kept for snapshots before the oldest is dropped.
const DEFAULT_RETAINED_RUNS: usize = 64;

#[derive(Debug)]
struct RunMetrics {
    started: Instant,
    finished: Option<Duration>,
    counts: BTreeMap<String, u64>,
    samples: u64,
    sample_total: Duration,
}

impl RunMetrics {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            finished: None,
            counts: BTreeMap::new(),
            samples: 0,
            sample_total: Duration::ZERO,
        }
    }
}

/// Read-only view of one run's metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub run_id: RunId,
    pub phase: Phase,
    pub counts: BTreeMap<String, u64>,
    pub elapsed: Duration,
    pub finished: bool,
    /// Successes over successes plus failures; `1.0` before any attempt.
    pub success_rate: f64,
    pub documents_per_second: f64,
    /// Mean of the recorded per-document timings.
    pub mean_latency: Option<Duration>,
}

impl MetricsSnapshot {
    pub fn count(&self, counter: &str) -> u64 {
        self.counts.get(counter).copied().unwrap_or(0)
    }
}

type RunKey = (RunId, Phase);

#[derive(Debug, Default)]
struct State {
    runs: HashMap<RunKey, RunMetrics>,
    /// Finished runs, oldest first.
    finished: VecDeque<RunKey>,
}

/// Aggregates counter increments and timing samples keyed by run and phase.
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<State>,
    retain: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }

    /// Keep at most `retain` finished runs. Unfinished runs are never dropped.
    pub fn with_retention(retain: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retain: retain.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the clock for a run. Calling it again resets nothing.
    pub fn start(&self, run: RunId, phase: Phase) {
        self.state().runs.entry((run, phase)).or_insert_with(RunMetrics::new);
    }

    pub fn increment(&self, run: RunId, phase: Phase, counter: &str, by: u64) {
        let mut state = self.state();
        let metrics = state.runs.entry((run, phase)).or_insert_with(RunMetrics::new);
        *metrics.counts.entry(counter.to_string()).or_insert(0) += by;
    }

    /// Record how long one document took.
    pub fn record_timing(&self, run: RunId, phase: Phase, elapsed: Duration) {
        let mut state = self.state();
        let metrics = state.runs.entry((run, phase)).or_insert_with(RunMetrics::new);
        metrics.samples += 1;
        metrics.sample_total += elapsed;
    }

    /// Freeze the elapsed time of a run, dropping the oldest finished runs
    /// beyond the retention limit.
    pub fn finish(&self, run: RunId, phase: Phase) {
        let mut state = self.state();
        let newly_finished = match state.runs.get_mut(&(run, phase)) {
            Some(metrics) if metrics.finished.is_none() => {
                metrics.finished = Some(metrics.started.elapsed());
                true
            }
            _ => false,
        };
        if !newly_finished {
            return;
        }

        state.finished.push_back((run, phase));
        while state.finished.len() > self.retain {
            if let Some(oldest) = state.finished.pop_front() {
                state.runs.remove(&oldest);
            }
        }
    }

    pub fn snapshot(&self, run: RunId, phase: Phase) -> Option<MetricsSnapshot> {
        let state = self.state();
        let metrics = state.runs.get(&(run, phase))?;

        let elapsed = metrics
            .finished
            .unwrap_or_else(|| metrics.started.elapsed());
        let sum = |names: &[&str]| -> u64 {
            names
                .iter()
                .map(|n| metrics.counts.get(*n).copied().unwrap_or(0))
                .sum()
        };
        let successes = sum(SUCCESS_COUNTERS);
        let failures = sum(FAILURE_COUNTERS);
        let handled: u64 = metrics.counts.values().sum();

        let success_rate = if successes + failures == 0 {
            1.0
        } else {
            successes as f64 / (successes + failures) as f64
        };
        let secs = elapsed.as_secs_f64();
        let documents_per_second = if secs > 0.0 { handled as f64 / secs } else { 0.0 };
        let mean_latency = (metrics.samples > 0).then(|| {
            let nanos = metrics.sample_total.as_nanos() / u128::from(metrics.samples);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        });

        Some(MetricsSnapshot {
            run_id: run,
            phase,
            counts: metrics.counts.clone(),
            elapsed,
            finished: metrics.finished.is_some(),
            success_rate,
            documents_per_second,
            mean_latency,
        })
    }
}
