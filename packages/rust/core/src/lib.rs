//! Core pipeline orchestration for Docket.
//!
//! This crate ties the fingerprint index, landing ingestion, transform
//! dispatch and processing into the two run operations exposed by
//! [`Pipeline`]: `ingest_run` and `process_run`.

pub mod feed;
pub mod fingerprint;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod process;
pub mod run;

pub use feed::{DiscoveredDocument, DiscoveryFeed, IngestScope, ManifestFeed, VecFeed};
pub use fingerprint::{FingerprintStore, MemoryFingerprints, Registration};
pub use ingest::{IngestOutcome, IngestSettings, LandingIngestor};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use pipeline::Pipeline;
pub use process::{ProcessOutcome, ProcessSettings, ProcessingEngine};
pub use run::{
    CancelFlag, IngestCounts, ProcessCounts, ProgressReporter, RunContext, RunSummary,
    SilentProgress,
};
