//! The two run operations: `ingest_run` and `process_run`.
//!
//! [`Pipeline`] wires the metadata store, the landing and processed blob
//! stores, the fingerprint index and the transform registry together from a
//! [`PipelineConfig`].

use std::sync::Arc;

use docket_shared::{DateRange, Phase, PipelineConfig, Result};
use docket_storage::{BlobStore, FsBlobStore, Storage};
use docket_transform::TransformRegistry;
use tracing::info;

use crate::feed::{DiscoveryFeed, IngestScope};
use crate::fingerprint::FingerprintStore;
use crate::ingest::{IngestSettings, LandingIngestor};
use crate::metrics::MetricsCollector;
use crate::process::{ProcessSettings, ProcessingEngine};
use crate::run::{IngestCounts, ProcessCounts, RunContext, RunSummary};

/// Fully wired pipeline over one data directory.
pub struct Pipeline {
    config: PipelineConfig,
    storage: Arc<Storage>,
    metrics: Arc<MetricsCollector>,
    ingestor: LandingIngestor,
    engine: ProcessingEngine,
}

impl Pipeline {
    /// Open the stores under `config.data_dir` with the built-in transforms.
    pub async fn open(config: PipelineConfig) -> Result<Self> {
        Self::open_with_registry(config, TransformRegistry::new()).await
    }

    /// Open the stores with a caller-supplied transform registry.
    pub async fn open_with_registry(
        config: PipelineConfig,
        registry: TransformRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config.database_path()).await?);
        let landing: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.landing_root()));
        let processed: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.processed_root()));

        info!(data_dir = %config.data_dir.display(), "pipeline opened");
        Ok(Self::from_parts(
            config,
            Arc::clone(&storage) as Arc<dyn FingerprintStore>,
            storage,
            landing,
            processed,
            registry,
        ))
    }

    /// Assemble a pipeline from already-open parts.
    pub fn from_parts(
        config: PipelineConfig,
        fingerprints: Arc<dyn FingerprintStore>,
        storage: Arc<Storage>,
        landing: Arc<dyn BlobStore>,
        processed: Arc<dyn BlobStore>,
        registry: TransformRegistry,
    ) -> Self {
        let ingestor = LandingIngestor::new(
            fingerprints,
            Arc::clone(&storage),
            Arc::clone(&landing),
            IngestSettings {
                concurrency: config.ingest_concurrency,
                granularity: config.granularity,
                date_formats: config.date_formats.clone(),
            },
        );
        let engine = ProcessingEngine::new(
            Arc::clone(&storage),
            landing,
            processed,
            Arc::new(registry),
            ProcessSettings {
                concurrency: config.process_concurrency,
                granularity: config.granularity,
                transform_version: config.transform_version,
            },
        );

        Self {
            config,
            storage,
            metrics: Arc::new(MetricsCollector::new()),
            ingestor,
            engine,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn ingestor(&self) -> &LandingIngestor {
        &self.ingestor
    }

    pub fn engine(&self) -> &ProcessingEngine {
        &self.engine
    }

    /// A fresh run context feeding this pipeline's metrics collector.
    pub fn context(&self, phase: Phase) -> RunContext {
        RunContext::new(phase, Arc::clone(&self.metrics))
    }

    /// Ingest the documents `feed` yields for `[range]`, optionally for one body.
    pub async fn ingest_run(
        &self,
        range: DateRange,
        body: Option<String>,
        feed: &mut dyn DiscoveryFeed,
        ctx: &RunContext,
    ) -> Result<RunSummary<IngestCounts>> {
        let scope = IngestScope::new(range, body);
        self.ingestor.ingest_run(&scope, feed, ctx).await
    }

    /// Process landing records in `[range]` at the configured transform version,
    /// or at `transform_version` when given.
    pub async fn process_run(
        &self,
        range: DateRange,
        transform_version: Option<u32>,
        ctx: &RunContext,
    ) -> Result<RunSummary<ProcessCounts>> {
        let version = transform_version.unwrap_or(self.config.transform_version);
        self.engine.process_range(range, version, ctx).await
    }
}
