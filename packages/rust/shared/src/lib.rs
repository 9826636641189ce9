//! Shared types, error model, and configuration for Docket.
//!
//! This crate is the foundation depended on by all other Docket crates.
//! It provides:
//! - [`DocketError`]: the unified error type
//! - Domain types ([`DocumentRecord`], [`ProcessedRecord`], [`RunId`], ...)
//! - Date partitioning ([`Granularity`], [`DateRange`])
//! - Content hashing and blob path derivation
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod dates;
pub mod error;
pub mod paths;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, IngestConfig, PipelineConfig, ProcessConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use dates::{DEFAULT_DATE_FORMATS, DateRange, Granularity, parse_published_date};
pub use error::{DocketError, Result};
pub use paths::{content_hash, processed_blob_path, raw_blob_path, sanitize_identifier};
pub use types::{
    DocumentFailure, DocumentMetadata, DocumentRecord, FailureKind, FileFormat, LandingStats,
    Phase, ProcessStatus, ProcessedRecord, RunId, RunRecord,
};
