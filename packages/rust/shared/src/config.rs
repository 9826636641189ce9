//! Application configuration for Docket.
//!
//! User config lives at `~/.docket/docket.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dates::{DEFAULT_DATE_FORMATS, Granularity};
use crate::error::{DocketError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docket.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docket";

/// Metadata database file name inside the data directory.
pub const DATABASE_FILE_NAME: &str = "docket.db";

// ---------------------------------------------------------------------------
// Config structs (matching docket.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where landing/processed blobs and the metadata database live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Landing-zone ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Processing-zone settings.
    #[serde(default)]
    pub process: ProcessConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root data directory. Holds `landing/`, `processed/` and `docket.db`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "var/docket".into()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Documents ingested concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Partition bucket size: `day`, `month` or `year`.
    #[serde(default)]
    pub partition_granularity: Granularity,

    /// Accepted publication date formats (chrono `strftime` syntax), tried in order.
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            partition_granularity: Granularity::default(),
            date_formats: default_date_formats(),
        }
    }
}

fn default_concurrency() -> u32 {
    8
}
fn default_date_formats() -> Vec<String> {
    DEFAULT_DATE_FORMATS.iter().map(|f| (*f).to_string()).collect()
}

/// `[process]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Documents transformed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Version of the transform rules in force. Bumping it reprocesses everything.
    #[serde(default = "default_transform_version")]
    pub transform_version: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            transform_version: default_transform_version(),
        }
    }
}

fn default_transform_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root data directory.
    pub data_dir: PathBuf,
    pub ingest_concurrency: usize,
    pub process_concurrency: usize,
    pub granularity: Granularity,
    pub date_formats: Vec<String>,
    pub transform_version: u32,
}

impl PipelineConfig {
    /// Metadata database path.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Root of raw landing blobs.
    pub fn landing_root(&self) -> PathBuf {
        self.data_dir.join("landing")
    }

    /// Root of processed blobs.
    pub fn processed_root(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(DocketError::config("storage.data_dir must not be empty"));
        }
        if self.ingest_concurrency == 0 || self.process_concurrency == 0 {
            return Err(DocketError::config("concurrency must be at least 1"));
        }
        if self.date_formats.is_empty() {
            return Err(DocketError::config("ingest.date_formats must not be empty"));
        }
        if self.transform_version == 0 {
            return Err(DocketError::config("process.transform_version starts at 1"));
        }
        Ok(())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            data_dir: expand_home(&config.storage.data_dir),
            ingest_concurrency: config.ingest.concurrency as usize,
            process_concurrency: config.process.concurrency as usize,
            granularity: config.ingest.partition_granularity,
            date_formats: config.ingest.date_formats.clone(),
            transform_version: config.process.transform_version,
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docket/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocketError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docket/docket.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocketError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocketError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file to `path`, or to `~/.docket/docket.toml` when
/// `None`. Returns the path written.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| DocketError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| DocketError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocketError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("partition_granularity = \"month\""));
        assert!(toml_str.contains("transform_version = 1"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[ingest]
partition_granularity = "year"

[process]
transform_version = 4
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.ingest.partition_granularity, Granularity::Year);
        assert_eq!(config.ingest.concurrency, 8);
        assert_eq!(config.ingest.date_formats.len(), 3);
        assert_eq!(config.process.transform_version, 4);
        assert_eq!(config.storage.data_dir, "var/docket");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let mut app = AppConfig::default();
        app.storage.data_dir = "/srv/docket".into();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.database_path(), PathBuf::from("/srv/docket/docket.db"));
        assert_eq!(pipeline.landing_root(), PathBuf::from("/srv/docket/landing"));
        assert_eq!(pipeline.process_concurrency, 8);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut pipeline = PipelineConfig::from(&AppConfig::default());
        pipeline.ingest_concurrency = 0;
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn init_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("docket_cfg_{}", uuid::Uuid::now_v7()))
            .join("docket.toml");
        let written = init_config(Some(&path)).expect("init");
        let loaded = load_config_from(&written).expect("load");
        assert_eq!(loaded.process.transform_version, 1);
        let _ = std::fs::remove_dir_all(path.parent().expect("parent"));
    }
}
