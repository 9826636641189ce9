//! Core domain types for the Docket document pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Which half of the pipeline a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Ingest,
    Process,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Process => "process",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Self::Ingest),
            "process" => Ok(Self::Process),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// FileFormat
// ---------------------------------------------------------------------------

/// Detected format of a raw document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Html,
    Pdf,
    Doc,
    Unknown,
}

impl FileFormat {
    /// Stable upper-case name, as stored in the metadata database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "HTML",
            Self::Pdf => "PDF",
            Self::Doc => "DOC",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// File extension used for raw blobs of this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Unknown => "bin",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTML" => Ok(Self::Html),
            "PDF" => Ok(Self::Pdf),
            "DOC" => Ok(Self::Doc),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown file format: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery input
// ---------------------------------------------------------------------------

/// Metadata for a document as handed over by the discovery source.
///
/// Nothing here is validated yet; the landing ingestor decides whether the
/// record is acceptable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable external key for the document.
    pub identifier: String,
    /// Free-text description or title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publication date as published by the source, unparsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Decision-making body the document came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Link the document was fetched from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

// ---------------------------------------------------------------------------
// Landing zone
// ---------------------------------------------------------------------------

/// A raw document accepted into the landing zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable external key (unique).
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publication date.
    pub published_date: NaiveDate,
    /// Publication date truncated to the partition granularity.
    pub partition_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    /// Blob path of the raw bytes, relative to the landing root.
    pub raw_storage_path: String,
    /// SHA-256 hex of the raw bytes (unique across the landing zone).
    pub content_hash: String,
    pub file_format: FileFormat,
    /// Raw byte length.
    pub raw_size: u64,
    pub ingested_at: DateTime<Utc>,
    /// Whether a successful processed record exists at the transform version
    /// the record was read under. Derived on read, never stored.
    #[serde(default)]
    pub processed: bool,
}

// ---------------------------------------------------------------------------
// Processed zone
// ---------------------------------------------------------------------------

/// Outcome of a single transform attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Success,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown process status: {other}")),
        }
    }
}

/// One transform attempt for a `(source_identifier, transform_version)` pair.
///
/// There is at most one record per pair. A FAILED record is replaced by the
/// next attempt; a SUCCESS record is final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Record identifier (UUID v7), new for every attempt.
    pub id: String,
    /// Identifier of the landing document this was produced from.
    pub source_identifier: String,
    pub transform_version: u32,
    /// Blob path of the output, relative to the processed root. Absent when
    /// the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_storage_path: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub status: ProcessStatus,
    /// Present iff `status` is FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Number of attempts made for this pair, this one included.
    pub attempts: u32,
    /// SHA-256 hex of the processed bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Metadata delta produced by the transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Why a single document did not make it through a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Missing identifier or unparseable publication date.
    InvalidMetadata,
    /// Identifier already ingested with different content.
    IdentifierConflict,
    /// No transform strategy for the detected format.
    UnsupportedFormat,
    /// The transform produced no content.
    EmptyContent,
    /// The transform could not make sense of the bytes.
    MalformedContent,
    /// A store rejected a read or write for this document.
    StorageFailure,
}

impl FailureKind {
    /// Stable code, used as the prefix of stored failure reasons.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidMetadata => "INVALID_METADATA",
            Self::IdentifierConflict => "IDENTIFIER_CONFLICT",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::MalformedContent => "MALFORMED_CONTENT",
            Self::StorageFailure => "STORAGE_FAILURE",
        }
    }

    /// Render a stored failure reason: `CODE: detail`.
    pub fn reason(self, detail: impl std::fmt::Display) -> String {
        format!("{}: {detail}", self.code())
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A per-document failure carried in a run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub identifier: String,
    pub kind: FailureKind,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Runs and statistics
// ---------------------------------------------------------------------------

/// A persisted run, as stored in the `runs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Date range and filters the run was scoped to.
    pub scope: serde_json::Value,
    /// Final run summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

/// Aggregate statistics over the landing zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandingStats {
    pub total_documents: u64,
    /// Documents with a successful record at the transform version queried.
    pub processed_documents: u64,
    pub by_format: BTreeMap<String, u64>,
    pub by_body: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_published: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_published: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn file_format_names() {
        assert_eq!("pdf".parse::<FileFormat>(), Ok(FileFormat::Pdf));
        assert_eq!(FileFormat::Html.to_string(), "HTML");
        assert_eq!(FileFormat::Unknown.extension(), "bin");
        assert!("xls".parse::<FileFormat>().is_err());
    }

    #[test]
    fn failure_reason_is_prefixed_with_code() {
        let reason = FailureKind::UnsupportedFormat.reason("no strategy for UNKNOWN");
        assert_eq!(reason, "UNSUPPORTED_FORMAT: no strategy for UNKNOWN");

        let json = serde_json::to_string(&FailureKind::StorageFailure).expect("serialize");
        assert_eq!(json, "\"STORAGE_FAILURE\"");
    }

    #[test]
    fn discovered_metadata_tolerates_missing_fields() {
        let meta: DocumentMetadata =
            serde_json::from_str(r#"{"identifier":"ADJ-00012"}"#).expect("deserialize");
        assert_eq!(meta.identifier, "ADJ-00012");
        assert!(meta.published_date.is_none());
        assert!(meta.body.is_none());
    }
}
