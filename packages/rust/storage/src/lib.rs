//! libSQL metadata store and blob storage for Docket.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! fingerprint index, landing-zone metadata, processed-zone records and run
//! history. Raw and processed bytes live outside the database in a
//! [`BlobStore`].
//!
//! **Access rules:**
//! - pipeline runs: read-write via [`Storage::open`]
//! - inspection commands: read-only via [`Storage::open_readonly`]

mod blob;
mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use docket_shared::{
    DocketError, DocumentRecord, FileFormat, LandingStats, Phase, ProcessStatus, ProcessedRecord,
    Result, RunId, RunRecord,
};
use libsql::{Connection, Database, params};

pub use blob::{BlobStore, FsBlobStore};

/// Column list shared by every landing-document select. The trailing column
/// is the derived `processed` flag and takes the transform version as `?1`.
const LANDING_COLUMNS: &str = "l.identifier, l.description, l.published_date, l.partition_date,
     l.source_body, l.source_link, l.raw_storage_path, l.content_hash, l.file_format,
     l.raw_size, l.ingested_at,
     EXISTS (SELECT 1 FROM processed_documents p
             WHERE p.source_identifier = l.identifier
               AND p.transform_version = ?1
               AND p.status = 'SUCCESS')";

const PROCESSED_COLUMNS: &str = "id, source_identifier, transform_version, processed_storage_path,
     processed_at, status, failure_reason, attempts, content_hash, metadata_json";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocketError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(DocketError::storage)?;
        let conn = db.connect().map_err(DocketError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocketError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(DocketError::storage)?;
        let conn = db.connect().map_err(DocketError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DocketError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Verify the database answers queries and carries a schema.
    pub async fn health_check(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM schema_migrations", params![])
            .await
            .map_err(|e| DocketError::Storage(format!("metadata store unavailable: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DocketError::Storage(format!("metadata store unavailable: {e}")))?;
        Ok(())
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DocketError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fingerprint operations
    // -----------------------------------------------------------------------

    /// Look up which identifier owns `content_hash`.
    pub async fn lookup_fingerprint(&self, content_hash: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT identifier FROM fingerprints WHERE content_hash = ?1",
                params![content_hash],
            )
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(DocketError::storage)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    /// Claim `content_hash` for `identifier`.
    ///
    /// Returns `true` if this call inserted the entry and `false` if the hash
    /// was already registered. The insert-or-nothing is a single statement, so
    /// exactly one of any number of concurrent callers wins.
    pub async fn register_fingerprint(&self, content_hash: &str, identifier: &str) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO fingerprints (content_hash, identifier, registered_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(content_hash) DO NOTHING
                 RETURNING identifier",
                params![content_hash, identifier, now.as_str()],
            )
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    /// Remove the entry for `content_hash`, but only while `identifier` still owns it.
    pub async fn release_fingerprint(&self, content_hash: &str, identifier: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM fingerprints WHERE content_hash = ?1 AND identifier = ?2",
                params![content_hash, identifier],
            )
            .await
            .map_err(DocketError::storage)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Landing-zone operations
    // -----------------------------------------------------------------------

    /// Insert a landing record. Returns `false` if the identifier is taken.
    pub async fn insert_landing(&self, doc: &DocumentRecord) -> Result<bool> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO landing_documents (identifier, description, published_date,
                     partition_date, source_body, source_link, raw_storage_path, content_hash,
                     file_format, raw_size, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(identifier) DO NOTHING
                 RETURNING identifier",
                params![
                    doc.identifier.as_str(),
                    doc.description.as_deref(),
                    format_date(doc.published_date),
                    format_date(doc.partition_date),
                    doc.source_body.as_deref(),
                    doc.source_link.as_deref(),
                    doc.raw_storage_path.as_str(),
                    doc.content_hash.as_str(),
                    doc.file_format.as_str(),
                    doc.raw_size as i64,
                    doc.ingested_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    /// Point lookup of a landing record. `processed` is evaluated against
    /// `transform_version`.
    pub async fn get_landing(
        &self,
        identifier: &str,
        transform_version: u32,
    ) -> Result<Option<DocumentRecord>> {
        let sql =
            format!("SELECT {LANDING_COLUMNS} FROM landing_documents l WHERE l.identifier = ?2");
        let mut rows = self
            .conn
            .query(&sql, params![transform_version, identifier])
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_document(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    /// All landing records whose partition date lies in `[start, end]`,
    /// ordered by partition then identifier.
    pub async fn scan_landing(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        transform_version: u32,
    ) -> Result<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT {LANDING_COLUMNS} FROM landing_documents l
             WHERE l.partition_date BETWEEN ?2 AND ?3
             ORDER BY l.partition_date, l.identifier"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![transform_version, format_date(start), format_date(end)],
            )
            .await
            .map_err(DocketError::storage)?;

        let mut results = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => results.push(row_to_document(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DocketError::storage(e)),
            }
        }
        Ok(results)
    }

    /// Aggregate landing statistics; the processed count is for `transform_version`.
    pub async fn landing_stats(&self, transform_version: u32) -> Result<LandingStats> {
        let mut stats = LandingStats::default();

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), MIN(published_date), MAX(published_date) FROM landing_documents",
                params![],
            )
            .await
            .map_err(DocketError::storage)?;
        if let Ok(Some(row)) = rows.next().await {
            stats.total_documents = row.get::<i64>(0).unwrap_or(0) as u64;
            stats.earliest_published = row.get::<String>(1).ok().and_then(|s| parse_date(&s).ok());
            stats.latest_published = row.get::<String>(2).ok().and_then(|s| parse_date(&s).ok());
        }

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM processed_documents p
                 JOIN landing_documents l ON l.identifier = p.source_identifier
                 WHERE p.transform_version = ?1 AND p.status = 'SUCCESS'",
                params![transform_version],
            )
            .await
            .map_err(DocketError::storage)?;
        if let Ok(Some(row)) = rows.next().await {
            stats.processed_documents = row.get::<i64>(0).unwrap_or(0) as u64;
        }

        let mut rows = self
            .conn
            .query(
                "SELECT file_format, COUNT(*) FROM landing_documents GROUP BY file_format",
                params![],
            )
            .await
            .map_err(DocketError::storage)?;
        while let Ok(Some(row)) = rows.next().await {
            let format: String = row.get(0).map_err(DocketError::storage)?;
            stats
                .by_format
                .insert(format, row.get::<i64>(1).unwrap_or(0) as u64);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(source_body, ''), COUNT(*) FROM landing_documents
                 GROUP BY COALESCE(source_body, '')",
                params![],
            )
            .await
            .map_err(DocketError::storage)?;
        while let Ok(Some(row)) = rows.next().await {
            let body: String = row.get(0).map_err(DocketError::storage)?;
            let body = if body.is_empty() { "(none)".into() } else { body };
            stats
                .by_body
                .insert(body, row.get::<i64>(1).unwrap_or(0) as u64);
        }

        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Processed-zone operations
    // -----------------------------------------------------------------------

    /// The record for `(identifier, transform_version)`, if any attempt exists.
    pub async fn get_processed(
        &self,
        identifier: &str,
        transform_version: u32,
    ) -> Result<Option<ProcessedRecord>> {
        let sql = format!(
            "SELECT {PROCESSED_COLUMNS} FROM processed_documents
             WHERE source_identifier = ?1 AND transform_version = ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![identifier, transform_version])
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_processed(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    /// Every processed record for a document, oldest transform version first.
    pub async fn list_processed(&self, identifier: &str) -> Result<Vec<ProcessedRecord>> {
        let sql = format!(
            "SELECT {PROCESSED_COLUMNS} FROM processed_documents
             WHERE source_identifier = ?1 ORDER BY transform_version"
        );
        let mut rows = self
            .conn
            .query(&sql, params![identifier])
            .await
            .map_err(DocketError::storage)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_processed(&row)?);
        }
        Ok(results)
    }

    /// Write the outcome of a transform attempt.
    ///
    /// A new pair is inserted with `attempts = 1`. A pair holding a FAILED
    /// record is superseded: the new record takes its place and `attempts` is
    /// incremented. A pair holding SUCCESS is left untouched and `None` is
    /// returned. On write, returns the stored attempt count.
    pub async fn record_processed(&self, record: &ProcessedRecord) -> Result<Option<u32>> {
        self.check_writable()?;
        let metadata_json = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(DocketError::storage)?;

        let mut rows = self
            .conn
            .query(
                "INSERT INTO processed_documents (id, source_identifier, transform_version,
                     processed_storage_path, processed_at, status, failure_reason, attempts,
                     content_hash, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
                 ON CONFLICT(source_identifier, transform_version) DO UPDATE SET
                   id = excluded.id,
                   processed_storage_path = excluded.processed_storage_path,
                   processed_at = excluded.processed_at,
                   status = excluded.status,
                   failure_reason = excluded.failure_reason,
                   attempts = processed_documents.attempts + 1,
                   content_hash = excluded.content_hash,
                   metadata_json = excluded.metadata_json
                 WHERE processed_documents.status = 'FAILED'
                 RETURNING attempts",
                params![
                    record.id.as_str(),
                    record.source_identifier.as_str(),
                    record.transform_version,
                    record.processed_storage_path.as_deref(),
                    record.processed_at.to_rfc3339(),
                    record.status.as_str(),
                    record.failure_reason.as_deref(),
                    record.content_hash.as_deref(),
                    metadata_json.as_deref(),
                ],
            )
            .await
            .map_err(DocketError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<u32>(0).map_err(DocketError::storage)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocketError::storage(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        self.check_writable()?;
        let scope_json = serde_json::to_string(&run.scope).map_err(DocketError::storage)?;
        self.conn
            .execute(
                "INSERT INTO runs (id, phase, started_at, scope_json) VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.id.to_string(),
                    run.phase.as_str(),
                    run.started_at.to_rfc3339(),
                    scope_json,
                ],
            )
            .await
            .map_err(DocketError::storage)?;
        Ok(())
    }

    /// Mark a run finished and attach its summary.
    pub async fn finish_run(&self, id: RunId, stats: &serde_json::Value) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let stats_json = serde_json::to_string(stats).map_err(DocketError::storage)?;
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, id.to_string()],
            )
            .await
            .map_err(DocketError::storage)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, phase, started_at, finished_at, scope_json, stats_json
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(DocketError::storage)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row.get(0).map_err(DocketError::storage)?;
            let phase: String = row.get(1).map_err(DocketError::storage)?;
            let started_at: String = row.get(2).map_err(DocketError::storage)?;
            let scope: String = row.get(4).map_err(DocketError::storage)?;
            results.push(RunRecord {
                id: id.parse().map_err(DocketError::storage)?,
                phase: phase.parse::<Phase>().map_err(DocketError::Storage)?,
                started_at: parse_timestamp(&started_at)?,
                finished_at: row
                    .get::<String>(3)
                    .ok()
                    .map(|s| parse_timestamp(&s))
                    .transpose()?,
                scope: serde_json::from_str(&scope).map_err(DocketError::storage)?,
                stats: row
                    .get::<String>(5)
                    .ok()
                    .map(|s| serde_json::from_str(&s))
                    .transpose()
                    .map_err(DocketError::storage)?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DocketError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DocketError::Storage(format!("invalid timestamp '{s}': {e}")))
}

/// Convert a row selected with [`LANDING_COLUMNS`] to a [`DocumentRecord`].
fn row_to_document(row: &libsql::Row) -> Result<DocumentRecord> {
    let published: String = row.get(2).map_err(DocketError::storage)?;
    let partition: String = row.get(3).map_err(DocketError::storage)?;
    let format: String = row.get(8).map_err(DocketError::storage)?;
    let ingested_at: String = row.get(10).map_err(DocketError::storage)?;

    Ok(DocumentRecord {
        identifier: row.get::<String>(0).map_err(DocketError::storage)?,
        description: row.get::<String>(1).ok(),
        published_date: parse_date(&published)?,
        partition_date: parse_date(&partition)?,
        source_body: row.get::<String>(4).ok(),
        source_link: row.get::<String>(5).ok(),
        raw_storage_path: row.get::<String>(6).map_err(DocketError::storage)?,
        content_hash: row.get::<String>(7).map_err(DocketError::storage)?,
        file_format: format.parse::<FileFormat>().map_err(DocketError::Storage)?,
        raw_size: row.get::<i64>(9).map_err(DocketError::storage)? as u64,
        ingested_at: parse_timestamp(&ingested_at)?,
        processed: row.get::<i64>(11).unwrap_or(0) != 0,
    })
}

/// Convert a row selected with [`PROCESSED_COLUMNS`] to a [`ProcessedRecord`].
fn row_to_processed(row: &libsql::Row) -> Result<ProcessedRecord> {
    let processed_at: String = row.get(4).map_err(DocketError::storage)?;
    let status: String = row.get(5).map_err(DocketError::storage)?;

    Ok(ProcessedRecord {
        id: row.get::<String>(0).map_err(DocketError::storage)?,
        source_identifier: row.get::<String>(1).map_err(DocketError::storage)?,
        transform_version: row.get::<u32>(2).map_err(DocketError::storage)?,
        processed_storage_path: row.get::<String>(3).ok(),
        processed_at: parse_timestamp(&processed_at)?,
        status: status.parse::<ProcessStatus>().map_err(DocketError::Storage)?,
        failure_reason: row.get::<String>(6).ok(),
        attempts: row.get::<u32>(7).map_err(DocketError::storage)?,
        content_hash: row.get::<String>(8).ok(),
        metadata: row
            .get::<String>(9)
            .ok()
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DocketError::storage)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("docket_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    fn make_doc(identifier: &str, hash: &str, published: &str) -> DocumentRecord {
        let published_date = date(published);
        DocumentRecord {
            identifier: identifier.into(),
            description: Some(format!("Decision {identifier}")),
            published_date,
            partition_date: date(&format!("{}-01", &published[..7])),
            source_body: Some("Labour Court".into()),
            source_link: None,
            raw_storage_path: format!("{}/{identifier}.html", &published[..7]),
            content_hash: hash.into(),
            file_format: FileFormat::Html,
            raw_size: 42,
            ingested_at: Utc::now(),
            processed: false,
        }
    }

    fn make_processed(identifier: &str, version: u32, status: ProcessStatus) -> ProcessedRecord {
        ProcessedRecord {
            id: Uuid::now_v7().to_string(),
            source_identifier: identifier.into(),
            transform_version: version,
            processed_storage_path: (status == ProcessStatus::Success)
                .then(|| format!("2025-02/{identifier}.v{version}.txt")),
            processed_at: Utc::now(),
            status,
            failure_reason: (status == ProcessStatus::Failed)
                .then(|| "UNSUPPORTED_FORMAT: no strategy".to_string()),
            attempts: 1,
            content_hash: None,
            metadata: Some(serde_json::json!({ "word_count": 12 })),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
        storage.health_check().await.expect("healthy");
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("docket_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn fingerprint_claim_is_first_writer_wins() {
        let storage = test_storage().await;
        assert!(storage.register_fingerprint("abc", "DOC-1").await.unwrap());
        assert!(!storage.register_fingerprint("abc", "DOC-2").await.unwrap());
        assert_eq!(
            storage.lookup_fingerprint("abc").await.unwrap().as_deref(),
            Some("DOC-1")
        );

        // Release by a non-owner is a no-op.
        storage.release_fingerprint("abc", "DOC-2").await.unwrap();
        assert!(storage.lookup_fingerprint("abc").await.unwrap().is_some());

        storage.release_fingerprint("abc", "DOC-1").await.unwrap();
        assert!(storage.lookup_fingerprint("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn landing_insert_lookup_and_scan() {
        let storage = test_storage().await;
        assert!(storage.insert_landing(&make_doc("A", "h1", "2025-01-20")).await.unwrap());
        assert!(storage.insert_landing(&make_doc("B", "h2", "2025-02-10")).await.unwrap());
        assert!(storage.insert_landing(&make_doc("C", "h3", "2025-04-02")).await.unwrap());

        // Same identifier again is refused, not overwritten.
        assert!(!storage.insert_landing(&make_doc("A", "h9", "2025-01-21")).await.unwrap());

        let a = storage.get_landing("A", 1).await.unwrap().expect("A exists");
        assert_eq!(a.content_hash, "h1");
        assert_eq!(a.source_body.as_deref(), Some("Labour Court"));
        assert!(!a.processed);

        let scanned = storage
            .scan_landing(date("2025-01-01"), date("2025-03-01"), 1)
            .await
            .unwrap();
        let ids: Vec<_> = scanned.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn processed_flag_is_derived_per_version() {
        let storage = test_storage().await;
        storage.insert_landing(&make_doc("A", "h1", "2025-02-10")).await.unwrap();
        storage
            .record_processed(&make_processed("A", 1, ProcessStatus::Success))
            .await
            .unwrap();

        assert!(storage.get_landing("A", 1).await.unwrap().unwrap().processed);
        assert!(!storage.get_landing("A", 2).await.unwrap().unwrap().processed);
    }

    #[tokio::test]
    async fn failed_record_is_superseded_success_is_final() {
        let storage = test_storage().await;

        let first = make_processed("A", 1, ProcessStatus::Failed);
        assert_eq!(storage.record_processed(&first).await.unwrap(), Some(1));

        let retry = make_processed("A", 1, ProcessStatus::Success);
        assert_eq!(storage.record_processed(&retry).await.unwrap(), Some(2));

        let stored = storage.get_processed("A", 1).await.unwrap().expect("record");
        assert_eq!(stored.status, ProcessStatus::Success);
        assert_eq!(stored.id, retry.id);
        assert_ne!(stored.id, first.id);
        assert!(stored.failure_reason.is_none());
        assert_eq!(stored.metadata, Some(serde_json::json!({ "word_count": 12 })));

        let again = make_processed("A", 1, ProcessStatus::Failed);
        assert_eq!(storage.record_processed(&again).await.unwrap(), None);
        let stored = storage.get_processed("A", 1).await.unwrap().expect("record");
        assert_eq!(stored.status, ProcessStatus::Success);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn stats_and_runs() {
        let storage = test_storage().await;
        storage.insert_landing(&make_doc("A", "h1", "2025-01-20")).await.unwrap();
        let mut pdf = make_doc("B", "h2", "2025-02-10");
        pdf.file_format = FileFormat::Pdf;
        pdf.source_body = None;
        storage.insert_landing(&pdf).await.unwrap();
        storage
            .record_processed(&make_processed("A", 1, ProcessStatus::Success))
            .await
            .unwrap();

        let stats = storage.landing_stats(1).await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.processed_documents, 1);
        assert_eq!(stats.by_format.get("PDF"), Some(&1));
        assert_eq!(stats.by_body.get("(none)"), Some(&1));
        assert_eq!(stats.earliest_published, Some(date("2025-01-20")));
        assert_eq!(stats.latest_published, Some(date("2025-02-10")));

        let run = RunRecord {
            id: RunId::new(),
            phase: Phase::Ingest,
            started_at: Utc::now(),
            finished_at: None,
            scope: serde_json::json!({ "start": "2025-01-01", "end": "2025-03-01" }),
            stats: None,
        };
        storage.insert_run(&run).await.unwrap();
        storage
            .finish_run(run.id, &serde_json::json!({ "ingested": 2 }))
            .await
            .unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run.id);
        assert_eq!(runs[0].phase, Phase::Ingest);
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].stats, Some(serde_json::json!({ "ingested": 2 })));
    }

    #[tokio::test]
    async fn readonly_refuses_writes() {
        let tmp = std::env::temp_dir().join(format!("docket_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.expect("create"));
        let ro = Storage::open_readonly(&tmp).await.expect("open readonly");
        assert!(ro.register_fingerprint("abc", "A").await.is_err());
        assert!(ro.landing_stats(1).await.is_ok());
    }
}
