//! SQL migration definitions for the Docket metadata database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: fingerprints, landing_documents, processed_documents, runs",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Content-hash index: the sole authority for duplicate detection
CREATE TABLE IF NOT EXISTS fingerprints (
    content_hash  TEXT PRIMARY KEY,
    identifier    TEXT NOT NULL,
    registered_at TEXT NOT NULL
);

-- Raw documents accepted into the landing zone
CREATE TABLE IF NOT EXISTS landing_documents (
    identifier       TEXT PRIMARY KEY,
    description      TEXT,
    published_date   TEXT NOT NULL,
    partition_date   TEXT NOT NULL,
    source_body      TEXT,
    source_link      TEXT,
    raw_storage_path TEXT NOT NULL,
    content_hash     TEXT NOT NULL UNIQUE,
    file_format      TEXT NOT NULL,
    raw_size         INTEGER NOT NULL,
    ingested_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_landing_partition ON landing_documents(partition_date);

-- One transform attempt per (document, transform version)
CREATE TABLE IF NOT EXISTS processed_documents (
    id                     TEXT NOT NULL UNIQUE,
    source_identifier      TEXT NOT NULL,
    transform_version      INTEGER NOT NULL,
    processed_storage_path TEXT,
    processed_at           TEXT NOT NULL,
    status                 TEXT NOT NULL CHECK (status IN ('SUCCESS', 'FAILED')),
    failure_reason         TEXT,
    attempts               INTEGER NOT NULL DEFAULT 1,
    content_hash           TEXT,
    metadata_json          TEXT,
    PRIMARY KEY (source_identifier, transform_version)
);

CREATE INDEX IF NOT EXISTS idx_processed_status ON processed_documents(transform_version, status);

-- Run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    phase       TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    scope_json  TEXT NOT NULL,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
