//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run `statements` in one transaction and record `version`.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: records and the sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Patients are keyed by their stable code; `id` is ephemeral until synced
            "CREATE TABLE IF NOT EXISTS patients (
                code TEXT PRIMARY KEY,
                id INTEGER NOT NULL,
                nik TEXT NOT NULL,
                bpjs_number TEXT,
                name TEXT NOT NULL,
                birth_date TEXT NOT NULL,
                gender TEXT NOT NULL,
                address TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                synced_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_patients_created ON patients(created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_patients_synced ON patients(synced_at)",
            "CREATE TABLE IF NOT EXISTS examinations (
                id INTEGER PRIMARY KEY,
                patient_code TEXT NOT NULL REFERENCES patients(code),
                examined_at INTEGER NOT NULL,
                physical TEXT,
                vitals TEXT,
                lab TEXT,
                created_at INTEGER NOT NULL,
                synced_at INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_examinations_patient ON examinations(patient_code, examined_at DESC)",
            // Transient rows; FIFO by (created_at, id)
            "CREATE TABLE IF NOT EXISTS sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                operation TEXT NOT NULL,
                record_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_order ON sync_queue(created_at, id)",
        ],
    )
    .await
}

/// Migration to version 2: queue dependencies, terminal failure markers, sync metadata
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "ALTER TABLE sync_queue ADD COLUMN depends_on INTEGER",
            "ALTER TABLE patients ADD COLUMN sync_failed_at INTEGER",
            "ALTER TABLE patients ADD COLUMN sync_error TEXT",
            "ALTER TABLE examinations ADD COLUMN sync_failed_at INTEGER",
            "ALTER TABLE examinations ADD COLUMN sync_error TEXT",
            "CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
        ],
    )
    .await
}
