//! Shared local durable store used by the coordinator and the sync engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    finish_transaction, Database, ExaminationRepository, LibSqlExaminationRepository,
    LibSqlPatientRepository, LibSqlSyncMetaRepository, LibSqlSyncQueueRepository,
    PatientRepository, SyncMetaRepository, SyncQueueRepository,
};
use crate::models::{
    EntityType, Examination, NewSyncQueueItem, Patient, PatientCode, SyncMeta, SyncQueueItem,
};
use crate::{Error, Result};

/// Counts of work the remote has not acknowledged yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub queued_items: usize,
    pub unsynced_patients: usize,
    pub unsynced_examinations: usize,
}

/// Thread-safe handle over the patients, examinations and sync queue tables.
///
/// Every method takes the connection lock for its whole duration, so the
/// multi-statement writes below are never interleaved with other writers.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh store is
    /// created in its place.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local store at {} is unreadable: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("posbindu.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local store from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale store sidecar {}", path.display());
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------

    /// Codes already used under `prefix` (collision set for code generation).
    pub async fn patient_codes_with_prefix(&self, prefix: &str) -> Result<HashSet<String>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .codes_with_prefix(prefix)
            .await
    }

    pub async fn get_patient(&self, code: &PatientCode) -> Result<Option<Patient>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection()).get(code).await
    }

    pub async fn list_patients(&self, limit: usize, offset: usize) -> Result<Vec<Patient>> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .list(limit, offset)
            .await
    }

    /// Write a patient the remote just acknowledged.
    pub async fn save_synced_patient(&self, patient: &Patient, synced_at: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlPatientRepository::new(db.connection())
            .upsert_canonical(patient, synced_at)
            .await
    }

    /// Write a provisional patient and its queue item in one transaction.
    pub async fn record_offline_patient(
        &self,
        patient: &Patient,
        item: &NewSyncQueueItem,
    ) -> Result<SyncQueueItem> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            LibSqlPatientRepository::new(conn).insert(patient).await?;
            LibSqlSyncQueueRepository::new(conn).enqueue(item).await
        }
        .await;
        finish_transaction(conn, result).await
    }

    /// Bulk upsert of the remote's canonical patient list. Returns the number merged.
    pub async fn merge_remote_patients(&self, patients: &[Patient], synced_at: i64) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            let repo = LibSqlPatientRepository::new(conn);
            for patient in patients {
                repo.upsert_canonical(patient, synced_at).await?;
            }
            LibSqlSyncMetaRepository::new(conn)
                .record_pull(synced_at)
                .await?;
            Ok(patients.len())
        }
        .await;
        finish_transaction(conn, result).await
    }

    // ------------------------------------------------------------------
    // Examinations
    // ------------------------------------------------------------------

    pub async fn get_examination(&self, id: i64) -> Result<Option<Examination>> {
        let db = self.db.lock().await;
        LibSqlExaminationRepository::new(db.connection())
            .get(id)
            .await
    }

    pub async fn list_examinations(
        &self,
        code: &PatientCode,
        limit: usize,
    ) -> Result<Vec<Examination>> {
        let db = self.db.lock().await;
        LibSqlExaminationRepository::new(db.connection())
            .list_for_patient(code, limit)
            .await
    }

    /// Write an examination the remote just acknowledged.
    pub async fn save_synced_examination(
        &self,
        examination: &Examination,
        synced_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlExaminationRepository::new(db.connection())
            .replace_with_canonical(examination.id, examination, synced_at)
            .await
    }

    /// Write a provisional examination and its queue item in one transaction.
    ///
    /// If the patient's own create is still queued, the new item records a
    /// dependency on it.
    pub async fn record_offline_examination(
        &self,
        examination: &Examination,
        item: NewSyncQueueItem,
    ) -> Result<SyncQueueItem> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            let queue = LibSqlSyncQueueRepository::new(conn);
            let depends_on = queue
                .pending_patient_item(&examination.patient_code)
                .await?;
            LibSqlExaminationRepository::new(conn)
                .insert(examination)
                .await?;
            queue.enqueue(&item.with_dependency(depends_on)).await
        }
        .await;
        finish_transaction(conn, result).await
    }

    // ------------------------------------------------------------------
    // Sync queue
    // ------------------------------------------------------------------

    /// Queue items, oldest first.
    pub async fn pending_items(&self) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .list_pending()
            .await
    }

    pub async fn queue_item(&self, id: i64) -> Result<Option<SyncQueueItem>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .get(id)
            .await
    }

    pub async fn queue_len(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .count()
            .await
    }

    /// Count a failed attempt; returns the new retry count.
    pub async fn record_failed_attempt(&self, item_id: i64) -> Result<u32> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .increment_retry(item_id)
            .await
    }

    /// Apply a committed patient create: canonical record in, queue item out.
    pub async fn commit_patient(
        &self,
        item_id: i64,
        canonical: &Patient,
        synced_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            LibSqlPatientRepository::new(conn)
                .upsert_canonical(canonical, synced_at)
                .await?;
            LibSqlSyncQueueRepository::new(conn).delete(item_id).await
        }
        .await;
        finish_transaction(conn, result).await
    }

    /// Apply a committed examination create.
    pub async fn commit_examination(
        &self,
        item_id: i64,
        local_id: i64,
        canonical: &Examination,
        synced_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            LibSqlExaminationRepository::new(conn)
                .replace_with_canonical(local_id, canonical, synced_at)
                .await?;
            LibSqlSyncQueueRepository::new(conn).delete(item_id).await
        }
        .await;
        finish_transaction(conn, result).await
    }

    /// Drop a queue item for good and flag its record as failed.
    ///
    /// The record itself stays in place, unsynced.
    pub async fn evict(&self, item: &SyncQueueItem, reason: &str, failed_at: i64) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = async {
            match item.entity_type {
                EntityType::Patient => {
                    let code = PatientCode::parse(&item.record_key)?;
                    LibSqlPatientRepository::new(conn)
                        .mark_failed(&code, failed_at, reason)
                        .await?;
                }
                EntityType::Examination => {
                    let id = item.record_key.parse::<i64>().map_err(|_| {
                        Error::Storage(format!(
                            "Queue item {} has a malformed examination key '{}'",
                            item.id, item.record_key
                        ))
                    })?;
                    LibSqlExaminationRepository::new(conn)
                        .mark_failed(id, failed_at, reason)
                        .await?;
                }
            }
            LibSqlSyncQueueRepository::new(conn).delete(item.id).await
        }
        .await;
        finish_transaction(conn, result).await
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    pub async fn sync_meta(&self) -> Result<SyncMeta> {
        let db = self.db.lock().await;
        LibSqlSyncMetaRepository::new(db.connection()).load().await
    }

    pub async fn record_pass(&self, at: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncMetaRepository::new(db.connection())
            .record_pass(at)
            .await
    }

    pub async fn pending_summary(&self) -> Result<PendingSummary> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(PendingSummary {
            queued_items: LibSqlSyncQueueRepository::new(conn).count().await?,
            unsynced_patients: LibSqlPatientRepository::new(conn).count_unsynced().await?,
            unsynced_examinations: LibSqlExaminationRepository::new(conn)
                .count_unsynced()
                .await?,
        })
    }
}
