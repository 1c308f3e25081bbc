//! Sync queue repository implementation

use crate::error::{Error, Result};
use crate::models::{EntityType, NewSyncQueueItem, PatientCode, SyncQueueItem};
use libsql::{params, Connection};

const QUEUE_COLUMNS: &str =
    "id, entity_type, operation, record_key, payload, retry_count, created_at, depends_on";

/// Trait for sync queue operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// Append an item; the returned copy carries its assigned id
    async fn enqueue(&self, item: &NewSyncQueueItem) -> Result<SyncQueueItem>;

    /// All items, oldest first
    async fn list_pending(&self) -> Result<Vec<SyncQueueItem>>;

    async fn get(&self, id: i64) -> Result<Option<SyncQueueItem>>;

    async fn count(&self) -> Result<usize>;

    /// Add one to the retry count and return the new value
    async fn increment_retry(&self, id: i64) -> Result<u32>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Id of the still-queued create for `code`, if any
    async fn pending_patient_item(&self, code: &PatientCode) -> Result<Option<i64>>;
}

/// libSQL implementation of `SyncQueueRepository`
pub struct LibSqlSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueueRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &libsql::Row) -> Result<SyncQueueItem> {
        let entity_type: String = row.get(1)?;
        let operation: String = row.get(2)?;
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(5)?;

        Ok(SyncQueueItem {
            id: row.get(0)?,
            entity_type: entity_type.parse()?,
            operation: operation.parse()?,
            record_key: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            created_at: row.get(6)?,
            depends_on: row.get(7)?,
        })
    }
}

impl SyncQueueRepository for LibSqlSyncQueueRepository<'_> {
    async fn enqueue(&self, item: &NewSyncQueueItem) -> Result<SyncQueueItem> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (entity_type, operation, record_key, payload, retry_count, created_at, depends_on)
                 VALUES (?, ?, ?, ?, 0, ?, ?)",
                params![
                    item.entity_type.as_str(),
                    item.operation.as_str(),
                    item.record_key.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.created_at,
                    item.depends_on
                ],
            )
            .await?;

        let id = self.conn.last_insert_rowid();
        Ok(SyncQueueItem {
            id,
            entity_type: item.entity_type,
            operation: item.operation,
            record_key: item.record_key.clone(),
            payload: item.payload.clone(),
            retry_count: 0,
            created_at: item.created_at,
            depends_on: item.depends_on,
        })
    }

    async fn list_pending(&self) -> Result<Vec<SyncQueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY created_at ASC, id ASC"),
                (),
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }

    async fn get(&self, id: i64) -> Result<Option<SyncQueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn increment_retry(&self, id: i64) -> Result<u32> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?",
                [id],
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound(format!("sync queue item {id}")));
        }

        self.get(id)
            .await?
            .map(|item| item.retry_count)
            .ok_or_else(|| Error::NotFound(format!("sync queue item {id}")))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(())
    }

    async fn pending_patient_item(&self, code: &PatientCode) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM sync_queue
                 WHERE entity_type = ? AND record_key = ?
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1",
                params![EntityType::Patient.as_str(), code.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)?)),
            None => Ok(None),
        }
    }
}
