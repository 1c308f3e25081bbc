//! Sync metadata repository implementation

use crate::error::Result;
use crate::models::SyncMeta;
use libsql::{params, Connection};

const LAST_PULL_AT: &str = "last_pull_at";
const LAST_PASS_AT: &str = "last_pass_at";

/// Trait for sync metadata storage (async)
#[allow(async_fn_in_trait)]
pub trait SyncMetaRepository {
    /// Load metadata; missing keys stay `None`
    async fn load(&self) -> Result<SyncMeta>;

    async fn record_pull(&self, at: i64) -> Result<()>;

    async fn record_pass(&self, at: i64) -> Result<()>;
}

/// libSQL implementation of `SyncMetaRepository`
pub struct LibSqlSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncMetaRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncMetaRepository for LibSqlSyncMetaRepository<'_> {
    async fn load(&self) -> Result<SyncMeta> {
        Ok(SyncMeta {
            last_pull_at: self.get_value(LAST_PULL_AT).await?,
            last_pass_at: self.get_value(LAST_PASS_AT).await?,
        })
    }

    async fn record_pull(&self, at: i64) -> Result<()> {
        self.set_value(LAST_PULL_AT, at).await
    }

    async fn record_pass(&self, at: i64) -> Result<()> {
        self.set_value(LAST_PASS_AT, at).await
    }
}

impl LibSqlSyncMetaRepository<'_> {
    async fn get_value(&self, key: &str) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_value(&self, key: &str, value: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_empty_meta() {
        let db = setup().await;
        let repo = LibSqlSyncMetaRepository::new(db.connection());

        assert_eq!(repo.load().await.unwrap(), SyncMeta::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_overwrite() {
        let db = setup().await;
        let repo = LibSqlSyncMetaRepository::new(db.connection());

        repo.record_pull(10).await.unwrap();
        repo.record_pass(11).await.unwrap();
        repo.record_pull(20).await.unwrap();

        let meta = repo.load().await.unwrap();
        assert_eq!(meta.last_pull_at, Some(20));
        assert_eq!(meta.last_pass_at, Some(11));
    }
}
