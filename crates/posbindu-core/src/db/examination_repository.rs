//! Examination repository implementation

#![allow(clippy::cast_possible_wrap)]

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Examination, PatientCode};
use libsql::{params, Connection};

const EXAMINATION_COLUMNS: &str = "id, patient_code, examined_at, physical, vitals, lab, \
                                   created_at, synced_at, sync_failed_at, sync_error";

/// Trait for examination storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ExaminationRepository {
    async fn insert(&self, examination: &Examination) -> Result<()>;

    /// Swap the local row identified by `local_id` for the remote's canonical version
    async fn replace_with_canonical(
        &self,
        local_id: i64,
        examination: &Examination,
        synced_at: i64,
    ) -> Result<()>;

    async fn get(&self, id: i64) -> Result<Option<Examination>>;

    /// Examinations for one patient, most recent first
    async fn list_for_patient(&self, code: &PatientCode, limit: usize)
        -> Result<Vec<Examination>>;

    async fn count_unsynced(&self) -> Result<usize>;

    async fn mark_failed(&self, id: i64, failed_at: i64, reason: &str) -> Result<()>;
}

/// libSQL implementation of `ExaminationRepository`
pub struct LibSqlExaminationRepository<'a> {
    conn: &'a Connection,
}

fn to_json_column<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn from_json_column<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>> {
    value
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(Into::into)
}

impl<'a> LibSqlExaminationRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_examination(row: &libsql::Row) -> Result<Examination> {
        let patient_code: String = row.get(1)?;
        Ok(Examination {
            id: row.get(0)?,
            patient_code: PatientCode::parse(&patient_code)?,
            examined_at: row.get(2)?,
            physical: from_json_column(row.get(3)?)?,
            vitals: from_json_column(row.get(4)?)?,
            lab: from_json_column(row.get(5)?)?,
            created_at: row.get(6)?,
            synced_at: row.get(7)?,
            sync_failed_at: row.get(8)?,
            sync_error: row.get(9)?,
        })
    }
}

impl ExaminationRepository for LibSqlExaminationRepository<'_> {
    async fn insert(&self, examination: &Examination) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO examinations (id, patient_code, examined_at, physical, vitals, lab, created_at, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    examination.id,
                    examination.patient_code.as_str(),
                    examination.examined_at,
                    to_json_column(examination.physical.as_ref())?,
                    to_json_column(examination.vitals.as_ref())?,
                    to_json_column(examination.lab.as_ref())?,
                    examination.created_at,
                    examination.synced_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn replace_with_canonical(
        &self,
        local_id: i64,
        examination: &Examination,
        synced_at: i64,
    ) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE examinations SET
                    id = ?, patient_code = ?, examined_at = ?, physical = ?, vitals = ?, lab = ?,
                    created_at = ?, synced_at = ?, sync_failed_at = NULL, sync_error = NULL
                 WHERE id = ?",
                params![
                    examination.id,
                    examination.patient_code.as_str(),
                    examination.examined_at,
                    to_json_column(examination.physical.as_ref())?,
                    to_json_column(examination.vitals.as_ref())?,
                    to_json_column(examination.lab.as_ref())?,
                    examination.created_at,
                    synced_at,
                    local_id
                ],
            )
            .await?;

        if updated == 0 {
            // The provisional row is gone; keep the canonical copy anyway
            let synced = Examination {
                synced_at: Some(synced_at),
                ..examination.clone()
            };
            self.insert(&synced).await?;
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Examination>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {EXAMINATION_COLUMNS} FROM examinations WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_examination(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_for_patient(
        &self,
        code: &PatientCode,
        limit: usize,
    ) -> Result<Vec<Examination>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EXAMINATION_COLUMNS} FROM examinations
                     WHERE patient_code = ?
                     ORDER BY examined_at DESC, id DESC
                     LIMIT ?"
                ),
                params![code.as_str(), limit as i64],
            )
            .await?;

        let mut examinations = Vec::new();
        while let Some(row) = rows.next().await? {
            examinations.push(Self::parse_examination(&row)?);
        }
        Ok(examinations)
    }

    async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM examinations WHERE synced_at IS NULL",
                (),
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn mark_failed(&self, id: i64, failed_at: i64, reason: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE examinations SET sync_failed_at = ?, sync_error = ?
                 WHERE id = ? AND synced_at IS NULL",
                params![failed_at, reason, id],
            )
            .await?;
        Ok(())
    }
}
