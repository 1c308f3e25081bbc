//! Patient repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{Patient, PatientCode};
use libsql::{params, Connection};

const PATIENT_COLUMNS: &str = "id, code, nik, bpjs_number, name, birth_date, gender, address, \
                               created_at, synced_at, sync_failed_at, sync_error";

/// Trait for patient storage operations (async)
#[allow(async_fn_in_trait)]
pub trait PatientRepository {
    /// Insert a new patient; fails if the code is already taken
    async fn insert(&self, patient: &Patient) -> Result<()>;

    /// Insert or replace by code with the remote's canonical version
    async fn upsert_canonical(&self, patient: &Patient, synced_at: i64) -> Result<()>;

    /// Get a patient by code
    async fn get(&self, code: &PatientCode) -> Result<Option<Patient>>;

    /// List patients, newest first
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Patient>>;

    /// All codes starting with `prefix`
    async fn codes_with_prefix(&self, prefix: &str) -> Result<HashSet<String>>;

    /// Number of patients the remote has not acknowledged
    async fn count_unsynced(&self) -> Result<usize>;

    /// Flag an unsynced patient whose pending create was given up on
    async fn mark_failed(&self, code: &PatientCode, failed_at: i64, reason: &str) -> Result<()>;
}

/// libSQL implementation of `PatientRepository`
pub struct LibSqlPatientRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPatientRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a patient from a database row
    fn parse_patient(row: &libsql::Row) -> Result<Patient> {
        let code: String = row.get(1)?;
        let birth_date: String = row.get(5)?;
        let gender: String = row.get(6)?;

        Ok(Patient {
            id: row.get(0)?,
            code: PatientCode::parse(&code)?,
            nik: row.get(2)?,
            bpjs_number: row.get(3)?,
            name: row.get(4)?,
            birth_date: birth_date.parse().map_err(|error| {
                Error::Storage(format!("Invalid birth date '{birth_date}': {error}"))
            })?,
            gender: gender.parse()?,
            address: row.get(7)?,
            created_at: row.get(8)?,
            synced_at: row.get(9)?,
            sync_failed_at: row.get(10)?,
            sync_error: row.get(11)?,
        })
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<Patient>> {
        let mut patients = Vec::new();
        while let Some(row) = rows.next().await? {
            patients.push(Self::parse_patient(&row)?);
        }
        Ok(patients)
    }
}

impl PatientRepository for LibSqlPatientRepository<'_> {
    async fn insert(&self, patient: &Patient) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO patients (id, code, nik, bpjs_number, name, birth_date, gender, address, created_at, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    patient.id,
                    patient.code.as_str(),
                    patient.nik.as_str(),
                    patient.bpjs_number.clone(),
                    patient.name.as_str(),
                    patient.birth_date.to_string(),
                    patient.gender.as_str(),
                    patient.address.as_str(),
                    patient.created_at,
                    patient.synced_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_canonical(&self, patient: &Patient, synced_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO patients (id, code, nik, bpjs_number, name, birth_date, gender, address, created_at, synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(code) DO UPDATE SET
                    id = excluded.id,
                    nik = excluded.nik,
                    bpjs_number = excluded.bpjs_number,
                    name = excluded.name,
                    birth_date = excluded.birth_date,
                    gender = excluded.gender,
                    address = excluded.address,
                    created_at = excluded.created_at,
                    synced_at = excluded.synced_at,
                    sync_failed_at = NULL,
                    sync_error = NULL",
                params![
                    patient.id,
                    patient.code.as_str(),
                    patient.nik.as_str(),
                    patient.bpjs_number.clone(),
                    patient.name.as_str(),
                    patient.birth_date.to_string(),
                    patient.gender.as_str(),
                    patient.address.as_str(),
                    patient.created_at,
                    synced_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, code: &PatientCode) -> Result<Option<Patient>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE code = ?"),
                [code.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_patient(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Patient>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PATIENT_COLUMNS} FROM patients
                     ORDER BY created_at DESC, code ASC
                     LIMIT ? OFFSET ?"
                ),
                params![limit as i64, offset as i64],
            )
            .await?;
        self.collect(rows).await
    }

    async fn codes_with_prefix(&self, prefix: &str) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT code FROM patients WHERE substr(code, 1, length(?1)) = ?1",
                [prefix],
            )
            .await?;

        let mut codes = HashSet::new();
        while let Some(row) = rows.next().await? {
            codes.insert(row.get::<String>(0)?);
        }
        Ok(codes)
    }

    async fn count_unsynced(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM patients WHERE synced_at IS NULL", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn mark_failed(&self, code: &PatientCode, failed_at: i64, reason: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE patients SET sync_failed_at = ?, sync_error = ?
                 WHERE code = ? AND synced_at IS NULL",
                params![failed_at, reason, code.as_str()],
            )
            .await?;
        Ok(())
    }
}
