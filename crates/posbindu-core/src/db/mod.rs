//! Database layer for Posbindu

mod connection;
mod examination_repository;
mod meta_repository;
mod migrations;
mod patient_repository;
mod queue_repository;

pub use connection::{finish_transaction, Database};
pub use examination_repository::{ExaminationRepository, LibSqlExaminationRepository};
pub use meta_repository::{LibSqlSyncMetaRepository, SyncMetaRepository};
pub use patient_repository::{LibSqlPatientRepository, PatientRepository};
pub use queue_repository::{LibSqlSyncQueueRepository, SyncQueueRepository};
