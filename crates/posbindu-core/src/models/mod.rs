//! Data models for Posbindu

mod examination;
mod patient;
mod sync_item;
mod sync_meta;

pub use examination::{
    BloodPressureCategory, BmiCategory, Examination, LabLevel, LabMetrics, LabReading,
    NewExamination, PhysicalMetrics, VitalMetrics,
};
pub use patient::{Gender, NewPatient, Patient, PatientCode, PatientInput};
pub use sync_item::{EntityType, NewSyncQueueItem, OperationType, SyncQueueItem};
pub use sync_meta::SyncMeta;
