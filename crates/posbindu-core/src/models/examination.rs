//! Health examination model

use serde::{Deserialize, Serialize};

use super::patient::PatientCode;

/// Body-mass index bands (Asia-Pacific cut-offs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    ObeseI,
    ObeseII,
}

/// Blood pressure bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BloodPressureCategory {
    Normal,
    Prehypertension,
    HypertensionStage1,
    HypertensionStage2,
}

/// Classification shared by the lab readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabLevel {
    Normal,
    Borderline,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalMetrics {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub bmi_category: BmiCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalMetrics {
    pub systolic: u16,
    pub diastolic: u16,
    pub category: BloodPressureCategory,
}

/// A single lab value with its derived classification (mg/dL)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabReading {
    pub value: f64,
    pub level: LabLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fasting_glucose: Option<LabReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_glucose: Option<LabReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_hour_glucose: Option<LabReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cholesterol: Option<LabReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uric_acid: Option<LabReading>,
}

impl LabMetrics {
    pub const fn is_empty(&self) -> bool {
        self.fasting_glucose.is_none()
            && self.random_glucose.is_none()
            && self.two_hour_glucose.is_none()
            && self.cholesterol.is_none()
            && self.uric_acid.is_none()
    }
}

/// `createExamination` request body. Stored verbatim in the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExamination {
    pub patient_code: PatientCode,
    /// Examination timestamp (Unix ms)
    pub examined_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<PhysicalMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<VitalMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<LabMetrics>,
}

/// An examination as materialized in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Examination {
    pub id: i64,
    /// Always the stable code, never the patient's ephemeral id
    pub patient_code: PatientCode,
    pub examined_at: i64,
    #[serde(default)]
    pub physical: Option<PhysicalMetrics>,
    #[serde(default)]
    pub vitals: Option<VitalMetrics>,
    #[serde(default)]
    pub lab: Option<LabMetrics>,
    pub created_at: i64,
    #[serde(default)]
    pub synced_at: Option<i64>,
    #[serde(default)]
    pub sync_failed_at: Option<i64>,
    #[serde(default)]
    pub sync_error: Option<String>,
}

impl Examination {
    /// Build the unsynced record written on the offline path.
    #[must_use]
    pub fn provisional(id: i64, payload: &NewExamination, created_at: i64) -> Self {
        Self {
            id,
            patient_code: payload.patient_code.clone(),
            examined_at: payload.examined_at,
            physical: payload.physical.clone(),
            vitals: payload.vitals.clone(),
            lab: payload.lab.clone(),
            created_at,
            synced_at: None,
            sync_failed_at: None,
            sync_error: None,
        }
    }

    pub const fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}
