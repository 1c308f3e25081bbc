//! Patient model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Stable, human-meaningful patient identifier.
///
/// Assigned once at registration time (online or offline) and never changed.
/// Examinations always reference a patient through this code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatientCode(String);

impl PatientCode {
    /// Parse a code, rejecting empty values and non-alphanumeric characters.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::InvalidInput("Patient code cannot be empty".into()));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!(
                "Patient code '{value}' must be alphanumeric"
            )));
        }
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PatientCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PatientCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PatientCode> for String {
    fn from(code: PatientCode) -> Self {
        code.0
    }
}

/// Biological sex as recorded at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "MALE",
            Self::Female => "FEMALE",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MALE" | "M" | "L" => Ok(Self::Male),
            "FEMALE" | "F" | "P" => Ok(Self::Female),
            other => Err(Error::InvalidInput(format!("Unknown gender: {other}"))),
        }
    }
}

/// Caller-supplied fields for a patient registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    /// National identity number (NIK), 16 digits
    pub nik: String,
    /// Health insurance membership number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpjs_number: Option<String>,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub address: String,
}

impl PatientInput {
    /// Reject input the remote would never accept.
    pub fn validate(&self) -> Result<()> {
        let nik = self.nik.trim();
        if nik.len() != 16 || !nik.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidInput("NIK must be exactly 16 digits".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Patient name cannot be empty".into()));
        }
        Ok(())
    }

    /// Attach the resolved code, producing the exact payload sent to the remote.
    #[must_use]
    pub fn into_payload(self, code: PatientCode) -> NewPatient {
        NewPatient {
            code,
            nik: self.nik.trim().to_string(),
            bpjs_number: self.bpjs_number,
            name: self.name.trim().to_string(),
            birth_date: self.birth_date,
            gender: self.gender,
            address: self.address.trim().to_string(),
        }
    }
}

/// `createPatient` request body. Stored verbatim in the sync queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub code: PatientCode,
    pub nik: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpjs_number: Option<String>,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub address: String,
}

/// A patient as materialized in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Ephemeral local id until reconciled; canonical id afterwards
    pub id: i64,
    pub code: PatientCode,
    pub nik: String,
    #[serde(default)]
    pub bpjs_number: Option<String>,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub address: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Set once the remote acknowledged this exact record (Unix ms)
    #[serde(default)]
    pub synced_at: Option<i64>,
    /// Set when the pending create was evicted from the queue (Unix ms)
    #[serde(default)]
    pub sync_failed_at: Option<i64>,
    #[serde(default)]
    pub sync_error: Option<String>,
}

impl Patient {
    /// Build the unsynced record written on the offline path.
    #[must_use]
    pub fn provisional(id: i64, payload: &NewPatient, created_at: i64) -> Self {
        Self {
            id,
            code: payload.code.clone(),
            nik: payload.nik.clone(),
            bpjs_number: payload.bpjs_number.clone(),
            name: payload.name.clone(),
            birth_date: payload.birth_date,
            gender: payload.gender,
            address: payload.address.clone(),
            created_at,
            synced_at: None,
            sync_failed_at: None,
            sync_error: None,
        }
    }

    pub const fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }

    /// Age in whole years on the given date
    #[must_use]
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.birth_date).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PatientInput {
        PatientInput {
            nik: "3174012501900001".to_string(),
            bpjs_number: None,
            name: " Siti Aminah ".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 25).unwrap(),
            gender: Gender::Female,
            address: "Jl. Melati 4".to_string(),
        }
    }

    #[test]
    fn test_patient_code_parse() {
        let code = PatientCode::parse("pasien20250101xy").unwrap();
        assert_eq!(code.as_str(), "pasien20250101xy");
        assert!(PatientCode::parse("").is_err());
        assert!(PatientCode::parse("pasien-2025").is_err());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("P".parse::<Gender>().unwrap(), Gender::Female);
        assert!("x".parse::<Gender>().is_err());
    }

    #[test]
    fn test_input_validation() {
        assert!(input().validate().is_ok());

        let mut short_nik = input();
        short_nik.nik = "1234".to_string();
        assert!(short_nik.validate().is_err());

        let mut blank_name = input();
        blank_name.name = "  ".to_string();
        assert!(blank_name.validate().is_err());
    }

    #[test]
    fn test_payload_uses_camel_case() {
        let code = PatientCode::parse("pasien20250101xy").unwrap();
        let payload = input().into_payload(code);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["code"], "pasien20250101xy");
        assert_eq!(json["birthDate"], "1990-01-25");
        assert_eq!(json["gender"], "FEMALE");
        assert_eq!(json["name"], "Siti Aminah");
        assert!(json.get("bpjsNumber").is_none());
    }

    #[test]
    fn test_provisional_is_unsynced() {
        let code = PatientCode::parse("pasien20250101xy").unwrap();
        let payload = input().into_payload(code);
        let patient = Patient::provisional(1_700_000_000_000, &payload, 1_700_000_000_000);
        assert!(!patient.is_synced());
        assert_eq!(patient.id, 1_700_000_000_000);
        assert_eq!(
            patient.age_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            34
        );
    }

    #[test]
    fn test_canonical_record_without_local_fields() {
        let json = r#"{
            "id": 42,
            "code": "pasien20250101xy",
            "nik": "3174012501900001",
            "name": "Siti Aminah",
            "birthDate": "1990-01-25",
            "gender": "FEMALE",
            "address": "Jl. Melati 4",
            "createdAt": 1700000000000
        }"#;
        let patient: Patient = serde_json::from_str(json).unwrap();
        assert_eq!(patient.id, 42);
        assert_eq!(patient.synced_at, None);
        assert_eq!(patient.bpjs_number, None);
    }
}
