//! Health metric classification.
//!
//! Pure numeric-to-label mappings applied to raw measurements before an
//! examination payload is built. Lab values are in mg/dL.

use crate::error::{Error, Result};
use crate::models::{
    BloodPressureCategory, BmiCategory, Gender, LabLevel, LabMetrics, LabReading, NewExamination,
    PatientCode, PhysicalMetrics, VitalMetrics,
};

/// Raw measurements taken at a screening visit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements {
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub systolic: Option<u16>,
    pub diastolic: Option<u16>,
    pub fasting_glucose: Option<f64>,
    pub random_glucose: Option<f64>,
    pub two_hour_glucose: Option<f64>,
    pub cholesterol: Option<f64>,
    pub uric_acid: Option<f64>,
}

/// BMI rounded to one decimal place.
pub fn bmi(height_cm: f64, weight_kg: f64) -> Result<f64> {
    if !height_cm.is_finite() || !weight_kg.is_finite() || height_cm <= 0.0 || weight_kg <= 0.0 {
        return Err(Error::InvalidInput(
            "Height and weight must be positive numbers".into(),
        ));
    }
    let height_m = height_cm / 100.0;
    Ok((weight_kg / (height_m * height_m) * 10.0).round() / 10.0)
}

pub fn classify_bmi(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 23.0 {
        BmiCategory::Normal
    } else if bmi < 25.0 {
        BmiCategory::Overweight
    } else if bmi < 30.0 {
        BmiCategory::ObeseI
    } else {
        BmiCategory::ObeseII
    }
}

/// The higher of the two component bands wins.
pub const fn classify_blood_pressure(systolic: u16, diastolic: u16) -> BloodPressureCategory {
    if systolic >= 160 || diastolic >= 100 {
        BloodPressureCategory::HypertensionStage2
    } else if systolic >= 140 || diastolic >= 90 {
        BloodPressureCategory::HypertensionStage1
    } else if systolic >= 120 || diastolic >= 80 {
        BloodPressureCategory::Prehypertension
    } else {
        BloodPressureCategory::Normal
    }
}

pub fn classify_fasting_glucose(value: f64) -> LabLevel {
    banded(value, 100.0, 126.0)
}

pub fn classify_random_glucose(value: f64) -> LabLevel {
    banded(value, 140.0, 200.0)
}

pub fn classify_two_hour_glucose(value: f64) -> LabLevel {
    banded(value, 140.0, 200.0)
}

pub fn classify_cholesterol(value: f64) -> LabLevel {
    banded(value, 200.0, 240.0)
}

pub fn classify_uric_acid(value: f64, gender: Gender) -> LabLevel {
    let limit = match gender {
        Gender::Male => 7.0,
        Gender::Female => 6.0,
    };
    if value > limit {
        LabLevel::High
    } else {
        LabLevel::Normal
    }
}

fn banded(value: f64, borderline_from: f64, high_from: f64) -> LabLevel {
    if value >= high_from {
        LabLevel::High
    } else if value >= borderline_from {
        LabLevel::Borderline
    } else {
        LabLevel::Normal
    }
}

fn reading(value: Option<f64>, classify: impl Fn(f64) -> LabLevel) -> Result<Option<LabReading>> {
    match value {
        Some(value) if !value.is_finite() || value < 0.0 => Err(Error::InvalidInput(
            "Lab values must be non-negative numbers".into(),
        )),
        Some(value) => Ok(Some(LabReading {
            value,
            level: classify(value),
        })),
        None => Ok(None),
    }
}

impl Measurements {
    pub const fn is_empty(&self) -> bool {
        self.height_cm.is_none()
            && self.weight_kg.is_none()
            && self.systolic.is_none()
            && self.diastolic.is_none()
            && self.fasting_glucose.is_none()
            && self.random_glucose.is_none()
            && self.two_hour_glucose.is_none()
            && self.cholesterol.is_none()
            && self.uric_acid.is_none()
    }

    /// Derive every category and build the `createExamination` payload.
    pub fn into_payload(
        self,
        patient_code: PatientCode,
        examined_at: i64,
        gender: Gender,
    ) -> Result<NewExamination> {
        if self.is_empty() {
            return Err(Error::InvalidInput(
                "An examination needs at least one measurement".into(),
            ));
        }

        let physical = match (self.height_cm, self.weight_kg) {
            (Some(height_cm), Some(weight_kg)) => {
                let bmi = bmi(height_cm, weight_kg)?;
                Some(PhysicalMetrics {
                    height_cm,
                    weight_kg,
                    bmi,
                    bmi_category: classify_bmi(bmi),
                })
            }
            (None, None) => None,
            _ => {
                return Err(Error::InvalidInput(
                    "Height and weight must be recorded together".into(),
                ))
            }
        };

        let vitals = match (self.systolic, self.diastolic) {
            (Some(systolic), Some(diastolic)) => Some(VitalMetrics {
                systolic,
                diastolic,
                category: classify_blood_pressure(systolic, diastolic),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::InvalidInput(
                    "Systolic and diastolic pressure must be recorded together".into(),
                ))
            }
        };

        let lab = LabMetrics {
            fasting_glucose: reading(self.fasting_glucose, classify_fasting_glucose)?,
            random_glucose: reading(self.random_glucose, classify_random_glucose)?,
            two_hour_glucose: reading(self.two_hour_glucose, classify_two_hour_glucose)?,
            cholesterol: reading(self.cholesterol, classify_cholesterol)?,
            uric_acid: reading(self.uric_acid, |value| classify_uric_acid(value, gender))?,
        };

        Ok(NewExamination {
            patient_code,
            examined_at,
            physical,
            vitals,
            lab: (!lab.is_empty()).then_some(lab),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_and_category() {
        let value = bmi(160.0, 64.0).unwrap();
        assert!((value - 25.0).abs() < f64::EPSILON);
        assert_eq!(classify_bmi(value), BmiCategory::ObeseI);
        assert_eq!(classify_bmi(18.4), BmiCategory::Underweight);
        assert_eq!(classify_bmi(22.9), BmiCategory::Normal);
        assert_eq!(classify_bmi(23.0), BmiCategory::Overweight);
        assert_eq!(classify_bmi(31.0), BmiCategory::ObeseII);
        assert!(bmi(0.0, 50.0).is_err());
    }

    #[test]
    fn test_blood_pressure_takes_worse_component() {
        assert_eq!(
            classify_blood_pressure(118, 76),
            BloodPressureCategory::Normal
        );
        assert_eq!(
            classify_blood_pressure(118, 92),
            BloodPressureCategory::HypertensionStage1
        );
        assert_eq!(
            classify_blood_pressure(165, 70),
            BloodPressureCategory::HypertensionStage2
        );
    }

    #[test]
    fn test_lab_levels() {
        assert_eq!(classify_fasting_glucose(99.0), LabLevel::Normal);
        assert_eq!(classify_fasting_glucose(110.0), LabLevel::Borderline);
        assert_eq!(classify_fasting_glucose(126.0), LabLevel::High);
        assert_eq!(classify_cholesterol(239.0), LabLevel::Borderline);
        assert_eq!(classify_uric_acid(6.5, Gender::Male), LabLevel::Normal);
        assert_eq!(classify_uric_acid(6.5, Gender::Female), LabLevel::High);
    }

    #[test]
    fn test_into_payload_derives_sections() {
        let code = PatientCode::parse("pasien20250101xy").unwrap();
        let payload = Measurements {
            height_cm: Some(170.0),
            weight_kg: Some(65.0),
            systolic: Some(130),
            diastolic: Some(85),
            cholesterol: Some(250.0),
            ..Measurements::default()
        }
        .into_payload(code, 1_000, Gender::Male)
        .unwrap();

        let physical = payload.physical.unwrap();
        assert_eq!(physical.bmi_category, BmiCategory::Normal);
        assert_eq!(
            payload.vitals.unwrap().category,
            BloodPressureCategory::Prehypertension
        );
        let lab = payload.lab.unwrap();
        assert_eq!(lab.cholesterol.unwrap().level, LabLevel::High);
        assert!(lab.fasting_glucose.is_none());
    }

    #[test]
    fn test_into_payload_rejects_partial_pairs_and_empty() {
        let code = PatientCode::parse("pasien20250101xy").unwrap();
        let partial = Measurements {
            height_cm: Some(170.0),
            ..Measurements::default()
        };
        assert!(partial
            .into_payload(code.clone(), 1, Gender::Male)
            .is_err());
        assert!(Measurements::default()
            .into_payload(code, 1, Gender::Male)
            .is_err());
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert!(bmi(f64::NAN, 60.0).is_err());
        assert!(bmi(165.0, f64::INFINITY).is_err());

        let code = PatientCode::parse("pasien20250101xy").unwrap();
        let glucose = Measurements {
            fasting_glucose: Some(f64::NAN),
            ..Measurements::default()
        };
        assert!(matches!(
            glucose.into_payload(code.clone(), 1, Gender::Female),
            Err(Error::InvalidInput(_))
        ));

        let physical = Measurements {
            height_cm: Some(f64::NAN),
            weight_kg: Some(60.0),
            ..Measurements::default()
        };
        assert!(matches!(
            physical.into_payload(code, 1, Gender::Female),
            Err(Error::InvalidInput(_))
        ));
    }
}
