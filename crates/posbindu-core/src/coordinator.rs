//! Routes create-mutations to the online or offline path.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate};
use rand::{RngCore, SeedableRng};

use crate::classify::Measurements;
use crate::connectivity::ConnectivityMonitor;
use crate::identifier::{CodeGenerator, EphemeralIds};
use crate::models::{
    EntityType, Examination, NewExamination, NewPatient, NewSyncQueueItem, Patient, PatientCode,
    PatientInput,
};
use crate::remote::RemoteService;
use crate::services::LocalStore;
use crate::util::{unix_millis_now, Clock};
use crate::{Error, Result};

/// Outcome of a create-mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
    /// The remote acknowledged it; the stored copy is canonical.
    Synced(T),
    /// Stored provisionally and waiting in the sync queue.
    Queued { record: T, queue_item_id: i64 },
}

impl<T> Submission<T> {
    pub const fn record(&self) -> &T {
        match self {
            Self::Synced(record) | Self::Queued { record, .. } => record,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            Self::Synced(record) | Self::Queued { record, .. } => record,
        }
    }

    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

pub struct SubmissionCoordinator {
    store: LocalStore,
    remote: Arc<dyn RemoteService>,
    connectivity: Arc<ConnectivityMonitor>,
    codes: CodeGenerator,
    ids: EphemeralIds,
    rng: Mutex<Box<dyn RngCore + Send>>,
    clock: Clock,
}

impl SubmissionCoordinator {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteService>,
        connectivity: Arc<ConnectivityMonitor>,
        codes: CodeGenerator,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            codes,
            ids: EphemeralIds::new(),
            rng: Mutex::new(Box::new(rand::rngs::StdRng::from_entropy())),
            clock: unix_millis_now,
        }
    }

    /// Replace the code RNG, e.g. with a seeded one.
    #[must_use]
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Replace the millisecond clock used for ids, timestamps and code dates.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Register a patient. The code is assigned here on both paths.
    pub async fn register_patient(&self, input: PatientInput) -> Result<Submission<Patient>> {
        input.validate()?;
        let online = self.connectivity.is_online();
        let now = (self.clock)();

        let code = self.next_code(now).await?;
        let payload = input.into_payload(code);

        if online {
            tracing::debug!(code = %payload.code, "Registering patient online");
            let canonical = self.remote.create_patient(&payload).await?;
            self.store.save_synced_patient(&canonical, now).await?;
            let stored = self.stored_patient(&canonical.code).await?;
            return Ok(Submission::Synced(stored));
        }

        self.queue_patient(&payload, now).await
    }

    /// Record an examination for a patient already known by code.
    pub async fn record_examination(
        &self,
        payload: NewExamination,
    ) -> Result<Submission<Examination>> {
        if payload.physical.is_none()
            && payload.vitals.is_none()
            && payload.lab.as_ref().is_none_or(crate::models::LabMetrics::is_empty)
        {
            return Err(Error::InvalidInput(
                "An examination needs at least one measurement".into(),
            ));
        }

        if self.store.get_patient(&payload.patient_code).await?.is_none() {
            return Err(Error::NotFound(format!("patient {}", payload.patient_code)));
        }

        let online = self.connectivity.is_online();
        let now = (self.clock)();

        if online {
            tracing::debug!(code = %payload.patient_code, "Recording examination online");
            let canonical = self
                .remote
                .create_examination(&payload.patient_code, &payload)
                .await?;
            self.store.save_synced_examination(&canonical, now).await?;
            let stored = self
                .store
                .get_examination(canonical.id)
                .await?
                .ok_or_else(|| Error::Storage(format!("examination {} vanished", canonical.id)))?;
            return Ok(Submission::Synced(stored));
        }

        self.queue_examination(payload, now).await
    }

    /// Classify raw measurements and record the resulting examination.
    pub async fn record_measurements(
        &self,
        patient_code: &PatientCode,
        examined_at: Option<i64>,
        measurements: Measurements,
    ) -> Result<Submission<Examination>> {
        let patient = self
            .store
            .get_patient(patient_code)
            .await?
            .ok_or_else(|| Error::NotFound(format!("patient {patient_code}")))?;

        let examined_at = examined_at.unwrap_or_else(|| (self.clock)());
        let payload = measurements.into_payload(patient.code, examined_at, patient.gender)?;
        self.record_examination(payload).await
    }

    async fn next_code(&self, now: i64) -> Result<PatientCode> {
        let date = code_date(now)?;
        let existing = self
            .store
            .patient_codes_with_prefix(&self.codes.day_prefix(date))
            .await?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.codes.generate(date, &existing, &mut *rng)
    }

    async fn queue_patient(&self, payload: &NewPatient, now: i64) -> Result<Submission<Patient>> {
        let id = self.ids.next_at(now);
        let patient = Patient::provisional(id, payload, now);
        let item =
            NewSyncQueueItem::create(EntityType::Patient, payload.code.as_str(), payload, now)?;

        let queued = self.store.record_offline_patient(&patient, &item).await?;
        tracing::info!(code = %patient.code, item = queued.id, "Patient queued for sync");
        Ok(Submission::Queued {
            record: patient,
            queue_item_id: queued.id,
        })
    }

    async fn queue_examination(
        &self,
        payload: NewExamination,
        now: i64,
    ) -> Result<Submission<Examination>> {
        let id = self.ids.next_at(now);
        let examination = Examination::provisional(id, &payload, now);
        let item =
            NewSyncQueueItem::create(EntityType::Examination, id.to_string(), &payload, now)?;

        let queued = self
            .store
            .record_offline_examination(&examination, item)
            .await?;
        tracing::info!(
            id,
            code = %examination.patient_code,
            item = queued.id,
            depends_on = ?queued.depends_on,
            "Examination queued for sync"
        );
        Ok(Submission::Queued {
            record: examination,
            queue_item_id: queued.id,
        })
    }

    async fn stored_patient(&self, code: &PatientCode) -> Result<Patient> {
        self.store
            .get_patient(code)
            .await?
            .ok_or_else(|| Error::Storage(format!("patient {code} vanished")))
    }
}

fn code_date(now_ms: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp_millis(now_ms)
        .map(|at| at.date_naive())
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {now_ms} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodPressureCategory, Gender, LabMetrics, VitalMetrics};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NEW_YEAR_MS: i64 = 1_735_689_600_000;

    fn new_year() -> i64 {
        NEW_YEAR_MS
    }

    /// Remote that echoes payloads back or fails with a fixed error.
    #[derive(Default)]
    struct EchoRemote {
        calls: AtomicUsize,
        fail_with_validation: bool,
    }

    #[async_trait]
    impl RemoteService for EchoRemote {
        async fn create_patient(&self, payload: &NewPatient) -> Result<Patient> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_with_validation {
                return Err(Error::Validation("nik already registered".into()));
            }
            Ok(Patient::provisional(7, payload, 1))
        }

        async fn create_examination(
            &self,
            _patient_code: &PatientCode,
            payload: &NewExamination,
        ) -> Result<Examination> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_with_validation {
                return Err(Error::Validation("systolic out of range".into()));
            }
            Ok(Examination::provisional(8, payload, 1))
        }

        async fn list_patients(&self) -> Result<Vec<Patient>> {
            Ok(Vec::new())
        }
    }

    fn input() -> PatientInput {
        PatientInput {
            nik: "3174012501900001".to_string(),
            bpjs_number: None,
            name: "Siti Aminah".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 25).unwrap(),
            gender: Gender::Female,
            address: "Jl. Melati 4".to_string(),
        }
    }

    async fn coordinator(online: bool, remote: Arc<EchoRemote>) -> SubmissionCoordinator {
        let store = LocalStore::open_in_memory().await.unwrap();
        SubmissionCoordinator::new(
            store,
            remote,
            Arc::new(ConnectivityMonitor::new(Some(online))),
            CodeGenerator::default(),
        )
        .with_rng(StdRng::seed_from_u64(1))
        .with_clock(new_year)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_registration_is_stored_and_queued() {
        let remote = Arc::new(EchoRemote::default());
        let coordinator = coordinator(false, Arc::clone(&remote)).await;

        let submission = coordinator.register_patient(input()).await.unwrap();
        assert!(submission.is_queued());

        let patient = submission.record();
        assert_eq!(patient.id, NEW_YEAR_MS);
        assert!(patient.code.as_str().starts_with("pasien20250101"));
        assert_eq!(patient.code.as_str().len(), "pasien20250101".len() + 2);
        assert_eq!(patient.synced_at, None);

        let stored = coordinator.store().get_patient(&patient.code).await.unwrap();
        assert_eq!(stored.as_ref(), Some(patient));
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_ids_stay_unique_within_one_millisecond() {
        let coordinator = coordinator(false, Arc::new(EchoRemote::default())).await;

        let first = coordinator.register_patient(input()).await.unwrap();
        let second = coordinator.register_patient(input()).await.unwrap();

        assert_eq!(first.record().id, NEW_YEAR_MS);
        assert_eq!(second.record().id, NEW_YEAR_MS + 1);
        assert_ne!(first.record().code, second.record().code);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_registration_stores_canonical_record_as_synced() {
        let remote = Arc::new(EchoRemote::default());
        let coordinator = coordinator(true, Arc::clone(&remote)).await;

        let submission = coordinator.register_patient(input()).await.unwrap();
        let Submission::Synced(patient) = submission else {
            panic!("expected a synced submission");
        };
        assert_eq!(patient.id, 7);
        assert_eq!(patient.synced_at, Some(NEW_YEAR_MS));
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_failure_is_returned_and_never_queued() {
        let remote = Arc::new(EchoRemote {
            fail_with_validation: true,
            ..EchoRemote::default()
        });
        let coordinator = coordinator(true, remote).await;

        let error = coordinator.register_patient(input()).await.unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
        assert!(coordinator.store().list_patients(10, 0).await.unwrap().is_empty());
    }

    fn vitals_for(code: PatientCode) -> NewExamination {
        NewExamination {
            patient_code: code,
            examined_at: NEW_YEAR_MS,
            physical: None,
            vitals: Some(VitalMetrics {
                systolic: 110,
                diastolic: 70,
                category: BloodPressureCategory::Normal,
            }),
            lab: None,
        }
    }

    /// Seed a synced patient without going through the remote.
    async fn seed_patient(coordinator: &SubmissionCoordinator) -> Patient {
        let payload = input().into_payload(PatientCode::parse("pasien20250101ab").unwrap());
        let patient = Patient::provisional(3, &payload, 1);
        coordinator
            .store()
            .save_synced_patient(&patient, NEW_YEAR_MS)
            .await
            .unwrap();
        patient
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_examination_stores_canonical_record_as_synced() {
        let remote = Arc::new(EchoRemote::default());
        let coordinator = coordinator(true, Arc::clone(&remote)).await;
        let patient = seed_patient(&coordinator).await;

        let submission = coordinator
            .record_examination(vitals_for(patient.code.clone()))
            .await
            .unwrap();
        let Submission::Synced(examination) = submission else {
            panic!("expected a synced submission");
        };
        assert_eq!(examination.id, 8);
        assert_eq!(examination.patient_code, patient.code);
        assert_eq!(examination.synced_at, Some(NEW_YEAR_MS));
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_examination_failure_is_returned_and_never_queued() {
        let remote = Arc::new(EchoRemote {
            fail_with_validation: true,
            ..EchoRemote::default()
        });
        let coordinator = coordinator(true, Arc::clone(&remote)).await;
        let patient = seed_patient(&coordinator).await;

        let error = coordinator
            .record_examination(vitals_for(patient.code.clone()))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
        assert!(coordinator
            .store()
            .list_examinations(&patient.code, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_examination_for_unknown_patient_never_reaches_remote() {
        let remote = Arc::new(EchoRemote::default());
        let coordinator = coordinator(true, Arc::clone(&remote)).await;
        let code = PatientCode::parse("pasien20250101zz").unwrap();

        assert!(matches!(
            coordinator.record_examination(vitals_for(code)).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_input_is_rejected_before_any_write() {
        let coordinator = coordinator(false, Arc::new(EchoRemote::default())).await;
        let mut bad = input();
        bad.nik = "123".to_string();

        assert!(matches!(
            coordinator.register_patient(bad).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(coordinator.store().queue_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_examination_references_patient_code() {
        let coordinator = coordinator(false, Arc::new(EchoRemote::default())).await;
        let patient = coordinator
            .register_patient(input())
            .await
            .unwrap()
            .into_record();

        let measurements = Measurements {
            systolic: Some(150),
            diastolic: Some(85),
            ..Measurements::default()
        };
        let submission = coordinator
            .record_measurements(&patient.code, None, measurements)
            .await
            .unwrap();

        let examination = submission.record();
        assert_eq!(examination.patient_code, patient.code);
        assert_eq!(
            examination.vitals,
            Some(VitalMetrics {
                systolic: 150,
                diastolic: 85,
                category: BloodPressureCategory::HypertensionStage1,
            })
        );

        let items = coordinator.store().pending_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].depends_on, Some(items[0].id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_examination_for_unknown_patient_fails() {
        let coordinator = coordinator(false, Arc::new(EchoRemote::default())).await;
        let payload = NewExamination {
            patient_code: PatientCode::parse("pasien20250101zz").unwrap(),
            examined_at: NEW_YEAR_MS,
            physical: None,
            vitals: Some(VitalMetrics {
                systolic: 110,
                diastolic: 70,
                category: BloodPressureCategory::Normal,
            }),
            lab: None,
        };

        assert!(matches!(
            coordinator.record_examination(payload).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_examination_is_rejected() {
        let coordinator = coordinator(true, Arc::new(EchoRemote::default())).await;
        let payload = NewExamination {
            patient_code: PatientCode::parse("pasien20250101zz").unwrap(),
            examined_at: NEW_YEAR_MS,
            physical: None,
            vitals: None,
            lab: Some(LabMetrics::default()),
        };

        assert!(matches!(
            coordinator.record_examination(payload).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
