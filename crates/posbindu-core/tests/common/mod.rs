//! Shared helpers for the sync scenario tests.
//!
//! `ScriptedRemote` is an in-memory remote registry that records every call
//! and fails create calls according to a script.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;

use posbindu_core::identifier::CodeGenerator;
use posbindu_core::{
    ConnectivityMonitor, Error, Examination, Gender, LocalStore, NewExamination, NewPatient,
    Patient, PatientCode, PatientInput, RemoteService, Result, SubmissionCoordinator, SyncEngine,
    SyncPhase,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 2023-11-14T22:13:20Z
pub const SCENARIO_NOW_MS: i64 = 1_700_000_000_000;

pub fn scenario_clock() -> i64 {
    SCENARIO_NOW_MS
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatePatient(String),
    CreateExamination(String),
    ListPatients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Timeout,
    Validation,
    Authentication,
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Self::Network => Error::Network("connection reset by peer".into()),
            Self::Timeout => Error::Timeout(Duration::from_secs(30)),
            Self::Validation => Error::Validation("payload rejected (422)".into()),
            Self::Authentication => Error::Authentication("token expired (401)".into()),
        }
    }
}

#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<Call>>,
    create_failures: Mutex<VecDeque<Failure>>,
    pull_failure: Mutex<Option<Failure>>,
    accepted: Mutex<Vec<Patient>>,
    gate: Option<Arc<Semaphore>>,
    next_id: AtomicI64,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote whose create calls wait for a permit on the returned gate.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let remote = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (remote, gate)
    }

    /// Fail the next `times` create calls with `failure`.
    pub fn fail_next(&self, failure: Failure, times: usize) {
        let mut failures = self.create_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(failure);
        }
    }

    pub fn fail_pull(&self, failure: Failure) {
        *self.pull_failure.lock().unwrap() = Some(failure);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, Call::ListPatients))
            .count()
    }

    /// Seed a patient that only exists remotely.
    pub fn seed_patient(&self, patient: Patient) {
        self.accepted.lock().unwrap().push(patient);
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    fn scripted_failure(&self) -> Option<Error> {
        self.create_failures
            .lock()
            .unwrap()
            .pop_front()
            .map(Failure::into_error)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn create_patient(&self, payload: &NewPatient) -> Result<Patient> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::CreatePatient(payload.code.to_string()));
        self.pass_gate().await;
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }

        let canonical = Patient::provisional(self.next_id(), payload, SCENARIO_NOW_MS);
        self.accepted.lock().unwrap().push(canonical.clone());
        Ok(canonical)
    }

    async fn create_examination(
        &self,
        patient_code: &PatientCode,
        payload: &NewExamination,
    ) -> Result<Examination> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::CreateExamination(patient_code.to_string()));
        self.pass_gate().await;
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }

        let known = self
            .accepted
            .lock()
            .unwrap()
            .iter()
            .any(|patient| &patient.code == patient_code);
        if !known {
            return Err(Error::Validation(format!("unknown patient {patient_code}")));
        }
        Ok(Examination::provisional(
            self.next_id(),
            payload,
            SCENARIO_NOW_MS,
        ))
    }

    async fn list_patients(&self) -> Result<Vec<Patient>> {
        self.calls.lock().unwrap().push(Call::ListPatients);
        if let Some(failure) = *self.pull_failure.lock().unwrap() {
            return Err(failure.into_error());
        }
        Ok(self.accepted.lock().unwrap().clone())
    }
}

/// Coordinator, engine and monitor sharing one in-memory store.
pub struct Harness {
    pub remote: Arc<ScriptedRemote>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub coordinator: SubmissionCoordinator,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub async fn offline(remote: ScriptedRemote) -> Self {
        let remote = Arc::new(remote);
        let store = LocalStore::open_in_memory().await.unwrap();
        let monitor = Arc::new(ConnectivityMonitor::new(Some(false)));

        let coordinator = SubmissionCoordinator::new(
            store.clone(),
            Arc::clone(&remote) as Arc<dyn RemoteService>,
            Arc::clone(&monitor),
            CodeGenerator::default(),
        )
        .with_rng(StdRng::seed_from_u64(2025))
        .with_clock(scenario_clock);

        let engine = Arc::new(
            SyncEngine::new(store, Arc::clone(&remote) as Arc<dyn RemoteService>)
                .with_clock(scenario_clock),
        );

        Self {
            remote,
            monitor,
            coordinator,
            engine,
        }
    }

    pub fn store(&self) -> &LocalStore {
        self.engine.store()
    }

    pub async fn register(&self, name: &str) -> Patient {
        self.coordinator
            .register_patient(patient_input(name))
            .await
            .unwrap()
            .into_record()
    }

    /// Wait until the engine is idle again, failing the test after 5 s.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.engine.phase() != SyncPhase::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sync pass did not finish");
    }
}

pub fn patient_input(name: &str) -> PatientInput {
    PatientInput {
        nik: "3174012501900001".to_string(),
        bpjs_number: Some("0001234567890".to_string()),
        name: name.to_string(),
        birth_date: NaiveDate::from_ymd_opt(1968, 8, 17).unwrap(),
        gender: Gender::Male,
        address: "Jl. Kenanga 12, Depok".to_string(),
    }
}
