//! Remote service contract consumed by the coordinator and the sync engine.

mod http;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::models::{Examination, NewExamination, NewPatient, Patient, PatientCode};
use crate::Result;

pub use http::{classify_status, HttpRemoteService};

/// The remote authority holding canonical records.
///
/// Implementations map their failures onto `Error::Validation`,
/// `Error::Network`, `Error::Timeout` and `Error::Authentication`.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Create a patient under the client-generated code in `payload`.
    async fn create_patient(&self, payload: &NewPatient) -> Result<Patient>;

    async fn create_examination(
        &self,
        patient_code: &PatientCode,
        payload: &NewExamination,
    ) -> Result<Examination>;

    /// The full current patient collection.
    async fn list_patients(&self) -> Result<Vec<Patient>>;
}

/// Supplies the bearer credential attached to every remote call.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// Forget the current credential after the remote rejected it.
    fn clear(&self);
}

/// In-process credential holder.
#[derive(Default)]
pub struct StaticCredentials {
    token: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = self.bearer_token().is_some();
        formatter
            .debug_struct("StaticCredentials")
            .field("token", &if present { "[REDACTED]" } else { "<none>" })
            .finish()
    }
}
