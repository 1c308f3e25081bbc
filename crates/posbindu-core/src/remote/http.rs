//! `reqwest` implementation of the remote service contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CredentialProvider, RemoteService};
use crate::config::ClientConfig;
use crate::models::{Examination, NewExamination, NewPatient, Patient, PatientCode};
use crate::util::compact_text;
use crate::{Error, Result};

/// HTTP client for the remote patient registry.
///
/// Endpoints, relative to the configured base URL:
/// `POST /patients`, `POST /patients/{code}/examinations`, `GET /patients`.
#[derive(Clone)]
pub struct HttpRemoteService {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRemoteService {
    pub fn new(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let base_url = config.require_api_base_url()?.to_string();
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Network(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            timeout,
            client,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let mut request = request.header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(&error))?;

        if !status.is_success() {
            let error = classify_status(status, &body);
            if error.is_authentication() {
                tracing::warn!("Remote rejected the bearer credential; clearing it");
                self.credentials.clear();
            }
            return Err(error);
        }

        parse_envelope(&body)
    }

    fn transport_error(&self, error: &reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout(self.timeout)
        } else if error.is_connect() {
            Error::Network(format!("could not reach {}: {error}", self.base_url))
        } else {
            Error::Network(error.to_string())
        }
    }
}

impl std::fmt::Debug for HttpRemoteService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteService")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn create_patient(&self, payload: &NewPatient) -> Result<Patient> {
        let url = format!("{}/patients", self.base_url);
        tracing::debug!(code = %payload.code, "POST {url}");
        self.send(self.client.post(url).json(payload)).await
    }

    async fn create_examination(
        &self,
        patient_code: &PatientCode,
        payload: &NewExamination,
    ) -> Result<Examination> {
        let url = format!(
            "{}/patients/{}/examinations",
            self.base_url,
            urlencoding::encode(patient_code.as_str())
        );
        tracing::debug!("POST {url}");
        self.send(self.client.post(url).json(payload)).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>> {
        let url = format!("{}/patients", self.base_url);
        tracing::debug!("GET {url}");
        self.send(self.client.get(url)).await
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(message),
        _ => Error::Network(message),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(Envelope::Wrapped { data } | Envelope::Bare(data)) => Ok(data),
        Err(error) => Err(Error::Validation(format!(
            "unexpected response body ({error}): {}",
            compact_text(body)
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
