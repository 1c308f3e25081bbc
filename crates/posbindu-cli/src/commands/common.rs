use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use posbindu_core::identifier::CodeGenerator;
use posbindu_core::{
    ClientConfig, ConnectivityMonitor, Examination, HttpRemoteService, LocalStore, NewExamination,
    NewPatient, Patient, PatientCode, RemoteService, Submission, SubmissionCoordinator, SyncEngine,
    SyncQueueItem,
};
use serde::Serialize;

use crate::auth::KeyringCredentials;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;
use crate::probe::TcpProbe;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub db_path: PathBuf,
    pub profile: Option<String>,
    pub offline: bool,
}

impl GlobalArgs {
    pub fn new(db_path: Option<PathBuf>, profile: Option<String>, offline: bool) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            profile,
            offline: offline || env_flag("POSBINDU_OFFLINE"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|value| matches!(value.trim(), "1" | "true" | "yes"))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("POSBINDU_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("posbindu")
        .join("posbindu.db")
}

pub async fn open_store(path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(path).await?)
}

/// Stand-in remote for profiles without a base URL. The CLI treats such a
/// profile as permanently offline, so this is only reached by a misuse.
struct UnconfiguredRemote;

#[async_trait]
impl RemoteService for UnconfiguredRemote {
    async fn create_patient(&self, _payload: &NewPatient) -> posbindu_core::Result<Patient> {
        Err(unconfigured())
    }

    async fn create_examination(
        &self,
        _patient_code: &PatientCode,
        _payload: &NewExamination,
    ) -> posbindu_core::Result<Examination> {
        Err(unconfigured())
    }

    async fn list_patients(&self) -> posbindu_core::Result<Vec<Patient>> {
        Err(unconfigured())
    }
}

fn unconfigured() -> posbindu_core::Error {
    posbindu_core::Error::Network("No remote API base URL is configured".to_string())
}

/// Store, profile config and remote client for one command invocation.
pub struct AppContext {
    pub profile_name: String,
    pub config: ClientConfig,
    pub store: LocalStore,
    remote: Option<Arc<HttpRemoteService>>,
}

impl AppContext {
    pub async fn open(args: &GlobalArgs) -> Result<Self, CliError> {
        let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = profiles.resolve_profile_name(args.profile.as_deref());
        let config = profiles
            .profile(&profile_name)
            .cloned()
            .unwrap_or_default()
            .client_config()
            .map_err(CliError::Config)?;

        let remote = if config.api_base_url.is_some() {
            let credentials = Arc::new(KeyringCredentials::for_profile(&profile_name)?);
            Some(Arc::new(HttpRemoteService::new(&config, credentials)?))
        } else {
            None
        };

        let store = open_store(&args.db_path).await?;
        tracing::debug!(profile = %profile_name, db = %args.db_path.display(), "Opened local store");

        Ok(Self {
            profile_name,
            config,
            store,
            remote,
        })
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote.as_deref().map(HttpRemoteService::base_url)
    }

    pub fn require_remote(&self) -> Result<Arc<dyn RemoteService>, CliError> {
        self.remote
            .clone()
            .map(|remote| remote as Arc<dyn RemoteService>)
            .ok_or(CliError::RemoteNotConfigured)
    }

    fn remote_or_unconfigured(&self) -> Arc<dyn RemoteService> {
        self.require_remote()
            .unwrap_or_else(|_| Arc::new(UnconfiguredRemote))
    }

    pub fn probe(&self) -> Option<TcpProbe> {
        self.remote_url().and_then(TcpProbe::from_base_url)
    }

    /// Current reachability reading; offline when forced or unconfigured.
    pub async fn reachability(&self, forced_offline: bool) -> Option<bool> {
        if forced_offline {
            return Some(false);
        }
        match self.probe() {
            Some(probe) => probe.check().await,
            None => Some(false),
        }
    }

    pub async fn connectivity(&self, forced_offline: bool) -> Arc<ConnectivityMonitor> {
        Arc::new(ConnectivityMonitor::new(
            self.reachability(forced_offline).await,
        ))
    }

    pub fn coordinator(&self, monitor: Arc<ConnectivityMonitor>) -> SubmissionCoordinator {
        SubmissionCoordinator::new(
            self.store.clone(),
            self.remote_or_unconfigured(),
            monitor,
            CodeGenerator::new(self.config.patient_code_prefix.clone()),
        )
    }

    pub fn engine(&self) -> Result<Arc<SyncEngine>, CliError> {
        Ok(Arc::new(
            SyncEngine::new(self.store.clone(), self.require_remote()?)
                .with_max_retries(self.config.max_retries),
        ))
    }
}

pub fn parse_patient_code(code: &str) -> Result<PatientCode, CliError> {
    PatientCode::parse(code.trim())
        .map_err(|_| CliError::InvalidArgument(format!("'{code}' is not a valid patient code")))
}

pub fn parse_examined_at(value: Option<&str>) -> Result<Option<i64>, CliError> {
    value
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw.trim())
                .map(|date_time| date_time.timestamp_millis())
                .map_err(|error| {
                    CliError::InvalidArgument(format!("examined-at '{raw}': {error}"))
                })
        })
        .transpose()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutput<'a, T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_item_id: Option<i64>,
    pub record: &'a T,
}

pub fn submission_output<T: Serialize>(submission: &Submission<T>) -> SubmissionOutput<'_, T> {
    match submission {
        Submission::Synced(record) => SubmissionOutput {
            status: "synced",
            queue_item_id: None,
            record,
        },
        Submission::Queued {
            record,
            queue_item_id,
        } => SubmissionOutput {
            status: "queued",
            queue_item_id: Some(*queue_item_id),
            record,
        },
    }
}

pub fn sync_status_label(
    synced_at: Option<i64>,
    sync_failed_at: Option<i64>,
    sync_error: Option<&str>,
) -> String {
    match (synced_at, sync_failed_at) {
        (Some(_), _) => "synced".to_string(),
        (None, Some(_)) => format!("failed: {}", sync_error.unwrap_or("unknown error")),
        (None, None) => "pending".to_string(),
    }
}

pub fn format_patient_lines(patients: &[Patient]) -> Vec<String> {
    let today = Utc::now().date_naive();
    patients
        .iter()
        .map(|patient| format_patient_line(patient, today))
        .collect()
}

fn format_patient_line(patient: &Patient, today: NaiveDate) -> String {
    let name = truncate(&patient.name, 24);
    let status = sync_status_label(
        patient.synced_at,
        patient.sync_failed_at,
        patient.sync_error.as_deref(),
    );
    format!(
        "{:<16}  {name:<24}  {:<6}  {:>3}y  {status}",
        patient.code.as_str(),
        patient.gender.as_str(),
        patient.age_on(today)
    )
}

pub fn format_examination_lines(examinations: &[Examination]) -> Vec<String> {
    examinations
        .iter()
        .map(|examination| {
            let mut parts = Vec::new();
            if let Some(physical) = &examination.physical {
                parts.push(format!(
                    "BMI {:.1} ({:?})",
                    physical.bmi, physical.bmi_category
                ));
            }
            if let Some(vitals) = &examination.vitals {
                parts.push(format!(
                    "BP {}/{} ({:?})",
                    vitals.systolic, vitals.diastolic, vitals.category
                ));
            }
            if let Some(lab) = &examination.lab {
                let readings = [
                    ("GDP", &lab.fasting_glucose),
                    ("GDS", &lab.random_glucose),
                    ("G2PP", &lab.two_hour_glucose),
                    ("CHOL", &lab.cholesterol),
                    ("UA", &lab.uric_acid),
                ];
                for (label, reading) in readings {
                    if let Some(reading) = reading {
                        parts.push(format!("{label} {} ({:?})", reading.value, reading.level));
                    }
                }
            }

            let status = sync_status_label(
                examination.synced_at,
                examination.sync_failed_at,
                examination.sync_error.as_deref(),
            );
            format!(
                "{}  {}  [{status}]",
                format_sync_timestamp(examination.examined_at),
                parts.join(", ")
            )
        })
        .collect()
}

pub fn format_queue_lines(items: &[SyncQueueItem], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "#{:<5} {:<11}  {:<18}  retries={}  queued {}",
                item.id,
                item.entity_type.to_string(),
                item.record_key,
                item.retry_count,
                format_relative_time(item.created_at, now_ms)
            );
            if let Some(depends_on) = item.depends_on {
                line.push_str(&format!("  after #{depends_on}"));
            }
            line
        })
        .collect()
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
