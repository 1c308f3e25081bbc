//! Queue draining and remote-to-local refresh.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_MAX_RETRIES;
use crate::connectivity::{ConnectivityMonitor, Listener, ListenerId};
use crate::models::{EntityType, NewExamination, NewPatient, SyncQueueItem};
use crate::remote::RemoteService;
use crate::services::LocalStore;
use crate::state::{PhaseCell, SyncPhase};
use crate::util::{compact_text, unix_millis_now, Clock};
use crate::{Error, Result};

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items the remote accepted
    pub committed: usize,
    /// Items that failed and stay queued for another pass
    pub retried: usize,
    /// Items dropped from the queue and marked failed on their record
    pub evicted: usize,
    /// Items skipped because the item they depend on is still queued
    pub deferred: usize,
    /// Patients merged by the pull, `None` when the pull did not complete
    pub pulled: Option<usize>,
    pub pull_error: Option<String>,
    /// Set when draining stopped early; the pull is skipped in that case
    pub aborted: Option<String>,
}

impl SyncReport {
    pub const fn is_clean(&self) -> bool {
        self.retried == 0
            && self.evicted == 0
            && self.deferred == 0
            && self.pull_error.is_none()
            && self.aborted.is_none()
    }
}

/// Returns the phase to `Idle` when a pass ends, however it ends.
struct PassGuard {
    phase: Arc<PhaseCell>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.phase.set(SyncPhase::Idle);
    }
}

enum ItemOutcome {
    Committed,
    Retried,
    Evicted,
}

pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteService>,
    phase: Arc<PhaseCell>,
    max_retries: u32,
    clock: Clock,
}

impl SyncEngine {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteService>) -> Self {
        Self {
            store,
            remote,
            phase: Arc::new(PhaseCell::new()),
            max_retries: DEFAULT_MAX_RETRIES,
            clock: unix_millis_now,
        }
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.get()
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Run a pass on the current task.
    ///
    /// Returns `None` without doing anything when a pass is already active.
    pub async fn run_pass(&self) -> Option<SyncReport> {
        let guard = self.claim()?;
        Some(self.run_claimed(guard).await)
    }

    /// Start a pass in the background.
    ///
    /// The phase leaves `Idle` before this returns, so a second trigger
    /// issued right after is a no-op. Returns `None` when a pass is already
    /// active or no tokio runtime is available.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<SyncReport>> {
        let guard = self.claim()?;
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("Sync trigger ignored: no async runtime available");
            return None;
        };

        let engine = Arc::clone(self);
        Some(runtime.spawn(async move { engine.run_claimed(guard).await }))
    }

    /// Trigger a pass on every offline-to-online transition of `monitor`.
    pub fn attach(self: &Arc<Self>, monitor: &ConnectivityMonitor) -> ListenerId {
        let engine = Arc::clone(self);
        monitor.subscribe(Listener::new().on_online(move || {
            if engine.trigger().is_none() {
                tracing::debug!("Back online, but a sync pass is already running");
            }
            Ok(())
        }))
    }

    fn claim(&self) -> Option<PassGuard> {
        if self.phase.try_begin() {
            Some(PassGuard {
                phase: Arc::clone(&self.phase),
            })
        } else {
            tracing::debug!(phase = %self.phase.get(), "Sync pass already active");
            None
        }
    }

    async fn run_claimed(&self, guard: PassGuard) -> SyncReport {
        let mut report = SyncReport::default();
        tracing::info!("Sync pass started");

        if let Err(error) = self.drain(&mut report).await {
            tracing::error!("Sync pass aborted while draining: {error}");
            report.aborted = Some(error.to_string());
        } else {
            self.phase.set(SyncPhase::Pulling);
            self.pull(&mut report).await;
        }

        if let Err(error) = self.store.record_pass((self.clock)()).await {
            tracing::warn!("Failed to record sync pass time: {error}");
        }

        tracing::info!(
            committed = report.committed,
            retried = report.retried,
            evicted = report.evicted,
            deferred = report.deferred,
            pulled = ?report.pulled,
            "Sync pass finished"
        );
        drop(guard);
        report
    }

    /// Push every queued item once, oldest first.
    ///
    /// Per-item remote failures are absorbed into `report`. Only
    /// authentication and local storage failures stop the loop.
    async fn drain(&self, report: &mut SyncReport) -> Result<()> {
        let items = self.store.pending_items().await?;
        if items.is_empty() {
            tracing::debug!("Sync queue is empty");
            return Ok(());
        }
        tracing::info!("Draining {} queued item(s)", items.len());

        for item in items {
            if let Some(dependency) = item.depends_on {
                if self.store.queue_item(dependency).await?.is_some() {
                    tracing::debug!(
                        item = item.id,
                        dependency,
                        "Deferring queue item until its dependency commits"
                    );
                    report.deferred += 1;
                    continue;
                }
            }

            match self.process(&item).await? {
                ItemOutcome::Committed => report.committed += 1,
                ItemOutcome::Retried => report.retried += 1,
                ItemOutcome::Evicted => report.evicted += 1,
            }
        }
        Ok(())
    }

    async fn process(&self, item: &SyncQueueItem) -> Result<ItemOutcome> {
        let error = match self.push(item).await {
            Ok(()) => {
                tracing::info!(
                    item = item.id,
                    entity = %item.entity_type,
                    key = %item.record_key,
                    "Queue item committed"
                );
                return Ok(ItemOutcome::Committed);
            }
            Err(error) => error,
        };

        if error.is_authentication() || error.is_storage() {
            return Err(error);
        }

        if error.is_retryable() {
            let retries = self.store.record_failed_attempt(item.id).await?;
            if retries <= self.max_retries {
                tracing::warn!(
                    item = item.id,
                    retries,
                    "Queue item failed, will retry: {error}"
                );
                return Ok(ItemOutcome::Retried);
            }
            tracing::error!(
                item = item.id,
                retries,
                "Queue item exceeded {} retries, giving up: {error}",
                self.max_retries
            );
        } else {
            tracing::error!(item = item.id, "Queue item rejected, giving up: {error}");
        }

        let reason = compact_text(&error.to_string());
        self.store.evict(item, &reason, (self.clock)()).await?;
        Ok(ItemOutcome::Evicted)
    }

    async fn push(&self, item: &SyncQueueItem) -> Result<()> {
        match item.entity_type {
            EntityType::Patient => {
                let payload: NewPatient = decode_payload(item)?;
                let canonical = self.remote.create_patient(&payload).await?;
                self.store
                    .commit_patient(item.id, &canonical, (self.clock)())
                    .await
            }
            EntityType::Examination => {
                let payload: NewExamination = decode_payload(item)?;
                let local_id = item.record_key.parse::<i64>().map_err(|_| {
                    Error::Validation(format!(
                        "queue item {} has a malformed examination key '{}'",
                        item.id, item.record_key
                    ))
                })?;
                let canonical = self
                    .remote
                    .create_examination(&payload.patient_code, &payload)
                    .await?;
                self.store
                    .commit_examination(item.id, local_id, &canonical, (self.clock)())
                    .await
            }
        }
    }

    async fn pull(&self, report: &mut SyncReport) {
        let result = match self.remote.list_patients().await {
            Ok(patients) => {
                self.store
                    .merge_remote_patients(&patients, (self.clock)())
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(merged) => {
                tracing::info!("Pulled {merged} patient(s) from the remote");
                report.pulled = Some(merged);
            }
            Err(error) => {
                tracing::warn!("Pull failed; drained items are unaffected: {error}");
                report.pull_error = Some(error.to_string());
            }
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("phase", &self.phase.get())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Stored payloads that no longer parse can never succeed.
fn decode_payload<T: serde::de::DeserializeOwned>(item: &SyncQueueItem) -> Result<T> {
    serde_json::from_value(item.payload.clone()).map_err(|error| {
        Error::Validation(format!(
            "queue item {} has an unreadable payload: {error}",
            item.id
        ))
    })
}
