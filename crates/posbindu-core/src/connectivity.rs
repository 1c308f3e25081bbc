//! Online/offline signal shared by the coordinator and the sync engine.
//!
//! The host feeds platform reachability into [`ConnectivityMonitor::update`];
//! subscribers hear about each transition exactly once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::Result;

/// Platform reachability source.
///
/// `None` means the platform cannot tell.
pub trait Reachability: Send + Sync {
    fn is_reachable(&self) -> Option<bool>;
}

type Callback = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Pair of transition callbacks registered with the monitor.
#[derive(Clone, Default)]
pub struct Listener {
    on_online: Option<Callback>,
    on_offline: Option<Callback>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_online(mut self, callback: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.on_online = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_offline(
        mut self,
        callback: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_offline = Some(Arc::new(callback));
        self
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ConnectivityMonitor {
    /// Start from a reported reachability; unknown counts as online.
    pub fn new(initial: Option<bool>) -> Self {
        let online = initial.unwrap_or(true);
        tracing::debug!(online, reported = initial.is_some(), "Connectivity monitor started");
        Self {
            state: watch::Sender::new(online),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start from the current answer of a platform probe.
    pub fn from_probe(probe: &dyn Reachability) -> Self {
        Self::new(probe.is_reachable())
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver that observes every state change, for async consumers.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, listener));
        id
    }

    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Feed a new platform reading.
    ///
    /// Unknown readings leave the state as is. Returns `true` when this call
    /// caused a transition.
    pub fn update(&self, reachable: Option<bool>) -> bool {
        let Some(online) = reachable else {
            return false;
        };

        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            tracing::info!(online, "Connectivity changed");
            self.notify(online);
        }
        changed
    }

    /// Re-read a probe and feed the result through [`Self::update`].
    pub fn poll(&self, probe: &dyn Reachability) -> bool {
        self.update(probe.is_reachable())
    }

    fn notify(&self, online: bool) {
        let callbacks: Vec<(ListenerId, Callback)> = self
            .lock_listeners()
            .iter()
            .filter_map(|(id, listener)| {
                let callback = if online {
                    listener.on_online.as_ref()
                } else {
                    listener.on_offline.as_ref()
                };
                callback.map(|callback| (*id, Arc::clone(callback)))
            })
            .collect();

        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(listener = id.0, online, "Connectivity listener failed: {error}");
                }
                Err(_) => {
                    tracing::error!(listener = id.0, online, "Connectivity listener panicked");
                }
            }
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.lock_listeners().len())
            .finish()
    }
}
