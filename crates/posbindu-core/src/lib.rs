//! posbindu-core - Offline-first sync engine for Posbindu clients
//!
//! Patient registrations and health examinations are written locally first
//! and reconciled with the remote registry once connectivity returns.

pub mod classify;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod identifier;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, Listener, ListenerId, Reachability};
pub use coordinator::{Submission, SubmissionCoordinator};
pub use error::{Error, Result};
pub use identifier::{CodeGenerator, EphemeralIds};
pub use models::{
    EntityType, Examination, Gender, NewExamination, NewPatient, Patient, PatientCode,
    PatientInput, SyncQueueItem,
};
pub use remote::{CredentialProvider, HttpRemoteService, RemoteService, StaticCredentials};
pub use services::{LocalStore, PendingSummary};
pub use state::SyncPhase;
pub use sync::{SyncEngine, SyncReport};
