//! Sync engine: drains the queue, then refreshes from the remote.

mod engine;

pub use engine::{SyncEngine, SyncReport};
