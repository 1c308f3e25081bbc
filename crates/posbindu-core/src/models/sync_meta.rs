//! Sync bookkeeping model

use serde::{Deserialize, Serialize};

/// Timestamps (Unix ms) of the most recent sync activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Last time the remote patient list was merged locally
    pub last_pull_at: Option<i64>,
    /// Last time a sync pass finished, whatever its outcome
    pub last_pass_at: Option<i64>,
}
