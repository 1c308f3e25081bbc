//! Sync queue item model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of record a queued mutation creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Patient,
    Examination,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "PATIENT",
            Self::Examination => "EXAMINATION",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PATIENT" => Ok(Self::Patient),
            "EXAMINATION" => Ok(Self::Examination),
            other => Err(Error::Storage(format!("Unknown entity type: {other}"))),
        }
    }
}

/// Only creation is ever queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
        }
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(Self::Create),
            other => Err(Error::Storage(format!("Unknown operation type: {other}"))),
        }
    }
}

/// A pending mutation waiting for the sync engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: i64,
    pub entity_type: EntityType,
    pub operation: OperationType,
    /// Local key of the materialized record: the patient code, or the
    /// examination's local id
    pub record_key: String,
    /// Original request body, exactly as it would be sent to the remote
    pub payload: serde_json::Value,
    pub retry_count: u32,
    /// Enqueue timestamp (Unix ms); defines FIFO order
    pub created_at: i64,
    /// Queue item that must commit before this one is attempted
    #[serde(default)]
    pub depends_on: Option<i64>,
}

/// Queue item before the store assigns it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncQueueItem {
    pub entity_type: EntityType,
    pub operation: OperationType,
    pub record_key: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub depends_on: Option<i64>,
}

impl NewSyncQueueItem {
    pub fn create(
        entity_type: EntityType,
        record_key: impl Into<String>,
        payload: &impl Serialize,
        created_at: i64,
    ) -> Result<Self> {
        Ok(Self {
            entity_type,
            operation: OperationType::Create,
            record_key: record_key.into(),
            payload: serde_json::to_value(payload)?,
            created_at,
            depends_on: None,
        })
    }

    #[must_use]
    pub const fn with_dependency(mut self, depends_on: Option<i64>) -> Self {
        self.depends_on = depends_on;
        self
    }
}
