//! Bounded history of failed log deliveries, kept in persistent storage.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::storage::{KeyValueStorage, LOGGING_ERRORS_KEY};

pub const MAX_ERROR_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingFailure {
    pub timestamp: String,
    pub event: String,
    pub error: String,
}

pub fn load(storage: &dyn KeyValueStorage) -> Vec<LoggingFailure> {
    let Some(raw) = storage.get(LOGGING_ERRORS_KEY) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Discarding unreadable logging error history: {}", e);
        Vec::new()
    })
}

/// Append a failure, evicting the oldest entries beyond the capacity.
pub fn push(storage: &dyn KeyValueStorage, failure: LoggingFailure) -> Result<()> {
    let mut entries = load(storage);
    entries.push(failure);
    if entries.len() > MAX_ERROR_ENTRIES {
        let excess = entries.len() - MAX_ERROR_ENTRIES;
        entries.drain(..excess);
    }
    storage.set(LOGGING_ERRORS_KEY, &serde_json::to_string(&entries)?)
}

pub fn clear(storage: &dyn KeyValueStorage) -> Result<()> {
    storage.remove(LOGGING_ERRORS_KEY)
}
