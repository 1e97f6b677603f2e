//! Persistence for event processing results

use crate::domain::{EventIdentifier, ProcessingResult, ProcessingStatus};
use crate::library::BoxedError;
use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

/// Error thrown by [`ResultStore`] operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend can not be reached, callers should treat the operation as retryable
    #[error("storage backend unavailable")]
    Unavailable(#[source] BoxedError),
    /// Stored data exists but can not be interpreted
    #[error("stored data could not be interpreted")]
    Corrupted(#[source] BoxedError),
}

/// Outcome of a conditional write to a [`ResultStore`]
#[derive(Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The record was written
    Applied,
    /// A terminal record was already present and remains untouched
    Superseded(ProcessingStatus),
}

/// Storage backend holding one [`ProcessingResult`] per event
///
/// The conditional upsert is the fencing primitive of the whole pipeline:
/// once a terminal status has been written, later writes for the same event
/// (from stale claim holders or redeliveries) bounce off.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Retrieves the current record for an event, if any
    async fn get(&self, id: &EventIdentifier)
        -> Result<Option<ProcessingResult>, StorageError>;

    /// Writes the record unless a terminal one is already present
    async fn upsert_if_not_terminal(
        &self,
        result: &ProcessingResult,
    ) -> Result<UpsertOutcome, StorageError>;

    /// Verifies that the backend is reachable
    async fn ping(&self) -> Result<(), StorageError>;
}
