use super::{ResultStore, StorageError, UpsertOutcome};
use crate::domain::{EventIdentifier, ProcessingResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// [`ResultStore`] keeping all records in process memory
///
/// Intended for tests and simulations. The backend can be taken "offline" at
/// runtime to exercise the transient failure paths of its callers.
#[derive(Clone)]
pub struct MemoryResultStore {
    records: Arc<Mutex<HashMap<EventIdentifier, ProcessingResult>>>,
    available: Arc<AtomicBool>,
}

impl MemoryResultStore {
    /// Creates an empty, reachable store
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Toggles whether operations succeed or fail with [`StorageError::Unavailable`]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of records currently stored
    pub fn len(&self) -> usize {
        self.records.lock().expect("result store mutex poisoned").len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("simulated outage".into()))
        }
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(
        &self,
        id: &EventIdentifier,
    ) -> Result<Option<ProcessingResult>, StorageError> {
        self.ensure_available()?;

        let records = self.records.lock().expect("result store mutex poisoned");
        Ok(records.get(id).cloned())
    }

    async fn upsert_if_not_terminal(
        &self,
        result: &ProcessingResult,
    ) -> Result<UpsertOutcome, StorageError> {
        self.ensure_available()?;

        let mut records = self.records.lock().expect("result store mutex poisoned");

        if let Some(existing) = records.get(&result.event_id) {
            if existing.status.is_terminal() {
                return Ok(UpsertOutcome::Superseded(existing.status));
            }
        }

        records.insert(result.event_id, result.clone());
        Ok(UpsertOutcome::Applied)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::ProcessingStatus;
    use serde_json::json;

    #[tokio::test]
    async fn fence_writes_against_terminal_records() {
        let store = MemoryResultStore::new();
        let id = EventIdentifier::new_v4();

        store
            .upsert_if_not_terminal(&ProcessingResult::pending(id, 1))
            .await
            .unwrap();
        store
            .upsert_if_not_terminal(&ProcessingResult::failed(id, "boom".into(), 1))
            .await
            .unwrap();

        let outcome = store
            .upsert_if_not_terminal(&ProcessingResult::processed(id, json!(1), 2))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Superseded(ProcessingStatus::Failed));
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            ProcessingStatus::Failed
        );
    }

    #[tokio::test]
    async fn fail_while_offline() {
        let store = MemoryResultStore::new();
        store.set_available(false);

        assert!(store.ping().await.is_err());
        assert!(store.get(&EventIdentifier::new_v4()).await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
