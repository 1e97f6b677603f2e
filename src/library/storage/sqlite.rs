use super::{ResultStore, StorageError, UpsertOutcome};
use crate::domain::{EventIdentifier, ProcessingResult, ProcessingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

const MAX_CONNECTIONS: u32 = 5;

/// [`ResultStore`] backed by a SQLite database
///
/// One row per event, keyed by the event identifier. Terminal rows are fenced
/// at the SQL level through a conditional `ON CONFLICT` update so that two
/// workers racing on the same event can not overwrite each others outcome.
#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Connects to the given database and creates the schema if necessary
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| StorageError::Unavailable(e.into()))?;

        let store = Self { pool };
        store.setup_tables().await?;

        Ok(store)
    }

    async fn setup_tables(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
                CREATE TABLE IF NOT EXISTS ProcessingResults (
                    EventId TEXT PRIMARY KEY,
                    Status TEXT NOT NULL,
                    ResultPayload TEXT,
                    Error TEXT,
                    ProcessedAt TEXT NOT NULL,
                    AttemptCount INTEGER NOT NULL
                )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(e.into()))?;

        Ok(())
    }

    fn decode(id: EventIdentifier, row: SqliteRow) -> Result<ProcessingResult, StorageError> {
        let status: String = row.get("Status");
        let result_payload: Option<String> = row.get("ResultPayload");
        let error: Option<String> = row.get("Error");
        let processed_at: String = row.get("ProcessedAt");
        let attempt_count: i64 = row.get("AttemptCount");

        let status: ProcessingStatus = status
            .parse()
            .map_err(|e: String| StorageError::Corrupted(e.into()))?;

        let result_payload = result_payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StorageError::Corrupted(e.into()))?;

        let processed_at = DateTime::parse_from_rfc3339(&processed_at)
            .map_err(|e| StorageError::Corrupted(e.into()))?
            .with_timezone(&Utc);

        Ok(ProcessingResult {
            event_id: id,
            status,
            result_payload,
            error,
            processed_at,
            attempt_count: attempt_count as u32,
        })
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn get(
        &self,
        id: &EventIdentifier,
    ) -> Result<Option<ProcessingResult>, StorageError> {
        let row = sqlx::query(
            "SELECT Status, ResultPayload, Error, ProcessedAt, AttemptCount FROM ProcessingResults WHERE EventId = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(e.into()))?;

        row.map(|row| Self::decode(*id, row)).transpose()
    }

    async fn upsert_if_not_terminal(
        &self,
        result: &ProcessingResult,
    ) -> Result<UpsertOutcome, StorageError> {
        let result_payload = result.result_payload.as_ref().map(|v| v.to_string());

        let rows_affected = sqlx::query(
            r#"
                INSERT INTO ProcessingResults ( EventId, Status, ResultPayload, Error, ProcessedAt, AttemptCount )
                VALUES ( ?, ?, ?, ?, ?, ? )
                ON CONFLICT ( EventId ) DO UPDATE SET
                    Status = excluded.Status,
                    ResultPayload = excluded.ResultPayload,
                    Error = excluded.Error,
                    ProcessedAt = excluded.ProcessedAt,
                    AttemptCount = excluded.AttemptCount
                WHERE ProcessingResults.Status NOT IN ( 'processed', 'failed' )
            "#,
        )
        .bind(result.event_id.to_string())
        .bind(result.status.to_string())
        .bind(result_payload)
        .bind(result.error.clone())
        .bind(result.processed_at.to_rfc3339())
        .bind(result.attempt_count as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(e.into()))?
        .rows_affected();

        if rows_affected > 0 {
            return Ok(UpsertOutcome::Applied);
        }

        // Nothing was written, a terminal row must be in place
        let existing = self.get(&result.event_id).await?;

        match existing {
            Some(record) => Ok(UpsertOutcome::Superseded(record.status)),
            None => Err(StorageError::Corrupted(
                "conflicting row disappeared mid-write".into(),
            )),
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.into()))?;

        Ok(())
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use serde_json::json;

    // A pool would hand every connection its own private in-memory database,
    // so the tests run on a single connection instead.
    async fn store() -> SqliteResultStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let store = SqliteResultStore { pool };
        store.setup_tables().await.unwrap();
        store
    }

    #[tokio::test]
    async fn round_trip_a_record() {
        let store = store().await;
        let result = ProcessingResult::processed(EventIdentifier::new_v4(), json!({"ok": true}), 1);

        assert_eq!(
            store.upsert_if_not_terminal(&result).await.unwrap(),
            UpsertOutcome::Applied
        );

        let stored = store.get(&result.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Processed);
        assert_eq!(stored.result_payload, Some(json!({"ok": true})));
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn return_nothing_for_unknown_events() {
        let store = store().await;
        assert!(store.get(&EventIdentifier::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_pending_records() {
        let store = store().await;
        let id = EventIdentifier::new_v4();

        store
            .upsert_if_not_terminal(&ProcessingResult::pending(id, 1))
            .await
            .unwrap();

        let outcome = store
            .upsert_if_not_terminal(&ProcessingResult::processed(id, json!(42), 1))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Applied);
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            ProcessingStatus::Processed
        );
    }

    #[tokio::test]
    async fn fence_writes_against_terminal_records() {
        let store = store().await;
        let id = EventIdentifier::new_v4();

        store
            .upsert_if_not_terminal(&ProcessingResult::processed(id, json!(1), 1))
            .await
            .unwrap();

        let outcome = store
            .upsert_if_not_terminal(&ProcessingResult::failed(id, "late write".into(), 2))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Superseded(ProcessingStatus::Processed));

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Processed);
        assert_eq!(stored.attempt_count, 1);
    }
}
