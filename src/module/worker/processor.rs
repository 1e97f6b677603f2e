use crate::domain::{EventReceivedNotification, ProcessingFailure, ProcessingResult};
use crate::harness::Service;
use crate::library::communication::event::{ConsumeError, Consumer, Delivery};
use crate::library::communication::CommunicationFactory;
use crate::library::storage::{ResultStore, SqliteResultStore, UpsertOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Transformation applied to each delivered event
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Produces the result payload for a single event
    async fn process(
        &self,
        notification: &EventReceivedNotification,
    ) -> Result<Value, ProcessingFailure>;
}

/// Processor which echoes the submitted payload back as its result
///
/// Stands in for actual business logic. An optional artificial work duration
/// turns it into a tunable load for capacity experiments.
#[derive(Clone)]
pub struct EchoProcessor {
    work_duration: Duration,
}

impl EchoProcessor {
    /// Creates a new instance which burns the given duration per event
    pub fn new(work_duration: Duration) -> Self {
        Self { work_duration }
    }
}

#[async_trait]
impl EventProcessor for EchoProcessor {
    async fn process(
        &self,
        notification: &EventReceivedNotification,
    ) -> Result<Value, ProcessingFailure> {
        if !self.work_duration.is_zero() {
            sleep(self.work_duration).await;
        }

        Ok(json!({
            "event_id": notification.event_id,
            "echo": notification.payload.clone().into_value(),
        }))
    }
}

/// Configuration shared by every processor service instance
#[derive(Clone)]
pub struct ProcessorConfig<P, S> {
    /// Processor applied to each delivered event
    pub processor: P,
    /// Store receiving the processing outcomes
    pub store: S,
    /// Delivery attempt budget per event
    pub max_attempts: u32,
}

/// Consumer which records exactly one terminal outcome per delivered event
///
/// Processing is idempotent with respect to redelivery: settled events are
/// skipped, and outcomes arriving late (after another worker took over the
/// claim) bounce off the conditional upsert of the store.
pub struct EventProcessorService<P, S> {
    processor: P,
    store: S,
    max_attempts: u32,
}

impl<P, S> EventProcessorService<P, S>
where
    P: EventProcessor,
    S: ResultStore,
{
    /// Creates a new instance from raw parts
    pub fn new(processor: P, store: S, max_attempts: u32) -> Self {
        Self {
            processor,
            store,
            max_attempts,
        }
    }

    async fn settle(&self, record: ProcessingResult) -> Result<(), ConsumeError> {
        match self.store.upsert_if_not_terminal(&record).await {
            Ok(UpsertOutcome::Applied) => {
                info!(
                    event_id = %record.event_id,
                    status = %record.status,
                    attempt = record.attempt_count,
                    "Settled event"
                );
                Ok(())
            }
            Ok(UpsertOutcome::Superseded(status)) => {
                // Another worker finished while we were processing
                debug!(
                    event_id = %record.event_id,
                    %status,
                    "Outcome superseded by an earlier terminal record"
                );
                Ok(())
            }
            Err(e) => Err(ConsumeError::Transient(e.into())),
        }
    }
}

#[async_trait]
impl<P, S> Consumer for EventProcessorService<P, S>
where
    P: EventProcessor + Send + Sync,
    S: ResultStore + Send + Sync,
{
    type Notification = EventReceivedNotification;

    async fn consume(&self, delivery: Delivery<Self::Notification>) -> Result<(), ConsumeError> {
        let notification = delivery.notification;
        let event_id = notification.event_id;
        let attempt = delivery.delivery_count;

        match self.store.get(&event_id).await {
            Ok(Some(record)) if record.status.is_terminal() => {
                debug!(%event_id, status = %record.status, "Skipping already settled event");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return Err(ConsumeError::Transient(e.into())),
        }

        // Claim marker so lookups can distinguish "in flight" from "unknown"
        let pending = ProcessingResult::pending(event_id, attempt);
        match self.store.upsert_if_not_terminal(&pending).await {
            Ok(UpsertOutcome::Applied) => {}
            Ok(UpsertOutcome::Superseded(status)) => {
                debug!(%event_id, %status, "Event settled concurrently, skipping");
                return Ok(());
            }
            Err(e) => return Err(ConsumeError::Transient(e.into())),
        }

        match self.processor.process(&notification).await {
            Ok(result_payload) => {
                self.settle(ProcessingResult::processed(event_id, result_payload, attempt))
                    .await
            }
            Err(ProcessingFailure::Terminal(reason)) => {
                warn!(%event_id, %reason, "Event failed permanently");
                self.settle(ProcessingResult::failed(event_id, reason, attempt))
                    .await
            }
            Err(ProcessingFailure::Transient(e)) => {
                if attempt >= self.max_attempts {
                    warn!(
                        %event_id,
                        attempt,
                        "Delivery attempt budget exhausted, marking event as failed: {}",
                        e
                    );
                    let record = ProcessingResult::failed(
                        event_id,
                        format!("delivery attempts exhausted: {}", e),
                        attempt,
                    );
                    self.settle(record).await
                } else {
                    Err(ConsumeError::Transient(e))
                }
            }
        }
    }
}

/// Service wrapper binding the processor consumer into the harness
pub struct ProcessorService<F>(PhantomData<F>);

impl<F> Service<F> for ProcessorService<F>
where
    F: CommunicationFactory + Send + Sync,
{
    const NAME: &'static str = "ProcessorService";
    type Instance = EventProcessorService<EchoProcessor, SqliteResultStore>;
    type Config = ProcessorConfig<EchoProcessor, SqliteResultStore>;

    fn instantiate(_factory: F, config: &Self::Config) -> Self::Instance {
        EventProcessorService::new(
            config.processor.clone(),
            config.store.clone(),
            config.max_attempts,
        )
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::domain::{EventPayload, ProcessingStatus};
    use crate::library::communication::event::NotificationFrame;
    use crate::library::storage::MemoryResultStore;

    struct TerminalProcessor;

    #[async_trait]
    impl EventProcessor for TerminalProcessor {
        async fn process(
            &self,
            _notification: &EventReceivedNotification,
        ) -> Result<Value, ProcessingFailure> {
            Err(ProcessingFailure::Terminal("unprocessable".into()))
        }
    }

    struct TransientProcessor;

    #[async_trait]
    impl EventProcessor for TransientProcessor {
        async fn process(
            &self,
            _notification: &EventReceivedNotification,
        ) -> Result<Value, ProcessingFailure> {
            Err(ProcessingFailure::Transient("backend hiccup".into()))
        }
    }

    fn delivery(attempt: u32) -> Delivery<EventReceivedNotification> {
        let notification = EventReceivedNotification::new(EventPayload::default());

        Delivery {
            notification: NotificationFrame::new(notification),
            sequence: "0".into(),
            delivery_count: attempt,
        }
    }

    #[tokio::test]
    async fn settle_successful_events() {
        let store = MemoryResultStore::new();
        let service =
            EventProcessorService::new(EchoProcessor::new(Duration::ZERO), store.clone(), 5);

        let delivery = delivery(1);
        let event_id = delivery.notification.event_id;

        service.consume(delivery).await.unwrap();

        let record = store.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Processed);
        assert_eq!(record.attempt_count, 1);
        assert!(record.result_payload.is_some());
    }

    #[tokio::test]
    async fn skip_already_settled_events() {
        let store = MemoryResultStore::new();
        let delivery = delivery(2);
        let event_id = delivery.notification.event_id;

        let settled = ProcessingResult::processed(event_id, json!({"n": 1}), 1);
        store.upsert_if_not_terminal(&settled).await.unwrap();

        // A processor that would fail terminally must never run for settled events
        let service = EventProcessorService::new(TerminalProcessor, store.clone(), 5);
        service.consume(delivery).await.unwrap();

        let record = store.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Processed);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn record_permanent_failures() {
        let store = MemoryResultStore::new();
        let service = EventProcessorService::new(TerminalProcessor, store.clone(), 5);

        let delivery = delivery(1);
        let event_id = delivery.notification.event_id;

        service.consume(delivery).await.unwrap();

        let record = store.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("unprocessable"));
    }

    #[tokio::test]
    async fn leave_transient_failures_for_redelivery() {
        let store = MemoryResultStore::new();
        let service = EventProcessorService::new(TransientProcessor, store.clone(), 5);

        let delivery = delivery(1);
        let event_id = delivery.notification.event_id;

        assert!(service.consume(delivery).await.is_err());

        // The claim marker persists so lookups report the event as in flight
        let record = store.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn fail_events_once_the_attempt_budget_is_exhausted() {
        let store = MemoryResultStore::new();
        let service = EventProcessorService::new(TransientProcessor, store.clone(), 3);

        let delivery = delivery(3);
        let event_id = delivery.notification.event_id;

        service.consume(delivery).await.unwrap();

        let record = store.get(&event_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Failed);
        assert_eq!(record.attempt_count, 3);
        assert!(record.error.unwrap().contains("exhausted"));
    }

    #[tokio::test]
    async fn report_store_outages_as_transient() {
        let store = MemoryResultStore::new();
        store.set_available(false);

        let service =
            EventProcessorService::new(EchoProcessor::new(Duration::ZERO), store.clone(), 5);

        assert!(matches!(
            service.consume(delivery(1)).await,
            Err(ConsumeError::Transient(_))
        ));
    }
}
