//! End-to-end delivery guarantees, exercised on the in-memory backends

use async_trait::async_trait;
use eventline::domain::{
    EventIdentifier, EventPayload, EventReceivedNotification, ProcessingFailure, ProcessingStatus,
};
use eventline::harness::MemoryCommunicationFactory;
use eventline::library::communication::CommunicationFactory;
use eventline::library::communication::event::{
    ConsumerExt, ConsumerGroupDescriptor, Notification, NotificationPublisher, QueueProvider,
};
use eventline::library::communication::implementation::memory::MemoryLog;
use eventline::library::storage::{MemoryResultStore, ResultStore};
use eventline::module::worker::{EchoProcessor, EventProcessor, EventProcessorService};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Fails the first delivery of every event with a transient fault
struct FailOnceProcessor {
    seen: Mutex<HashSet<EventIdentifier>>,
}

impl FailOnceProcessor {
    fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl EventProcessor for FailOnceProcessor {
    async fn process(
        &self,
        notification: &EventReceivedNotification,
    ) -> Result<Value, ProcessingFailure> {
        let first = self
            .seen
            .lock()
            .unwrap()
            .insert(notification.event_id);

        if first {
            Err(ProcessingFailure::Transient("first delivery fails".into()))
        } else {
            Ok(json!({ "recovered": true }))
        }
    }
}

/// Fails every delivery with a transient fault
struct AlwaysTransientProcessor;

#[async_trait]
impl EventProcessor for AlwaysTransientProcessor {
    async fn process(
        &self,
        _notification: &EventReceivedNotification,
    ) -> Result<Value, ProcessingFailure> {
        Err(ProcessingFailure::Transient("backend is gone".into()))
    }
}

async fn publish_events(log: &MemoryLog, count: usize) -> Vec<EventIdentifier> {
    let mut ids = Vec::with_capacity(count);

    for i in 0..count {
        let mut payload = serde_json::Map::new();
        payload.insert("index".into(), json!(i));

        let notification = EventReceivedNotification::new(EventPayload::from(payload));
        ids.push(notification.event_id);
        log.publish(notification).await.unwrap();
    }

    ids
}

fn echo_service(store: &MemoryResultStore) -> EventProcessorService<EchoProcessor, MemoryResultStore> {
    EventProcessorService::new(
        EchoProcessor::new(Duration::ZERO),
        store.clone(),
        MAX_ATTEMPTS,
    )
}

#[tokio::test]
async fn settle_every_submitted_event() {
    let factory = MemoryCommunicationFactory::default();
    let store = MemoryResultStore::new();
    let ids = publish_events(&factory.notification_publisher(), 20).await;

    echo_service(&store)
        .consume_queue(
            factory.queue_provider(),
            &ConsumerGroupDescriptor::default(),
            "worker-1",
            10,
            Some(DRAIN_TIMEOUT),
        )
        .await
        .unwrap();

    for id in ids {
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Processed);
        assert_eq!(record.attempt_count, 1);
    }
}

#[tokio::test]
async fn spread_events_across_competing_consumers_without_duplicates() {
    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let ids = publish_events(&log, 10).await;

    let group = ConsumerGroupDescriptor::default();
    let first = {
        let log = log.clone();
        let service = echo_service(&store);
        let group = group.clone();
        tokio::spawn(async move {
            service
                .consume_queue(log, &group, "worker-1", 2, Some(DRAIN_TIMEOUT))
                .await
                .unwrap();
        })
    };
    let second = {
        let log = log.clone();
        let service = echo_service(&store);
        let group = group.clone();
        tokio::spawn(async move {
            service
                .consume_queue(log, &group, "worker-2", 2, Some(DRAIN_TIMEOUT))
                .await
                .unwrap();
        })
    };

    first.await.unwrap();
    second.await.unwrap();

    // Each event was settled exactly once on its first delivery
    assert_eq!(store.len(), 10);
    for id in ids {
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ProcessingStatus::Processed);
        assert_eq!(record.attempt_count, 1);
    }
}

#[tokio::test]
async fn redeliver_unacknowledged_events_to_another_consumer() {
    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let ids = publish_events(&log, 1).await;
    let group = ConsumerGroupDescriptor::default();

    // The first consumer hits a transient fault and leaves the entry claimed
    let flaky = EventProcessorService::new(FailOnceProcessor::new(), store.clone(), MAX_ATTEMPTS);
    flaky
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Pending);

    // After the claim ages out, a second consumer takes over and succeeds
    log.expire_claims("event.received", &group);
    let reclaimed = log
        .reclaim(
            EventReceivedNotification::queue(),
            &group,
            "worker-2",
            Duration::from_secs(30),
            10,
        )
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);

    let service = echo_service(&store);
    for entry in reclaimed {
        service.consume_entry(entry).await;
    }

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Processed);
    assert_eq!(record.attempt_count, 2);
}

#[tokio::test]
async fn resume_own_pending_claims_after_a_restart() {
    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let ids = publish_events(&log, 1).await;
    let group = ConsumerGroupDescriptor::default();

    // The first run hits a transient fault and exits with the claim still open
    let flaky = EventProcessorService::new(FailOnceProcessor::new(), store.clone(), MAX_ATTEMPTS);
    flaky
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();
    assert_eq!(
        store.get(&ids[0]).await.unwrap().unwrap().status,
        ProcessingStatus::Pending
    );

    // Coming back under the same name picks the claim up again without
    // waiting for it to age out and be swept by another group member
    flaky
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Processed);
    assert_eq!(record.attempt_count, 1);
}

#[tokio::test]
async fn recover_from_a_result_store_outage() {
    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let ids = publish_events(&log, 1).await;
    let group = ConsumerGroupDescriptor::default();

    // With the store down the delivery stays unacknowledged
    store.set_available(false);
    echo_service(&store)
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();
    assert!(store.is_empty() || store.get(&ids[0]).await.is_err());

    // Once the store is back, a reclaim settles the event
    store.set_available(true);
    log.expire_claims("event.received", &group);

    let reclaimed = log
        .reclaim(
            EventReceivedNotification::queue(),
            &group,
            "worker-1",
            Duration::from_secs(30),
            10,
        )
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);

    let service = echo_service(&store);
    for entry in reclaimed {
        service.consume_entry(entry).await;
    }

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Processed);
}

#[tokio::test]
async fn discard_poison_entries_while_processing_the_rest() {
    use eventline::library::communication::event::RawNotificationPublisher;

    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let group = ConsumerGroupDescriptor::default();

    log.publish_raw(b"this is not a notification", EventReceivedNotification::queue())
        .await
        .unwrap();
    let ids = publish_events(&log, 1).await;

    echo_service(&store)
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();

    // The valid event settled, the poison entry was dropped without a record
    assert_eq!(store.len(), 1);
    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Processed);

    // Nothing is redelivered on a later reclaim
    log.expire_claims("event.received", &group);
    let reclaimed = log
        .reclaim(
            EventReceivedNotification::queue(),
            &group,
            "worker-2",
            Duration::from_secs(30),
            10,
        )
        .await
        .unwrap();
    assert!(reclaimed.is_empty());
}

#[tokio::test]
async fn fail_events_after_exhausting_the_attempt_budget() {
    let log = MemoryLog::new();
    let store = MemoryResultStore::new();
    let ids = publish_events(&log, 1).await;
    let group = ConsumerGroupDescriptor::default();

    let service = EventProcessorService::new(AlwaysTransientProcessor, store.clone(), 2);

    service
        .consume_queue(log.clone(), &group, "worker-1", 10, Some(DRAIN_TIMEOUT))
        .await
        .unwrap();
    assert_eq!(
        store.get(&ids[0]).await.unwrap().unwrap().status,
        ProcessingStatus::Pending
    );

    // Second delivery reaches the budget of two attempts and settles as failed
    log.expire_claims("event.received", &group);
    let reclaimed = log
        .reclaim(
            EventReceivedNotification::queue(),
            &group,
            "worker-1",
            Duration::from_secs(30),
            10,
        )
        .await
        .unwrap();

    for entry in reclaimed {
        service.consume_entry(entry).await;
    }

    let record = store.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Failed);
    assert_eq!(record.attempt_count, 2);
    assert!(record.error.unwrap().contains("exhausted"));
}
