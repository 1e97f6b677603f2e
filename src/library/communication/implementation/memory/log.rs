use super::super::super::super::{BoxedError, EmptyResult};
use super::super::super::event::{
    ConsumerGroupDescriptor, QueueDescriptor, QueueLocation, QueueProvider,
    RawNotificationPublisher, RawQueueEntry,
};
use super::super::json::JsonQueueEntry;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// In-process, length-bounded append-only log with consumer group semantics
///
/// Cloning is cheap and yields a handle onto the same underlying log. The struct
/// implements both the publishing and the consuming side of the queueing traits.
#[derive(Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<LogState>>,
}

#[derive(Default)]
struct LogState {
    queues: HashMap<String, QueueState>,
}

#[derive(Default)]
struct QueueState {
    next_offset: u64,
    entries: VecDeque<StoredEntry>,
    groups: HashMap<String, GroupState>,
}

struct StoredEntry {
    offset: u64,
    payload: Arc<Vec<u8>>,
}

struct GroupState {
    cursor: u64,
    pending: HashMap<u64, PendingClaim>,
}

struct PendingClaim {
    consumer: String,
    claimed_at: Instant,
    delivery_count: u32,
}

struct ClaimedEntry {
    offset: u64,
    payload: Arc<Vec<u8>>,
    delivery_count: u32,
}

impl MemoryLog {
    /// Creates a new, empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewinds the claim timestamps of every pending entry in the given group so
    /// that any `min_idle` filter treats them as expired
    ///
    /// Simulates a crashed consumer whose claims have aged out, without having to
    /// wait for the claim timeout in real time.
    pub fn expire_claims(&self, queue_key: &str, group: &ConsumerGroupDescriptor) {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");

        if let Some(queue) = state.queues.get_mut(queue_key) {
            if let Some(group) = queue.groups.get_mut(&group.identifier().to_string()) {
                for claim in group.pending.values_mut() {
                    claim.claimed_at = claim
                        .claimed_at
                        .checked_sub(Duration::from_secs(86_400))
                        .unwrap_or(claim.claimed_at);
                }
            }
        }
    }

    /// Number of entries currently retained in a queue
    pub fn len(&self, queue_key: &str) -> usize {
        let state = self.inner.lock().expect("memory log mutex poisoned");
        state
            .queues
            .get(queue_key)
            .map(|q| q.entries.len())
            .unwrap_or_default()
    }

    /// Whether a queue holds no retained entries
    pub fn is_empty(&self, queue_key: &str) -> bool {
        self.len(queue_key) == 0
    }

    fn append(&self, queue_key: &str, payload: &[u8], limit: usize) {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");
        let queue = state.queues.entry(queue_key.to_owned()).or_default();

        let offset = queue.next_offset;
        queue.next_offset += 1;
        queue.entries.push_back(StoredEntry {
            offset,
            payload: Arc::new(payload.to_vec()),
        });

        // Approximate retention, matching capped stream behaviour
        while queue.entries.len() > limit {
            queue.entries.pop_front();
        }
    }

    fn ensure_group(&self, queue_key: &str, group: &ConsumerGroupDescriptor) {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");
        let queue = state.queues.entry(queue_key.to_owned()).or_default();

        let cursor = match group.start() {
            QueueLocation::Head => queue.entries.front().map(|e| e.offset).unwrap_or_default(),
            QueueLocation::Tail => queue.next_offset,
        };

        queue
            .groups
            .entry(group.identifier().to_string())
            .or_insert(GroupState {
                cursor,
                pending: HashMap::new(),
            });
    }

    fn pending_for_consumer(
        &self,
        queue_key: &str,
        group_name: &str,
        consumer: &str,
        floor: u64,
        max: usize,
    ) -> Vec<ClaimedEntry> {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");
        let queue = match state.queues.get_mut(queue_key) {
            Some(queue) => queue,
            None => return Vec::new(),
        };

        let payloads: HashMap<u64, Arc<Vec<u8>>> = queue
            .entries
            .iter()
            .map(|e| (e.offset, e.payload.clone()))
            .collect();

        let group = match queue.groups.get_mut(group_name) {
            Some(group) => group,
            None => return Vec::new(),
        };

        let mut offsets: Vec<u64> = group
            .pending
            .iter()
            .filter(|(offset, claim)| claim.consumer == consumer && **offset >= floor)
            .map(|(offset, _)| *offset)
            .collect();
        offsets.sort_unstable();
        offsets.truncate(max);

        let mut claimed = Vec::new();

        for offset in offsets {
            let payload = match payloads.get(&offset) {
                Some(payload) => payload.clone(),
                None => {
                    // Entry was trimmed out of retention, the claim is void
                    group.pending.remove(&offset);
                    continue;
                }
            };

            let claim = group.pending.get_mut(&offset).expect("claim disappeared");
            // Re-delivery to the existing claim holder does not count as a new attempt
            claim.claimed_at = Instant::now();

            claimed.push(ClaimedEntry {
                offset,
                payload,
                delivery_count: claim.delivery_count,
            });
        }

        claimed
    }

    fn claim_batch(
        &self,
        queue_key: &str,
        group_name: &str,
        consumer: &str,
        max: usize,
    ) -> Vec<ClaimedEntry> {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");
        let queue = match state.queues.get_mut(queue_key) {
            Some(queue) => queue,
            None => return Vec::new(),
        };
        let group = match queue.groups.get_mut(group_name) {
            Some(group) => group,
            None => return Vec::new(),
        };

        let mut claimed = Vec::new();

        for entry in queue.entries.iter() {
            if claimed.len() >= max {
                break;
            }

            if entry.offset < group.cursor {
                continue;
            }

            group.cursor = entry.offset + 1;
            group.pending.insert(
                entry.offset,
                PendingClaim {
                    consumer: consumer.to_owned(),
                    claimed_at: Instant::now(),
                    delivery_count: 1,
                },
            );

            claimed.push(ClaimedEntry {
                offset: entry.offset,
                payload: entry.payload.clone(),
                delivery_count: 1,
            });
        }

        claimed
    }

    fn acknowledge(&self, queue_key: &str, group_name: &str, consumer: &str, offset: u64) -> EmptyResult {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");

        let claim = state
            .queues
            .get_mut(queue_key)
            .and_then(|queue| queue.groups.get_mut(group_name));

        if let Some(group) = claim {
            if let Some(pending) = group.pending.get(&offset) {
                if pending.consumer == consumer {
                    group.pending.remove(&offset);
                    return Ok(());
                }
            }
        }

        Err(format!("entry {} is no longer claimed by this consumer", offset).into())
    }

    fn reclaim_expired(
        &self,
        queue_key: &str,
        group_name: &str,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> Vec<ClaimedEntry> {
        let mut state = self.inner.lock().expect("memory log mutex poisoned");
        let queue = match state.queues.get_mut(queue_key) {
            Some(queue) => queue,
            None => return Vec::new(),
        };

        let payloads: HashMap<u64, Arc<Vec<u8>>> = queue
            .entries
            .iter()
            .map(|e| (e.offset, e.payload.clone()))
            .collect();

        let group = match queue.groups.get_mut(group_name) {
            Some(group) => group,
            None => return Vec::new(),
        };

        let now = Instant::now();
        let mut expired: Vec<u64> = group
            .pending
            .iter()
            .filter(|(_, claim)| now.duration_since(claim.claimed_at) >= min_idle)
            .map(|(offset, _)| *offset)
            .collect();
        expired.sort_unstable();
        expired.truncate(max);

        let mut claimed = Vec::new();

        for offset in expired {
            let payload = match payloads.get(&offset) {
                Some(payload) => payload.clone(),
                None => {
                    // Entry was trimmed out of retention, the claim is void
                    group.pending.remove(&offset);
                    continue;
                }
            };

            let claim = group.pending.get_mut(&offset).expect("claim disappeared");
            claim.consumer = consumer.to_owned();
            claim.claimed_at = now;
            claim.delivery_count += 1;

            claimed.push(ClaimedEntry {
                offset,
                payload,
                delivery_count: claim.delivery_count,
            });
        }

        claimed
    }

    fn build_entry(
        &self,
        queue_key: &str,
        group_name: &str,
        consumer: &str,
        claimed: ClaimedEntry,
    ) -> MemoryQueueEntry {
        MemoryQueueEntry {
            log: self.clone(),
            queue_key: queue_key.to_owned(),
            group: group_name.to_owned(),
            consumer: consumer.to_owned(),
            sequence: claimed.offset.to_string(),
            offset: claimed.offset,
            payload: claimed.payload,
            delivery_count: claimed.delivery_count,
        }
    }
}

#[async_trait]
impl RawNotificationPublisher for MemoryLog {
    async fn publish_raw(&self, data: &[u8], descriptor: QueueDescriptor) -> EmptyResult {
        self.append(descriptor.key(), data, descriptor.limit());
        Ok(())
    }

    async fn ping(&self) -> EmptyResult {
        Ok(())
    }
}

/// Entry claimed from a [`MemoryLog`]
pub struct MemoryQueueEntry {
    log: MemoryLog,
    queue_key: String,
    group: String,
    consumer: String,
    sequence: String,
    offset: u64,
    payload: Arc<Vec<u8>>,
    delivery_count: u32,
}

#[async_trait]
impl RawQueueEntry for MemoryQueueEntry {
    fn sequence(&self) -> &str {
        &self.sequence
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    async fn acknowledge(&mut self) -> EmptyResult {
        self.log
            .acknowledge(&self.queue_key, &self.group, &self.consumer, self.offset)
    }
}

impl JsonQueueEntry for MemoryQueueEntry {}

#[async_trait]
impl QueueProvider for MemoryLog {
    type Entry = MemoryQueueEntry;

    async fn consume(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        batch_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        self.ensure_group(queue.key(), group);

        struct StreamState {
            log: MemoryLog,
            queue_key: String,
            group_name: String,
            consumer: String,
            batch_size: usize,
            idle_timeout: Option<Duration>,
            buffer: VecDeque<MemoryQueueEntry>,
            last_delivery: Instant,
            catching_up: bool,
            resume_floor: u64,
        }

        let state = StreamState {
            log: self.clone(),
            queue_key: queue.key().to_owned(),
            group_name: group.identifier().to_string(),
            consumer: consumer.to_owned(),
            batch_size,
            idle_timeout,
            buffer: VecDeque::new(),
            last_delivery: Instant::now(),
            catching_up: true,
            resume_floor: 0,
        };

        let stream = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(entry) = state.buffer.pop_front() {
                    return Some((Ok(entry), state));
                }

                // A consumer resuming under a known name works off its own
                // unacknowledged claims before moving on to new entries
                if state.catching_up {
                    let pending = state.log.pending_for_consumer(
                        &state.queue_key,
                        &state.group_name,
                        &state.consumer,
                        state.resume_floor,
                        state.batch_size,
                    );

                    if pending.is_empty() {
                        state.catching_up = false;
                    } else {
                        state.last_delivery = Instant::now();
                        state.resume_floor = pending
                            .last()
                            .map(|e| e.offset + 1)
                            .unwrap_or(state.resume_floor);

                        for entry in pending {
                            let entry = state.log.build_entry(
                                &state.queue_key,
                                &state.group_name,
                                &state.consumer,
                                entry,
                            );
                            state.buffer.push_back(entry);
                        }
                    }

                    continue;
                }

                let claimed = state.log.claim_batch(
                    &state.queue_key,
                    &state.group_name,
                    &state.consumer,
                    state.batch_size,
                );

                if claimed.is_empty() {
                    if let Some(idle) = state.idle_timeout {
                        if state.last_delivery.elapsed() >= idle {
                            return None;
                        }
                    }

                    sleep(POLL_INTERVAL).await;
                } else {
                    state.last_delivery = Instant::now();

                    for entry in claimed {
                        let entry = state.log.build_entry(
                            &state.queue_key,
                            &state.group_name,
                            &state.consumer,
                            entry,
                        );
                        state.buffer.push_back(entry);
                    }
                }
            }
        })
        .boxed();

        Ok(stream)
    }

    async fn reclaim(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        min_idle: Duration,
        batch_size: usize,
    ) -> Result<Vec<Self::Entry>, BoxedError> {
        self.ensure_group(queue.key(), group);

        let claimed = self.reclaim_expired(
            queue.key(),
            &group.identifier().to_string(),
            consumer,
            min_idle,
            batch_size,
        );

        Ok(claimed
            .into_iter()
            .map(|entry| {
                self.build_entry(
                    queue.key(),
                    &group.identifier().to_string(),
                    consumer,
                    entry,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::event::ConsumerGroupIdentifier;
    use pretty_assertions::assert_eq;

    fn descriptor() -> QueueDescriptor {
        QueueDescriptor::new("test".into(), 100)
    }

    fn group() -> ConsumerGroupDescriptor {
        ConsumerGroupDescriptor::default()
    }

    async fn publish_numbers(log: &MemoryLog, count: usize) {
        for i in 0..count {
            log.publish_raw(format!("{}", i).as_bytes(), descriptor())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn deliver_in_append_order() {
        let log = MemoryLog::new();
        publish_numbers(&log, 3).await;

        log.ensure_group("test", &group());
        let claimed = log.claim_batch("test", "worker", "consumer-1", 10);
        let payloads: Vec<String> = claimed
            .iter()
            .map(|e| String::from_utf8(e.payload.to_vec()).unwrap())
            .collect();

        assert_eq!(payloads, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn deliver_each_entry_to_only_one_consumer() {
        let log = MemoryLog::new();
        publish_numbers(&log, 4).await;

        log.ensure_group("test", &group());
        let first = log.claim_batch("test", "worker", "consumer-1", 2);
        let second = log.claim_batch("test", "worker", "consumer-2", 10);

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);

        let mut offsets: Vec<u64> = first
            .iter()
            .chain(second.iter())
            .map(|e| e.offset)
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn reject_acknowledgement_after_reassignment() {
        let log = MemoryLog::new();
        publish_numbers(&log, 1).await;

        log.ensure_group("test", &group());
        log.claim_batch("test", "worker", "consumer-1", 1);
        log.expire_claims("test", &group());

        let reclaimed = log.reclaim_expired("test", "worker", "consumer-2", Duration::ZERO, 10);
        assert_eq!(reclaimed.len(), 1);

        // The original claim holder may no longer acknowledge
        assert!(log.acknowledge("test", "worker", "consumer-1", 0).is_err());
        // The new holder may
        assert!(log.acknowledge("test", "worker", "consumer-2", 0).is_ok());
    }

    #[tokio::test]
    async fn withhold_unexpired_claims_from_reclaim() {
        let log = MemoryLog::new();
        publish_numbers(&log, 1).await;

        log.ensure_group("test", &group());
        log.claim_batch("test", "worker", "consumer-1", 1);

        let reclaimed =
            log.reclaim_expired("test", "worker", "consumer-2", Duration::from_secs(60), 10);
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn count_deliveries_across_reclaims() {
        let log = MemoryLog::new();
        publish_numbers(&log, 1).await;

        log.ensure_group("test", &group());
        let first = log.claim_batch("test", "worker", "consumer-1", 1);
        assert_eq!(first[0].delivery_count, 1);

        log.expire_claims("test", &group());
        let second = log.reclaim_expired("test", "worker", "consumer-2", Duration::ZERO, 10);
        assert_eq!(second[0].delivery_count, 2);

        log.expire_claims("test", &group());
        let third = log.reclaim_expired("test", "worker", "consumer-3", Duration::ZERO, 10);
        assert_eq!(third[0].delivery_count, 3);
    }

    #[tokio::test]
    async fn redeliver_own_claims_before_new_entries() {
        let log = MemoryLog::new();
        publish_numbers(&log, 3).await;

        log.ensure_group("test", &group());
        let first = log.claim_batch("test", "worker", "consumer-1", 2);
        assert_eq!(first.len(), 2);

        // The same consumer coming back gets its unacknowledged claims again,
        // without the counter treating this as a fresh attempt
        let replayed = log.pending_for_consumer("test", "worker", "consumer-1", 0, 10);
        let offsets: Vec<u64> = replayed.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 1]);
        assert!(replayed.iter().all(|e| e.delivery_count == 1));

        // Claims held by someone else are not handed out
        let foreign = log.pending_for_consumer("test", "worker", "consumer-2", 0, 10);
        assert!(foreign.is_empty());

        // Acknowledged entries no longer show up
        log.acknowledge("test", "worker", "consumer-1", 0).unwrap();
        let remaining = log.pending_for_consumer("test", "worker", "consumer-1", 0, 10);
        let offsets: Vec<u64> = remaining.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![1]);
    }

    #[tokio::test]
    async fn evict_oldest_entries_beyond_the_limit() {
        let log = MemoryLog::new();
        let bounded = QueueDescriptor::new("test".into(), 2);

        for i in 0..5 {
            log.publish_raw(format!("{}", i).as_bytes(), bounded.clone())
                .await
                .unwrap();
        }

        assert_eq!(log.len("test"), 2);

        log.ensure_group("test", &group());
        let claimed = log.claim_batch("test", "worker", "consumer-1", 10);
        let payloads: Vec<String> = claimed
            .iter()
            .map(|e| String::from_utf8(e.payload.to_vec()).unwrap())
            .collect();

        assert_eq!(payloads, vec!["3", "4"]);
    }

    #[tokio::test]
    async fn start_tail_groups_at_the_end() {
        let log = MemoryLog::new();
        publish_numbers(&log, 3).await;

        let tail_group =
            ConsumerGroupDescriptor::new(ConsumerGroupIdentifier::Worker, QueueLocation::Tail);
        log.ensure_group("test", &tail_group);

        assert!(log.claim_batch("test", "worker", "consumer-1", 10).is_empty());

        publish_numbers(&log, 1).await;
        assert_eq!(log.claim_batch("test", "worker", "consumer-1", 10).len(), 1);
    }
}
