use super::super::super::BoxedError;
use super::{ConsumerGroupDescriptor, QueueDescriptor, QueueEntry};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Allows consumption of notification queues using [consumer groups](ConsumerGroupDescriptor)
#[async_trait]
pub trait QueueProvider {
    /// Type of [`QueueEntry`] returned by the provider
    type Entry: QueueEntry + Send + Sync;

    /// Subscribes to new notifications on a given queue joining the specified
    /// [`ConsumerGroup`](ConsumerGroupDescriptor) with the given consumer name,
    /// creating both if they do not exist.
    ///
    /// Every yielded entry is claimed by `consumer` until it is acknowledged or
    /// its claim expires. After a restart, entries previously claimed by the same
    /// consumer name are yielded first so work can be resumed.
    async fn consume(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str, // &ConsumerIdentifier
        batch_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError>;

    /// Surfaces entries whose claim has been idle for at least `min_idle` without
    /// an acknowledgement, transferring their claim to `consumer`.
    ///
    /// Returned entries carry an incremented [`delivery_count`](super::RawQueueEntry::delivery_count).
    /// This is the recovery path for entries owned by crashed consumers and has to be
    /// called periodically by live group members.
    async fn reclaim(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str, // &ConsumerIdentifier
        min_idle: Duration,
        batch_size: usize,
    ) -> Result<Vec<Self::Entry>, BoxedError>;
}
