use crate::library::communication::implementation::memory::MemoryLog;
use crate::library::communication::implementation::redis::{
    RedisFactory, RedisPublisher, RedisQueueProvider,
};
use crate::library::communication::CommunicationFactory;
use crate::library::BoxedError;

/// Communication factory backed by a redis server
pub struct RedisCommunicationFactory {
    factory: RedisFactory,
}

impl RedisCommunicationFactory {
    /// Creates a new instance which connects to the given URL
    pub fn new(url: &str) -> Result<Self, BoxedError> {
        Ok(Self {
            factory: RedisFactory::new(url)?,
        })
    }
}

impl CommunicationFactory for RedisCommunicationFactory {
    type QueueProvider = RedisQueueProvider;
    type NotificationPublisher = RedisPublisher;

    fn queue_provider(&self) -> Self::QueueProvider {
        RedisQueueProvider::new(self.factory.clone())
    }

    fn notification_publisher(&self) -> Self::NotificationPublisher {
        RedisPublisher::new(self.factory.clone())
    }
}

/// Communication factory handing out handles onto a shared [`MemoryLog`]
///
/// All instances created from the same factory observe the same queues, which
/// makes it the backend of choice for end-to-end tests.
#[derive(Clone, Default)]
pub struct MemoryCommunicationFactory {
    log: MemoryLog,
}

impl MemoryCommunicationFactory {
    /// Creates a new instance on top of an existing log
    pub fn new(log: MemoryLog) -> Self {
        Self { log }
    }
}

impl CommunicationFactory for MemoryCommunicationFactory {
    type QueueProvider = MemoryLog;
    type NotificationPublisher = MemoryLog;

    fn queue_provider(&self) -> Self::QueueProvider {
        self.log.clone()
    }

    fn notification_publisher(&self) -> Self::NotificationPublisher {
        self.log.clone()
    }
}
