use super::super::super::event::{QueueDescriptor, RawNotificationPublisher};
use super::super::super::super::EmptyResult;
use super::RedisFactory;
use super::{STREAM_ID_NEW, STREAM_PAYLOAD_KEY};
use async_trait::async_trait;
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;

/// [`NotificationPublisher`](super::super::super::event::NotificationPublisher) implementation
/// using [`XADD`](https://redis.io/commands/xadd)
///
/// Streams are capped to the [`limit`](QueueDescriptor::limit) of their descriptor using
/// approximate trimming.
#[derive(Clone)]
pub struct RedisPublisher {
    factory: RedisFactory,
}

impl RedisPublisher {
    /// Creates a new instance on top of a [`RedisFactory`]
    pub fn new(factory: RedisFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl RawNotificationPublisher for RedisPublisher {
    async fn publish_raw(&self, data: &[u8], descriptor: QueueDescriptor) -> EmptyResult {
        let limit = StreamMaxlen::Approx(descriptor.limit());
        let mut con = self.factory.shared_connection().await?;

        let result = con
            .xadd_maxlen::<_, _, _, _, ()>(
                descriptor.key(),
                limit,
                STREAM_ID_NEW,
                &[(STREAM_PAYLOAD_KEY, data)],
            )
            .await;

        if let Err(e) = result {
            self.factory.invalidate_shared().await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn ping(&self) -> EmptyResult {
        let mut con = self.factory.shared_connection().await?;

        if let Err(e) = redis::cmd("PING").query_async::<_, ()>(&mut con).await {
            self.factory.invalidate_shared().await;
            return Err(e.into());
        }

        Ok(())
    }
}
