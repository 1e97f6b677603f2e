use super::{super::super::EmptyResult, Notification, NotificationFrame, QueueDescriptor};
use async_trait::async_trait;

/// Structure which allows publishing of serialized data into a queue
#[async_trait]
pub trait RawNotificationPublisher {
    /// Appends an opaque payload to a [`Queue`](QueueDescriptor)
    ///
    /// Implementations must report an error when the queue can not accept writes.
    /// Silently dropping a payload is never permissible as callers rely on a
    /// successful return to confirm durability.
    async fn publish_raw(&self, data: &[u8], descriptor: QueueDescriptor) -> EmptyResult;

    /// Verifies that the queue backend is reachable and accepting commands
    async fn ping(&self) -> EmptyResult;
}

/// Publisher for [`Notifications`](Notification)
#[async_trait]
pub trait NotificationPublisher {
    /// Publishes a [`Notification`] to its designated queue, wrapped in a [`NotificationFrame`]
    async fn publish<N: Notification + Send + Sync>(&self, notification: N) -> EmptyResult;

    /// Verifies that the queue backend is reachable and accepting commands
    async fn ping(&self) -> EmptyResult;
}

#[async_trait]
impl<P> NotificationPublisher for P
where
    P: RawNotificationPublisher + Send + Sync,
{
    async fn publish<N: Notification + Send + Sync>(&self, notification: N) -> EmptyResult {
        let frame = NotificationFrame::new(notification);
        let data = serde_json::to_string(&frame)?;
        self.publish_raw(data.as_bytes(), N::queue()).await
    }

    async fn ping(&self) -> EmptyResult {
        RawNotificationPublisher::ping(self).await
    }
}
