use super::event::{NotificationPublisher, QueueProvider};

/// Factory to provide implementations for the traits from this module
pub trait CommunicationFactory {
    /// [`QueueProvider`] implementation type
    type QueueProvider: QueueProvider + Send + Sync;
    /// [`NotificationPublisher`] implementation type
    type NotificationPublisher: NotificationPublisher + Send + Sync;

    /// Instantiates a new [`QueueProvider`]
    fn queue_provider(&self) -> Self::QueueProvider;
    /// Instantiates a new [`NotificationPublisher`]
    fn notification_publisher(&self) -> Self::NotificationPublisher;
}
