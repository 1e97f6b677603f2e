use super::super::super::BoxedError;
use super::Notification;
use super::{ConsumerGroupDescriptor, NotificationFrame};
use super::{QueueEntry, QueueProvider};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::any::type_name;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const DEFAULT_CONCURRENCY: usize = 10;

/// Failure modes a [`Consumer`] may report for a single delivery
///
/// Anything the consumer resolves internally (including permanent processing
/// failures that have been recorded) is an `Ok(())` from its point of view and
/// results in an acknowledgement.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Processing could not complete due to a temporary condition. The entry is
    /// left unacknowledged so it becomes eligible for reclaim-driven redelivery.
    #[error("transient failure, delivery left for redelivery")]
    Transient(#[source] BoxedError),
}

/// Notification delivered to a [`Consumer`] together with its claim metadata
#[derive(Debug)]
pub struct Delivery<N> {
    /// The framed notification parsed from the queue entry
    pub notification: NotificationFrame<N>,
    /// Position of the underlying entry within its queue
    pub sequence: String,
    /// How many times this entry has been delivered so far, including this delivery
    pub delivery_count: u32,
}

/// Entity which may consume and process [`Notifications`](Notification)
#[async_trait]
pub trait Consumer {
    /// Notification to consume
    type Notification: Notification;

    /// Processes a delivered notification
    ///
    /// Returning `Ok(())` acknowledges the entry, [`ConsumeError::Transient`] leaves
    /// it claimed-but-unacknowledged for a later reclaim.
    async fn consume(&self, delivery: Delivery<Self::Notification>) -> Result<(), ConsumeError>;
}

/// Helper functions to aid the consumption of messages
#[async_trait]
pub trait ConsumerExt {
    /// Consumes notifications from a queue using the given provider, acknowledging
    /// deliveries the consumer resolved and leaving transient failures for reclaim.
    async fn consume_queue<Q>(
        &self,
        provider: Q,
        group: &ConsumerGroupDescriptor,
        consumer: &str, // &ConsumerIdentifier
        batch_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Result<(), BoxedError>
    where
        Q: QueueProvider + Send + Sync;

    /// Pushes a single already-claimed entry through the consumption path
    ///
    /// Used by reclaim sweeps which take over expired claims outside of the
    /// regular delivery stream.
    async fn consume_entry<E>(&self, entry: E)
    where
        E: QueueEntry + Send + Sync;
}

#[async_trait]
impl<C> ConsumerExt for C
where
    C: Consumer + Send + Sync,
    C::Notification: DeserializeOwned + Send + Sync,
{
    async fn consume_queue<Q>(
        &self,
        provider: Q,
        group: &ConsumerGroupDescriptor,
        consumer: &str, // &ConsumerIdentifier
        batch_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Result<(), BoxedError>
    where
        Q: QueueProvider + Send + Sync,
    {
        let stream = provider
            .consume(
                C::Notification::queue(),
                group,
                consumer,
                batch_size,
                idle_timeout,
            )
            .await?;

        stream
            .for_each_concurrent(Some(DEFAULT_CONCURRENCY), |item| async move {
                match item {
                    Ok(entry) => self.consume_entry(entry).await,
                    Err(e) => error!(
                        "Failed to receive notification {}: {}",
                        type_name::<C::Notification>(),
                        e
                    ),
                }
            })
            .await;

        Ok(())
    }

    async fn consume_entry<E>(&self, mut entry: E)
    where
        E: QueueEntry + Send + Sync,
    {
        let frame = match entry.parse_payload::<NotificationFrame<C::Notification>>() {
            Ok(frame) => frame,
            Err(e) => {
                // A poison entry will never deserialize, acknowledge it so the
                // queue does not redeliver it indefinitely.
                error!(
                    "Failed to deserialize {}, discarding entry: {}",
                    type_name::<C::Notification>(),
                    e
                );
                if let Err(e) = entry.acknowledge().await {
                    warn!("Failed to acknowledge poison entry: {}", e);
                }
                return;
            }
        };

        let delivery = Delivery {
            notification: frame,
            sequence: entry.sequence().to_owned(),
            delivery_count: entry.delivery_count(),
        };

        match self.consume(delivery).await {
            Ok(_) => {
                if let Err(e) = entry.acknowledge().await {
                    // The claim expired and was handed to another consumer. Our
                    // local progress for this entry is void, the late store write
                    // is fenced by the conditional upsert.
                    warn!(
                        sequence = entry.sequence(),
                        "Failed to acknowledge {}: {}",
                        type_name::<C::Notification>(),
                        e
                    );
                }
            }
            Err(ConsumeError::Transient(e)) => {
                debug!(
                    sequence = entry.sequence(),
                    delivery_count = entry.delivery_count(),
                    "Leaving delivery unacknowledged after transient failure: {}",
                    e
                );
            }
        }
    }
}
