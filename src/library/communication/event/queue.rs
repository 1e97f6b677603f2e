use super::super::super::BoxedError;
use crate::library::EmptyResult;
use async_trait::async_trait;
use serde::Deserialize;

/// Describes a notification queue and its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    key: String,
    limit: usize,
}

impl QueueDescriptor {
    /// Creates a new instance from raw parts
    pub fn new(key: String, limit: usize) -> Self {
        Self { key, limit }
    }

    /// Value which may be used by queue implementations to identify a queue
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum number of notifications to be retained in the queue
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Location within the queue
#[derive(Clone, Copy)]
pub enum QueueLocation {
    /// Start of the queue (not necessarily the first notification as a queue is limited in length)
    Head,
    /// End of the queue (exclusive of the last message)
    Tail,
}

/// Entry retrieved from a [`Queue`](QueueDescriptor) providing a raw payload
#[async_trait]
pub trait RawQueueEntry {
    /// Position of the entry within its queue, unique and monotonic per queue
    fn sequence(&self) -> &str;

    /// Payload of the item
    fn payload(&self) -> &[u8];

    /// Number of times this entry has been delivered to a consumer, starting at `1`
    /// for the first delivery and incremented on every redelivery after a reclaim
    fn delivery_count(&self) -> u32;

    /// Acknowledge the item as processed
    ///
    /// Fails when the claim on this entry has expired and the entry has been handed
    /// to another consumer in the meantime. Callers must treat such a failure as
    /// "somebody else owns this now" and discard their local progress.
    async fn acknowledge(&mut self) -> EmptyResult;
}

/// Useful functions for [`QueueEntry`] implementations with default implementations
pub trait QueueEntry: RawQueueEntry {
    /// Attempts to parse the wire-format payload into a given data structure
    fn parse_payload<'a, T>(&'a self) -> Result<T, BoxedError>
    where
        T: Deserialize<'a>;
}
