use super::super::super::super::BoxedError;
use super::super::json::JsonQueueEntry;
use super::RedisQueueError;
use super::STREAM_PAYLOAD_KEY;
use crate::library::communication::event::RawQueueEntry;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamId;
use redis::AsyncCommands;

/// Redis based implementation of the [`QueueEntry`](crate::library::communication::event::QueueEntry) trait
pub struct RedisQueueEntry {
    con: MultiplexedConnection,
    id: String,
    key: String,
    group: String,
    payload: Vec<u8>,
    delivery_count: u32,
}

impl RedisQueueEntry {
    pub(super) fn new(
        con: MultiplexedConnection,
        entry: StreamId,
        key: String,
        group: String,
        delivery_count: u32,
    ) -> Result<Self, RedisQueueError> {
        let payload = entry
            .get(STREAM_PAYLOAD_KEY)
            .ok_or(RedisQueueError::MissingPayload)?;

        Ok(Self {
            con,
            id: entry.id,
            key,
            group,
            payload,
            delivery_count,
        })
    }
}

#[async_trait]
impl RawQueueEntry for RedisQueueEntry {
    fn sequence(&self) -> &str {
        &self.id
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    async fn acknowledge(&mut self) -> Result<(), BoxedError> {
        let removed: u64 = self
            .con
            .xack(&self.key, &self.group, &[&self.id])
            .await?;

        // XACK returns the number of entries removed from the PEL. Zero means the
        // claim expired and the entry has been reassigned or acknowledged elsewhere.
        if removed == 0 {
            return Err(format!("entry {} is no longer claimed by this consumer", self.id).into());
        }

        Ok(())
    }
}

impl JsonQueueEntry for RedisQueueEntry {}
