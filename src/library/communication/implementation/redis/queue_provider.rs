use super::super::super::super::BoxedError;
use super::super::super::event::{
    ConsumerGroupDescriptor, QueueDescriptor, QueueLocation, QueueProvider,
};
use super::{
    RedisFactory, RedisQueueEntry, PENDING_RANGE_END, PENDING_RANGE_START, STREAM_ID_ADDITIONS,
    STREAM_ID_HEAD, STREAM_ID_TAIL,
};
use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use redis::aio::{Connection, MultiplexedConnection};
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;
use std::convert::TryInto;
use std::time::Duration;
use tracing::error;

/// Queue provider implementation using [Redis Streams](https://redis.io/topics/streams-intro)
pub struct RedisQueueProvider {
    factory: RedisFactory,
}

impl RedisQueueProvider {
    /// Creates a new instance with a given [`RedisFactory`]
    pub fn new(factory: RedisFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl QueueProvider for RedisQueueProvider {
    type Entry = RedisQueueEntry;

    /// Consumes a redis stream data structure using the following steps:
    ///
    /// 1. Create the stream and/or consumer group if it does not exist
    /// 2. Start streaming entries from the PEL until the queue head is reached
    /// 3. Wait for and stream new entries in a blocking manner
    /// 4. Bail if no messages have been received within `idle_timeout` or block indefinitely
    async fn consume(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        batch_size: usize,
        idle_timeout: Option<Duration>,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        let key = queue.key().to_owned();

        // Dedicated connection for the blocking XREADGROUP command
        let mut con = self.factory.owned_connection().await?;

        // Create the group if it does not exist
        create_consumer_group(&mut con, &key, group).await;

        let block_duration = idle_timeout
            .map(|d| d.as_millis().try_into().unwrap_or_default())
            .unwrap_or_default();

        let read_options = StreamReadOptions::default()
            .group(group.identifier().to_string(), consumer)
            .count(batch_size)
            .block(block_duration);

        // Shared connection handed to each entry for acknowledgement
        let ack_con = self.factory.shared_connection().await?;

        let group_name = group.identifier().to_string();
        let stream = xread_stream(con, read_options, key.clone())
            .then(move |item| {
                let mut con = ack_con.clone();
                let key = key.clone();
                let group_name = group_name.clone();

                async move {
                    let (entry, replayed) = item?;

                    // Entries replayed from the PEL carry their real delivery
                    // counter, fresh deliveries are always on their first
                    let delivery_count = if replayed {
                        pending_delivery_count(&mut con, &key, &group_name, &entry.id).await
                    } else {
                        1
                    };

                    let entry =
                        RedisQueueEntry::new(con, entry, key, group_name, delivery_count)?;
                    Ok::<_, BoxedError>(entry)
                }
            })
            .boxed();

        Ok(stream)
    }

    /// Surfaces expired claims using [`XPENDING`](https://redis.io/commands/xpending)
    /// followed by [`XCLAIM`](https://redis.io/commands/xclaim)
    ///
    /// The `min_idle` filter is passed to `XCLAIM` as well so a claim raced away by
    /// another group member in between the two commands is not stolen back.
    async fn reclaim(
        &self,
        queue: QueueDescriptor,
        group: &ConsumerGroupDescriptor,
        consumer: &str,
        min_idle: Duration,
        batch_size: usize,
    ) -> Result<Vec<Self::Entry>, BoxedError> {
        let key = queue.key().to_owned();
        let group_name = group.identifier().to_string();
        let min_idle_ms: usize = min_idle.as_millis().try_into().unwrap_or(usize::MAX);

        let mut con = self.factory.shared_connection().await?;

        let pending: StreamPendingCountReply = con
            .xpending_count(
                &key,
                &group_name,
                PENDING_RANGE_START,
                PENDING_RANGE_END,
                batch_size,
            )
            .await?;

        let mut delivery_counts: HashMap<String, u32> = HashMap::new();
        let mut expired_ids: Vec<String> = Vec::new();

        for id in pending.ids {
            // last_delivered_ms carries the idle time of the claim
            if id.last_delivered_ms >= min_idle_ms {
                delivery_counts.insert(id.id.clone(), id.times_delivered as u32);
                expired_ids.push(id.id);
            }
        }

        if expired_ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = con
            .xclaim(&key, &group_name, consumer, min_idle_ms, &expired_ids)
            .await?;

        let mut entries = Vec::with_capacity(claimed.ids.len());

        for entry in claimed.ids {
            // XCLAIM increments the delivery counter of every transferred entry
            let delivery_count = delivery_counts
                .get(&entry.id)
                .copied()
                .unwrap_or_default()
                .saturating_add(1);

            entries.push(RedisQueueEntry::new(
                con.clone(),
                entry,
                key.clone(),
                group_name.clone(),
                delivery_count,
            )?);
        }

        Ok(entries)
    }
}

async fn create_consumer_group(con: &mut Connection, key: &str, group: &ConsumerGroupDescriptor) {
    let start_id = match group.start() {
        QueueLocation::Head => STREAM_ID_HEAD,
        QueueLocation::Tail => STREAM_ID_TAIL,
    };

    con.xgroup_create_mkstream::<_, _, _, ()>(key, group.identifier().to_string(), start_id)
        .await
        .ok();
}

/// Looks up how often a pending entry has been delivered already
///
/// Falls back to one when the entry vanished from the PEL in between, which
/// only happens when it was acknowledged or claimed away concurrently.
async fn pending_delivery_count(
    con: &mut MultiplexedConnection,
    key: &str,
    group: &str,
    id: &str,
) -> u32 {
    let reply: RedisResult<StreamPendingCountReply> =
        con.xpending_count(key, group, id, id, 1).await;

    match reply {
        Ok(reply) => reply
            .ids
            .first()
            .map(|entry| entry.times_delivered as u32)
            .unwrap_or(1),
        Err(_) => 1,
    }
}

fn xread_stream(
    con: Connection,
    options: StreamReadOptions,
    key: String,
) -> BoxStream<'static, RedisResult<(StreamId, bool)>> {
    let initial_id: String = STREAM_ID_HEAD.to_string();

    let stream = stream::unfold((con, options, initial_id), move |(mut con, options, id)| {
        let key = key.to_owned();

        async move {
            let result = con
                .xread_options::<_, _, StreamReadReply>(&[&key], &[&id], &options)
                .await;

            match result {
                Ok(mut reply) => {
                    if let Some(stream) = reply.keys.pop() {
                        assert_eq!(stream.key, key);

                        // If we are already operating on "latest" then continue doing so
                        if id == STREAM_ID_ADDITIONS {
                            Some((Ok((stream.ids, false)), (con, options, id)))
                        }
                        // If we are processing pending messages after a crash and have more, run through them
                        else if let Some(next_id) =
                            stream.ids.last().map(|entry| entry.id.to_owned())
                        {
                            Some((Ok((stream.ids, true)), (con, options, next_id)))
                        }
                        // If we have finished processing pending messages after a crash, move to "latest"
                        else {
                            Some((
                                Ok((stream.ids, true)),
                                (con, options, STREAM_ID_ADDITIONS.to_string()),
                            ))
                        }
                    } else {
                        None
                    }
                }
                Err(e) => {
                    error!("Encountered error reading from redis stream {:?}", e);
                    None
                }
            }
        }
    });

    // It is possible to stream in batches (receiving multiple entries from the redis)
    // by setting the options.count value >1. The resulting stream will still yield
    // one at a time to make it easier to use.
    stream
        .flat_map(|result| match result {
            Ok((batch, replayed)) => stream::iter(batch)
                .map(move |entry| Ok((entry, replayed)))
                .boxed(),
            Err(e) => stream::once(async { Err(e) }).boxed(),
        })
        .boxed()
}
