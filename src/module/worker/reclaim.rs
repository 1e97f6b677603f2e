use super::processor::{EchoProcessor, EventProcessorService, ProcessorConfig};
use crate::domain::EventReceivedNotification;
use crate::harness::RedisCommunicationFactory;
use crate::library::communication::event::{
    ConsumerExt, ConsumerGroupDescriptor, Notification, QueueProvider,
};
use crate::library::communication::CommunicationFactory;
use crate::library::helpers::Backoff;
use crate::library::storage::SqliteResultStore;
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Job periodically sweeping expired claims back into processing
///
/// Entries claimed by a crashed or stalled worker stay invisible to the regular
/// delivery stream. This job takes over claims older than the claim timeout and
/// pushes them through the same consumption path, bumping their delivery count.
pub struct ReclaimJob {
    redis_url: String,
    group: ConsumerGroupDescriptor,
    consumer: String,
    claim_timeout: Duration,
    batch_size: usize,
    config: ProcessorConfig<EchoProcessor, SqliteResultStore>,
}

impl ReclaimJob {
    /// Creates a new instance from raw parts
    pub fn new(
        redis_url: String,
        group: ConsumerGroupDescriptor,
        consumer: String,
        claim_timeout: Duration,
        batch_size: usize,
        config: ProcessorConfig<EchoProcessor, SqliteResultStore>,
    ) -> Self {
        Self {
            redis_url,
            group,
            consumer,
            claim_timeout,
            batch_size,
            config,
        }
    }
}

#[async_trait]
impl Job for ReclaimJob {
    const NAME: &'static str = module_path!();
    const SUPPORTS_GRACEFUL_TERMINATION: bool = true;

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let factory = RedisCommunicationFactory::new(&self.redis_url)?;
        let provider = factory.queue_provider();
        let service = EventProcessorService::new(
            self.config.processor.clone(),
            self.config.store.clone(),
            self.config.max_attempts,
        );

        // Sweep twice per claim timeout so takeover latency stays bounded
        let interval = std::cmp::max(self.claim_timeout / 2, MIN_SWEEP_INTERVAL);

        let signal = manager.termination_signal();
        tokio::pin!(signal);

        manager.ready().await;

        let mut backoff = Backoff::default();

        loop {
            tokio::select! {
                _ = &mut signal => break,
                _ = sleep(interval) => {
                    let reclaimed = provider
                        .reclaim(
                            EventReceivedNotification::queue(),
                            &self.group,
                            &self.consumer,
                            self.claim_timeout,
                            self.batch_size,
                        )
                        .await;

                    match reclaimed {
                        Ok(entries) => {
                            backoff = Backoff::default();

                            if !entries.is_empty() {
                                debug!(count = entries.len(), "Took over expired claims");
                            }

                            for entry in entries {
                                service.consume_entry(entry).await;
                            }
                        }
                        Err(e) => {
                            warn!("Reclaim sweep failed: {}", e);

                            // Do not hammer an unreachable queue at the sweep interval
                            if let Some(delay) = backoff.next() {
                                sleep(delay).await;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
