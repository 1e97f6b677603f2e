//! Competing consumer turning logged events into processing results

use crate::harness::{Heart, Module, ServiceRunner};
use crate::library::communication::event::ConsumerGroupDescriptor;
use crate::library::storage::SqliteResultStore;
use crate::library::BoxedError;
use async_trait::async_trait;
use jatsl::{schedule, JobScheduler};
use processor::{ProcessorConfig, ProcessorService};
use reclaim::ReclaimJob;

mod options;
mod processor;
mod reclaim;

pub use options::Options;
pub use processor::{EchoProcessor, EventProcessor, EventProcessorService};

/// Module implementation
pub struct Worker {
    options: Options,
}

impl Worker {
    /// Creates a new instance from raw parts
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Module for Worker {
    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let redis_url = self.options.redis.url.clone();
        let consumer = self.options.queueing.id.clone();
        let group = ConsumerGroupDescriptor::default();

        let store = SqliteResultStore::new(&self.options.storage.url).await?;
        let config = ProcessorConfig {
            processor: EchoProcessor::new(self.options.processing_delay),
            store,
            max_attempts: self.options.max_attempts,
        };

        let runner = ServiceRunner::<ProcessorService<_>>::new(
            redis_url.clone(),
            group.clone(),
            consumer.clone(),
            self.options.batch_size,
            None,
            config.clone(),
        );

        let reclaim_job = ReclaimJob::new(
            redis_url,
            group,
            consumer,
            self.options.claim_timeout,
            self.options.batch_size,
            config,
        );

        schedule!(scheduler, { runner, reclaim_job });

        Ok(Some(Heart::without_heart_stone()))
    }
}
