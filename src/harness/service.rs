use super::RedisCommunicationFactory;
use crate::library::communication::event::{ConsumerExt, ConsumerGroupDescriptor};
use crate::library::communication::CommunicationFactory;
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use std::time::Duration;

/// Structure which can be instantiated with a [`CommunicationFactory`]
pub trait Service<F: CommunicationFactory + Send + Sync> {
    /// Name of the service displayed in log messages
    const NAME: &'static str;
    /// Instance type which will be instantiated
    type Instance: Send + Sync;
    /// Configuration type passed to the service
    type Config: Send + Sync;

    /// Creates a new instance which could be of a different type
    fn instantiate(factory: F, config: &Self::Config) -> Self::Instance;
}

/// Runner for [`Service`] implementations where [`Service::Instance`] conforms to the [`ConsumerExt`] trait
pub struct ServiceRunner<S: Service<RedisCommunicationFactory>> {
    redis_url: String,
    group: ConsumerGroupDescriptor,
    consumer: String,
    batch_size: usize,
    idle_timeout: Option<Duration>,
    config: <S as Service<RedisCommunicationFactory>>::Config,
}

impl<S> ServiceRunner<S>
where
    S: Service<RedisCommunicationFactory>,
    S::Instance: ConsumerExt + Send + Sync,
{
    /// Creates a new runner job which will connect to the given redis server and use the provided consumer group and name
    pub fn new(
        redis_url: String,
        group: ConsumerGroupDescriptor,
        consumer: String,
        batch_size: usize,
        idle_timeout: Option<Duration>,
        config: <S as Service<RedisCommunicationFactory>>::Config,
    ) -> Self {
        Self {
            redis_url,
            group,
            consumer,
            batch_size,
            idle_timeout,
            config,
        }
    }
}

#[async_trait]
impl<S> Job for ServiceRunner<S>
where
    S: Service<RedisCommunicationFactory> + Send + Sync,
    S::Instance: ConsumerExt,
{
    const NAME: &'static str = "ServiceRunner";

    fn name(&self) -> String {
        format!("{}({})", Self::NAME, S::NAME)
    }

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let factory = RedisCommunicationFactory::new(&self.redis_url)?;
        let provider = factory.queue_provider();
        let service = S::instantiate(factory, &self.config);

        manager.ready().await;

        service
            .consume_queue(
                provider,
                &self.group,
                &self.consumer,
                self.batch_size,
                self.idle_timeout,
            )
            .await?;

        Ok(())
    }
}
