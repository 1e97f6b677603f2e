//! HTTP ingress accepting event submissions and appending them to the delivery log

use crate::harness::{Heart, Module};
use crate::library::BoxedError;
use async_trait::async_trait;
use jatsl::{schedule, JobScheduler};
use server::IngestServerJob;

mod options;
mod server;

pub use options::Options;

/// Module implementation
pub struct Ingest {
    options: Options,
}

impl Ingest {
    /// Creates a new instance from raw parts
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Module for Ingest {
    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let server_job = IngestServerJob::new(
            crate::constants::PORT_INGEST,
            self.options.redis.url.clone(),
            self.options.payload_size_limit,
        );

        schedule!(scheduler, { server_job });

        Ok(Some(Heart::without_heart_stone()))
    }
}
