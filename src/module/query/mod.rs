//! Read-side API answering event status lookups from the result store

use crate::harness::{Heart, Module};
use crate::library::BoxedError;
use async_trait::async_trait;
use jatsl::{schedule, JobScheduler};
use server::QueryServerJob;

mod options;
mod server;

pub use options::Options;

/// Module implementation
pub struct Query {
    options: Options,
}

impl Query {
    /// Creates a new instance from raw parts
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Module for Query {
    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let server_job = QueryServerJob::new(
            crate::constants::PORT_QUERY,
            self.options.storage.url.clone(),
        );

        schedule!(scheduler, { server_job });

        Ok(Some(Heart::without_heart_stone()))
    }
}
