//! Synthetic load and availability measurement against a running pipeline
//!
//! The simulator acts as an external user: it submits events at a fixed rate,
//! polls for their outcome and probes the service health endpoints. Downtime is
//! classified into two tiers. A failing health endpoint counts against that
//! service, while failed round-trips with healthy services count as functional
//! downtime of the pipeline as a whole.

use crate::harness::{Heart, Module, ModuleTerminationReason};
use crate::library::helpers::wait_for;
use crate::library::{BoxedError, EmptyResult};
use async_trait::async_trait;
use client::PipelineClient;
use context::SimulationContext;
use jatsl::{schedule, JobScheduler};
use load::LoadGeneratorJob;
use probe::HealthProbeJob;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod client;
mod context;
mod load;
mod options;
mod probe;

pub use options::Options;

/// Module implementation
pub struct Simulator {
    options: Options,
    context: Arc<SimulationContext>,
}

impl Simulator {
    /// Creates a new instance from raw parts
    pub fn new(options: Options) -> Self {
        Self {
            options,
            context: Arc::new(SimulationContext::new()),
        }
    }
}

#[async_trait]
impl Module for Simulator {
    async fn pre_startup(&mut self) -> EmptyResult {
        // Measurement starts with both services reachable, anything else would
        // be counted as downtime of the deployment rather than the pipeline.
        let startup_timeout = Duration::from_secs(30);

        for base in [&self.options.ingest_url, &self.options.query_url] {
            let url = format!("{}/healthz", base);

            wait_for(&url, startup_timeout)
                .await
                .map_err(|_| format!("service at {} did not become healthy", base))?;
        }

        Ok(())
    }

    async fn run(&mut self, scheduler: &JobScheduler) -> Result<Option<Heart>, BoxedError> {
        let client = Arc::new(PipelineClient::new(
            self.options.ingest_url.clone(),
            self.options.query_url.clone(),
            self.options.health_timeout,
        ));

        let probe_job = HealthProbeJob::new(
            client.clone(),
            self.context.clone(),
            self.options.probe_interval,
        );

        let load_job = LoadGeneratorJob::new(
            client,
            self.context.clone(),
            self.options.rate,
            self.options.max_in_flight,
            self.options.poll_interval,
            self.options.poll_timeout,
        );

        schedule!(scheduler, { probe_job, load_job });

        Ok(Some(Heart::with_lifetime(self.options.duration).0))
    }

    async fn post_shutdown(&mut self, _termination_reason: ModuleTerminationReason) {
        self.context.flush();
        self.context.report();

        if self.context.failure_count() == 0 {
            info!("All synthetic round-trips completed successfully");
        }
    }
}
