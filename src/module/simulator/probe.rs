use super::client::PipelineClient;
use super::context::SimulationContext;
use crate::domain::downtime::ProbeTarget;
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Job periodically probing the health endpoints of the pipeline services
pub struct HealthProbeJob {
    client: Arc<PipelineClient>,
    context: Arc<SimulationContext>,
    interval: Duration,
}

impl HealthProbeJob {
    /// Creates a new instance from raw parts
    pub fn new(
        client: Arc<PipelineClient>,
        context: Arc<SimulationContext>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            context,
            interval,
        }
    }
}

#[async_trait]
impl Job for HealthProbeJob {
    const NAME: &'static str = module_path!();
    const SUPPORTS_GRACEFUL_TERMINATION: bool = true;

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let signal = manager.termination_signal();
        tokio::pin!(signal);

        manager.ready().await;

        loop {
            tokio::select! {
                _ = &mut signal => break,
                _ = sleep(self.interval) => {
                    let ingest = self.client.ingest_healthy().await;
                    self.context.record_health(ProbeTarget::Ingest, ingest);

                    let query = self.client.query_healthy().await;
                    self.context.record_health(ProbeTarget::Query, query);
                }
            }
        }

        Ok(())
    }
}
