use super::client::PipelineClient;
use super::context::SimulationContext;
use crate::domain::ProcessingStatus;
use crate::library::EmptyResult;
use async_trait::async_trait;
use jatsl::{Job, JobManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, warn};

/// Job generating synthetic end-to-end round-trips at a fixed rate
///
/// Every round-trip submits one event and polls the query service until the
/// event reaches a terminal status or the poll deadline passes. Only a
/// successfully processed event counts as a functional success.
pub struct LoadGeneratorJob {
    client: Arc<PipelineClient>,
    context: Arc<SimulationContext>,
    rate: usize,
    max_in_flight: usize,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl LoadGeneratorJob {
    /// Creates a new instance from raw parts
    pub fn new(
        client: Arc<PipelineClient>,
        context: Arc<SimulationContext>,
        rate: usize,
        max_in_flight: usize,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            client,
            context,
            rate,
            max_in_flight,
            poll_interval,
            poll_timeout,
        }
    }
}

#[async_trait]
impl Job for LoadGeneratorJob {
    const NAME: &'static str = module_path!();
    const SUPPORTS_GRACEFUL_TERMINATION: bool = true;

    async fn execute(&self, manager: JobManager) -> EmptyResult {
        let budget = Arc::new(Semaphore::new(self.max_in_flight));
        let mut ticker = interval(Duration::from_secs(1));

        let signal = manager.termination_signal();
        tokio::pin!(signal);

        manager.ready().await;

        loop {
            tokio::select! {
                _ = &mut signal => break,
                _ = ticker.tick() => {
                    for _ in 0..self.rate {
                        match budget.clone().try_acquire_owned() {
                            Ok(permit) => {
                                let client = self.client.clone();
                                let context = self.context.clone();
                                let poll_interval = self.poll_interval;
                                let poll_timeout = self.poll_timeout;

                                tokio::spawn(async move {
                                    let started = Instant::now();
                                    let success =
                                        round_trip(&client, poll_interval, poll_timeout).await;
                                    context.record_round_trip(success, started.elapsed());
                                    drop(permit);
                                });
                            }
                            Err(_) => {
                                // The pipeline is so far behind that all in-flight
                                // slots are taken, that is a failure in itself
                                warn!("Round-trip budget exhausted");
                                self.context.record_round_trip(false, Duration::ZERO);
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

async fn round_trip(
    client: &PipelineClient,
    poll_interval: Duration,
    poll_timeout: Duration,
) -> bool {
    let event_id = match client.submit_event().await {
        Ok(id) => id,
        Err(e) => {
            debug!("Event submission failed: {}", e);
            return false;
        }
    };

    let deadline = Instant::now() + poll_timeout;

    while Instant::now() < deadline {
        match client.fetch_status(&event_id).await {
            Ok(Some(ProcessingStatus::Processed)) => return true,
            Ok(Some(ProcessingStatus::Failed)) => {
                debug!(%event_id, "Event settled as failed");
                return false;
            }
            // Still pending or not yet visible, keep polling
            Ok(_) => {}
            // Individual poll errors are absorbed by the deadline
            Err(_) => {}
        }

        sleep(poll_interval).await;
    }

    debug!(%event_id, "Round-trip deadline passed");
    false
}
