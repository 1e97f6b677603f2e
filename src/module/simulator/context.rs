use crate::domain::downtime::{AvailabilityTracker, ProbeTarget, ProbeTier};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Shared bookkeeping for one simulation run
///
/// Probe and load jobs feed their observations in concurrently, the module
/// turns it into a report once everything has shut down.
#[derive(Default)]
pub struct SimulationContext {
    tracker: Mutex<AvailabilityTracker>,
    round_trips: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    latency_ms_total: AtomicU64,
}

impl SimulationContext {
    /// Creates an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a health observation for a service
    pub fn record_health(&self, target: ProbeTarget, healthy: bool) {
        self.tracker
            .lock()
            .expect("availability tracker mutex poisoned")
            .record_health(target, healthy, Utc::now());
    }

    /// Records the outcome and duration of a completed synthetic round-trip
    pub fn record_round_trip(&self, success: bool, latency: Duration) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.latency_ms_total
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        self.tracker
            .lock()
            .expect("availability tracker mutex poisoned")
            .record_functional(success, Utc::now());
    }

    /// Closes all open downtime windows
    pub fn flush(&self) {
        self.tracker
            .lock()
            .expect("availability tracker mutex poisoned")
            .close_all(Utc::now());
    }

    /// Number of round-trips that did not complete successfully
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Writes a human readable summary of the run to the log
    pub fn report(&self) {
        let now = Utc::now();
        let tracker = self
            .tracker
            .lock()
            .expect("availability tracker mutex poisoned");

        let round_trips = self.round_trips.load(Ordering::Relaxed);
        let mean_latency_ms = match round_trips {
            0 => 0,
            n => self.latency_ms_total.load(Ordering::Relaxed) / n,
        };

        info!(
            round_trips,
            successes = self.successes.load(Ordering::Relaxed),
            failures = self.failures.load(Ordering::Relaxed),
            mean_latency_ms,
            "Synthetic load summary"
        );

        for interval in tracker.intervals() {
            warn!(
                target_service = ?interval.target,
                tier = ?interval.tier,
                reason = ?interval.reason,
                started_at = %interval.started_at,
                duration_ms = interval.duration(now).num_milliseconds(),
                "Observed downtime window"
            );
        }

        info!(
            health_downtime_ms = tracker.total_downtime(ProbeTier::Health, now).num_milliseconds(),
            functional_downtime_ms = tracker
                .total_downtime(ProbeTier::Functional, now)
                .num_milliseconds(),
            "Downtime totals"
        );
    }
}

#[cfg(test)]
mod does {
    use super::*;

    #[test]
    fn count_round_trip_outcomes() {
        let context = SimulationContext::new();

        context.record_round_trip(true, Duration::from_millis(20));
        context.record_round_trip(false, Duration::from_millis(40));
        context.record_round_trip(false, Duration::ZERO);

        assert_eq!(context.failure_count(), 2);
    }
}
