//! Availability bookkeeping for simulated pipeline runs
//!
//! Downtime is tracked as intervals, one per `(target, tier)` pair. An interval
//! opens on the first failed observation and closes on the next successful one
//! of the same pair. Health and functional observations are kept on separate
//! tiers so that a crashed service and a silently stalled pipeline show up as
//! distinct numbers in the final report.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Service a probe observation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTarget {
    /// Ingress gateway accepting submissions
    Ingest,
    /// Query service answering status lookups
    Query,
    /// The pipeline end-to-end, from submission to terminal status
    Pipeline,
}

/// Guarantee a probe observation exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTier {
    /// Service answers its health endpoint
    Health,
    /// Service produces correct end-to-end behaviour
    Functional,
}

/// Why a downtime interval was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeReason {
    /// Health endpoint was unreachable or reported unhealthy
    HealthCheckFailed,
    /// Services were reachable but a round-trip did not complete correctly
    FunctionalFailure,
}

/// Window during which a target did not meet a guarantee
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeInterval {
    /// Affected service
    pub target: ProbeTarget,
    /// Violated guarantee
    pub tier: ProbeTier,
    /// Cause recorded when the window opened
    pub reason: DowntimeReason,
    /// First failed observation
    pub started_at: DateTime<Utc>,
    /// Next successful observation, `None` while the window is still open
    pub ended_at: Option<DateTime<Utc>>,
}

impl DowntimeInterval {
    /// Length of the window, using `now` as the end for open windows
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at.unwrap_or(now) - self.started_at
    }
}

/// Turns a series of probe observations into downtime intervals
///
/// Functional failures observed while any health tier is down are attributed
/// to the health outage and do not open a functional window of their own.
/// All timestamps are caller-provided which keeps the tracker deterministic.
#[derive(Default)]
pub struct AvailabilityTracker {
    open: HashMap<(ProbeTarget, ProbeTier), DowntimeInterval>,
    closed: Vec<DowntimeInterval>,
}

impl AvailabilityTracker {
    /// Creates a tracker with no recorded downtime
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a health observation for a service
    pub fn record_health(&mut self, target: ProbeTarget, healthy: bool, at: DateTime<Utc>) {
        self.record(
            target,
            ProbeTier::Health,
            DowntimeReason::HealthCheckFailed,
            healthy,
            at,
        );
    }

    /// Records the outcome of an end-to-end round-trip
    pub fn record_functional(&mut self, success: bool, at: DateTime<Utc>) {
        if !success && self.health_down() {
            // Already accounted for by the open health window
            return;
        }

        self.record(
            ProbeTarget::Pipeline,
            ProbeTier::Functional,
            DowntimeReason::FunctionalFailure,
            success,
            at,
        );
    }

    fn record(
        &mut self,
        target: ProbeTarget,
        tier: ProbeTier,
        reason: DowntimeReason,
        up: bool,
        at: DateTime<Utc>,
    ) {
        let key = (target, tier);

        if up {
            if let Some(mut interval) = self.open.remove(&key) {
                interval.ended_at = Some(at);
                self.closed.push(interval);
            }
        } else {
            self.open.entry(key).or_insert(DowntimeInterval {
                target,
                tier,
                reason,
                started_at: at,
                ended_at: None,
            });
        }
    }

    fn health_down(&self) -> bool {
        self.open.contains_key(&(ProbeTarget::Ingest, ProbeTier::Health))
            || self.open.contains_key(&(ProbeTarget::Query, ProbeTier::Health))
    }

    /// Closes every open window, usually at the end of a simulation
    pub fn close_all(&mut self, at: DateTime<Utc>) {
        for (_, mut interval) in self.open.drain() {
            interval.ended_at = Some(at);
            self.closed.push(interval);
        }

        self.closed.sort_by_key(|interval| interval.started_at);
    }

    /// All recorded windows, closed ones first, then any still open
    pub fn intervals(&self) -> Vec<DowntimeInterval> {
        let mut intervals = self.closed.clone();
        intervals.extend(self.open.values().cloned());
        intervals
    }

    /// Accumulated downtime across all targets of a given tier
    pub fn total_downtime(&self, tier: ProbeTier, now: DateTime<Utc>) -> Duration {
        self.intervals()
            .iter()
            .filter(|interval| interval.tier == tier)
            .fold(Duration::zero(), |sum, interval| {
                sum + interval.duration(now)
            })
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.ymd(2021, 6, 1).and_hms(12, 0, second)
    }

    #[test]
    fn open_and_close_a_health_window() {
        let mut tracker = AvailabilityTracker::new();

        tracker.record_health(ProbeTarget::Ingest, true, at(0));
        tracker.record_health(ProbeTarget::Ingest, false, at(5));
        tracker.record_health(ProbeTarget::Ingest, false, at(10));
        tracker.record_health(ProbeTarget::Ingest, true, at(15));

        let intervals = tracker.intervals();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].started_at, at(5));
        assert_eq!(intervals[0].ended_at, Some(at(15)));
        assert_eq!(intervals[0].reason, DowntimeReason::HealthCheckFailed);
    }

    #[test]
    fn keep_targets_separate() {
        let mut tracker = AvailabilityTracker::new();

        tracker.record_health(ProbeTarget::Ingest, false, at(0));
        tracker.record_health(ProbeTarget::Query, false, at(2));
        tracker.record_health(ProbeTarget::Ingest, true, at(4));

        let intervals = tracker.intervals();
        assert_eq!(intervals.len(), 2);

        let open: Vec<_> = intervals.iter().filter(|i| i.ended_at.is_none()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].target, ProbeTarget::Query);
    }

    #[test]
    fn attribute_functional_failures_to_health_outages() {
        let mut tracker = AvailabilityTracker::new();

        tracker.record_health(ProbeTarget::Query, false, at(0));
        tracker.record_functional(false, at(1));

        // Only the health window exists
        assert_eq!(tracker.intervals().len(), 1);
        assert_eq!(tracker.intervals()[0].tier, ProbeTier::Health);

        // With health restored, functional failures count on their own
        tracker.record_health(ProbeTarget::Query, true, at(2));
        tracker.record_functional(false, at(3));

        let functional: Vec<_> = tracker
            .intervals()
            .into_iter()
            .filter(|i| i.tier == ProbeTier::Functional)
            .collect();
        assert_eq!(functional.len(), 1);
        assert_eq!(functional[0].reason, DowntimeReason::FunctionalFailure);
    }

    #[test]
    fn close_open_windows_on_demand() {
        let mut tracker = AvailabilityTracker::new();

        tracker.record_health(ProbeTarget::Ingest, false, at(0));
        tracker.record_functional(true, at(1));
        tracker.record_functional(false, at(2));
        tracker.close_all(at(10));

        assert!(tracker.intervals().iter().all(|i| i.ended_at.is_some()));
    }

    #[test]
    fn sum_downtime_per_tier() {
        let mut tracker = AvailabilityTracker::new();

        tracker.record_health(ProbeTarget::Ingest, false, at(0));
        tracker.record_health(ProbeTarget::Ingest, true, at(10));
        tracker.record_functional(false, at(20));
        tracker.record_functional(true, at(25));

        assert_eq!(
            tracker.total_downtime(ProbeTier::Health, at(30)),
            Duration::seconds(10)
        );
        assert_eq!(
            tracker.total_downtime(ProbeTier::Functional, at(30)),
            Duration::seconds(5)
        );
    }
}
