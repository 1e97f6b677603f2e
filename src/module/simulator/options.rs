use crate::library::helpers::{parse_millis, parse_seconds};
use std::time::Duration;
use structopt::StructOpt;

/// Options for the simulator module
#[derive(Debug, StructOpt)]
pub struct Options {
    /// Base URL of the ingest service
    #[structopt(long, env, default_value = "http://localhost:40080")]
    pub ingest_url: String,

    /// Base URL of the query service
    #[structopt(long, env, default_value = "http://localhost:40081")]
    pub query_url: String,

    /// Total duration of the simulation in seconds
    #[structopt(long, env, default_value = "60", parse(try_from_str = parse_seconds))]
    pub duration: Duration,

    /// Number of synthetic round-trips started per second
    #[structopt(long, env, default_value = "5")]
    pub rate: usize,

    /// Upper bound on concurrently running round-trips.
    /// When the pipeline falls behind, additional round-trips are
    /// counted as failures instead of being queued indefinitely.
    #[structopt(long, env, default_value = "50")]
    pub max_in_flight: usize,

    /// Milliseconds between status polls of a single round-trip
    #[structopt(long, env, default_value = "500", parse(try_from_str = parse_millis))]
    pub poll_interval: Duration,

    /// Seconds a round-trip may take before it counts as a functional failure
    #[structopt(long, env, default_value = "10", parse(try_from_str = parse_seconds))]
    pub poll_timeout: Duration,

    /// Seconds between health checks of the ingest and query services
    #[structopt(long, env, default_value = "5", parse(try_from_str = parse_seconds))]
    pub probe_interval: Duration,

    /// Seconds a health check may take before the service counts as down
    #[structopt(long, env, default_value = "2", parse(try_from_str = parse_seconds))]
    pub health_timeout: Duration,
}
