use crate::library::helpers::{parse_millis, parse_seconds};
use crate::module::options::{QueueingOptions, RedisOptions, StorageOptions};
use std::time::Duration;
use structopt::StructOpt;

/// Options for the worker module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub queueing: QueueingOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub redis: RedisOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub storage: StorageOptions,

    /// Number of seconds after which the claim of an unacknowledged delivery
    /// expires and the entry becomes eligible for takeover by another worker
    #[structopt(long, env, default_value = "30", parse(try_from_str = parse_seconds))]
    pub claim_timeout: Duration,

    /// Maximum number of delivery attempts before an event is marked
    /// as permanently failed instead of being redelivered again
    #[structopt(long, env, default_value = "5")]
    pub max_attempts: u32,

    /// Number of log entries to request per read
    #[structopt(long, env, default_value = "10")]
    pub batch_size: usize,

    /// Artificial processing duration per event in milliseconds.
    /// Simulates CPU bound work during load experiments.
    #[structopt(long, env, default_value = "0", parse(try_from_str = parse_millis))]
    pub processing_delay: Duration,
}
