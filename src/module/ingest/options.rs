use crate::module::options::RedisOptions;
use structopt::StructOpt;

/// Options for the ingest module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub redis: RedisOptions,

    /// Maximum accepted size of a submitted event payload in bytes.
    /// Larger requests are rejected before the body is read to cap
    /// the memory usage of a single submission.
    #[structopt(long, env, default_value = "65536")]
    pub payload_size_limit: u64,
}
