use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(about = "Durable event delivery pipeline with competing-consumer workers.")]
pub struct MainOptions {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        global = true,
        default_value = "info,hyper=warn,warp=warn,sqlx=warn,tower=warn,h2=warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,

    /// Format in which log lines are written to stdout
    ///
    /// Formats: text, compact, json
    #[structopt(
        long,
        global = true,
        default_value = "text",
        env,
        value_name = "format"
    )]
    pub log_format: LogFormat,

    /// OpenTelemetry collector endpoint
    ///
    /// Omitting it disables tracing
    #[structopt(long, global = true, env)]
    pub telemetry_endpoint: Option<String>,

    /// Enable status reporting server which can be used as a readiness probe
    #[structopt(long, global = true, env, value_name = "port")]
    pub status_server: Option<u16>,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    Ingest(eventline::module::ingest::Options),
    Worker(eventline::module::worker::Options),
    Query(eventline::module::query::Options),
    Simulator(eventline::module::simulator::Options),
}

impl Command {
    pub fn service_name(&self) -> &'static str {
        match self {
            Command::Ingest(_) => "eventline-ingest",
            Command::Worker(_) => "eventline-worker",
            Command::Query(_) => "eventline-query",
            Command::Simulator(_) => "eventline-simulator",
        }
    }
}

#[derive(Debug)]
pub enum LogFormat {
    Text,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}
