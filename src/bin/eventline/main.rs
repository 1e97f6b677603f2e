use anyhow::Result;
use eventline::harness::ModuleRunner;
use eventline::module::ingest::Ingest;
use eventline::module::query::Query;
use eventline::module::simulator::Simulator;
use eventline::module::worker::Worker;
use options::{Command, LogFormat, MainOptions};
use structopt::StructOpt;
use tracing::info;

mod options;
mod telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let options = MainOptions::from_args();
    let telemetry_enabled = options.telemetry_endpoint.is_some();
    let runner = init(&options)?;

    match options.command {
        Command::Ingest(options) => runner.run(Ingest::new(options)).await,
        Command::Worker(options) => runner.run(Worker::new(options)).await,
        Command::Query(options) => runner.run(Query::new(options)).await,
        Command::Simulator(options) => runner.run(Simulator::new(options)).await,
    };

    if telemetry_enabled {
        telemetry::flush();
    }

    Ok(())
}

fn init(options: &MainOptions) -> Result<ModuleRunner> {
    match &options.telemetry_endpoint {
        Some(endpoint) => telemetry::try_init(endpoint, options.command.service_name())?,
        None => {
            let formatter = tracing_subscriber::fmt().with_env_filter(options.log.as_str());

            match options.log_format {
                LogFormat::Text => formatter.init(),
                LogFormat::Compact => formatter.compact().init(),
                LogFormat::Json => formatter.json().init(),
            }
        }
    }

    let runner = match options.status_server {
        Some(port) => ModuleRunner::new_with_status_server(port),
        None => ModuleRunner::default(),
    };

    info!("Eventline {}", env!("CARGO_PKG_VERSION"));

    Ok(runner)
}
