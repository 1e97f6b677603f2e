use anyhow::Result;
use opentelemetry::sdk::propagation::TraceContextPropagator;
use opentelemetry::sdk::trace::{self, IdGenerator, Sampler};
use opentelemetry::sdk::Resource;
use opentelemetry::trace::TraceError;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_semantic_conventions as semcov;
use std::time::Duration;
use tracing::Subscriber;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

pub fn try_init(endpoint: &str, service_name: &str) -> Result<()> {
    with_endpoint(endpoint, service_name)?.try_init()?;
    Ok(())
}

fn with_endpoint(
    endpoint: &str,
    service_name: &str,
) -> Result<impl Subscriber + Send + Sync + 'static, TraceError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource: Vec<KeyValue> = vec![
        semcov::resource::SERVICE_NAME.string(service_name.to_owned()),
        semcov::resource::SERVICE_VERSION.string(env!("CARGO_PKG_VERSION")),
    ];

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(3)),
        )
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(IdGenerator::default())
                .with_max_events_per_span(64)
                .with_max_attributes_per_span(16)
                .with_resource(Resource::new(resource)),
        )
        .install_batch(opentelemetry::runtime::Tokio)?;

    let filter = EnvFilter::from_default_env();
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok(Registry::default().with(filter).with(telemetry))
}

pub fn flush() {
    global::shutdown_tracer_provider();
}
