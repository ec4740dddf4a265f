use accounts_backend::{
    cli::run_cli_command,
    configuration::Configuration,
    error::{AccountsError, AccountsResult},
};
use tracing::{error, info, instrument};

#[instrument(err, skip(configuration))]
fn setup_tracing_subscriber(configuration: &Configuration) -> AccountsResult<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;
    use tracing::subscriber::set_global_default;
    use tracing_subscriber::fmt::Layer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    let logging_layer = Layer::default().json().with_span_list(true);
    let subscriber = Registry::default().with(logging_layer);

    let with_otel = if let Some(opentelemetry_url) = configuration.opentelemetry_url.as_ref() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                Resource::new(vec![KeyValue::new("service.name", "accounts-backend")]),
            ))
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(opentelemetry_url),
            )
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .map_err(|error| AccountsError::SetupTracing {
                source: Box::new(error),
            })?;

        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        set_global_default(subscriber.with(otel_layer)).map(|_| true)
    } else {
        set_global_default(subscriber).map(|_| false)
    }
    .map_err(|error| AccountsError::SetupTracing {
        source: Box::new(error),
    })?;

    info!(
        "Set up tracing subscriber successfully {}",
        if with_otel {
            "including opentelemetry"
        } else {
            "without opentelemetry"
        }
    );

    Ok(())
}

pub fn main() -> AccountsResult<()> {
    // Load configuration
    let configuration = Configuration::from_environment()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| AccountsError::TokioRuntime {
            source: Box::new(error),
        })?;

    // the batch exporter of opentelemetry needs a running tokio runtime
    runtime.block_on(async { setup_tracing_subscriber(&configuration) })?;

    info!("Entering tokio runtime...");
    let result = runtime.block_on(async {
        run_cli_command(&configuration).await.map_err(|error| {
            error!("Application error: {error}");
            error
        })
    });

    info!(
        "Tokio runtime returned, shutting down with timeout {}s...",
        configuration.shutdown_timeout.as_secs_f32(),
    );
    runtime.shutdown_timeout(configuration.shutdown_timeout);
    info!("Tokio runtime shut down successfully");

    info!("Terminated");
    result
}
