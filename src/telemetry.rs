//! Telemetry setup for caddy-dns.
//!
//! Supports:
//! - Tracing with configurable log levels
//! - Prometheus metrics endpoint (with `prometheus` feature)
//! - OpenTelemetry tracing export (with `otel` feature)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Keeps exporters alive; call [`Telemetry::shutdown`] before exit to flush.
#[must_use]
pub struct Telemetry {
    #[cfg(feature = "otel")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

/// Initialize telemetry (tracing, metrics, optional OTLP).
pub fn init(config: &TelemetryConfig) -> Result<Telemetry, BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    #[cfg(feature = "otel")]
    let telemetry = {
        let provider = match config.opentelemetry {
            Some(ref otel_config) => Some(otel::tracer_provider(otel_config)?),
            None => None,
        };
        let otel_layer = provider.as_ref().map(|provider| {
            use opentelemetry::trace::TracerProvider;
            tracing_opentelemetry::layer().with_tracer(provider.tracer("caddy-dns"))
        });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(otel_layer)
            .try_init()?;

        if let Some(ref otel_config) = config.opentelemetry {
            tracing::info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
        }

        Telemetry {
            tracer_provider: provider,
        }
    };

    #[cfg(not(feature = "otel"))]
    let telemetry = {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        if config.opentelemetry.is_some() {
            tracing::warn!("opentelemetry configured but the `otel` feature is disabled");
        }

        Telemetry {}
    };

    match config.prometheus_addr {
        #[cfg(feature = "prometheus")]
        Some(addr) => {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;
            tracing::info!(%addr, "Prometheus metrics exporter started");
        }
        #[cfg(not(feature = "prometheus"))]
        Some(addr) => {
            tracing::warn!(%addr, "prometheus_addr configured but the `prometheus` feature is disabled");
        }
        None => {}
    }

    Ok(telemetry)
}

impl Telemetry {
    /// Flush and stop exporters.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    use super::BoxError;
    use crate::config::OpenTelemetryConfig;

    pub(super) fn tracer_provider(config: &OpenTelemetryConfig) -> Result<SdkTracerProvider, BoxError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .build()?;

        let resource = Resource::builder()
            .with_attributes([
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    config.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    env!("CARGO_PKG_VERSION"),
                ),
            ])
            .build();

        Ok(SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build())
    }
}
