//! Tracing Setup
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` driven by
//! `RUST_LOG`, a fmt layer, and optionally an OpenTelemetry layer exporting
//! spans over OTLP/gRPC.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "true" to export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name for spans (default: market-data-service)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "market-data-service";

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Filter applied when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "market_data_service=info,tower_http=info,hyper=warn";

/// Shuts the tracer provider down when dropped, flushing pending spans.
#[derive(Debug)]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some(provider) = self.tracer_provider.take() else {
            return;
        };
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Whether spans are exported.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name attached to exported spans.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            enabled: lookup("OTEL_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.otlp_endpoint),
            service_name: lookup("OTEL_SERVICE_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.service_name),
        }
    }
}

/// Install the subscriber using configuration from the environment.
///
/// Keep the returned guard alive for the life of the process.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the subscriber with `config`.
///
/// If the OTLP exporter cannot be built, logging continues without span
/// export.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let tracer_provider = if config.enabled {
        match build_tracer_provider(config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                eprintln!("OTLP exporter unavailable, continuing without span export: {e}");
                None
            }
        }
    } else {
        None
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    TelemetryGuard { tracer_provider }
}

fn build_tracer_provider(
    config: &TelemetryConfig,
) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}
