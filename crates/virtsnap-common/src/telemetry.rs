//! Tracing and metrics bootstrap for virtsnap processes
//!
//! Logs are JSON-structured through tracing-subscriber. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans and metrics are additionally
//! pushed over OTLP/gRPC with W3C trace-context propagation; without it the
//! process only logs locally.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Failures while bringing up tracing or metrics export
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An OTLP exporter could not be constructed
    #[error("OTLP exporter setup failed: {0}")]
    Otlp(String),

    /// A global tracing subscriber was already installed
    #[error("tracing subscriber init failed: {0}")]
    Subscriber(String),
}

/// Telemetry settings for one process
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    /// Service name attached to exported spans and metrics
    pub service_name: String,

    /// OTLP collector endpoint; export is disabled when unset
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    /// Settings for a named service, with the exporter endpoint taken from
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn for_service(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
        }
    }
}

/// Downward-API environment variables mapped onto OTel resource attributes
const K8S_RESOURCE_ENV: &[(&str, &str)] = &[
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
];

/// Install the global subscriber and, if configured, the OTLP exporters.
///
/// Call once at process start, before the first log line.
pub fn init_telemetry(settings: TelemetrySettings) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Option<Layer> composes as a no-op layer when export is disabled
    let otel_layer = match &settings.otlp_endpoint {
        Some(endpoint) => {
            let tracer = init_otlp(endpoint, &settings.service_name)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let json_logs = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(log_filter())
        .with(json_logs)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// `RUST_LOG` if present, otherwise a default that keeps virtsnap at debug
/// and the noisier HTTP stack at warn.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,virtsnap=debug,kube=info,tower=warn,hyper=warn"))
}

/// Identity of this process as seen by the collector: service name and
/// version plus whatever the downward API exposes about the pod.
fn detect_resource(service_name: &str) -> Resource {
    let mut attributes = vec![
        KeyValue::new(SERVICE_NAME, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];
    attributes.extend(K8S_RESOURCE_ENV.iter().filter_map(|(var, key)| {
        std::env::var(var)
            .ok()
            .map(|value| KeyValue::new(*key, value))
    }));
    Resource::new(attributes)
}

/// Stand up both OTLP pipelines against one endpoint: a periodic push
/// reader for metrics and a batch exporter for spans. Returns the tracer
/// the subscriber layer hooks into.
fn init_otlp(
    endpoint: &str,
    service_name: &str,
) -> Result<opentelemetry_sdk::trace::Tracer, TelemetryError> {
    let resource = detect_resource(service_name);

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Otlp(e.to_string()))?;
    let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(
            opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter, runtime::Tokio)
                .build(),
        )
        .with_resource(resource.clone())
        .build();
    global::set_meter_provider(meter_provider);

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Otlp(e.to_string()))?;
    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(span_exporter, runtime::Tokio)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider.tracer(service_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_for_service() {
        let settings = TelemetrySettings::for_service("virtsnap-operator");
        assert_eq!(settings.service_name, "virtsnap-operator");
    }

    #[test]
    fn test_detected_resource_is_not_empty() {
        // At minimum the service name and version land in the resource.
        let resource = detect_resource("virtsnap-test");
        assert!(!resource.is_empty());
    }

    #[test]
    fn test_default_filter_directives_parse() {
        // The fallback directives must stay parseable; a typo here would
        // silently drop the filter at startup.
        let filter =
            EnvFilter::new("info,virtsnap=debug,kube=info,tower=warn,hyper=warn").to_string();
        assert!(filter.contains("virtsnap=debug"));
    }
}
