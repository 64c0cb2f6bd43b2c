//! Tracer setup and management

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SimpleSpanProcessor, TracerProvider};
use sqlgate_core::ObservabilityConfig;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Global tracer provider holder
static TRACER_PROVIDER: OnceLock<Arc<TracerProvider>> = OnceLock::new();

/// Span processor builders registered before initialization
type ProcessorBuilder = Box<dyn FnOnce() -> SimpleSpanProcessor + Send>;
static SPAN_PROCESSOR_BUILDERS: Mutex<Option<Vec<ProcessorBuilder>>> = Mutex::new(Some(Vec::new()));

/// Register a span processor (and with it an exporter) to attach to the
/// tracer provider. Must be called before [`init_telemetry`]; later calls
/// are ignored with a warning.
pub fn register_span_processor(builder: ProcessorBuilder) -> bool {
    let mut builders = SPAN_PROCESSOR_BUILDERS
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    if let Some(ref mut vec) = *builders {
        vec.push(builder);
        true
    } else {
        tracing::warn!("Attempted to register span processor after telemetry initialization");
        false
    }
}

/// Initialize logging and tracing for the process.
///
/// Installs a tracer provider with any registered span processors, the
/// OpenTelemetry layer, and a fmt layer that writes JSON lines when
/// `config.json_logs` is set. Log levels come from `RUST_LOG`, defaulting to
/// `info`.
///
/// # Example
///
/// ```rust,no_run
/// use sqlgate_core::ObservabilityConfig;
/// use sqlgate_telemetry::init_telemetry;
///
/// init_telemetry(&ObservabilityConfig::default()).expect("failed to install tracing subscriber");
/// ```
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let builders = SPAN_PROCESSOR_BUILDERS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .unwrap_or_default();

    let mut provider_builder = TracerProvider::builder();
    for builder in builders {
        provider_builder = provider_builder.with_span_processor(builder());
    }
    let tracer_provider = provider_builder.build();
    let tracer = tracer_provider.tracer(config.service_name.clone());
    let _ = TRACER_PROVIDER.set(Arc::new(tracer_provider));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_layer = config.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
    });
    let text_layer = (!config.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .try_init()
}

/// Flush and shut down the tracer provider, if one was installed.
pub fn shutdown_telemetry() {
    if let Some(provider) = tracer_provider()
        && let Err(e) = provider.shutdown()
    {
        tracing::warn!(error = %e, "Tracer provider shutdown failed");
    }
}

/// Get the global tracer provider if initialized
pub fn tracer_provider() -> Option<Arc<TracerProvider>> {
    TRACER_PROVIDER.get().cloned()
}
