use core::fmt;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::models::like::Toggle;
use crate::util::env::Env;

pub const TRACER_NAME: &str = "blog-counter-tracer";
pub const METER_NAME: &str = "blog-counter";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every telemetry provider for the process.
///
/// Built once in `main`; the request-facing part of it is handed out as a [`Metrics`] handle and
/// stored in the application state rather than reached through `opentelemetry::global`. OTLP
/// export is only wired up when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, otherwise logs go to stdout
/// and the meter provider has no reader.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub tracer_name: &'static str,
    pub collector_url: Option<String>,

    log_filter: String,
    logger_provider: Option<SdkLoggerProvider>,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    pub fn new(env: &Env) -> TelemetryResult<Telemetry> {
        let collector_url = env
            .otel_exporter_otlp_endpoint
            .clone()
            .filter(|url| !url.trim().is_empty());
        let base_resource = base_attrs(&env.api_service_name, env!("CARGO_PKG_VERSION"));

        let (logger_provider, tracer_provider, meter_provider) = match &collector_url {
            Some(url) => (
                Some(build_logger_provider(url, base_resource.clone())?),
                Some(build_tracer_provider(url, base_resource.clone())?),
                build_meter_provider(url, base_resource)?,
            ),
            None => (
                None,
                None,
                SdkMeterProvider::builder()
                    .with_resource(base_resource)
                    .build(),
            ),
        };

        Ok(Self {
            tracer_name: TRACER_NAME,
            collector_url,
            log_filter: env.log_filter.clone(),
            logger_provider,
            tracer_provider,
            meter_provider,
        })
    }

    /// Installs the `tracing` subscriber for the process
    pub fn register(&self) -> TelemetryResult<()> {
        let trace_layer = self.tracer_provider.as_ref().map(|provider| {
            tracing_opentelemetry::layer().with_tracer(provider.tracer(self.tracer_name))
        });
        let log_layer = self
            .logger_provider
            .as_ref()
            .map(|provider| OpenTelemetryTracingBridge::new(provider));

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(EnvFilter::new(&self.log_filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init()?;

        Ok(())
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::new(&self.meter_provider)
    }

    pub fn shutdown(self) {
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("error during metering shutdown: {e:?}");
        }

        if let Some(provider) = self.logger_provider
            && let Err(e) = provider.shutdown()
        {
            eprintln!("error during logging shutdown: {e:?}");
        }

        if let Some(provider) = self.tracer_provider
            && let Err(e) = provider.shutdown()
        {
            eprintln!("error during tracing shutdown: {e:?}");
        }
    }
}

/// Request-level counters, cloned into whatever needs to record against them
#[derive(Clone)]
pub struct Metrics {
    visits_recorded: Counter<u64>,
    likes_toggled: Counter<u64>,
    store_failures: Counter<u64>,
    auth_failures: Counter<u64>,
}

impl Metrics {
    pub fn new(provider: &SdkMeterProvider) -> Self {
        let meter = provider.meter(METER_NAME);

        Self {
            visits_recorded: meter
                .u64_counter("visits.recorded")
                .with_description("visits recorded through the counter endpoint")
                .build(),
            likes_toggled: meter
                .u64_counter("likes.toggled")
                .with_description("like toggles, split by direction")
                .build(),
            store_failures: meter
                .u64_counter("store.failures")
                .with_description("store reads/writes that failed and were degraded")
                .build(),
            auth_failures: meter
                .u64_counter("auth.failures")
                .with_description("like requests rejected for a missing or invalid credential")
                .build(),
        }
    }

    /// Handle backed by a provider with no reader; recorded values go nowhere
    pub fn noop() -> Self {
        Self::new(&SdkMeterProvider::builder().build())
    }

    pub fn visit_recorded(&self) {
        self.visits_recorded.add(1, &[]);
    }

    pub fn like_toggled(&self, toggled: Toggle) {
        let direction = match toggled {
            Toggle::Liked => "liked",
            Toggle::Unliked => "unliked",
        };
        self.likes_toggled
            .add(1, &[KeyValue::new("direction", direction)]);
    }

    pub fn store_failure(&self, op: &'static str) {
        self.store_failures.add(1, &[KeyValue::new("op", op)]);
    }

    pub fn auth_failure(&self) {
        self.auth_failures.add(1, &[]);
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

pub fn build_logger_provider(
    collector_url: &str,
    base_resource: Resource,
) -> TelemetryResult<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

pub fn build_tracer_provider(
    collector_url: &str,
    base_resource: Resource,
) -> TelemetryResult<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

pub fn build_meter_provider(
    collector_url: &str,
    base_resource: Resource,
) -> TelemetryResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(collector_url)
        .with_timeout(EXPORT_TIMEOUT)
        .build()?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn base_attrs(name: &str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name.to_owned()),
            KeyValue::new("service.version", version),
        ])
        .build()
}

pub type TelemetryResult<T> = core::result::Result<T, TelemetryErr>;

#[derive(Debug, Error)]
pub enum TelemetryErr {
    #[error("while building an otlp exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("while installing the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}
