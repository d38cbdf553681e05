// SPDX-License-Identifier: MIT
//! Telemetry initialization: availability probe, OTLP providers, log fan-out.
//!
//! [`init_telemetry`] runs once at startup:
//!
//! 1. Probe the collector endpoint ([`crate::probe`]). If nothing is listening,
//!    initialization stops here: nothing is built, written or installed.
//! 2. Otherwise write the endpoint to `OTEL_EXPORTER_OTLP_ENDPOINT`, build span,
//!    metric and log exporters from it (HTTP binary OTLP) and register the
//!    tracer and meter providers as globals.
//! 3. Install a `tracing` subscriber whose log sink is a [`FanOut`] over the
//!    remote handler followed by the console handler (when enabled).
//!
//! # Example
//! ```no_run
//! use otel_fanout::config::TelemetryConfig;
//! use otel_fanout::telemetry::init_telemetry;
//! fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//!     tracing::info!(exporting = handle.is_exporting(), "telemetry ready");
//!     handle.shutdown()?; // optional: flushes pending batches
//!     Ok(())
//! }
//! ```
//!
//! # Shutdown
//! Nothing has to be torn down. [`TelemetryHandle::shutdown`] flushes whatever is
//! still queued; dropping the handle instead may lose the final batches.
//!
//! # Threading Model
//! Batch and periodic processors run on their own threads with the blocking HTTP
//! client. The log fan-out itself runs synchronously on the logging thread.
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::bridge::HandlerLayer;
use crate::config::{TelemetryConfig, ENDPOINT_ENV};
use crate::console::ConsoleHandler;
use crate::dispatcher::FanOut;
use crate::handler::Handler;
use crate::probe::is_collector_available_within;
use crate::remote::OtelHandler;

const TRACER_NAME: &str = env!("CARGO_PKG_NAME");

static INSTALLED: OnceLock<Arc<dyn Handler>> = OnceLock::new();

/// Root handler installed by [`init_telemetry`], if any.
///
/// Useful for code that wants to pass the handler explicitly (or derive scoped
/// handlers from it) instead of going through `tracing` macros.
pub fn installed_handler() -> Option<Arc<dyn Handler>> {
    INSTALLED.get().cloned()
}

struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

/// Handle allowing explicit synchronous shutdown of telemetry providers.
pub struct TelemetryHandle {
    providers: Option<Providers>,
}

impl TelemetryHandle {
    /// Whether the collector was reachable and exporters were configured.
    pub fn is_exporting(&self) -> bool {
        self.providers.is_some()
    }

    /// Flush and shutdown all configured telemetry providers.
    ///
    /// Returns `Ok(())` if every provider shut down cleanly, or when nothing was
    /// exporting. Otherwise the error names each failing provider.
    pub fn shutdown(self) -> Result<()> {
        let Some(providers) = self.providers else {
            return Ok(());
        };
        let mut errs = Vec::new();
        if let Err(e) = providers.tracer.shutdown() {
            errs.push(format!("tracer: {e}"));
        }
        if let Err(e) = providers.meter.shutdown() {
            errs.push(format!("meter: {e}"));
        }
        if let Err(e) = providers.logger.shutdown() {
            errs.push(format!("logger: {e}"));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errs.join(", "))
        }
    }
}

/// Initialize telemetry for the process.
///
/// An unreachable collector is not an error: initialization is skipped
/// entirely. No exporter is built, the environment is left untouched and no
/// subscriber is installed, so the console sink is only ever added next to
/// remote export.
///
/// # Errors
/// Returns an error if an exporter fails to build after the collector was found
/// reachable, or if a global `tracing` subscriber is already set.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<TelemetryHandle> {
    let Some(providers) = connect(&cfg)? else {
        return Ok(TelemetryHandle { providers: None });
    };

    // Remote first, then console.
    let mut handlers: Vec<Box<dyn Handler>> =
        vec![Box::new(OtelHandler::new(&providers.logger, cfg.export_level))];
    if cfg.console {
        handlers.push(Box::new(ConsoleHandler::stdout(cfg.console_level)));
    }

    let root: Arc<dyn Handler> = Arc::new(FanOut::new(handlers));
    let trace_layer = OpenTelemetryLayer::new(providers.tracer.tracer(TRACER_NAME));
    // RUST_LOG, when set, narrows what reaches the handlers.
    let filter = EnvFilter::try_from_default_env().ok();

    Registry::default()
        .with(filter)
        .with(HandlerLayer::new(root.clone()))
        .with(trace_layer)
        .try_init()?;
    let _ = INSTALLED.set(root);

    info!(endpoint = %cfg.endpoint, service = %cfg.service_name, "telemetry export enabled");
    Ok(TelemetryHandle {
        providers: Some(providers),
    })
}

/// Check the collector and, only if it answers, build the export providers.
fn connect(cfg: &TelemetryConfig) -> Result<Option<Providers>> {
    if !is_collector_available_within(&cfg.endpoint, cfg.probe_timeout) {
        return Ok(None);
    }
    build_providers(cfg).map(Some)
}

fn build_providers(cfg: &TelemetryConfig) -> Result<Providers> {
    // Exporters derive their per-signal URLs from this variable.
    std::env::set_var(ENDPOINT_ENV, &cfg.endpoint);

    let resource = Resource::builder()
        .with_service_name(cfg.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", cfg.service_version.clone()),
            KeyValue::new("deployment.environment", cfg.environment.clone()),
        ])
        .build();

    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(cfg.export_timeout)
        .build()?;
    let metric_exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(cfg.export_timeout)
        .build()?;
    let log_exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(cfg.export_timeout)
        .build()?;

    let tracer = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();
    global::set_tracer_provider(tracer.clone());

    let reader = PeriodicReader::builder(metric_exporter)
        .with_interval(cfg.metric_interval)
        .build();
    let meter = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource.clone())
        .build();
    global::set_meter_provider(meter.clone());

    let logger = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    Ok(Providers {
        tracer,
        meter,
        logger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::net::TcpListener;
    use std::time::Duration;

    fn unreachable_endpoint() -> String {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        format!("http://127.0.0.1:{port}")
    }

    fn quick(cfg: TelemetryConfig) -> TelemetryConfig {
        TelemetryConfig {
            probe_timeout: Duration::from_millis(100),
            export_timeout: Duration::from_millis(100),
            ..cfg
        }
    }

    #[test]
    #[serial]
    fn unreachable_collector_without_console_installs_nothing() {
        let before = std::env::var(ENDPOINT_ENV).ok();
        let cfg = quick(
            TelemetryConfig::default()
                .with_endpoint(unreachable_endpoint())
                .with_console(false),
        );

        let handle = init_telemetry(cfg).unwrap();

        assert!(!handle.is_exporting());
        assert!(installed_handler().is_none());
        assert_eq!(std::env::var(ENDPOINT_ENV).ok(), before);
        handle.shutdown().unwrap();
    }

    #[test]
    #[serial]
    fn unreachable_collector_skips_console_too() {
        let before = std::env::var(ENDPOINT_ENV).ok();
        let cfg = quick(
            TelemetryConfig::default()
                .with_endpoint(unreachable_endpoint())
                .with_console(true),
        );

        let handle = init_telemetry(cfg).unwrap();

        assert!(!handle.is_exporting());
        assert!(installed_handler().is_none());
        assert_eq!(std::env::var(ENDPOINT_ENV).ok(), before);
    }

    #[test]
    #[serial]
    fn reachable_collector_gets_providers_and_the_endpoint_variable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let cfg = quick(TelemetryConfig::default().with_endpoint(endpoint.clone()));

        let providers = connect(&cfg).unwrap();

        assert!(providers.is_some());
        assert_eq!(std::env::var(ENDPOINT_ENV).unwrap(), endpoint);
        let handle = TelemetryHandle { providers };
        assert!(handle.is_exporting());
        // Nothing answers HTTP on the listener; only the flush outcome differs.
        let _ = handle.shutdown();
    }
}
