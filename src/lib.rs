// SPDX-License-Identifier: MIT
//! Telemetry bootstrap with a fan-out log handler.
//!
//! This library wires `tracing` + OpenTelemetry for a host process:
//! * A startup probe checks that the OTLP collector accepts connections; if not,
//!   no exporter is ever built.
//! * Traces, metrics and logs are exported over OTLP/HTTP when the collector is up.
//! * Log records fan out to every configured sink (collector, console) through
//!   [`dispatcher::FanOut`], itself just another [`handler::Handler`].
//!
//! The primary entry points are [`telemetry::init_telemetry`] and
//! [`config::TelemetryConfig`].
//!
//! # Quick Start
//! ```no_run
//! use otel_fanout::config::TelemetryConfig;
//! use otel_fanout::telemetry::init_telemetry;
//! fn main() -> anyhow::Result<()> {
//!     let handle = init_telemetry(TelemetryConfig::from_env()?)?;
//!     // business logic
//!     handle.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod bridge;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod handler;
pub mod probe;
pub mod remote;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::TelemetryConfig;
pub use dispatcher::{DeliveryPolicy, FanOut};
pub use handler::{Attr, Handler, HandlerError, Level, Record, Value};
pub use probe::{is_collector_available, normalize_endpoint};
pub use telemetry::{init_telemetry, installed_handler, TelemetryHandle};
