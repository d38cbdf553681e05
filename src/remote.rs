// SPDX-License-Identifier: MIT
//! Handler that turns records into OpenTelemetry log records.
//!
//! Records are emitted through an [`SdkLoggerProvider`]; batching and OTLP export
//! are left to whatever processors the provider was built with.
use std::sync::Arc;

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider as _, Severity};
use opentelemetry::Key;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};

use crate::handler::{Attr, Handler, HandlerError, Level, Record, Value};

/// Instrumentation scope name of the emitted records.
pub const LOGGER_NAME: &str = "otel";

/// Crates of the export pipeline itself. Re-exporting their diagnostics would
/// feed the exporter with its own output.
const PIPELINE_CRATES: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "opentelemetry-otlp",
    "opentelemetry_http",
    "opentelemetry-http",
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "tower",
];

#[derive(Clone)]
pub struct OtelHandler {
    logger: Arc<SdkLogger>,
    min_level: Level,
    prefix: String,
    bound: Vec<(Key, AnyValue)>,
}

impl OtelHandler {
    pub fn new(provider: &SdkLoggerProvider, min_level: Level) -> Self {
        Self {
            logger: Arc::new(provider.logger(LOGGER_NAME)),
            min_level,
            prefix: String::new(),
            bound: Vec::new(),
        }
    }

    fn qualified(&self, attr: &Attr) -> (Key, AnyValue) {
        (
            Key::from(format!("{}{}", self.prefix, attr.key)),
            to_any_value(&attr.value),
        )
    }
}

impl Handler for OtelHandler {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        if is_pipeline_target(&record.target) {
            return Ok(());
        }
        let mut log_record = self.logger.create_log_record();
        log_record.set_timestamp(record.time);
        log_record.set_severity_number(severity(record.level));
        log_record.set_severity_text(record.level.as_str());
        log_record.set_body(AnyValue::String(record.message.clone().into()));
        if !record.target.is_empty() {
            log_record.set_target(record.target.clone());
        }
        for (key, value) in &self.bound {
            log_record.add_attribute(key.clone(), value.clone());
        }
        for attr in &record.attrs {
            let (key, value) = self.qualified(attr);
            log_record.add_attribute(key, value);
        }
        self.logger.emit(log_record);
        Ok(())
    }

    fn with_attrs(&self, attrs: &[Attr]) -> Box<dyn Handler> {
        let mut next = self.clone();
        next.bound.extend(attrs.iter().map(|attr| self.qualified(attr)));
        Box::new(next)
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        let mut next = self.clone();
        next.prefix.push_str(name);
        next.prefix.push('.');
        Box::new(next)
    }
}

/// Compares the crate segment of `target` only, so `hyperion::orders` is not
/// mistaken for `hyper`.
fn is_pipeline_target(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or(target);
    PIPELINE_CRATES.contains(&krate)
}

fn severity(level: Level) -> Severity {
    match level {
        Level::Trace => Severity::Trace,
        Level::Debug => Severity::Debug,
        Level::Info => Severity::Info,
        Level::Warn => Severity::Warn,
        Level::Error => Severity::Error,
    }
}

fn to_any_value(value: &Value) -> AnyValue {
    match value {
        Value::Str(s) => AnyValue::String(s.clone().into()),
        Value::I64(v) => AnyValue::Int(*v),
        Value::U64(v) => i64::try_from(*v)
            .map(AnyValue::Int)
            .unwrap_or_else(|_| AnyValue::String(v.to_string().into())),
        Value::F64(v) => AnyValue::Double(*v),
        Value::Bool(v) => AnyValue::Boolean(*v),
    }
}
