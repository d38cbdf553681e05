// SPDX-License-Identifier: MIT
//! Structured log records and the [`Handler`] capability.
//!
//! A [`Handler`] decides whether it wants records at a given [`Level`] and, if so,
//! records them somewhere (console, OTLP collector, ...). Binding attributes or
//! opening a group never mutates a handler; it returns a new one. That keeps
//! handlers freely shareable across threads and lets composite handlers such as
//! [`crate::dispatcher::FanOut`] nest without special cases.
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use thiserror::Error;

/// Severity of a log record, ordered from most to least verbose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Upper-case name used in rendered output (`INFO`, `WARN`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown log level `{0}` (expected trace, debug, info, warn or error)")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// A key/value pair attached to a record or bound to a handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One structured log event.
///
/// Records are built once by the caller (usually the [`crate::bridge::HandlerLayer`])
/// and then only read by handlers.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub time: SystemTime,
    pub level: Level,
    /// Module path of the call site that produced the record.
    pub target: String,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl Record {
    /// Create a record stamped with the current time and no attributes.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: SystemTime::now(),
            level,
            target: String::new(),
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(Attr::new(key, value));
        self
    }
}

/// Errors a handler can report for a single record.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
    #[error("{} handlers failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<HandlerError>),
}

fn join_errors(errors: &[HandlerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A log sink.
///
/// Implementations must be safe to call from many threads at once; nothing in
/// this crate adds locking around them.
pub trait Handler: Send + Sync {
    /// Whether records at `level` would be handled.
    fn enabled(&self, level: Level) -> bool;

    /// Record one event.
    fn handle(&self, record: &Record) -> Result<(), HandlerError>;

    /// A new handler that adds `attrs` to every record it handles.
    fn with_attrs(&self, attrs: &[Attr]) -> Box<dyn Handler>;

    /// A new handler that qualifies all later attributes with the group `name`.
    fn with_group(&self, name: &str) -> Box<dyn Handler>;
}
