// SPDX-License-Identifier: MIT
//! Plain-text console sink.
//!
//! Each record becomes one `key=value` line:
//!
//! ```text
//! time=2026-10-16T09:12:03.481Z level=INFO msg="user signed in" req.id=7 user=ada
//! ```
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;

use crate::handler::{Attr, Handler, HandlerError, Level, Record, Value};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Handler writing text lines to stdout or any other writer.
#[derive(Clone)]
pub struct ConsoleHandler {
    out: SharedWriter,
    min_level: Level,
    /// Open groups joined with `.`, with a trailing `.` when non-empty.
    prefix: String,
    /// Pre-rendered ` key=value` pairs from `with_attrs`.
    bound: String,
}

impl ConsoleHandler {
    pub fn new<W>(out: W, min_level: Level) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            min_level,
            prefix: String::new(),
            bound: String::new(),
        }
    }

    pub fn stdout(min_level: Level) -> Self {
        Self::new(io::stdout(), min_level)
    }

    fn render(&self, record: &Record) -> String {
        let time = DateTime::<Utc>::from(record.time).to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut line = format!("time={time} level={} msg=", record.level);
        push_value(&mut line, &record.message);
        line.push_str(&self.bound);
        for attr in &record.attrs {
            push_attr(&mut line, &self.prefix, attr);
        }
        line.push('\n');
        line
    }
}

impl Handler for ConsoleHandler {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let line = self.render(record);
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn with_attrs(&self, attrs: &[Attr]) -> Box<dyn Handler> {
        let mut next = self.clone();
        for attr in attrs {
            push_attr(&mut next.bound, &self.prefix, attr);
        }
        Box::new(next)
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        let mut next = self.clone();
        next.prefix.push_str(name);
        next.prefix.push('.');
        Box::new(next)
    }
}

fn push_attr(line: &mut String, prefix: &str, attr: &Attr) {
    line.push(' ');
    line.push_str(prefix);
    line.push_str(&attr.key);
    line.push('=');
    match &attr.value {
        Value::Str(s) => push_value(line, s),
        other => {
            let _ = write!(line, "{other}");
        }
    }
}

fn push_value(line: &mut String, value: &str) {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '=' || c == '"');
    if needs_quotes {
        let _ = write!(line, "{value:?}");
    } else {
        line.push_str(value);
    }
}
