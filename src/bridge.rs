// SPDX-License-Identifier: MIT
//! Routes `tracing` events into a [`Handler`].
//!
//! Spans map onto handler scopes: entering a span named `req` with fields
//! `id = 7` logs later events through `parent.with_group("req").with_attrs([id=7])`.
//! The derived handler lives in the span's extensions, so it is built once per
//! span rather than once per event.
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record as SpanValues};
use tracing::{Event, Metadata, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::{LookupSpan, SpanRef};
use tracing_subscriber::Layer;

use crate::handler::{Attr, Handler, Level, Record, Value};

/// `tracing_subscriber` layer that hands every enabled event to a root handler.
pub struct HandlerLayer {
    root: Arc<dyn Handler>,
}

impl HandlerLayer {
    pub fn new(root: Arc<dyn Handler>) -> Self {
        Self { root }
    }

    /// Run `f` with the handler scoped to `span`, or the root outside any span.
    fn with_scope<S, R>(
        &self,
        span: Option<&SpanRef<'_, S>>,
        f: impl FnOnce(&dyn Handler) -> R,
    ) -> R
    where
        S: for<'a> LookupSpan<'a>,
    {
        if let Some(span) = span {
            if let Some(scope) = span.extensions().get::<Scope>() {
                return f(scope.0.as_ref());
            }
        }
        f(self.root.as_ref())
    }
}

/// Handler derived for one span.
struct Scope(Box<dyn Handler>);

impl<S> Layer<S> for HandlerLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        metadata.is_span() || self.root.enabled(Level::from(*metadata.level()))
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::default();
        attrs.record(&mut fields);

        let parent = span.parent();
        let scoped = self.with_scope(parent.as_ref(), |handler| {
            let grouped = handler.with_group(span.name());
            if fields.attrs.is_empty() {
                grouped
            } else {
                grouped.with_attrs(&fields.attrs)
            }
        });
        span.extensions_mut().insert(Scope(scoped));
    }

    fn on_record(&self, id: &Id, values: &SpanValues<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Fields::default();
        values.record(&mut fields);
        if fields.attrs.is_empty() {
            return;
        }
        let mut extensions = span.extensions_mut();
        if let Some(scope) = extensions.get_mut::<Scope>() {
            scope.0 = scope.0.with_attrs(&fields.attrs);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // Records bridged from the `log` crate carry their real target and
        // level in `log.*` fields.
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let mut fields = Fields::default();
        event.record(&mut fields);
        let record = Record {
            time: SystemTime::now(),
            level: Level::from(*metadata.level()),
            target: metadata.target().to_string(),
            message: fields.message.unwrap_or_default(),
            attrs: fields.attrs,
        };

        let span = ctx.event_span(event);
        if let Err(err) = self.with_scope(span.as_ref(), |handler| handler.handle(&record)) {
            // Call sites cannot observe handler failures; stderr is the last resort.
            eprintln!("otel-fanout: failed to handle log record: {err}");
        }
    }
}

/// Collects event or span fields; the `message` field is kept apart and the
/// `log.*` fields added by the `log` bridge are dropped.
#[derive(Default)]
struct Fields {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl Fields {
    fn push(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if !field.name().starts_with("log.") {
            self.attrs.push(Attr {
                key: field.name().to_string(),
                value,
            });
        }
    }
}

impl Visit for Fields {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::Str(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, Value::Str(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FanOut;
    use crate::testing::{callers, journal, Recorder};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn with_handler(root: impl Handler + 'static, f: impl FnOnce()) {
        let subscriber = Registry::default().with(HandlerLayer::new(Arc::new(root)));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn event_becomes_one_record() {
        let log = journal();
        with_handler(Recorder::new("console", &log), || {
            tracing::warn!(user = "ada", attempts = 3u64, "login throttled");
        });

        let seen = log.lock().clone();
        assert_eq!(seen.len(), 1);
        let record = &seen[0].record;
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.message, "login throttled");
        assert_eq!(
            record.attrs,
            vec![Attr::new("user", "ada"), Attr::new("attempts", 3u64)]
        );
        assert_eq!(record.target, module_path!());
    }

    #[test]
    fn log_crate_records_keep_their_own_target() {
        let _ = tracing_log::LogTracer::init();
        let sink = journal();
        with_handler(Recorder::new("console", &sink), || {
            log::warn!(target: "reqwest::connect", "connection refused");
        });

        let seen = sink.lock().clone();
        assert_eq!(seen.len(), 1);
        let record = &seen[0].record;
        assert_eq!(record.target, "reqwest::connect");
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.message, "connection refused");
        assert!(record.attrs.is_empty(), "unexpected attrs {:?}", record.attrs);
    }

    #[test]
    fn display_and_debug_fields_are_rendered_as_strings() {
        let log = journal();
        with_handler(Recorder::new("console", &log), || {
            let path = std::path::PathBuf::from("/tmp/x");
            tracing::info!(path = ?path, code = %404, "missing");
        });

        let record = log.lock()[0].record.clone();
        assert_eq!(
            record.attrs,
            vec![Attr::new("path", "\"/tmp/x\""), Attr::new("code", "404")]
        );
    }

    #[test]
    fn spans_open_groups_and_bind_fields() {
        let log = journal();
        with_handler(Recorder::new("console", &log), || {
            let request = tracing::info_span!("req", id = 7i64);
            let _request = request.enter();
            let query = tracing::info_span!("db");
            let _query = query.enter();
            tracing::info!("query done");
        });

        let seen = log.lock()[0].clone();
        assert_eq!(seen.groups, vec!["req".to_string(), "db".to_string()]);
        assert_eq!(seen.bound, vec![Attr::new("id", 7i64)]);
    }

    #[test]
    fn late_span_fields_are_bound() {
        let log = journal();
        with_handler(Recorder::new("console", &log), || {
            let span = tracing::info_span!("job", status = tracing::field::Empty);
            let _guard = span.enter();
            span.record("status", "done");
            tracing::info!("finished");
        });

        assert_eq!(log.lock()[0].bound, vec![Attr::new("status", "done")]);
    }

    #[test]
    fn events_outside_spans_use_the_root() {
        let log = journal();
        with_handler(Recorder::new("console", &log), || {
            tracing::info!("plain");
        });

        let seen = log.lock()[0].clone();
        assert!(seen.groups.is_empty());
        assert!(seen.bound.is_empty());
    }

    #[test]
    fn disabled_fanout_drops_events_before_dispatch() {
        let log = journal();
        let root = FanOut::new(vec![
            Recorder::new("remote", &log).disabled().boxed(),
            Recorder::new("console", &log).disabled().boxed(),
        ]);
        with_handler(root, || {
            tracing::error!("nobody listens");
        });

        assert!(log.lock().is_empty());
    }

    #[test]
    fn only_enabled_children_receive_the_event() {
        let log = journal();
        let root = FanOut::new(vec![
            Recorder::new("remote", &log).disabled().boxed(),
            Recorder::new("console", &log).boxed(),
        ]);
        with_handler(root, || {
            tracing::info!(user = "ada", "signed in");
        });

        assert_eq!(callers(&log), vec!["console"]);
        let record = log.lock()[0].record.clone();
        assert_eq!(record.message, "signed in");
        assert_eq!(record.attrs, vec![Attr::new("user", "ada")]);
    }

    #[test]
    fn handler_errors_do_not_reach_the_call_site() {
        let log = journal();
        let root = FanOut::new(vec![
            Recorder::new("remote", &log).failing("collector gone").boxed(),
            Recorder::new("console", &log).boxed(),
        ]);
        with_handler(root, || {
            tracing::info!("still running");
        });

        assert_eq!(callers(&log), vec!["remote"]);
    }
}
