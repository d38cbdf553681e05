// SPDX-License-Identifier: MIT
//! Fan-out of log records to several handlers.
//!
//! [`FanOut`] is itself a [`Handler`], so dispatchers nest: a fan-out of
//! fan-outs behaves like one flat fan-out over the leaves.
use crate::handler::{Attr, Handler, HandlerError, Level, Record};

/// What [`FanOut::handle`] does when a child fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Stop at the first failing child and return its error. Children registered
    /// after it do not see the record.
    #[default]
    FailFast,
    /// Offer the record to every child and return all failures together.
    BestEffort,
}

/// A handler that forwards every operation to an ordered list of children.
pub struct FanOut {
    handlers: Vec<Box<dyn Handler>>,
    policy: DeliveryPolicy,
}

impl FanOut {
    /// Wrap `handlers` in registration order. The list is stored as given.
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self {
            handlers,
            policy: DeliveryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn derive(&self, f: impl Fn(&dyn Handler) -> Box<dyn Handler>) -> Box<dyn Handler> {
        Box::new(FanOut {
            handlers: self.handlers.iter().map(|h| f(h.as_ref())).collect(),
            policy: self.policy,
        })
    }
}

impl Handler for FanOut {
    fn enabled(&self, level: Level) -> bool {
        self.handlers.iter().any(|h| h.enabled(level))
    }

    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let mut failures = Vec::new();
        // A child that does not want this level is skipped even though the
        // fan-out as a whole reported itself enabled.
        for handler in self.handlers.iter().filter(|h| h.enabled(record.level)) {
            if let Err(err) = handler.handle(record) {
                match self.policy {
                    DeliveryPolicy::FailFast => return Err(err),
                    DeliveryPolicy::BestEffort => failures.push(err),
                }
            }
        }
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(HandlerError::Multiple(failures)),
        }
    }

    fn with_attrs(&self, attrs: &[Attr]) -> Box<dyn Handler> {
        self.derive(|h| h.with_attrs(attrs))
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        self.derive(|h| h.with_group(name))
    }
}
