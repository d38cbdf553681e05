// SPDX-License-Identifier: MIT
//! Handler doubles shared by the unit tests.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::{Attr, Handler, HandlerError, Level, Record};

/// What a [`Recorder`] saw for one record.
#[derive(Clone, Debug, PartialEq)]
pub struct Seen {
    pub name: &'static str,
    pub groups: Vec<String>,
    pub bound: Vec<Attr>,
    pub record: Record,
}

pub type Journal = Arc<Mutex<Vec<Seen>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Stub handler that appends everything it handles to a shared journal.
#[derive(Clone)]
pub struct Recorder {
    name: &'static str,
    enabled: bool,
    fail: Option<&'static str>,
    groups: Vec<String>,
    bound: Vec<Attr>,
    journal: Journal,
}

impl Recorder {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            enabled: true,
            fail: None,
            groups: Vec::new(),
            bound: Vec::new(),
            journal: journal.clone(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn failing(mut self, message: &'static str) -> Self {
        self.fail = Some(message);
        self
    }

    pub fn boxed(self) -> Box<dyn Handler> {
        Box::new(self)
    }
}

impl Handler for Recorder {
    fn enabled(&self, _level: Level) -> bool {
        self.enabled
    }

    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        self.journal.lock().push(Seen {
            name: self.name,
            groups: self.groups.clone(),
            bound: self.bound.clone(),
            record: record.clone(),
        });
        match self.fail {
            Some(message) => Err(HandlerError::Other(message.to_string())),
            None => Ok(()),
        }
    }

    fn with_attrs(&self, attrs: &[Attr]) -> Box<dyn Handler> {
        let mut next = self.clone();
        next.bound.extend_from_slice(attrs);
        Box::new(next)
    }

    fn with_group(&self, name: &str) -> Box<dyn Handler> {
        let mut next = self.clone();
        next.groups.push(name.to_string());
        Box::new(next)
    }
}

/// Names of the handlers that saw a record, in call order.
pub fn callers(journal: &Journal) -> Vec<&'static str> {
    journal.lock().iter().map(|seen| seen.name).collect()
}
