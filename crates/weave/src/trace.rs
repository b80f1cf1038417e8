//! Per-run event log.
//!
//! Every instrumented operation appends one record: which thread, at which
//! logical clock, at which call site, did what. The log can be rendered
//! interleaved (execution order) or grouped per thread.

use std::fmt::Write as _;
use std::panic::Location;

#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub thread_id: usize,
    pub clock: u64,
    pub location: &'static Location<'static>,
    pub what: String,
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<TraceEvent>,
    enabled: bool,
}

impl EventLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            events: Vec::new(),
            enabled,
        }
    }

    pub(crate) fn record(
        &mut self,
        thread_id: usize,
        clock: u64,
        location: &'static Location<'static>,
        what: String,
    ) {
        if self.enabled {
            self.events.push(TraceEvent {
                thread_id,
                clock,
                location,
                what,
            });
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in execution order.
    pub fn interleaved(&self) -> String {
        let mut out = String::new();
        for e in &self.events {
            let _ = writeln!(
                out,
                "[{}@{}] {} ({})",
                e.thread_id, e.clock, e.what, e.location
            );
        }
        out
    }

    /// Events grouped per thread, each group in execution order.
    pub fn by_thread(&self) -> String {
        let mut out = String::new();
        let max_thread = self.events.iter().map(|e| e.thread_id).max();
        let Some(max_thread) = max_thread else {
            return out;
        };
        for t in 0..=max_thread {
            let _ = writeln!(out, "thread {t}:");
            for e in self.events.iter().filter(|e| e.thread_id == t) {
                let _ = writeln!(out, "  @{} {} ({})", e.clock, e.what, e.location);
            }
        }
        out
    }
}
