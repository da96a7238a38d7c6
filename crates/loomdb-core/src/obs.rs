//! Observability boundary: warning sink, change notification sink, and the
//! store diagnostic report.
//!
//! Core store logic never prints or panics on recoverable conditions; every
//! warning flows through `LogSink` and every committed transaction flows
//! through `ChangeSink`.

use crate::store::TxReport;
use std::{cell::RefCell, collections::BTreeMap};

///
/// LogSink
///
/// Receiver for non-fatal warnings (e.g. retracting a nonexistent key).
/// Warnings are reported, never raised.
///

pub trait LogSink {
    fn warn(&self, message: &str);
}

///
/// NoopLogSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn warn(&self, _: &str) {}
}

///
/// MemoryLogSink
///
/// Collects warnings in memory for assertions and diagnostics.
///

#[derive(Debug, Default)]
pub struct MemoryLogSink {
    messages: RefCell<Vec<String>>,
}

impl MemoryLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn warn(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

///
/// ChangeSink
///
/// External observer of committed transactions. Reports are delivered
/// one-per-operation outside a batch and coalesced when a batch closes.
///

pub trait ChangeSink {
    fn notify(&self, reports: &[TxReport]);
}

///
/// StoreReport
///
/// Point-in-time store diagnostics.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreReport {
    pub basis_t: u64,
    pub entity_counts: BTreeMap<String, usize>,
    pub tx_count: usize,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_warnings() {
        let sink = MemoryLogSink::new();
        sink.warn("first");
        sink.warn("second");
        assert_eq!(sink.messages(), vec!["first", "second"]);
    }
}
