//! Diagnostic Trace Sink
//!
//! External tooling can watch engine activity by installing a [`TraceSink`]
//! on a runtime. Sinks are pure observers: they receive a [`TraceRecord`] for
//! each node lifecycle event and cannot influence propagation.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use serde::Serialize;

use crate::graph::{NodeId, NodeKind};

/// What happened to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    Created,
    Read,
    Written,
    Recomputed,
    ReactionRun,
    Disposed,
    TransactionClosed,
}

/// One structured trace record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub event: TraceEvent,
    /// Absent for runtime-wide events such as `TransactionClosed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Node version after the event.
    pub version: u64,
}

impl TraceRecord {
    pub(crate) fn node(
        event: TraceEvent,
        node: NodeId,
        kind: NodeKind,
        name: Option<&str>,
        version: u64,
    ) -> Self {
        Self {
            event,
            node: Some(node),
            kind: Some(kind),
            name: name.map(str::to_owned),
            version,
        }
    }

    pub(crate) fn runtime(event: TraceEvent) -> Self {
        Self {
            event,
            node: None,
            kind: None,
            name: None,
            version: 0,
        }
    }
}

/// Receiver of trace records.
pub trait TraceSink {
    fn record(&self, record: &TraceRecord);
}

/// Forwards every record to `tracing` at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, record: &TraceRecord) {
        tracing::trace!(
            target: "trellis::trace",
            event = ?record.event,
            node = ?record.node,
            kind = ?record.kind,
            name = record.name.as_deref().unwrap_or(""),
            version = record.version,
            "trace record"
        );
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> TraceSink for JsonLinesSink<W> {
    fn record(&self, record: &TraceRecord) {
        let mut writer = self.writer.borrow_mut();
        let written = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(err) = written {
            tracing::warn!("trace sink write failed: {}", err);
        }
    }
}

/// Keeps records in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<TraceRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.borrow().clone()
    }

    /// Records of a single event type, in arrival order.
    pub fn events(&self, event: TraceEvent) -> Vec<TraceRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.event == event)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: &TraceRecord) {
        self.records.borrow_mut().push(record.clone());
    }
}
